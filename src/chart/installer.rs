// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Applying a chart to the cluster and checking it is still in place.

use crate::chart::{ChartError, ChartManifest};
use crate::constants::{credentials, kinds, labels, operand, OPERATOR_NAME};
use crate::kubernetes::client::ClusterClient;
use crate::kubernetes::objects::{gvk_of, label};
use async_trait::async_trait;
use k8s_openapi::ByteString;
use kube::api::{DynamicObject, GroupVersionKind};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

/// Values from the credentials secret injected into the operand
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub sm_url: String,
    pub token_url: String,
    pub cluster_id: String,
}

/// Everything needed to install or check one chart version
#[derive(Debug, Clone)]
pub struct InstallParams {
    pub chart: ChartManifest,
    /// Objects removed before installing, left over from older releases
    pub outdated: Vec<DynamicObject>,
    pub namespace: String,
    pub credentials: Credentials,
    pub enable_limited_cache: bool,
    /// PEM bundle injected into the webhook configurations
    pub ca_bundle: Option<Vec<u8>>,
    pub ready_timeout: Duration,
    pub ready_check_interval: Duration,
}

#[async_trait]
pub trait ChartInstaller: Send + Sync {
    /// Apply the chart. Returns whether the installation became ready
    /// within the configured timeout.
    async fn install(&self, params: &InstallParams) -> Result<bool, ChartError>;

    /// Whether every chart object exists with the current version label
    async fn is_consistent(&self, params: &InstallParams) -> Result<bool, ChartError>;
}

/// Installs a chart by server-side applying its rendered manifests
pub struct ManifestInstaller {
    client: Arc<dyn ClusterClient>,
}

impl ManifestInstaller {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    async fn delete_outdated(&self, params: &InstallParams) -> Result<(), ChartError> {
        for obj in &params.outdated {
            let gvk = gvk_of(obj)?;
            let name = obj.metadata.name.as_deref().unwrap_or_default();
            let namespace = obj.metadata.namespace.as_deref().unwrap_or(&params.namespace);
            match self.client.delete(&gvk, Some(namespace), name).await {
                Ok(()) => info!("Deleted outdated {} {}", gvk.kind, name),
                Err(e) if e.is_tolerated() => debug!("Outdated {} {} already gone", gvk.kind, name),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn deployments_ready(
        &self,
        objects: &[(GroupVersionKind, DynamicObject)],
        namespace: &str,
    ) -> Result<bool, ChartError> {
        for (gvk, obj) in objects.iter().filter(|(gvk, _)| *gvk == kinds::deployment()) {
            let name = obj.metadata.name.as_deref().unwrap_or_default();
            let live = self.client.get(gvk, Some(namespace), name).await?;
            let wanted = live.data["spec"]["replicas"].as_i64().unwrap_or(1);
            let available = live.data["status"]["availableReplicas"].as_i64().unwrap_or(0);
            if available < wanted {
                debug!("Deployment {} has {}/{} available replicas", name, available, wanted);
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[async_trait]
impl ChartInstaller for ManifestInstaller {
    #[instrument(skip(self, params), fields(version = %params.chart.version))]
    async fn install(&self, params: &InstallParams) -> Result<bool, ChartError> {
        self.delete_outdated(params).await?;

        let objects = render(params)?;
        for (gvk, obj) in &objects {
            self.client.apply(gvk, obj).await?;
        }
        info!("Applied {} chart objects", objects.len());

        let deadline = Instant::now() + params.ready_timeout;
        loop {
            if self.deployments_ready(&objects, &params.namespace).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                warn!("Chart not ready after {:?}", params.ready_timeout);
                return Ok(false);
            }
            sleep(params.ready_check_interval).await;
        }
    }

    #[instrument(skip(self, params), fields(version = %params.chart.version))]
    async fn is_consistent(&self, params: &InstallParams) -> Result<bool, ChartError> {
        for (gvk, obj) in render(params)? {
            let name = obj.metadata.name.as_deref().unwrap_or_default();
            let live = match self.client.get(&gvk, Some(&params.namespace), name).await {
                Ok(live) => live,
                Err(e) if e.is_tolerated() => {
                    info!("{} {} is missing", gvk.kind, name);
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            };
            if label(&live, labels::CHART_VERSION) != Some(params.chart.version.as_str()) {
                info!("{} {} does not carry chart version {}", gvk.kind, name, params.chart.version);
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// The chart objects as they are applied: labelled, placed in the target
/// namespace and carrying the injected operand values.
pub fn render(params: &InstallParams) -> Result<Vec<(GroupVersionKind, DynamicObject)>, ChartError> {
    params
        .chart
        .objects
        .iter()
        .map(|template| {
            let gvk = gvk_of(template)?;
            let mut obj = template.clone();
            let object_labels = obj.metadata.labels.get_or_insert_with(Default::default);
            object_labels.insert(labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
            object_labels.insert(labels::CHART_VERSION.to_string(), params.chart.version.clone());
            obj.metadata.namespace = Some(params.namespace.clone());

            let name = obj.metadata.name.clone().unwrap_or_default();
            if gvk == kinds::config_map() && name == operand::CONFIG_MAP {
                inject_operand_config(&mut obj, params);
            } else if gvk == kinds::secret() && name == operand::SECRET {
                inject_operand_credentials(&mut obj, &params.credentials);
            } else if gvk == kinds::mutating_webhook() || gvk == kinds::validating_webhook() {
                if let Some(bundle) = &params.ca_bundle {
                    inject_ca_bundle(&mut obj, bundle);
                }
            }
            Ok((gvk, obj))
        })
        .collect()
}

fn ensure_object<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut serde_json::Map<String, Value>> {
    if !value.is_object() {
        *value = json!({});
    }
    let entry = value
        .as_object_mut()?
        .entry(key.to_string())
        .or_insert_with(|| json!({}));
    if !entry.is_object() {
        *entry = json!({});
    }
    entry.as_object_mut()
}

fn inject_operand_config(obj: &mut DynamicObject, params: &InstallParams) {
    let Some(data) = ensure_object(&mut obj.data, "data") else {
        return;
    };
    for (key, value) in [
        ("CLUSTER_ID", params.credentials.cluster_id.clone()),
        ("RELEASE_NAMESPACE", params.namespace.clone()),
        ("MANAGEMENT_NAMESPACE", params.namespace.clone()),
        ("ENABLE_LIMITED_CACHE", params.enable_limited_cache.to_string()),
    ] {
        data.insert(key.to_string(), Value::String(value));
    }
}

fn inject_operand_credentials(obj: &mut DynamicObject, creds: &Credentials) {
    let Some(data) = ensure_object(&mut obj.data, "data") else {
        return;
    };
    for (key, value) in [
        (credentials::CLIENT_ID, &creds.client_id),
        (credentials::CLIENT_SECRET, &creds.client_secret),
        (credentials::SM_URL, &creds.sm_url),
        (credentials::TOKEN_URL, &creds.token_url),
    ] {
        data.insert(key.to_string(), encode(value.as_bytes()));
    }
}

fn inject_ca_bundle(obj: &mut DynamicObject, bundle: &[u8]) {
    if let Some(webhooks) = obj.data["webhooks"].as_array_mut() {
        for webhook in webhooks {
            if let Some(client_config) = ensure_object(webhook, "clientConfig") {
                client_config.insert("caBundle".to_string(), encode(bundle));
            }
        }
    }
}

/// Base64 form used by Secret data and CA bundles
fn encode(bytes: &[u8]) -> Value {
    serde_json::to_value(ByteString(bytes.to_vec())).unwrap_or(Value::Null)
}
