// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The BtpOperator state machine.
//!
//! One pass reads the CR, settles leadership among all CRs, then acts on the
//! CR's state and writes the resulting status. A failing step records its
//! reason and ends the pass; the next pass starts over from the top.

use crate::certs::{CertificateManager, Rotation};
use crate::chart::{read_chart, read_manifests, ChartError, ChartInstaller, Credentials, InstallParams};
use crate::config::{ControllerConfig, SharedConfig};
use crate::constants::{credentials, kinds, FINALIZER};
use crate::error::{ManagerError, Result};
use crate::kubernetes::client::{ClusterClient, ClusterResult};
use crate::kubernetes::ensure_namespace_exists;
use crate::kubernetes::objects::from_dynamic;
use crate::reconcilers::deprovisioning::{DeprovisionError, DeprovisioningCoordinator};
use crate::reconcilers::leader::{is_leader, older_cr_message, select_leader};
use crate::reconcilers::migration::ChartVersionMigrator;
use crate::types::{BtpOperator, Reason, State};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::controller::Action;
use kube::ResourceExt;
use serde_json::json;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument, warn};

/// Result of one reconcile pass
#[derive(Debug)]
pub struct PassOutcome {
    pub action: Action,
    /// The CR is being deleted and still holds our finalizer
    pub deprovisioning: bool,
}

impl PassOutcome {
    fn idle() -> Self {
        Self {
            action: Action::await_change(),
            deprovisioning: false,
        }
    }
}

/// A step that failed with a reason to record on the CR
struct Failure {
    reason: Reason,
    message: String,
}

impl Failure {
    fn new(reason: Reason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

pub struct ReconciliationEngine {
    client: Arc<dyn ClusterClient>,
    installer: Arc<dyn ChartInstaller>,
    config: SharedConfig,
    certificates: CertificateManager,
    migrator: ChartVersionMigrator,
    coordinator: DeprovisioningCoordinator,
    /// UID of the leader whose update check already ran
    update_checked: Mutex<Option<String>>,
}

impl ReconciliationEngine {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        installer: Arc<dyn ChartInstaller>,
        config: SharedConfig,
    ) -> Self {
        Self {
            certificates: CertificateManager::new(client.clone()),
            migrator: ChartVersionMigrator::new(client.clone()),
            coordinator: DeprovisioningCoordinator::new(client.clone()),
            client,
            installer,
            config,
            update_checked: Mutex::new(None),
        }
    }

    #[instrument(skip(self))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<PassOutcome> {
        let config = self.config.snapshot();

        let obj = match self.client.get(&kinds::btp_operator(), Some(namespace), name).await {
            Ok(obj) => obj,
            Err(e) if e.is_not_found() => {
                debug!("BtpOperator {}/{} is gone", namespace, name);
                return Ok(PassOutcome::idle());
            }
            Err(e) => return Err(e.into()),
        };
        let mut cr: BtpOperator = from_dynamic(&obj)?;

        let all = self
            .client
            .list(&kinds::btp_operator(), None, None)
            .await?
            .iter()
            .map(from_dynamic)
            .collect::<ClusterResult<Vec<BtpOperator>>>()?;
        if all.len() > 1 {
            if let Some(leader) = select_leader(&all) {
                if !is_leader(&cr, leader) {
                    return self.handle_redundant(&mut cr, leader, &config).await;
                }
            }
            if let Some(status) = cr.status.as_mut() {
                status.conditions.clear();
            }
        }

        if !cr.has_finalizer() && !cr.is_deleting() {
            self.add_finalizer(&mut cr).await?;
        }

        if cr.is_deleting() && cr.state() != State::Deleting {
            self.set_status(&mut cr, Reason::HardDeleting, "BtpOperator is to be deleted")
                .await?;
            return Ok(PassOutcome {
                action: Action::await_change(),
                deprovisioning: cr.has_finalizer(),
            });
        }

        match cr.state() {
            State::New => self.set_status(&mut cr, Reason::Initialized, "Initialized").await?,
            State::Processing => self.handle_processing(&mut cr, &config).await?,
            State::Error | State::Warning => {
                self.set_status(&mut cr, Reason::Updated, "CR has been updated").await?
            }
            State::Ready => self.handle_ready(&mut cr, &config).await?,
            State::Deleting => {
                if self.handle_deleting(&mut cr, &config).await? {
                    return Ok(PassOutcome::idle());
                }
            }
        }

        Ok(PassOutcome {
            action: requeue_for(cr.state(), &config),
            deprovisioning: cr.is_deleting() && cr.has_finalizer(),
        })
    }

    async fn handle_redundant(
        &self,
        cr: &mut BtpOperator,
        leader: &BtpOperator,
        config: &ControllerConfig,
    ) -> Result<PassOutcome> {
        if cr.is_deleting() {
            if cr.has_finalizer() {
                info!("Releasing redundant BtpOperator {}", cr.name_any());
                self.remove_finalizer(cr).await?;
            }
            return Ok(PassOutcome::idle());
        }

        debug!("BtpOperator {} is not the leader", cr.name_any());
        self.set_status(cr, Reason::OlderCRExists, &older_cr_message(leader))
            .await?;
        Ok(PassOutcome {
            action: requeue_for(cr.state(), config),
            deprovisioning: false,
        })
    }

    async fn handle_processing(&self, cr: &mut BtpOperator, config: &ControllerConfig) -> Result<()> {
        if self.claim_update_check(cr) && self.check_for_update(cr, config).await? {
            return Ok(());
        }

        let mut params = match self.install_params(config).await {
            Ok(params) => params,
            Err(failure) => return self.record(cr, failure).await,
        };

        if let Err(e) = ensure_namespace_exists(self.client.as_ref(), &config.chart_namespace).await {
            return self.set_status(cr, Reason::ChartInstallFailed, &e.to_string()).await;
        }
        let certificates = match self.certificates.ensure(config).await {
            Ok(certificates) => certificates,
            Err(e) => return self.set_status(cr, Reason::ChartInstallFailed, &e.to_string()).await,
        };
        params.ca_bundle = Some(certificates.ca_cert_pem.clone().into_bytes());

        match self.installer.install(&params).await {
            Ok(true) => {
                if let Err(e) = self
                    .certificates
                    .reconcile_ca_bundles(certificates.ca_cert_pem.as_bytes())
                    .await
                {
                    return self.set_status(cr, Reason::ChartInstallFailed, &e.to_string()).await;
                }
                self.set_status(cr, Reason::ReconcileSucceeded, "Reconcile succeeded")
                    .await
            }
            Ok(false) => {
                info!("Chart {} installed but not ready yet", params.chart.version);
                Ok(())
            }
            Err(e) => self.set_status(cr, Reason::ChartInstallFailed, &e.to_string()).await,
        }
    }

    /// Runs once for each newly elected leader
    fn claim_update_check(&self, cr: &BtpOperator) -> bool {
        let id = cr.uid().unwrap_or_else(|| cr.name_any());
        let mut checked = match self.update_checked.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if checked.as_deref() == Some(id.as_str()) {
            return false;
        }
        *checked = Some(id);
        true
    }

    /// Returns whether the pass ends here. A fresh install has nothing to
    /// migrate and goes on to install in the same pass.
    async fn check_for_update(&self, cr: &mut BtpOperator, config: &ControllerConfig) -> Result<bool> {
        let chart = match read_chart(&config.chart_path) {
            Ok(chart) => chart,
            Err(failure) => return self.record(cr, chart_failure(failure)).await.map(|_| true),
        };

        let check = match self
            .migrator
            .check_and_record_version(&config.chart_namespace, &chart)
            .await
        {
            Ok(check) => check,
            Err(e) => return self.set_status(cr, e.reason(), &e.to_string()).await.map(|_| true),
        };
        if check.created {
            info!("Recorded chart version {} for a fresh install", chart.version);
            return Ok(false);
        }
        if !check.shifted {
            self.set_status(cr, Reason::UpdateCheckSucceeded, "Update not required")
                .await?;
            return Ok(true);
        }

        match self
            .migrator
            .delete_orphaned_resources(&config.chart_namespace, &check.old_version, &check.old_kinds)
            .await
        {
            Ok(deleted) => {
                info!(
                    "Removed {} resources of chart version {}",
                    deleted, check.old_version
                );
                let message = format!(
                    "Updated from chart version {} to {}",
                    check.old_version, chart.version
                );
                self.set_status(cr, Reason::UpdateDone, &message).await?;
            }
            Err(e) => self.set_status(cr, e.reason(), &e.to_string()).await?,
        }
        Ok(true)
    }

    async fn handle_ready(&self, cr: &mut BtpOperator, config: &ControllerConfig) -> Result<()> {
        let mut params = match self.install_params(config).await {
            Ok(params) => params,
            Err(failure) => return self.record(cr, failure).await,
        };

        let certificates = match self.certificates.ensure(config).await {
            Ok(certificates) => certificates,
            Err(e) => return self.set_status(cr, Reason::ConsistencyCheckFailed, &e.to_string()).await,
        };
        if certificates.rotation != Rotation::None {
            info!("Certificates rotated ({:?}), refreshing CA bundles", certificates.rotation);
        }
        if let Err(e) = self
            .certificates
            .reconcile_ca_bundles(certificates.ca_cert_pem.as_bytes())
            .await
        {
            return self.set_status(cr, Reason::ConsistencyCheckFailed, &e.to_string()).await;
        }
        params.ca_bundle = Some(certificates.ca_cert_pem.into_bytes());

        match self.installer.is_consistent(&params).await {
            Ok(true) => {
                debug!("Chart {} is consistent", params.chart.version);
                Ok(())
            }
            Ok(false) => {
                let message = format!("Chart {} differs from the cluster state", params.chart.version);
                self.set_status(cr, Reason::InconsistentChart, &message).await
            }
            Err(e) => self.set_status(cr, Reason::ConsistencyCheckFailed, &e.to_string()).await,
        }
    }

    /// Returns whether the CR was released and will disappear
    async fn handle_deleting(&self, cr: &mut BtpOperator, config: &ControllerConfig) -> Result<bool> {
        if !cr.is_deleting() || !cr.has_finalizer() {
            return Ok(false);
        }

        let chart_kinds = match read_chart(&config.chart_path) {
            Ok(chart) => chart.kinds,
            Err(e) => {
                warn!("Cannot read chart, removing certificate secrets only: {}", e);
                Vec::new()
            }
        };

        let mut soft_deleting = cr.clone();
        let outcome = self
            .coordinator
            .deprovision(config, &chart_kinds, || async move {
                self.set_status(&mut soft_deleting, Reason::SoftDeleting, "Being soft deleted")
                    .await
            })
            .await;

        match outcome {
            Ok(outcome) => {
                info!("Deprovisioning finished after hard delete {:?}", outcome);
                self.remove_finalizer(cr).await?;
                self.nudge_successors(cr).await?;
                Ok(true)
            }
            Err(DeprovisionError::Status(e)) => Err(e),
            Err(e) => {
                self.set_status(cr, Reason::ResourceRemovalFailed, &e.to_string())
                    .await?;
                Ok(false)
            }
        }
    }

    /// Move every other remaining CR to Processing so a successor is elected
    async fn nudge_successors(&self, released: &BtpOperator) -> Result<()> {
        for obj in self.client.list(&kinds::btp_operator(), None, None).await? {
            let mut other: BtpOperator = from_dynamic(&obj)?;
            if other.uid() == released.uid() || other.is_deleting() {
                continue;
            }
            self.set_status(&mut other, Reason::Processing, "After deprovisioning")
                .await?;
        }
        Ok(())
    }

    async fn install_params(&self, config: &ControllerConfig) -> std::result::Result<InstallParams, Failure> {
        let credentials = self.read_credentials(config).await?;
        let chart = read_chart(&config.chart_path).map_err(chart_failure)?;
        let outdated = read_manifests(&Path::new(&config.resources_path).join("delete"))
            .map_err(|e| Failure::new(Reason::PreparingInstallInfoFailed, e.to_string()))?;

        Ok(InstallParams {
            chart,
            outdated,
            namespace: config.chart_namespace.clone(),
            credentials,
            enable_limited_cache: config.enable_limited_cache,
            ca_bundle: None,
            ready_timeout: config.ready_timeout,
            ready_check_interval: config.ready_check_interval,
        })
    }

    async fn read_credentials(&self, config: &ControllerConfig) -> std::result::Result<Credentials, Failure> {
        let obj = match self
            .client
            .get(&kinds::secret(), Some(&config.chart_namespace), &config.secret_name)
            .await
        {
            Ok(obj) => obj,
            Err(e) => {
                if !e.is_not_found() {
                    warn!("Failed to read secret {}: {}", config.secret_name, e);
                }
                return Err(Failure::new(Reason::MissingSecret, "Secret resource not found"));
            }
        };
        let secret: Secret =
            from_dynamic(&obj).map_err(|e| Failure::new(Reason::InvalidSecret, e.to_string()))?;
        let data = secret.data.unwrap_or_default();

        let mut missing_keys = Vec::new();
        let mut missing_values = Vec::new();
        for key in credentials::REQUIRED_KEYS {
            match data.get(key) {
                None => missing_keys.push(key),
                Some(value) if value.0.is_empty() => missing_values.push(key),
                Some(_) => {}
            }
        }
        let mut problems = Vec::new();
        if !missing_keys.is_empty() {
            problems.push(format!("key(s) {} not found", missing_keys.join(", ")));
        }
        if !missing_values.is_empty() {
            problems.push(format!("missing value(s) for {} key(s)", missing_values.join(", ")));
        }
        if !problems.is_empty() {
            return Err(Failure::new(Reason::InvalidSecret, problems.join(", ")));
        }

        let value = |key: &str| {
            data.get(key)
                .map(|v| String::from_utf8_lossy(&v.0).into_owned())
                .unwrap_or_default()
        };
        Ok(Credentials {
            client_id: value(credentials::CLIENT_ID),
            client_secret: value(credentials::CLIENT_SECRET),
            sm_url: value(credentials::SM_URL),
            token_url: value(credentials::TOKEN_URL),
            cluster_id: value(credentials::CLUSTER_ID),
        })
    }

    async fn add_finalizer(&self, cr: &mut BtpOperator) -> Result<()> {
        let mut finalizers = cr.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        self.client
            .patch_merge(
                &kinds::btp_operator(),
                cr.namespace().as_deref(),
                &cr.name_any(),
                &json!({"metadata": {"finalizers": finalizers}}),
            )
            .await?;
        debug!("Added finalizer to {}", cr.name_any());
        cr.metadata.finalizers = Some(finalizers);
        Ok(())
    }

    async fn remove_finalizer(&self, cr: &mut BtpOperator) -> Result<()> {
        let finalizers: Vec<String> = cr
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != FINALIZER)
            .cloned()
            .collect();
        match self
            .client
            .patch_merge(
                &kinds::btp_operator(),
                cr.namespace().as_deref(),
                &cr.name_any(),
                &json!({"metadata": {"finalizers": finalizers}}),
            )
            .await
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        debug!("Removed finalizer from {}", cr.name_any());
        cr.metadata.finalizers = Some(finalizers);
        Ok(())
    }

    async fn record(&self, cr: &mut BtpOperator, failure: Failure) -> Result<()> {
        self.set_status(cr, failure.reason, &failure.message).await
    }

    async fn set_status(&self, cr: &mut BtpOperator, reason: Reason, message: &str) -> Result<()> {
        let name = cr.name_any();
        let namespace = cr.namespace();
        let generation = cr.metadata.generation;
        let status = cr.status.get_or_insert_with(Default::default);
        status.set_reason(reason, message, generation);
        info!(name = %name, state = ?status.state, reason = %reason, "{}", message);

        let value =
            serde_json::to_value(&*status).map_err(|e| ManagerError::InvalidObject(e.to_string()))?;
        self.client
            .patch_status(&kinds::btp_operator(), namespace.as_deref(), &name, &value)
            .await?;
        Ok(())
    }
}

fn chart_failure(err: ChartError) -> Failure {
    match err {
        ChartError::EmptyPath => Failure::new(Reason::ChartPathEmpty, err.to_string()),
        other => Failure::new(Reason::PreparingInstallInfoFailed, other.to_string()),
    }
}

fn requeue_for(state: State, config: &ControllerConfig) -> Action {
    match state {
        State::Processing | State::Error | State::Warning => {
            Action::requeue(config.processing_state_requeue_interval)
        }
        State::Ready => Action::requeue(config.ready_state_requeue_interval),
        State::New | State::Deleting => Action::await_change(),
    }
}
