// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Chart version tracking and cleanup of resources left behind by an upgrade.

use crate::chart::ChartManifest;
use crate::constants::{kinds, labels, versions, OPERATOR_NAME};
use crate::kubernetes::client::{ClusterClient, ClusterError};
use crate::kubernetes::objects::{from_dynamic, to_dynamic};
use crate::types::Reason;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{GroupVersionKind, ObjectMeta};
use kube::ResourceExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("failed to read the chart version record: {0}")]
    GettingConfigMap(String),

    #[error("failed to store chart details: {0}")]
    StoringChartDetails(String),

    #[error("failed to delete orphaned resources: {0}")]
    DeletingOrphans(ClusterError),
}

impl MigrationError {
    pub fn reason(&self) -> Reason {
        match self {
            MigrationError::GettingConfigMap(_) => Reason::GettingConfigMapFailed,
            MigrationError::StoringChartDetails(_) => Reason::StoringChartDetailsFailed,
            MigrationError::DeletingOrphans(_) => Reason::DeletionOfOrphanedResourcesFailed,
        }
    }
}

/// Result of comparing the chart against the version record
#[derive(Debug, Clone, PartialEq)]
pub struct VersionCheck {
    /// The record did not exist and was created
    pub created: bool,
    /// The chart version differs from the recorded one and the record moved on
    pub shifted: bool,
    /// Version recorded as current before this check
    pub old_version: String,
    /// Kinds recorded as current before this check
    pub old_kinds: Vec<GroupVersionKind>,
}

#[derive(Serialize, Deserialize)]
struct StoredKind {
    group: String,
    version: String,
    kind: String,
}

pub struct ChartVersionMigrator {
    client: Arc<dyn ClusterClient>,
}

impl ChartVersionMigrator {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Compare `chart` with the version record in `namespace`, creating the
    /// record when absent and shifting it when the version changed.
    #[instrument(skip(self, chart), fields(version = %chart.version))]
    pub async fn check_and_record_version(
        &self,
        namespace: &str,
        chart: &ChartManifest,
    ) -> Result<VersionCheck, MigrationError> {
        let current_kinds =
            encode_kinds(&chart.kinds).map_err(|e| MigrationError::StoringChartDetails(e.to_string()))?;

        let existing = match self
            .client
            .get(&kinds::config_map(), Some(namespace), versions::CONFIG_MAP)
            .await
        {
            Ok(obj) => Some(obj),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(MigrationError::GettingConfigMap(e.to_string())),
        };

        let Some(existing) = existing else {
            info!("Creating chart version record for {}", chart.version);
            self.store(namespace, &chart.version, &current_kinds, &chart.version, &current_kinds)
                .await?;
            return Ok(VersionCheck {
                created: true,
                shifted: false,
                old_version: chart.version.clone(),
                old_kinds: chart.kinds.clone(),
            });
        };

        let record: ConfigMap =
            from_dynamic(&existing).map_err(|e| MigrationError::GettingConfigMap(e.to_string()))?;
        let data = record.data.unwrap_or_default();
        let recorded_version = data
            .get(versions::CURRENT_CHART_VERSION)
            .cloned()
            .unwrap_or_default();
        let recorded_kinds_text = data.get(versions::CURRENT_GVKS).cloned().unwrap_or_default();
        let recorded_kinds = decode_kinds(&recorded_kinds_text)
            .map_err(|e| MigrationError::GettingConfigMap(e.to_string()))?;

        if recorded_version == chart.version {
            debug!("Chart version {} is unchanged", chart.version);
            return Ok(VersionCheck {
                created: false,
                shifted: false,
                old_version: recorded_version,
                old_kinds: recorded_kinds,
            });
        }

        info!(
            "Chart version changed from {} to {}",
            recorded_version, chart.version
        );
        self.store(
            namespace,
            &recorded_version,
            &recorded_kinds_text,
            &chart.version,
            &current_kinds,
        )
        .await?;

        Ok(VersionCheck {
            created: false,
            shifted: true,
            old_version: recorded_version,
            old_kinds: recorded_kinds,
        })
    }

    /// Delete every managed resource of `old_kinds` labelled with
    /// `old_version`. Kinds the cluster no longer serves are skipped.
    /// Returns the number of resources deleted.
    #[instrument(skip(self, old_kinds))]
    pub async fn delete_orphaned_resources(
        &self,
        namespace: &str,
        old_version: &str,
        old_kinds: &[GroupVersionKind],
    ) -> Result<usize, MigrationError> {
        let selector = labels::version_selector(old_version);
        let mut deleted = 0;

        for gvk in old_kinds {
            let orphans = match self.client.list(gvk, Some(namespace), Some(&selector)).await {
                Ok(orphans) => orphans,
                Err(e) if e.is_tolerated() => {
                    debug!("Skipping {}: {}", gvk.kind, e);
                    continue;
                }
                Err(e) => return Err(MigrationError::DeletingOrphans(e)),
            };

            for orphan in orphans {
                let name = orphan.name_any();
                let orphan_namespace = orphan.namespace().unwrap_or_else(|| namespace.to_string());
                match self.client.delete(gvk, Some(&orphan_namespace), &name).await {
                    Ok(()) => {
                        info!("Deleted orphaned {} {}", gvk.kind, name);
                        deleted += 1;
                    }
                    Err(e) if e.is_tolerated() => debug!("Orphaned {} {} already gone", gvk.kind, name),
                    Err(e) => return Err(MigrationError::DeletingOrphans(e)),
                }
            }
        }

        Ok(deleted)
    }

    async fn store(
        &self,
        namespace: &str,
        old_version: &str,
        old_kinds: &str,
        current_version: &str,
        current_kinds: &str,
    ) -> Result<(), MigrationError> {
        let record = ConfigMap {
            metadata: ObjectMeta {
                name: Some(versions::CONFIG_MAP.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    labels::MANAGED_BY.to_string(),
                    OPERATOR_NAME.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([
                (versions::OLD_CHART_VERSION.to_string(), old_version.to_string()),
                (versions::OLD_GVKS.to_string(), old_kinds.to_string()),
                (versions::CURRENT_CHART_VERSION.to_string(), current_version.to_string()),
                (versions::CURRENT_GVKS.to_string(), current_kinds.to_string()),
            ])),
            ..Default::default()
        };
        let obj = to_dynamic(&record).map_err(|e| MigrationError::StoringChartDetails(e.to_string()))?;
        self.client
            .apply(&kinds::config_map(), &obj)
            .await
            .map_err(|e| MigrationError::StoringChartDetails(e.to_string()))?;
        Ok(())
    }
}

fn encode_kinds(kinds: &[GroupVersionKind]) -> Result<String, serde_yaml::Error> {
    let stored: Vec<StoredKind> = kinds
        .iter()
        .map(|gvk| StoredKind {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        })
        .collect();
    serde_yaml::to_string(&stored)
}

fn decode_kinds(text: &str) -> Result<Vec<GroupVersionKind>, serde_yaml::Error> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let stored: Vec<StoredKind> = serde_yaml::from_str(text)?;
    Ok(stored
        .into_iter()
        .map(|k| GroupVersionKind::gvk(&k.group, &k.version, &k.kind))
        .collect())
}
