// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! CRD availability checking utilities

use crate::constants::crd::{POLL_INTERVAL_SECS, POLL_MAX_INTERVAL_SECS};
use crate::constants::kinds;
use crate::kubernetes::client::{ClusterClient, ClusterResult};
use kube::api::{ApiResource, GroupVersionKind};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Name of the CustomResourceDefinition serving `gvk`
pub fn crd_name(gvk: &GroupVersionKind) -> String {
    let plural = ApiResource::from_gvk(gvk).plural;
    format!("{}.{}", plural, gvk.group)
}

/// Check whether the CRD backing `gvk` exists in the cluster.
pub async fn kind_registered(client: &dyn ClusterClient, gvk: &GroupVersionKind) -> ClusterResult<bool> {
    match client.get(&kinds::crd(), None, &crd_name(gvk)).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_not_found() => {
            debug!("CRD {} is not registered", crd_name(gvk));
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Wait for the CRD backing `gvk` to become available in the cluster.
/// This uses exponential backoff starting at POLL_INTERVAL_SECS seconds.
pub async fn wait_for_kind(client: &dyn ClusterClient, gvk: &GroupVersionKind) {
    let mut interval = POLL_INTERVAL_SECS;

    loop {
        match kind_registered(client, gvk).await {
            Ok(true) => {
                info!("{} CRD ({}/{}) is available", gvk.kind, gvk.group, gvk.version);
                return;
            }
            Ok(false) => {
                info!(
                    "{} CRD not yet available, waiting {} seconds...",
                    gvk.kind, interval
                );
            }
            Err(e) => {
                warn!(
                    "Error checking for {} CRD: {}, retrying in {} seconds...",
                    gvk.kind, e, interval
                );
            }
        }

        sleep(Duration::from_secs(interval)).await;

        // Exponential backoff with max cap
        interval = (interval * 2).min(POLL_MAX_INTERVAL_SECS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::InMemoryCluster;

    #[test]
    fn test_crd_name_uses_plural_and_group() {
        assert_eq!(
            crd_name(&kinds::service_instance()),
            "serviceinstances.services.cloud.sap.com"
        );
        assert_eq!(
            crd_name(&kinds::btp_operator()),
            "btpoperators.operator.kyma-project.io"
        );
    }

    #[tokio::test]
    async fn test_kind_registered_follows_crd_presence() {
        let cluster = InMemoryCluster::new();
        assert!(!kind_registered(&cluster, &kinds::service_binding()).await.unwrap());

        cluster.register_dependent_kinds();
        assert!(kind_registered(&cluster, &kinds::service_binding()).await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_kind_returns_when_registered() {
        let cluster = InMemoryCluster::new();
        cluster.register_dependent_kinds();
        wait_for_kind(&cluster, &kinds::service_instance()).await;
    }
}
