// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Hot reload of the controller configuration from a ConfigMap.

use crate::config::{ControllerConfig, SharedConfig};
use crate::sync::ReconcileTrigger;
use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{Api, Client};
use kube_runtime::watcher;
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// Watch the named ConfigMap and swap in a new snapshot on every change.
///
/// Overrides are applied on top of `base`, so removing a key reverts it to
/// the startup value and deleting the ConfigMap reverts everything.
pub fn start_configmap_watch(
    client: Client,
    namespace: &str,
    configmap_name: &str,
    base: ControllerConfig,
    shared: SharedConfig,
    trigger: ReconcileTrigger,
) {
    let namespace = namespace.to_string();
    let configmap_name = configmap_name.to_string();
    tokio::spawn(async move {
        let configmaps: Api<ConfigMap> = Api::namespaced(client, &namespace);
        let watcher_config =
            watcher::Config::default().fields(&format!("metadata.name={}", configmap_name));

        info!(
            "Starting watch for ConfigMap '{}' in namespace '{}'",
            configmap_name, namespace
        );

        let stream = watcher(configmaps, watcher_config);
        pin_mut!(stream);

        while let Some(event) = stream.next().await {
            match event {
                Ok(watcher::Event::Apply(cm)) | Ok(watcher::Event::InitApply(cm)) => {
                    info!("ConfigMap '{}' changed, reloading configuration", configmap_name);
                    let data = cm.data.unwrap_or_default();
                    reload(&base, &data, &shared, &trigger);
                }
                Ok(watcher::Event::Delete(_)) => {
                    warn!(
                        "ConfigMap '{}' was deleted, reverting to defaults",
                        configmap_name
                    );
                    reload(&base, &BTreeMap::new(), &shared, &trigger);
                }
                Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => {}
                Err(e) => {
                    error!("Error watching ConfigMap: {}", e);
                }
            }
        }

        warn!("ConfigMap watch stream ended");
    });
}

/// Apply `data` on top of `base`, publish the result and nudge a reconcile
/// when anything changed.
///
/// A key whose value fails to parse keeps the value of the current snapshot.
pub fn reload(
    base: &ControllerConfig,
    data: &BTreeMap<String, String>,
    shared: &SharedConfig,
    trigger: &ReconcileTrigger,
) -> bool {
    let (mut next, report) = base.apply_overrides(data);
    let current = shared.snapshot();
    if !report.rejected.is_empty() {
        warn!("{} configuration key(s) rejected", report.rejected.len());
        for (key, _) in &report.rejected {
            next.restore_key(key, &current);
        }
    }

    if *current == next {
        return false;
    }

    shared.replace(next);
    trigger.nudge();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_reload_publishes_and_nudges() {
        let base = ControllerConfig::default();
        let shared = SharedConfig::new(base.clone());
        let (trigger, mut rx) = ReconcileTrigger::channel();

        let data = BTreeMap::from([("ReadyTimeout".to_string(), "2m".to_string())]);
        assert!(reload(&base, &data, &shared, &trigger));

        assert_eq!(shared.snapshot().ready_timeout, Duration::from_secs(120));
        assert!(rx.try_next().unwrap().is_some());
    }

    #[test]
    fn test_reload_without_change_does_not_nudge() {
        let base = ControllerConfig::default();
        let shared = SharedConfig::new(base.clone());
        let (trigger, mut rx) = ReconcileTrigger::channel();

        let data = BTreeMap::from([("Unknown".to_string(), "x".to_string())]);
        assert!(!reload(&base, &data, &shared, &trigger));
        assert!(rx.try_next().is_err());
    }

    #[test]
    fn test_invalid_value_keeps_last_accepted_value() {
        let base = ControllerConfig::default();
        let shared = SharedConfig::new(base.clone());
        let (trigger, _rx) = ReconcileTrigger::channel();

        let good = BTreeMap::from([("HardDeleteTimeout".to_string(), "1m".to_string())]);
        assert!(reload(&base, &good, &shared, &trigger));
        let bad = BTreeMap::from([
            ("HardDeleteTimeout".to_string(), "soon".to_string()),
            ("ReadyTimeout".to_string(), "2m".to_string()),
        ]);
        assert!(reload(&base, &bad, &shared, &trigger));

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.hard_delete_timeout, Duration::from_secs(60));
        assert_eq!(snapshot.ready_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_removed_key_reverts_after_rejection() {
        let base = ControllerConfig::default();
        let shared = SharedConfig::new(base.clone());
        let (trigger, _rx) = ReconcileTrigger::channel();

        let good = BTreeMap::from([("RsaKeyBits".to_string(), "2048".to_string())]);
        reload(&base, &good, &shared, &trigger);
        let bad = BTreeMap::from([("RsaKeyBits".to_string(), "many".to_string())]);
        reload(&base, &bad, &shared, &trigger);
        assert_eq!(shared.snapshot().rsa_key_bits, 2048);

        reload(&base, &BTreeMap::new(), &shared, &trigger);
        assert_eq!(shared.snapshot().rsa_key_bits, 4096);
    }

    #[test]
    fn test_reload_with_empty_data_reverts_to_base() {
        let base = ControllerConfig::default();
        let mut changed = base.clone();
        changed.chart_namespace = "elsewhere".to_string();
        let shared = SharedConfig::new(changed);
        let (trigger, _rx) = ReconcileTrigger::channel();

        assert!(reload(&base, &BTreeMap::new(), &shared, &trigger));
        assert_eq!(shared.snapshot().chart_namespace, "kyma-system");
    }
}
