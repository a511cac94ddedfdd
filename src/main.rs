// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use kube::Client;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use btp_manager::chart::ManifestInstaller;
use btp_manager::config::{start_configmap_watch, Config, SharedConfig};
use btp_manager::constants::kinds;
use btp_manager::kubernetes::{wait_for_kind, ClusterClient, KubeClusterClient};
use btp_manager::reconcilers::{BtpOperatorReconciler, ReconciliationEngine};
use btp_manager::sync::{dependent_watcher, ReconcileTrigger};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting BTP manager");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: chart_namespace={}, chart_path={}",
        config.controller.chart_namespace, config.controller.chart_path
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");
    let cluster: Arc<dyn ClusterClient> = Arc::new(KubeClusterClient::new(client.clone()));

    info!("Waiting for BtpOperator CRD to become available...");
    wait_for_kind(cluster.as_ref(), &kinds::btp_operator()).await;

    let shared = SharedConfig::new(config.controller.clone());
    let (trigger, requests) = ReconcileTrigger::channel();
    start_configmap_watch(
        client.clone(),
        &config.config_namespace,
        &config.config_name,
        config.controller,
        shared.clone(),
        trigger.clone(),
    );

    let installer = Arc::new(ManifestInstaller::new(cluster.clone()));
    let engine = ReconciliationEngine::new(cluster, installer, shared.clone());
    let dependents = dependent_watcher(client.clone(), trigger);
    let reconciler = BtpOperatorReconciler::new(client, engine, shared, dependents);

    info!("Starting BtpOperator controller...");
    reconciler.run(requests).await?;

    warn!("BtpOperator controller stopped");
    Ok(())
}
