// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Teardown of the operand when its BtpOperator is deleted.
//!
//! Dependent ServiceBindings and ServiceInstances are first deleted through
//! the API (hard delete), which lets the operand clean up in the service
//! manager. When that fails or does not finish in time, the operand is
//! removed and the dependents are forced out by stripping their finalizers
//! (soft delete). Either way the chart's resources are removed last.

use crate::config::ControllerConfig;
use crate::constants::{kinds, labels, operand};
use crate::error::ManagerError;
use crate::kubernetes::client::{gvk_key, ClusterClient, ClusterError, ClusterResult};
use crate::kubernetes::crd::kind_registered;
use crate::kubernetes::list_namespace_names;
use crate::kubernetes::objects::is_deleting;
use kube::api::GroupVersionKind;
use kube::ResourceExt;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Error, Debug)]
pub enum DeprovisionError {
    #[error("failed to list namespaces: {0}")]
    Namespaces(String),

    #[error("soft delete failed: {0}")]
    SoftDelete(String),

    #[error("failed to remove chart resources: {0}")]
    ChartResources(ClusterError),

    #[error("failed to update status: {0}")]
    Status(ManagerError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardDeleteOutcome {
    Succeeded,
    Failed,
    TimedOut,
}

pub struct DeprovisioningCoordinator {
    client: Arc<dyn ClusterClient>,
}

impl DeprovisioningCoordinator {
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self { client }
    }

    /// Remove dependents and chart resources. `on_soft_delete` runs before
    /// the soft delete starts, so the caller can record the fallback.
    #[instrument(skip_all, fields(namespace = %config.chart_namespace))]
    pub async fn deprovision<F, Fut>(
        &self,
        config: &ControllerConfig,
        chart_kinds: &[GroupVersionKind],
        on_soft_delete: F,
    ) -> Result<HardDeleteOutcome, DeprovisionError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::error::Result<()>>,
    {
        let namespaces = list_namespace_names(self.client.as_ref())
            .await
            .map_err(|e| DeprovisionError::Namespaces(e.to_string()))?;

        let outcome = self.hard_delete(config, namespaces).await;
        match outcome {
            HardDeleteOutcome::Succeeded => info!("Dependent resources removed"),
            HardDeleteOutcome::Failed | HardDeleteOutcome::TimedOut => {
                warn!("Hard delete ended with {:?}, falling back to soft delete", outcome);
                on_soft_delete().await.map_err(DeprovisionError::Status)?;
                self.soft_delete(config).await?;
            }
        }

        self.remove_chart_resources(config, chart_kinds).await?;
        Ok(outcome)
    }

    /// Race the hard-delete worker against `hard_delete_timeout`. The worker
    /// is cancelled and awaited when the timer wins.
    pub async fn hard_delete(
        &self,
        config: &ControllerConfig,
        namespaces: Vec<String>,
    ) -> HardDeleteOutcome {
        let token = CancellationToken::new();
        let mut worker = tokio::spawn(hard_delete_worker(
            self.client.clone(),
            namespaces,
            config.hard_delete_timeout / 2,
            config.hard_delete_check_interval,
            token.clone(),
        ));

        tokio::select! {
            result = &mut worker => match result {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Hard delete worker ended abnormally: {}", e);
                    HardDeleteOutcome::Failed
                }
            },
            _ = sleep(config.hard_delete_timeout) => {
                info!("Hard delete timed out after {:?}", config.hard_delete_timeout);
                token.cancel();
                if let Err(e) = worker.await {
                    debug!("Hard delete worker ended abnormally: {}", e);
                }
                HardDeleteOutcome::TimedOut
            }
        }
    }

    /// Remove the operand and force out every remaining dependent resource
    #[instrument(skip_all)]
    pub async fn soft_delete(&self, config: &ControllerConfig) -> Result<(), DeprovisionError> {
        let limit = config.delete_request_timeout;
        let ns = config.chart_namespace.as_str();

        for (gvk, namespace, name) in [
            (kinds::deployment(), Some(ns), config.deployment_name.as_str()),
            (kinds::mutating_webhook(), None, operand::MUTATING_WEBHOOK),
            (kinds::validating_webhook(), None, operand::VALIDATING_WEBHOOK),
        ] {
            match bounded(limit, self.client.delete(&gvk, namespace, name)).await {
                Ok(()) => info!("Deleted {} {}", gvk.kind, name),
                Err(e) if e.is_tolerated() => debug!("{} {} already gone", gvk.kind, name),
                Err(e) => return Err(soft_delete_error(&gvk, e)),
            }
        }

        for gvk in kinds::dependents() {
            let registered = bounded(limit, kind_registered(self.client.as_ref(), &gvk))
                .await
                .map_err(|e| soft_delete_error(&gvk, e))?;
            if !registered {
                debug!("{} is not registered, nothing to remove", gvk.kind);
                continue;
            }

            let items = bounded(limit, self.client.list(&gvk, None, None))
                .await
                .map_err(|e| soft_delete_error(&gvk, e))?;
            info!("Soft deleting {} {} resources", items.len(), gvk.kind);

            for item in &items {
                let name = item.name_any();
                let namespace = item.namespace();
                let namespace = namespace.as_deref();

                if !is_deleting(item) {
                    match bounded(limit, self.client.delete(&gvk, namespace, &name)).await {
                        Ok(()) => {}
                        Err(e) if e.is_not_found() => continue,
                        Err(e) => return Err(soft_delete_error(&gvk, e)),
                    }
                }

                let strip = json!({"metadata": {"finalizers": null}});
                match bounded(limit, self.client.patch_merge(&gvk, namespace, &name, &strip)).await {
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(soft_delete_error(&gvk, e)),
                }

                if gvk.kind == kinds::service_binding().kind {
                    let secret = item.data["spec"]["secretName"]
                        .as_str()
                        .filter(|s| !s.is_empty())
                        .unwrap_or(&name)
                        .to_string();
                    match bounded(limit, self.client.delete(&kinds::secret(), namespace, &secret)).await {
                        Ok(()) => debug!("Deleted secret {} of binding {}", secret, name),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(soft_delete_error(&kinds::secret(), e)),
                    }
                }
            }

            let remaining = bounded(limit, self.client.list(&gvk, None, None))
                .await
                .map_err(|e| soft_delete_error(&gvk, e))?;
            if !remaining.is_empty() {
                return Err(DeprovisionError::SoftDelete(format!(
                    "{} {} resources remain",
                    remaining.len(),
                    gvk.kind
                )));
            }
        }

        Ok(())
    }

    /// Delete every managed object of the chart's kinds, plus the
    /// certificate secrets
    #[instrument(skip_all)]
    pub async fn remove_chart_resources(
        &self,
        config: &ControllerConfig,
        chart_kinds: &[GroupVersionKind],
    ) -> Result<(), DeprovisionError> {
        let selector = labels::managed_selector();
        let mut sweep: Vec<GroupVersionKind> = Vec::new();
        for gvk in chart_kinds.iter().cloned().chain([kinds::secret()]) {
            if !sweep.iter().any(|seen| gvk_key(seen) == gvk_key(&gvk)) {
                sweep.push(gvk);
            }
        }

        for gvk in &sweep {
            match self
                .client
                .delete_collection(gvk, Some(&config.chart_namespace), Some(&selector))
                .await
            {
                Ok(()) => debug!("Removed managed {} resources", gvk.kind),
                Err(e) if e.is_tolerated() => debug!("Skipping {}: {}", gvk.kind, e),
                Err(e) => return Err(DeprovisionError::ChartResources(e)),
            }
        }
        info!("Chart resources removed");
        Ok(())
    }
}

async fn hard_delete_worker(
    client: Arc<dyn ClusterClient>,
    namespaces: Vec<String>,
    request_timeout: Duration,
    check_interval: Duration,
    token: CancellationToken,
) -> HardDeleteOutcome {
    let mut registered = Vec::new();
    for gvk in kinds::dependents() {
        match cancellable(&token, kind_registered(client.as_ref(), &gvk)).await {
            None => return HardDeleteOutcome::TimedOut,
            Some(Ok(true)) => registered.push(gvk),
            Some(Ok(false)) => debug!("{} is not registered", gvk.kind),
            Some(Err(e)) => {
                warn!("Failed to check whether {} is registered: {}", gvk.kind, e);
                return HardDeleteOutcome::Failed;
            }
        }
    }

    for gvk in &registered {
        for namespace in &namespaces {
            let call = timeout(request_timeout, client.delete_collection(gvk, Some(namespace), None));
            match cancellable(&token, call).await {
                None => return HardDeleteOutcome::TimedOut,
                Some(Ok(Ok(()))) => {}
                Some(Err(_)) => debug!("Deleting {} in {} hit its deadline", gvk.kind, namespace),
                Some(Ok(Err(ClusterError::DeadlineExceeded(e)))) => {
                    debug!("Deleting {} in {} hit its deadline: {}", gvk.kind, namespace, e)
                }
                Some(Ok(Err(e))) if e.is_tolerated() => debug!("Skipping {} in {}: {}", gvk.kind, namespace, e),
                Some(Ok(Err(e))) => {
                    warn!("Failed to delete {} in {}: {}", gvk.kind, namespace, e);
                    return HardDeleteOutcome::Failed;
                }
            }
        }
    }

    loop {
        let mut remaining = 0;
        for gvk in &registered {
            match cancellable(&token, count_remaining(client.as_ref(), gvk)).await {
                None => return HardDeleteOutcome::TimedOut,
                Some(Ok(count)) => remaining += count,
                Some(Err(e)) => {
                    warn!("Failed to list {}: {}", gvk.kind, e);
                    remaining += 1;
                }
            }
        }
        if remaining == 0 {
            return HardDeleteOutcome::Succeeded;
        }

        debug!("{} dependent resources remaining", remaining);
        if cancellable(&token, sleep(check_interval)).await.is_none() {
            return HardDeleteOutcome::TimedOut;
        }
    }
}

async fn count_remaining(client: &dyn ClusterClient, gvk: &GroupVersionKind) -> ClusterResult<usize> {
    match client.list(gvk, None, None).await {
        Ok(items) => Ok(items.len()),
        Err(e) if e.is_tolerated() => Ok(0),
        Err(e) => Err(e),
    }
}

/// Run `fut` unless `token` fires first
async fn cancellable<T>(token: &CancellationToken, fut: impl Future<Output = T>) -> Option<T> {
    tokio::select! {
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

async fn bounded<T>(limit: Duration, fut: impl Future<Output = ClusterResult<T>>) -> ClusterResult<T> {
    timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(ClusterError::DeadlineExceeded(format!("no response within {:?}", limit))))
}

fn soft_delete_error(gvk: &GroupVersionKind, err: ClusterError) -> DeprovisionError {
    DeprovisionError::SoftDelete(format!("{}: {}", gvk.kind, err))
}
