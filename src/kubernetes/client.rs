// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Generic cluster access over dynamic objects.

use crate::constants::OPERATOR_NAME;
use async_trait::async_trait;
use kube::{
    api::{
        ApiResource, DeleteParams, DynamicObject, GroupVersionKind, ListParams, Patch,
        PatchParams, TypeMeta,
    },
    discovery::{self, ApiCapabilities, Scope},
    Api, Client,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClusterError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("method not supported: {0}")]
    MethodNotSupported(String),

    #[error("no matches for kind {0}")]
    NoKindMatch(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ClusterError {
    /// Errors swallowed while sweeping resources of a kind that may be gone
    pub fn is_tolerated(&self) -> bool {
        matches!(
            self,
            ClusterError::NotFound(_)
                | ClusterError::MethodNotSupported(_)
                | ClusterError::NoKindMatch(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound(_))
    }

    fn from_kube(err: kube::Error, what: &str) -> Self {
        match err {
            kube::Error::Api(resp) => match resp.code {
                404 => ClusterError::NotFound(what.to_string()),
                405 => ClusterError::MethodNotSupported(format!("{}: {}", what, resp.message)),
                409 => ClusterError::Conflict(format!("{}: {}", what, resp.message)),
                504 => ClusterError::DeadlineExceeded(format!("{}: {}", what, resp.message)),
                _ => ClusterError::Api(format!("{}: {}", what, resp.message)),
            },
            kube::Error::SerdeError(e) => ClusterError::Serialization(e.to_string()),
            other => ClusterError::Api(format!("{}: {}", what, other)),
        }
    }
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Cluster access used by every component of the manager.
///
/// A `namespace` of `None` addresses all namespaces for namespaced kinds.
/// Cluster-scoped kinds ignore the namespace argument.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> ClusterResult<DynamicObject>;

    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<DynamicObject>>;

    /// Server-side apply of `obj`, owned by the operator's field manager
    async fn apply(&self, gvk: &GroupVersionKind, obj: &DynamicObject)
        -> ClusterResult<DynamicObject>;

    /// JSON merge patch of the whole object
    async fn patch_merge(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> ClusterResult<DynamicObject>;

    /// JSON merge patch of the status subresource
    async fn patch_status(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        status: &serde_json::Value,
    ) -> ClusterResult<()>;

    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> ClusterResult<()>;

    async fn delete_collection(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ClusterResult<()>;
}

/// `ClusterClient` backed by a kube `Client` and API discovery
pub struct KubeClusterClient {
    client: Client,
    resources: Mutex<HashMap<String, (ApiResource, ApiCapabilities)>>,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resources: Mutex::new(HashMap::new()),
        }
    }

    async fn resolve(&self, gvk: &GroupVersionKind) -> ClusterResult<(ApiResource, ApiCapabilities)> {
        let key = gvk_key(gvk);
        if let Some(found) = self.cached(&key) {
            return Ok(found);
        }

        let resolved = discovery::pinned_kind(&self.client, gvk)
            .await
            .map_err(|e| match e {
                kube::Error::Api(resp) if resp.code == 404 => ClusterError::NoKindMatch(key.clone()),
                kube::Error::Discovery(_) => ClusterError::NoKindMatch(key.clone()),
                other => ClusterError::from_kube(other, &key),
            })?;

        debug!("Discovered {} as {}", key, resolved.0.plural);
        if let Ok(mut resources) = self.resources.lock() {
            resources.insert(key, resolved.clone());
        }
        Ok(resolved)
    }

    fn cached(&self, key: &str) -> Option<(ApiResource, ApiCapabilities)> {
        self.resources
            .lock()
            .ok()
            .and_then(|resources| resources.get(key).cloned())
    }

    async fn api(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> ClusterResult<Api<DynamicObject>> {
        let (ar, caps) = self.resolve(gvk).await?;
        Ok(match (caps.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        })
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    #[instrument(skip(self), fields(kind = %gvk.kind))]
    async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> ClusterResult<DynamicObject> {
        let api = self.api(gvk, namespace).await?;
        api.get(name)
            .await
            .map_err(|e| ClusterError::from_kube(e, &describe(gvk, namespace, name)))
    }

    #[instrument(skip(self), fields(kind = %gvk.kind))]
    async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<DynamicObject>> {
        let api = self.api(gvk, namespace).await?;
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = api
            .list(&params)
            .await
            .map_err(|e| ClusterError::from_kube(e, &gvk_key(gvk)))?;
        Ok(list.items)
    }

    #[instrument(skip(self, obj), fields(kind = %gvk.kind, name = ?obj.metadata.name))]
    async fn apply(
        &self,
        gvk: &GroupVersionKind,
        obj: &DynamicObject,
    ) -> ClusterResult<DynamicObject> {
        let (_, caps) = self.resolve(gvk).await?;
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| ClusterError::Serialization(format!("{} without a name", gvk.kind)))?;

        let mut body = obj.clone();
        body.types = Some(TypeMeta {
            api_version: gvk.api_version(),
            kind: gvk.kind.clone(),
        });
        body.metadata.resource_version = None;
        body.metadata.managed_fields = None;
        if caps.scope == Scope::Cluster {
            body.metadata.namespace = None;
        }

        let api = self.api(gvk, body.metadata.namespace.as_deref()).await?;
        api.patch(
            &name,
            &PatchParams::apply(OPERATOR_NAME).force(),
            &Patch::Apply(&body),
        )
        .await
        .map_err(|e| ClusterError::from_kube(e, &describe(gvk, body.metadata.namespace.as_deref(), &name)))
    }

    #[instrument(skip(self, patch), fields(kind = %gvk.kind))]
    async fn patch_merge(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        patch: &serde_json::Value,
    ) -> ClusterResult<DynamicObject> {
        let api = self.api(gvk, namespace).await?;
        api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map_err(|e| ClusterError::from_kube(e, &describe(gvk, namespace, name)))
    }

    #[instrument(skip(self, status), fields(kind = %gvk.kind))]
    async fn patch_status(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
        status: &serde_json::Value,
    ) -> ClusterResult<()> {
        let api = self.api(gvk, namespace).await?;
        api.patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": status })),
        )
        .await
        .map_err(|e| ClusterError::from_kube(e, &describe(gvk, namespace, name)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(kind = %gvk.kind))]
    async fn delete(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> ClusterResult<()> {
        let api = self.api(gvk, namespace).await?;
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| ClusterError::from_kube(e, &describe(gvk, namespace, name)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(kind = %gvk.kind))]
    async fn delete_collection(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ClusterResult<()> {
        let api = self.api(gvk, namespace).await?;
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        api.delete_collection(&DeleteParams::default(), &params)
            .await
            .map_err(|e| ClusterError::from_kube(e, &gvk_key(gvk)))?;
        Ok(())
    }
}

/// Stable identifier of a kind, `group/version/Kind`
pub fn gvk_key(gvk: &GroupVersionKind) -> String {
    format!("{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

fn describe(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{} {}/{}", gvk.kind, ns, name),
        None => format!("{} {}", gvk.kind, name),
    }
}
