// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Namespace management utilities

use crate::constants::kinds;
use crate::error::{ManagerError, Result};
use crate::kubernetes::client::ClusterClient;
use kube::api::{DynamicObject, ObjectMeta};
use kube::ResourceExt;
use tracing::{debug, info, instrument};

/// Ensure a namespace exists in the cluster, create if it doesn't
#[instrument(skip(client))]
pub async fn ensure_namespace_exists(client: &dyn ClusterClient, namespace: &str) -> Result<()> {
    match client.get(&kinds::namespace(), None, namespace).await {
        Ok(_) => {
            debug!("Namespace {} already exists", namespace);
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            info!("Creating namespace {}", namespace);
            let ns = DynamicObject {
                types: None,
                metadata: ObjectMeta {
                    name: Some(namespace.to_string()),
                    ..Default::default()
                },
                data: serde_json::json!({}),
            };
            client.apply(&kinds::namespace(), &ns).await?;
            info!("Namespace {} created successfully", namespace);
            Ok(())
        }
        Err(e) => Err(ManagerError::NamespaceError(format!(
            "Failed to check/create namespace {}: {}",
            namespace, e
        ))),
    }
}

/// Names of every namespace in the cluster
#[instrument(skip(client))]
pub async fn list_namespace_names(client: &dyn ClusterClient) -> Result<Vec<String>> {
    let namespaces = client.list(&kinds::namespace(), None, None).await?;
    Ok(namespaces.iter().map(|ns| ns.name_any()).collect())
}
