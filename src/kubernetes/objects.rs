// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Conversions between typed resources and dynamic objects.

use crate::kubernetes::client::{ClusterError, ClusterResult};
use kube::api::{DynamicObject, GroupVersionKind};
use serde::{de::DeserializeOwned, Serialize};

/// Convert a typed resource into a dynamic object
pub fn to_dynamic<K: Serialize>(resource: &K) -> ClusterResult<DynamicObject> {
    serde_json::to_value(resource)
        .and_then(serde_json::from_value)
        .map_err(|e| ClusterError::Serialization(e.to_string()))
}

/// Convert a dynamic object into a typed resource
pub fn from_dynamic<K: DeserializeOwned>(obj: &DynamicObject) -> ClusterResult<K> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|e| ClusterError::Serialization(e.to_string()))
}

/// Group/version/kind declared by an object's type metadata
pub fn gvk_of(obj: &DynamicObject) -> ClusterResult<GroupVersionKind> {
    let types = obj.types.as_ref().ok_or_else(|| {
        ClusterError::Serialization(format!(
            "object {:?} has no apiVersion/kind",
            obj.metadata.name
        ))
    })?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", types.api_version.as_str()),
    };
    Ok(GroupVersionKind::gvk(group, version, &types.kind))
}

/// Value of one label, if set
pub fn label<'a>(obj: &'a DynamicObject, key: &str) -> Option<&'a str> {
    obj.metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(key))
        .map(String::as_str)
}

pub fn is_deleting(obj: &DynamicObject) -> bool {
    obj.metadata.deletion_timestamp.is_some()
}
