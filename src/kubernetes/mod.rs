// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for cluster access, CRD discovery, and namespace management.

pub mod client;
pub mod crd;
pub mod namespaces;
pub mod objects;

pub use client::{gvk_key, ClusterClient, ClusterError, ClusterResult, KubeClusterClient};
pub use crd::{kind_registered, wait_for_kind};
pub use namespaces::{ensure_namespace_exists, list_namespace_names};
