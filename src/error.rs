// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::certs::CertificateError;
use crate::chart::ChartError;
use crate::kubernetes::ClusterError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Cluster operation failed: {0}")]
    ClusterError(#[from] ClusterError),

    #[error("Chart error: {0}")]
    ChartError(#[from] ChartError),

    #[error("Certificate error: {0}")]
    CertificateError(#[from] CertificateError),

    #[error("Invalid object: {0}")]
    InvalidObject(String),

    #[error("Namespace creation failed: {0}")]
    NamespaceError(String),
}

pub type Result<T> = std::result::Result<T, ManagerError>;
