// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Chart reading and installation.

pub mod installer;
pub mod reader;

use crate::kubernetes::ClusterError;
use thiserror::Error;

pub use installer::{ChartInstaller, Credentials, InstallParams, ManifestInstaller};
pub use reader::{read_chart, read_manifests, ChartManifest};

#[derive(Error, Debug)]
pub enum ChartError {
    #[error("chart path is empty")]
    EmptyPath,

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("chart {0} does not declare a version")]
    MissingVersion(String),

    #[error("manifest in {0} has no kind or name")]
    InvalidManifest(String),

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}
