// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reading a chart directory into its version and manifests.

use crate::chart::ChartError;
use crate::kubernetes::objects::gvk_of;
use kube::api::{DynamicObject, GroupVersionKind};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// A chart as seen by the manager
#[derive(Debug, Clone)]
pub struct ChartManifest {
    pub version: String,
    /// Distinct kinds declared by the templates, in first-seen order
    pub kinds: Vec<GroupVersionKind>,
    pub objects: Vec<DynamicObject>,
}

#[derive(Deserialize)]
struct ChartFile {
    version: Option<String>,
}

/// Read `Chart.yaml` and every manifest under `templates/`
#[instrument]
pub fn read_chart(path: &str) -> Result<ChartManifest, ChartError> {
    if path.trim().is_empty() {
        return Err(ChartError::EmptyPath);
    }
    let root = Path::new(path);

    let chart_file = root.join("Chart.yaml");
    let content = std::fs::read_to_string(&chart_file).map_err(|source| ChartError::Io {
        path: chart_file.display().to_string(),
        source,
    })?;
    let chart: ChartFile = serde_yaml::from_str(&content).map_err(|e| ChartError::Parse {
        path: chart_file.display().to_string(),
        message: e.to_string(),
    })?;
    let version = chart
        .version
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ChartError::MissingVersion(path.to_string()))?;

    let objects = read_manifests(&root.join("templates"))?;
    let kinds = kinds_of(&objects)?;
    debug!(
        "Read chart {} with {} objects of {} kinds",
        version,
        objects.len(),
        kinds.len()
    );

    Ok(ChartManifest {
        version,
        kinds,
        objects,
    })
}

/// Every object in the `*.yaml`/`*.yml` files below `dir`.
///
/// A missing directory holds no manifests.
pub fn read_manifests(dir: &Path) -> Result<Vec<DynamicObject>, ChartError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut objects = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| ChartError::Parse {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;
        let is_manifest = entry.file_type().is_file()
            && entry
                .path()
                .extension()
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_manifest {
            continue;
        }

        let content = std::fs::read_to_string(entry.path()).map_err(|source| ChartError::Io {
            path: entry.path().display().to_string(),
            source,
        })?;
        objects.extend(parse_documents(&entry.path().display().to_string(), &content)?);
    }
    Ok(objects)
}

fn parse_documents(path: &str, content: &str) -> Result<Vec<DynamicObject>, ChartError> {
    let parse_error = |message: String| ChartError::Parse {
        path: path.to_string(),
        message,
    };

    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| parse_error(e.to_string()))?;
        if value.is_null() {
            continue;
        }
        let json = serde_json::to_value(&value).map_err(|e| parse_error(e.to_string()))?;
        let obj: DynamicObject =
            serde_json::from_value(json).map_err(|e| parse_error(e.to_string()))?;
        if obj.types.is_none() || obj.metadata.name.is_none() {
            return Err(ChartError::InvalidManifest(path.to_string()));
        }
        objects.push(obj);
    }
    Ok(objects)
}

fn kinds_of(objects: &[DynamicObject]) -> Result<Vec<GroupVersionKind>, ChartError> {
    let mut kinds: Vec<GroupVersionKind> = Vec::new();
    for obj in objects {
        let gvk = gvk_of(obj)?;
        if !kinds.contains(&gvk) {
            kinds.push(gvk);
        }
    }
    Ok(kinds)
}
