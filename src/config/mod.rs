// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Operator configuration: startup settings from the environment and the
//! hot-reloadable controller snapshot.

pub mod watch;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::env;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub use watch::start_configmap_watch;

/// Startup configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace of the hot-reload ConfigMap
    pub config_namespace: String,
    /// Name of the hot-reload ConfigMap
    pub config_name: String,
    /// Initial controller settings
    pub controller: ControllerConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config_namespace =
            env::var("CONFIG_NAMESPACE").unwrap_or_else(|_| "kyma-system".to_string());
        let config_name = env::var("CONFIG_NAME").unwrap_or_else(|_| "sap-btp-manager".to_string());

        let mut controller = ControllerConfig::default();
        if let Ok(path) = env::var("CHART_PATH") {
            controller.chart_path = path;
        }
        if let Ok(path) = env::var("RESOURCES_PATH") {
            controller.resources_path = path;
        }
        if let Ok(bits) = env::var("RSA_KEY_BITS") {
            controller.rsa_key_bits = bits
                .parse()
                .with_context(|| format!("RSA_KEY_BITS is not a number: {}", bits))?;
        }

        Ok(Config {
            config_namespace,
            config_name,
            controller,
        })
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid duration {0:?}")]
    InvalidDuration(String),

    #[error("invalid integer {0:?}")]
    InvalidInteger(String),

    #[error("invalid boolean {0:?}")]
    InvalidBool(String),
}

/// Immutable snapshot of the controller knobs.
///
/// Components read the snapshot current at the start of their work and never
/// observe a partially applied update.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub chart_namespace: String,
    pub secret_name: String,
    pub deployment_name: String,
    pub chart_path: String,
    pub resources_path: String,
    pub enable_limited_cache: bool,
    pub processing_state_requeue_interval: Duration,
    pub ready_state_requeue_interval: Duration,
    pub ready_timeout: Duration,
    pub ready_check_interval: Duration,
    pub hard_delete_timeout: Duration,
    pub hard_delete_check_interval: Duration,
    pub delete_request_timeout: Duration,
    pub ca_certificate_expiration: Duration,
    pub webhook_certificate_expiration: Duration,
    pub expiration_boundary: Duration,
    pub rsa_key_bits: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            chart_namespace: "kyma-system".to_string(),
            secret_name: "sap-btp-manager".to_string(),
            deployment_name: "sap-btp-operator-controller-manager".to_string(),
            chart_path: "./module-chart/chart".to_string(),
            resources_path: "./module-resources".to_string(),
            enable_limited_cache: false,
            processing_state_requeue_interval: Duration::from_secs(5 * 60),
            ready_state_requeue_interval: Duration::from_secs(15 * 60),
            ready_timeout: Duration::from_secs(5 * 60),
            ready_check_interval: Duration::from_secs(30),
            hard_delete_timeout: Duration::from_secs(20 * 60),
            hard_delete_check_interval: Duration::from_secs(10),
            delete_request_timeout: Duration::from_secs(5 * 60),
            ca_certificate_expiration: Duration::from_secs(87600 * 3600),
            webhook_certificate_expiration: Duration::from_secs(8760 * 3600),
            expiration_boundary: Duration::from_secs(168 * 3600),
            rsa_key_bits: 4096,
        }
    }
}

/// Outcome of applying a ConfigMap's data to a snapshot
#[derive(Debug, Default, PartialEq)]
pub struct ApplyReport {
    pub applied: Vec<String>,
    pub unknown: Vec<String>,
    pub rejected: Vec<(String, String)>,
}

impl ControllerConfig {
    /// Returns a copy of this snapshot with every recognized key in `data`
    /// applied. Keys that fail to parse keep their current value.
    pub fn apply_overrides(&self, data: &BTreeMap<String, String>) -> (Self, ApplyReport) {
        let mut next = self.clone();
        let mut report = ApplyReport::default();

        for (key, value) in data {
            match next.apply_key(key, value) {
                Ok(true) => report.applied.push(key.clone()),
                Ok(false) => {
                    warn!("Unknown configuration key {}, ignoring", key);
                    report.unknown.push(key.clone());
                }
                Err(e) => {
                    warn!("Failed to apply configuration key {}: {}, keeping previous value", key, e);
                    report.rejected.push((key.clone(), e.to_string()));
                }
            }
        }

        (next, report)
    }

    /// Copy the field named by `key` from `previous`
    pub fn restore_key(&mut self, key: &str, previous: &ControllerConfig) {
        match key {
            "ChartNamespace" => self.chart_namespace = previous.chart_namespace.clone(),
            "SecretName" => self.secret_name = previous.secret_name.clone(),
            "DeploymentName" => self.deployment_name = previous.deployment_name.clone(),
            "ChartPath" => self.chart_path = previous.chart_path.clone(),
            "ResourcesPath" => self.resources_path = previous.resources_path.clone(),
            "EnableLimitedCache" => self.enable_limited_cache = previous.enable_limited_cache,
            "ProcessingStateRequeueInterval" => {
                self.processing_state_requeue_interval = previous.processing_state_requeue_interval
            }
            "ReadyStateRequeueInterval" => {
                self.ready_state_requeue_interval = previous.ready_state_requeue_interval
            }
            "ReadyTimeout" => self.ready_timeout = previous.ready_timeout,
            "ReadyCheckInterval" => self.ready_check_interval = previous.ready_check_interval,
            "HardDeleteTimeout" => self.hard_delete_timeout = previous.hard_delete_timeout,
            "HardDeleteCheckInterval" => {
                self.hard_delete_check_interval = previous.hard_delete_check_interval
            }
            "DeleteRequestTimeout" => self.delete_request_timeout = previous.delete_request_timeout,
            "CaCertificateExpiration" => {
                self.ca_certificate_expiration = previous.ca_certificate_expiration
            }
            "WebhookCertificateExpiration" => {
                self.webhook_certificate_expiration = previous.webhook_certificate_expiration
            }
            "ExpirationBoundary" => self.expiration_boundary = previous.expiration_boundary,
            "RsaKeyBits" => self.rsa_key_bits = previous.rsa_key_bits,
            _ => {}
        }
    }

    fn apply_key(&mut self, key: &str, value: &str) -> std::result::Result<bool, ConfigError> {
        match key {
            "ChartNamespace" => self.chart_namespace = value.to_string(),
            "SecretName" => self.secret_name = value.to_string(),
            "DeploymentName" => self.deployment_name = value.to_string(),
            "ChartPath" => self.chart_path = value.to_string(),
            "ResourcesPath" => self.resources_path = value.to_string(),
            "EnableLimitedCache" => {
                self.enable_limited_cache = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidBool(value.to_string()))?
            }
            "ProcessingStateRequeueInterval" => {
                self.processing_state_requeue_interval = parse_duration(value)?
            }
            "ReadyStateRequeueInterval" => self.ready_state_requeue_interval = parse_duration(value)?,
            "ReadyTimeout" => self.ready_timeout = parse_duration(value)?,
            "ReadyCheckInterval" => self.ready_check_interval = parse_duration(value)?,
            "HardDeleteTimeout" => self.hard_delete_timeout = parse_duration(value)?,
            "HardDeleteCheckInterval" => self.hard_delete_check_interval = parse_duration(value)?,
            "DeleteRequestTimeout" => self.delete_request_timeout = parse_duration(value)?,
            "CaCertificateExpiration" => self.ca_certificate_expiration = parse_duration(value)?,
            "WebhookCertificateExpiration" => {
                self.webhook_certificate_expiration = parse_duration(value)?
            }
            "ExpirationBoundary" => self.expiration_boundary = parse_duration(value)?,
            "RsaKeyBits" => {
                self.rsa_key_bits = value
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidInteger(value.to_string()))?
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Parse a Go-style duration such as `5m`, `1h30m`, `1.5s` or `-168h`.
///
/// The sign is accepted and dropped; callers use the magnitude.
pub fn parse_duration(input: &str) -> std::result::Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());
    let s = input.trim();
    let s = s.strip_prefix(['-', '+']).unwrap_or(s);

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if number_len == 0 {
            return Err(invalid());
        }
        let number: f64 = rest[..number_len].parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total += number * nanos_per_unit;
    }

    Ok(Duration::from_nanos(total.round() as u64))
}

/// Process-wide handle to the current configuration snapshot.
///
/// Writers swap in a whole new snapshot; readers clone the `Arc` they get.
#[derive(Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<Arc<ControllerConfig>>>,
}

impl SharedConfig {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    /// The snapshot current at the time of the call
    pub fn snapshot(&self) -> Arc<ControllerConfig> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Atomically replace the current snapshot
    pub fn replace(&self, config: ControllerConfig) {
        let next = Arc::new(config);
        match self.inner.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
        info!("Controller configuration updated");
    }
}
