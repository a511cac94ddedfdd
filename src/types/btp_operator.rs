// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::FINALIZER;
use k8s_openapi::chrono::{SecondsFormat, Utc};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const READY_CONDITION: &str = "Ready";

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, schemars::JsonSchema)]
#[kube(group = "operator.kyma-project.io", version = "v1alpha1", kind = "BtpOperator")]
#[kube(namespaced)]
#[kube(status = "BtpOperatorStatus")]
#[kube(printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#)]
pub struct BtpOperatorSpec {}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub enum State {
    #[default]
    #[serde(rename = "")]
    New,
    Processing,
    Ready,
    Error,
    Warning,
    Deleting,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BtpOperatorStatus {
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Why the CR is in its current state. Each reason implies the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reason {
    ReconcileSucceeded,
    UpdateCheckSucceeded,
    UpdateDone,
    Initialized,
    Updated,
    Processing,
    HardDeleting,
    SoftDeleting,
    MissingSecret,
    InvalidSecret,
    OlderCRExists,
    ChartInstallFailed,
    ConsistencyCheckFailed,
    InconsistentChart,
    ResourceRemovalFailed,
    PreparingInstallInfoFailed,
    ChartPathEmpty,
    DeletionOfOrphanedResourcesFailed,
    StoringChartDetailsFailed,
    GettingConfigMapFailed,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::ReconcileSucceeded => "ReconcileSucceeded",
            Reason::UpdateCheckSucceeded => "UpdateCheckSucceeded",
            Reason::UpdateDone => "UpdateDone",
            Reason::Initialized => "Initialized",
            Reason::Updated => "Updated",
            Reason::Processing => "Processing",
            Reason::HardDeleting => "HardDeleting",
            Reason::SoftDeleting => "SoftDeleting",
            Reason::MissingSecret => "MissingSecret",
            Reason::InvalidSecret => "InvalidSecret",
            Reason::OlderCRExists => "OlderCRExists",
            Reason::ChartInstallFailed => "ChartInstallFailed",
            Reason::ConsistencyCheckFailed => "ConsistencyCheckFailed",
            Reason::InconsistentChart => "InconsistentChart",
            Reason::ResourceRemovalFailed => "ResourceRemovalFailed",
            Reason::PreparingInstallInfoFailed => "PreparingInstallInfoFailed",
            Reason::ChartPathEmpty => "ChartPathEmpty",
            Reason::DeletionOfOrphanedResourcesFailed => "DeletionOfOrphanedResourcesFailed",
            Reason::StoringChartDetailsFailed => "StoringChartDetailsFailed",
            Reason::GettingConfigMapFailed => "GettingConfigMapFailed",
        }
    }

    pub fn state(&self) -> State {
        match self {
            Reason::ReconcileSucceeded | Reason::UpdateCheckSucceeded | Reason::UpdateDone => {
                State::Ready
            }
            Reason::Initialized | Reason::Updated | Reason::Processing => State::Processing,
            Reason::HardDeleting | Reason::SoftDeleting => State::Deleting,
            Reason::MissingSecret => State::Warning,
            _ => State::Error,
        }
    }

    /// Status of the Ready condition carrying this reason
    pub fn condition_status(&self) -> &'static str {
        if self.state() == State::Ready {
            "True"
        } else {
            "False"
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BtpOperatorStatus {
    /// Move to the state implied by `reason` and record it on the Ready condition
    pub fn set_reason(&mut self, reason: Reason, message: &str, generation: Option<i64>) {
        self.state = reason.state();
        self.set_condition(Condition {
            condition_type: READY_CONDITION.to_string(),
            status: reason.condition_status().to_string(),
            reason: reason.as_str().to_string(),
            message: message.to_string(),
            observed_generation: generation,
            last_transition_time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
        });
    }

    /// Upsert by type. An identical status/reason/message keeps the existing
    /// transition time.
    pub fn set_condition(&mut self, condition: Condition) {
        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing)
                if existing.status == condition.status
                    && existing.reason == condition.reason
                    && existing.message == condition.message =>
            {
                existing.observed_generation = condition.observed_generation;
            }
            Some(existing) => *existing = condition,
            None => self.conditions.push(condition),
        }
    }

    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == READY_CONDITION)
    }
}

impl BtpOperator {
    pub fn state(&self) -> State {
        self.status.as_ref().map(|s| s.state).unwrap_or_default()
    }

    /// Reason of the Ready condition, if any
    pub fn reason(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.ready_condition())
            .map(|c| c.reason.as_str())
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|name| name == FINALIZER))
    }
}
