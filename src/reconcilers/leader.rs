// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Choosing the one BtpOperator that drives the installation.

use crate::types::BtpOperator;
use kube::ResourceExt;

/// The active CR: earliest creation timestamp, ties broken by name and then
/// namespace. CRs without a creation timestamp sort last.
pub fn select_leader(crs: &[BtpOperator]) -> Option<&BtpOperator> {
    crs.iter().min_by(|a, b| {
        let key = |cr: &BtpOperator| {
            let created = cr.metadata.creation_timestamp.as_ref().map(|t| t.0);
            (created.is_none(), created, cr.name_any(), cr.namespace().unwrap_or_default())
        };
        key(a).cmp(&key(b))
    })
}

/// Whether `cr` is the same object as `leader`
pub fn is_leader(cr: &BtpOperator, leader: &BtpOperator) -> bool {
    match (cr.uid(), leader.uid()) {
        (Some(a), Some(b)) => a == b,
        _ => cr.name_any() == leader.name_any() && cr.namespace() == leader.namespace(),
    }
}

/// Status message recorded on every CR that is not the leader
pub fn older_cr_message(leader: &BtpOperator) -> String {
    format!(
        "'{}' BtpOperator CR in '{}' namespace reconciles the module",
        leader.name_any(),
        leader.namespace().unwrap_or_default()
    )
}
