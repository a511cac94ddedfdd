// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! BtpOperator reconciliation: leadership, chart migration, deprovisioning
//! and the state machine tying them together.

pub mod btp_operator;
pub mod deprovisioning;
pub mod engine;
pub mod leader;
pub mod migration;

pub use btp_operator::BtpOperatorReconciler;
pub use deprovisioning::{DeprovisionError, DeprovisioningCoordinator, HardDeleteOutcome};
pub use engine::{PassOutcome, ReconciliationEngine};
pub use leader::select_leader;
pub use migration::{ChartVersionMigrator, MigrationError, VersionCheck};
