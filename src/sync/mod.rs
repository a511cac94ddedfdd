// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reconcile triggers and supervised background watches.

pub mod dependents;
pub mod supervisor;
pub mod trigger;

pub use dependents::dependent_watcher;
pub use supervisor::Supervisor;
pub use trigger::ReconcileTrigger;
