// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resource types.

pub mod btp_operator;

pub use btp_operator::{BtpOperator, BtpOperatorSpec, BtpOperatorStatus, Condition, Reason, State};
