// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Out-of-band reconcile requests.

use futures::channel::mpsc;
use tracing::{debug, warn};

/// Handle that asks the controller to reconcile every CR.
///
/// The receiving end is fed to the controller as a trigger stream. Nudges
/// that arrive while one is already pending are coalesced.
#[derive(Clone)]
pub struct ReconcileTrigger {
    tx: mpsc::Sender<()>,
}

impl ReconcileTrigger {
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    pub fn nudge(&self) {
        match self.tx.clone().try_send(()) {
            Ok(()) => debug!("Reconcile requested"),
            Err(e) if e.is_full() => debug!("Reconcile already pending"),
            Err(_) => warn!("Reconcile trigger is closed, dropping request"),
        }
    }
}
