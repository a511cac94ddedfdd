// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! BtpOperator controller - feeds CR events into the reconciliation engine.

use crate::config::SharedConfig;
use crate::error::{ManagerError, Result};
use crate::reconcilers::engine::{PassOutcome, ReconciliationEngine};
use crate::sync::Supervisor;
use crate::types::{BtpOperator, State};
use futures::channel::mpsc;
use futures::{future, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{
    controller::Action,
    reflector::{self, ObjectRef, Store},
    watcher, Controller, WatchStreamExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct BtpOperatorReconciler {
    client: Client,
    engine: ReconciliationEngine,
    config: SharedConfig,
    dependents: Supervisor,
}

/// State shared by every reconcile call
struct Context {
    engine: ReconciliationEngine,
    dependents: Supervisor,
    operators: Store<BtpOperator>,
}

impl BtpOperatorReconciler {
    pub fn new(
        client: Client,
        engine: ReconciliationEngine,
        config: SharedConfig,
        dependents: Supervisor,
    ) -> Self {
        Self {
            client,
            engine,
            config,
            dependents,
        }
    }

    /// Run the controller until shutdown. Every nudge on `trigger`
    /// reconciles all CRs.
    pub async fn run(self, trigger: mpsc::Receiver<()>) -> anyhow::Result<()> {
        let operators: Api<BtpOperator> = Api::all(self.client.clone());
        let settings = self.config.snapshot();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &settings.chart_namespace);

        let (reader, writer) = reflector::store();
        let events = watcher(operators, watcher::Config::default())
            .default_backoff()
            .reflect(writer)
            .try_filter_map(|event| future::ready(Ok(triggering_object(event))));

        let store = reader.clone();
        let config = self.config.clone();
        let context = Arc::new(Context {
            engine: self.engine,
            dependents: self.dependents,
            operators: reader.clone(),
        });

        Controller::for_stream(events, reader)
            .watches(secrets, watcher::Config::default(), move |secret| {
                if secret.name_any() != config.snapshot().secret_name {
                    return Vec::new();
                }
                debug!("Credentials secret changed, reconciling all BtpOperators");
                store
                    .state()
                    .iter()
                    .map(|cr| ObjectRef::from_obj(&**cr))
                    .collect()
            })
            .reconcile_all_on(trigger)
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| async move {
                match res {
                    Ok(o) => debug!("Reconciled BtpOperator: {:?}", o),
                    Err(e) => warn!("Reconciliation error: {:?}", e),
                }
            })
            .await;

        Ok(())
    }
}

/// The object to reconcile for a watch event, if any.
///
/// Updates of a CR that settled in Error or Warning are dropped so writing
/// that status does not reconcile it again right away; the requeue timer
/// retries it instead.
fn triggering_object(event: watcher::Event<BtpOperator>) -> Option<BtpOperator> {
    match event {
        watcher::Event::InitApply(cr) => Some(cr),
        watcher::Event::Apply(cr) if settled_in_error(&cr) => {
            debug!("Ignoring update of {} in {:?}", cr.name_any(), cr.state());
            None
        }
        watcher::Event::Apply(cr) => Some(cr),
        watcher::Event::Delete(_) | watcher::Event::Init | watcher::Event::InitDone => None,
    }
}

fn settled_in_error(cr: &BtpOperator) -> bool {
    matches!(cr.state(), State::Error | State::Warning) && !cr.is_deleting()
}

/// Whether any CR is still being torn down. The CR just reconciled is judged
/// by the pass outcome, the others by the cached state.
fn teardown_in_progress(reconciled: &BtpOperator, outcome: &PassOutcome, operators: &[Arc<BtpOperator>]) -> bool {
    outcome.deprovisioning
        || operators
            .iter()
            .filter(|cr| cr.uid() != reconciled.uid())
            .any(|cr| cr.is_deleting() && cr.has_finalizer())
}

async fn reconcile(cr: Arc<BtpOperator>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = cr
        .namespace()
        .ok_or_else(|| ManagerError::InvalidObject(format!("BtpOperator {} has no namespace", cr.name_any())))?;

    let outcome = ctx.engine.reconcile(&namespace, &cr.name_any()).await?;

    if teardown_in_progress(&cr, &outcome, &ctx.operators.state()) {
        ctx.dependents.start().await;
    } else {
        ctx.dependents.stop().await;
    }
    Ok(outcome.action)
}

fn error_policy(cr: Arc<BtpOperator>, error: &ManagerError, _ctx: Arc<Context>) -> Action {
    error!("Reconciliation of {} failed: {}", cr.name_any(), error);
    Action::requeue(Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FINALIZER;
    use crate::test_utils::{make_btp_operator, timestamp};
    use crate::types::{BtpOperatorStatus, Reason};

    fn make_operator(reason: Option<Reason>, deleting: bool) -> BtpOperator {
        let mut cr = make_btp_operator("btpoperator", "kyma-system", 1);
        if let Some(reason) = reason {
            let mut status = BtpOperatorStatus::default();
            status.set_reason(reason, "test", None);
            cr.status = Some(status);
        }
        if deleting {
            cr.metadata.deletion_timestamp = Some(timestamp(10));
        }
        cr
    }

    fn make_outcome(deprovisioning: bool) -> PassOutcome {
        PassOutcome {
            action: Action::await_change(),
            deprovisioning,
        }
    }

    fn make_deleting_leader() -> BtpOperator {
        let mut leader = make_btp_operator("leader", "kyma-system", 1);
        leader.metadata.deletion_timestamp = Some(timestamp(10));
        leader.metadata.finalizers = Some(vec![FINALIZER.to_string()]);
        leader
    }

    #[test]
    fn test_redundant_pass_keeps_leader_teardown_running() {
        let leader = make_deleting_leader();
        let redundant = make_btp_operator("redundant", "kyma-system", 2);
        let operators = vec![Arc::new(leader), Arc::new(redundant.clone())];

        assert!(teardown_in_progress(&redundant, &make_outcome(false), &operators));
    }

    #[test]
    fn test_released_cr_ends_teardown() {
        let leader = make_deleting_leader();
        let redundant = make_btp_operator("redundant", "kyma-system", 2);
        // The cache still shows the finalizer that this pass just removed
        let operators = vec![Arc::new(leader.clone()), Arc::new(redundant)];

        assert!(!teardown_in_progress(&leader, &make_outcome(false), &operators));
        assert!(teardown_in_progress(&leader, &make_outcome(true), &operators));
    }

    #[test]
    fn test_deleting_cr_without_our_finalizer_is_ignored() {
        let mut other = make_btp_operator("other", "kyma-system", 1);
        other.metadata.deletion_timestamp = Some(timestamp(10));
        let cr = make_btp_operator("btpoperator", "kyma-system", 2);
        let operators = vec![Arc::new(other), Arc::new(cr.clone())];

        assert!(!teardown_in_progress(&cr, &make_outcome(false), &operators));
    }

    #[test]
    fn test_updates_in_error_or_warning_are_dropped() {
        for reason in [Reason::OlderCRExists, Reason::MissingSecret] {
            let event = watcher::Event::Apply(make_operator(Some(reason), false));
            assert!(triggering_object(event).is_none());
        }
    }

    #[test]
    fn test_other_updates_pass() {
        for reason in [None, Some(Reason::Initialized), Some(Reason::ReconcileSucceeded)] {
            let event = watcher::Event::Apply(make_operator(reason, false));
            assert!(triggering_object(event).is_some());
        }
    }

    #[test]
    fn test_deleting_cr_in_error_passes() {
        let event = watcher::Event::Apply(make_operator(Some(Reason::ResourceRemovalFailed), true));
        assert!(triggering_object(event).is_some());
    }

    #[test]
    fn test_initial_listing_always_passes() {
        let event = watcher::Event::InitApply(make_operator(Some(Reason::InvalidSecret), false));
        assert!(triggering_object(event).is_some());
        assert!(triggering_object(watcher::Event::Init).is_none());
        assert!(triggering_object(watcher::Event::Delete(make_operator(None, false))).is_none());
    }
}
