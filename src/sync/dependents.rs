// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Watch on the operand's dependent resources during deprovisioning.

use crate::constants::kinds;
use crate::sync::{ReconcileTrigger, Supervisor};
use futures::{stream, StreamExt};
use kube::api::{ApiResource, DynamicObject};
use kube::{Api, Client, ResourceExt};
use kube_runtime::{watcher, WatchStreamExt};
use tracing::{debug, info, warn};

/// Supervised watch that nudges a reconcile whenever a ServiceInstance or
/// ServiceBinding is deleted, so a pending deprovisioning notices promptly.
pub fn dependent_watcher(client: Client, trigger: ReconcileTrigger) -> Supervisor {
    Supervisor::new("dependent resource watcher", move |token| {
        let client = client.clone();
        let trigger = trigger.clone();
        async move {
            let streams = kinds::dependents().map(|gvk| {
                let api: Api<DynamicObject> = Api::all_with(client.clone(), &ApiResource::from_gvk(&gvk));
                watcher(api, watcher::Config::default())
                    .default_backoff()
                    .boxed()
            });
            let mut events = stream::select_all(streams);

            info!("Watching dependent resources");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    event = events.next() => match event {
                        Some(Ok(watcher::Event::Delete(obj))) => {
                            debug!("Dependent resource {} deleted", obj.name_any());
                            trigger.nudge();
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => warn!("Error watching dependent resources: {}", e),
                        None => break,
                    },
                }
            }
            info!("Stopped watching dependent resources");
        }
    })
}
