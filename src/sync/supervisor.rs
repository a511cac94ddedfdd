// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! A background task that can be switched on and off at runtime.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

type TaskFactory = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, ()> + Send + Sync>;

enum TaskState {
    Stopped,
    Running {
        token: CancellationToken,
        handle: JoinHandle<()>,
    },
}

/// Two-state (stopped/running) supervised task.
///
/// `start` and `stop` are serialized by one lock and both are idempotent.
/// The task receives a cancellation token and must return once it fires.
pub struct Supervisor {
    name: &'static str,
    task: TaskFactory,
    state: Mutex<TaskState>,
}

impl Supervisor {
    pub fn new<F, Fut>(name: &'static str, task: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            name,
            task: Arc::new(move |token| -> BoxFuture<'static, ()> { Box::pin(task(token)) }),
            state: Mutex::new(TaskState::Stopped),
        }
    }

    /// Start the task unless it is already running. Returns whether a new
    /// task was started.
    pub async fn start(&self) -> bool {
        let mut state = self.state.lock().await;
        if let TaskState::Running { handle, .. } = &*state {
            if !handle.is_finished() {
                debug!("{} is already running", self.name);
                return false;
            }
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn((self.task)(token.clone()));
        *state = TaskState::Running { token, handle };
        info!("Started {}", self.name);
        true
    }

    /// Stop the task and wait for it to finish. Returns whether a running
    /// task was stopped.
    pub async fn stop(&self) -> bool {
        let mut state = self.state.lock().await;
        match std::mem::replace(&mut *state, TaskState::Stopped) {
            TaskState::Stopped => false,
            TaskState::Running { token, handle } => {
                token.cancel();
                if let Err(e) = handle.await {
                    debug!("{} ended abnormally: {}", self.name, e);
                }
                info!("Stopped {}", self.name);
                true
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn is_running(&self) -> bool {
        match &*self.state.lock().await {
            TaskState::Stopped => false,
            TaskState::Running { handle, .. } => !handle.is_finished(),
        }
    }
}
