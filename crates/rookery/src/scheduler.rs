// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-turtle routine tasks and assignments.
//!
//! At most one routine task runs per turtle. Starting a new one cancels the
//! previous task without waiting for it to unwind; each started routine
//! publishes exactly one terminal event (`routine_finished`,
//! `routine_aborted`, or `routine_failed`). Status transitions are guarded
//! by an epoch so a cancelled predecessor can never clobber the assignment
//! of its replacement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::agent::Agent;
use crate::events::Event;
use crate::routines::{Routine, RoutineCtx};
use crate::state::AppState;
use crate::store::TurtleId;

/// Why a start/continue request was refused. All map to HTTP 404.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartError {
    UnknownRoutine,
    NotConnected,
    NoPrevious,
}

impl StartError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownRoutine => "unknown routine",
            Self::NotConnected => "turtle not connected",
            Self::NoPrevious => "no previous routine",
        }
    }
}

/// Lifecycle state of a turtle's current (or last) routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Running,
    Finished,
    Aborted,
    Failed,
    Disconnected,
}

/// What a turtle is (or was last) doing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub routine: String,
    pub status: AssignmentStatus,
    pub config: Value,
    #[serde(skip)]
    epoch: u64,
}

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns routine tasks and the assignment map.
pub struct Scheduler {
    routines: IndexMap<String, Arc<dyn Routine>>,
    tasks: Mutex<HashMap<TurtleId, RunningTask>>,
    assignments: RwLock<HashMap<TurtleId, Assignment>>,
    epoch: AtomicU64,
}

impl Scheduler {
    pub fn new(routines: IndexMap<String, Arc<dyn Routine>>) -> Self {
        Self {
            routines,
            tasks: Mutex::new(HashMap::new()),
            assignments: RwLock::new(HashMap::new()),
            epoch: AtomicU64::new(1),
        }
    }

    /// Registered routines in registration order.
    pub fn routines(&self) -> &IndexMap<String, Arc<dyn Routine>> {
        &self.routines
    }

    pub async fn assignment(&self, id: TurtleId) -> Option<Assignment> {
        self.assignments.read().await.get(&id).cloned()
    }

    /// Start `name` on turtle `id`, cancelling any routine still running
    /// there. Errors with `NotFound` for an unknown routine or a turtle that
    /// is not connected.
    pub async fn start(
        &self,
        app: Arc<AppState>,
        id: TurtleId,
        name: &str,
        config: Value,
    ) -> Result<(), StartError> {
        let Some(routine) = self.routines.get(name).cloned() else {
            return Err(StartError::UnknownRoutine);
        };
        let agent = match app.gateway.get(id).await {
            Some(a) if a.is_alive() => a,
            _ => return Err(StartError::NotConnected),
        };

        {
            let tasks = self.tasks.lock().await;
            if let Some(prior) = tasks.get(&id) {
                if !prior.handle.is_finished() {
                    info!("Turtle {id}: cancelling previous routine");
                    prior.cancel.cancel();
                }
            }
        }

        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        self.assignments.write().await.insert(
            id,
            Assignment {
                routine: name.to_owned(),
                status: AssignmentStatus::Running,
                config: config.clone(),
                epoch,
            },
        );

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let routine_name = name.to_owned();
        let handle = tokio::spawn(run_routine_task(
            app,
            agent,
            routine,
            routine_name,
            config,
            epoch,
            task_cancel,
        ));
        self.tasks.lock().await.insert(id, RunningTask { cancel, handle });
        Ok(())
    }

    /// Request cancellation of a running routine. Returns whether there was
    /// one to cancel.
    pub async fn cancel(&self, id: TurtleId) -> bool {
        let tasks = self.tasks.lock().await;
        match tasks.get(&id) {
            Some(task) if !task.handle.is_finished() => {
                task.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Re-run the last recorded routine for this turtle with its last config.
    pub async fn continue_last(&self, app: Arc<AppState>, id: TurtleId) -> Result<(), StartError> {
        let last = self.assignments.read().await.get(&id).cloned();
        let Some(last) = last else {
            return Err(StartError::NoPrevious);
        };
        self.start(app, id, &last.routine, last.config).await
    }

    /// Agent went away: cancel its routine and mark the assignment.
    pub async fn on_disconnect(&self, id: TurtleId) {
        {
            let tasks = self.tasks.lock().await;
            if let Some(task) = tasks.get(&id) {
                if !task.handle.is_finished() {
                    task.cancel.cancel();
                }
            }
        }
        let mut assignments = self.assignments.write().await;
        if let Some(assignment) = assignments.get_mut(&id) {
            assignment.status = AssignmentStatus::Disconnected;
        }
    }

    /// Transition a running assignment to a terminal status. Only the task
    /// that owns `epoch` may transition, and only out of `running`, so a
    /// stale task or a disconnect marker is never overwritten.
    async fn settle(&self, id: TurtleId, epoch: u64, status: AssignmentStatus) {
        let mut assignments = self.assignments.write().await;
        if let Some(assignment) = assignments.get_mut(&id) {
            if assignment.epoch == epoch && assignment.status == AssignmentStatus::Running {
                assignment.status = status;
            }
        }
    }
}

async fn run_routine_task(
    app: Arc<AppState>,
    agent: Arc<Agent>,
    routine: Arc<dyn Routine>,
    name: String,
    config: Value,
    epoch: u64,
    cancel: CancellationToken,
) {
    let id = agent.id;
    info!("Turtle {id}: routine '{name}' started");
    app.bus.publish(Event::RoutineStarted { turtle_id: id, routine: name.clone() }).await;

    let work = async {
        let session = agent.session().await;
        let ctx = RoutineCtx { session: &session, config };
        routine.run(&ctx).await
    };

    tokio::select! {
        _ = cancel.cancelled() => {
            app.scheduler.settle(id, epoch, AssignmentStatus::Aborted).await;
            info!("Turtle {id}: routine '{name}' aborted");
            app.bus.publish(Event::RoutineAborted { turtle_id: id, routine: name }).await;
        }
        result = work => match result {
            Ok(()) => {
                app.scheduler.settle(id, epoch, AssignmentStatus::Finished).await;
                info!("Turtle {id}: routine '{name}' finished");
                app.bus.publish(Event::RoutineFinished { turtle_id: id, routine: name }).await;
            }
            Err(e) => {
                let error_text = format!("{e:?}");
                app.scheduler.settle(id, epoch, AssignmentStatus::Failed).await;
                error!("Turtle {id}: routine '{name}' failed: {error_text}");
                app.bus
                    .publish(Event::RoutineFailed {
                        turtle_id: id,
                        routine: name,
                        error: error_text,
                    })
                    .await;
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod scheduler_tests;
