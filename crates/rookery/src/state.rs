// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::events::{Event, EventBus, LogRecord};
use crate::gateway::Gateway;
use crate::scheduler::{Assignment, Scheduler};
use crate::store::{ConnectionStatus, Coords, StateStore, TurtleId};

/// Shared orchestrator state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<StateStore>,
    pub bus: EventBus,
    pub gateway: Gateway,
    pub scheduler: Scheduler,
    pub shutdown: CancellationToken,
}

/// Summarized view of one turtle for API responses and events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurtleSummary {
    pub id: TurtleId,
    pub alive: bool,
    pub assignment: Option<Assignment>,
    pub last_seen_ms: i64,
    pub fuel_level: Option<i64>,
    pub inventory: Option<Value>,
    pub coords: Option<Coords>,
    pub heading: Option<u8>,
    pub label: Option<String>,
}

impl AppState {
    /// Combine the persisted record with the current assignment into the
    /// summary shape clients consume. `alive` derives from the persisted
    /// connection status.
    pub async fn turtle_summary(&self, id: TurtleId) -> TurtleSummary {
        let record = self.store.get(id).await;
        let assignment = self.scheduler.assignment(id).await;
        TurtleSummary {
            id,
            alive: record.connection_status == ConnectionStatus::Connected,
            assignment,
            last_seen_ms: record.last_seen_ms,
            fuel_level: record.fuel_level,
            inventory: record.inventory,
            coords: record.coords,
            heading: record.heading,
            label: record.label,
        }
    }
}

/// Turn store change notifications into `state_updated` events. One event
/// per mutation, carrying the post-write snapshot.
pub fn spawn_change_notifier(state: Arc<AppState>, mut rx: mpsc::UnboundedReceiver<TurtleId>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                id = rx.recv() => match id {
                    Some(id) => {
                        let summary = state.turtle_summary(id).await;
                        state.bus.publish(Event::StateUpdated { turtle_id: id, turtle: summary }).await;
                    }
                    None => break,
                }
            }
        }
    });
}

/// Publish mirrored log records from the tracing layer onto the bus.
pub fn spawn_log_forwarder(state: Arc<AppState>, mut rx: mpsc::UnboundedReceiver<LogRecord>) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                record = rx.recv() => match record {
                    Some(record) => {
                        state.bus
                            .publish(Event::Log {
                                turtle_id: record.turtle_id,
                                level: record.level,
                                message: record.message,
                            })
                            .await;
                    }
                    None => break,
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;
