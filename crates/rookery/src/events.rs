// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed event fan-out to dashboard subscribers.
//!
//! Every mutation of turtle state, every connect/disconnect, and every
//! routine lifecycle transition is published here and pushed to `/events`
//! WebSocket clients. Log records are mirrored onto the bus through a
//! `tracing` layer so dashboards see the same stream operators do.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use tracing_subscriber::layer::Context;

use crate::state::TurtleSummary;
use crate::store::TurtleId;

/// How long a single subscriber may take to accept an event before eviction.
const SUBSCRIBER_SEND_TIMEOUT: Duration = Duration::from_millis(200);

/// Per-subscriber channel capacity.
const SUBSCRIBER_BUFFER: usize = 64;

// -- Wire-format event types --------------------------------------------------

/// Events pushed to `/events` subscribers, tagged with a `type` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A mirrored log record, optionally attributed to one turtle.
    Log {
        #[serde(skip_serializing_if = "Option::is_none")]
        turtle_id: Option<TurtleId>,
        level: String,
        message: String,
    },
    /// A turtle connected.
    Connected { turtle_id: TurtleId, turtle: TurtleSummary },
    /// A turtle disconnected.
    Disconnected { turtle_id: TurtleId, turtle: TurtleSummary },
    /// A turtle's persisted state changed.
    StateUpdated { turtle_id: TurtleId, turtle: TurtleSummary },
    /// A routine task started running.
    RoutineStarted { turtle_id: TurtleId, routine: String },
    /// A routine task returned normally.
    RoutineFinished { turtle_id: TurtleId, routine: String },
    /// A routine task was cancelled.
    RoutineAborted { turtle_id: TurtleId, routine: String },
    /// A routine task failed with an error.
    RoutineFailed { turtle_id: TurtleId, routine: String, error: String },
}

// -- Bus ----------------------------------------------------------------------

/// Fan-out hub for [`Event`]s.
///
/// Delivery is best-effort: each subscriber gets a bounded channel and a
/// short send deadline; subscribers that cannot keep up are evicted so a
/// stuck dashboard never stalls the orchestrator.
pub struct EventBus {
    subscribers: RwLock<HashMap<u64, mpsc::Sender<Event>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self { subscribers: RwLock::new(HashMap::new()), next_id: AtomicU64::new(1) }
    }

    /// Register a new subscriber. Returns its id and the receiving end.
    pub async fn subscribe(&self) -> (u64, mpsc::Receiver<Event>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.write().await.insert(id, tx);
        tracing::debug!(subscriber = id, "event bus: subscriber added");
        (id, rx)
    }

    /// Remove a subscriber. Safe to call for an already-evicted id.
    pub async fn unsubscribe(&self, id: u64) {
        self.subscribers.write().await.remove(&id);
        tracing::debug!(subscriber = id, "event bus: subscriber removed");
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Publish an event to every current subscriber.
    ///
    /// A subscriber that fails to accept within the send deadline is dropped
    /// from the set; eviction is idempotent.
    pub async fn publish(&self, event: Event) {
        let targets: Vec<(u64, mpsc::Sender<Event>)> = {
            let subs = self.subscribers.read().await;
            subs.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        let mut dead = Vec::new();
        for (id, tx) in targets {
            if tx.send_timeout(event.clone(), SUBSCRIBER_SEND_TIMEOUT).await.is_err() {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut subs = self.subscribers.write().await;
            for id in &dead {
                subs.remove(id);
            }
            tracing::debug!(count = dead.len(), "event bus: evicted dead subscribers");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// -- Log mirroring ------------------------------------------------------------

/// Log record lifted out of the tracing pipeline, ready to publish.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub turtle_id: Option<TurtleId>,
    pub level: String,
    pub message: String,
}

fn turtle_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)] // the pattern is a compile-time constant
        let re = Regex::new(r"Turtle\s+(\d+)").unwrap();
        re
    })
}

/// `tracing` layer that mirrors INFO-and-above records onto the event bus.
///
/// Records are pushed through an unbounded channel and published by a
/// forwarder task, so the layer itself never suspends or re-enters the bus.
/// Route-listing chatter (`GET /turtles`, `GET /routines`) is dropped to keep
/// the stream readable; a turtle id is extracted from messages of the form
/// `Turtle <n> ...` when present.
pub struct BusLogLayer {
    tx: mpsc::UnboundedSender<LogRecord>,
}

impl BusLogLayer {
    /// Create the layer plus the receiving end for the forwarder task.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LogRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for BusLogLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::INFO {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let message = visitor.0;
        if message.is_empty()
            || message.starts_with("GET /turtles")
            || message.starts_with("GET /routines")
        {
            return;
        }

        let turtle_id = turtle_id_regex()
            .captures(&message)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<TurtleId>().ok());

        let _ = self.tx.send(LogRecord { turtle_id, level: level.to_string(), message });
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            use fmt::Write;
            let _ = write!(self.0, "{value:?}");
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod events_tests;
