// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A connected turtle agent and its exclusive command session.
//!
//! One agent owns one WebSocket. Outgoing commands are stamped with an
//! unguessable request id and parked in a pending map; the gateway's reader
//! feeds inbound frames to [`Agent::dispatch_reply`], which completes the
//! matching request. Replies are matched by id, never by order, so the demux
//! stays correct even under interleaving.
//!
//! Commands go through a [`Session`] — a scoped exclusive lease on the agent.
//! At most one session is active per agent; acquirers queue on the session
//! mutex and the lease is released on every exit path, including
//! cancellation mid-await.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::error::CommandError;
use crate::store::{StateStore, TurtleId};

/// Deadline for a single command reply.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Reply frame from an agent. Either `in_reply_to` or `request_id` names the
/// request being answered.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_reply_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A connected turtle.
pub struct Agent {
    pub id: TurtleId,
    pub(crate) store: Arc<StateStore>,
    /// Closing this connection's socket loop.
    pub cancel: CancellationToken,
    outbox: mpsc::UnboundedSender<String>,
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    alive: AtomicBool,
    session_lock: Mutex<()>,
}

impl Agent {
    /// Build an agent around a frame writer channel. The gateway drains the
    /// receiving end into the socket.
    pub fn new(id: TurtleId, outbox: mpsc::UnboundedSender<String>, store: Arc<StateStore>) -> Self {
        Self {
            id,
            store,
            cancel: CancellationToken::new(),
            outbox,
            pending: Mutex::new(HashMap::new()),
            alive: AtomicBool::new(true),
            session_lock: Mutex::new(()),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Route one inbound text frame to its waiting request, if any.
    /// Unmatched frames are dropped.
    pub async fn dispatch_reply(&self, text: &str) {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            tracing::debug!("Turtle {}: dropping undecodable frame", self.id);
            return;
        };
        let req_id = value
            .get("in_reply_to")
            .or_else(|| value.get("request_id"))
            .and_then(|v| match v {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        let Some(req_id) = req_id else {
            return;
        };
        let Ok(reply) = serde_json::from_value::<Reply>(value) else {
            return;
        };
        let completion = self.pending.lock().await.remove(&req_id);
        if let Some(tx) = completion {
            let _ = tx.send(reply);
        }
    }

    /// Mark the agent dead and fail every pending request with a
    /// disconnection error. Idempotent.
    pub async fn mark_dead(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut pending = self.pending.lock().await;
        let n = pending.len();
        // Dropping the completions surfaces `Disconnected` to each waiter.
        pending.clear();
        if n > 0 {
            tracing::info!("Turtle {}: failed {n} pending requests on disconnect", self.id);
        }
        self.cancel.cancel();
    }

    #[cfg(test)]
    pub(crate) async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Acquire the exclusive session for this agent, waiting for any current
    /// holder to release it.
    pub async fn session(&self) -> Session<'_> {
        let guard = self.session_lock.lock().await;
        tracing::info!("Turtle {}: session acquired", self.id);
        Session { agent: self, _guard: guard }
    }

    /// Send one command line and await its correlated reply.
    /// Returns the request id alongside the outcome for audit trails.
    pub(crate) async fn send_traced(&self, line: &str) -> (String, Result<Reply, CommandError>) {
        let req_id = format!("s_{}", uuid::Uuid::new_v4().simple());
        if !self.is_alive() {
            return (req_id, Err(CommandError::Disconnected));
        }

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(req_id.clone(), tx);

        let frame = serde_json::json!({ "id": req_id, "command": line }).to_string();
        tracing::info!("Turtle {}: send id={} cmd={}", self.id, req_id, line);
        if self.outbox.send(frame).is_err() {
            self.pending.lock().await.remove(&req_id);
            return (req_id, Err(CommandError::Disconnected));
        }

        let result = match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // Completion dropped: the inbox failed it on disconnect.
            Ok(Err(_)) => Err(CommandError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&req_id);
                tracing::warn!("Turtle {}: reply timeout id={}", self.id, req_id);
                Err(CommandError::Timeout)
            }
        };
        (req_id, result)
    }
}

/// Exclusive lease on an agent's command channel.
///
/// All command operations go through a held session; dropping it lets the
/// next acquirer proceed without touching in-flight requests.
pub struct Session<'a> {
    agent: &'a Agent,
    _guard: MutexGuard<'a, ()>,
}

impl Session<'_> {
    pub fn id(&self) -> TurtleId {
        self.agent.id
    }

    pub(crate) fn agent(&self) -> &Agent {
        self.agent
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.agent.store
    }

    /// Raw request/reply. Most callers want the typed wrappers in
    /// `commands`.
    pub async fn send(&self, line: &str) -> Result<Reply, CommandError> {
        self.agent.send_traced(line).await.1
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        tracing::info!("Turtle {}: session released", self.agent.id);
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod agent_tests;
