// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection gateway for turtle agents.
//!
//! Agents dial `GET /ws` and must identify themselves within 10 seconds by
//! sending `{"type":"hello","computer_id":<id>}` as their first text frame;
//! anything else closes the socket with a protocol-violation code. A
//! registered agent evicts any previous connection for the same id. Connect
//! and disconnect hooks run in registration order with errors swallowed, so
//! one misbehaving hook never takes the gateway down.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use crate::agent::Agent;
use crate::state::AppState;
use crate::store::TurtleId;

/// How long a fresh connection has to send its hello frame.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Keepalive ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(20);

/// A pong must arrive within this long of a ping, or the peer is dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(20);

/// WebSocket close code for a malformed handshake.
const PROTOCOL_VIOLATION: u16 = 1002;

pub type ConnectHook = Box<
    dyn Fn(Arc<AppState>, Arc<Agent>) -> futures_util::future::BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;
pub type DisconnectHook = Box<
    dyn Fn(Arc<AppState>, TurtleId) -> futures_util::future::BoxFuture<'static, anyhow::Result<()>>
        + Send
        + Sync,
>;

/// Owns the set of connected agents and the lifecycle hooks.
pub struct Gateway {
    agents: RwLock<HashMap<TurtleId, Arc<Agent>>>,
    on_connect: RwLock<Vec<ConnectHook>>,
    on_disconnect: RwLock<Vec<DisconnectHook>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            on_connect: RwLock::new(Vec::new()),
            on_disconnect: RwLock::new(Vec::new()),
        }
    }

    pub async fn get(&self, id: TurtleId) -> Option<Arc<Agent>> {
        self.agents.read().await.get(&id).cloned()
    }

    pub async fn connected_ids(&self) -> Vec<TurtleId> {
        self.agents.read().await.keys().copied().collect()
    }

    pub async fn on_connect(&self, hook: ConnectHook) {
        self.on_connect.write().await.push(hook);
    }

    pub async fn on_disconnect(&self, hook: DisconnectHook) {
        self.on_disconnect.write().await.push(hook);
    }

    /// Register an agent, returning the previous agent for the same id, if
    /// one was connected.
    pub async fn register(&self, agent: Arc<Agent>) -> Option<Arc<Agent>> {
        self.agents.write().await.insert(agent.id, agent)
    }

    /// Remove `agent` from the map, but only if it is still the current
    /// mapping — a replacement connection must not be torn down by its
    /// evicted predecessor.
    async fn remove_if_current(&self, agent: &Arc<Agent>) -> bool {
        let mut agents = self.agents.write().await;
        match agents.get(&agent.id) {
            Some(current) if Arc::ptr_eq(current, agent) => {
                agents.remove(&agent.id);
                true
            }
            _ => false,
        }
    }

    pub(crate) async fn run_connect_hooks(&self, state: &Arc<AppState>, agent: &Arc<Agent>) {
        let hooks = self.on_connect.read().await;
        for hook in hooks.iter() {
            if let Err(e) = hook(Arc::clone(state), Arc::clone(agent)).await {
                warn!("on_connect hook failed: {e:#}");
            }
        }
    }

    pub(crate) async fn run_disconnect_hooks(&self, state: &Arc<AppState>, id: TurtleId) {
        let hooks = self.on_disconnect.read().await;
        for hook in hooks.iter() {
            if let Err(e) = hook(Arc::clone(state), id).await {
                warn!("on_disconnect hook failed: {e:#}");
            }
        }
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

/// `GET /ws` — WebSocket upgrade for turtle agents.
pub async fn agent_ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_agent_socket(state, socket))
}

async fn handle_agent_socket(state: Arc<AppState>, mut socket: WebSocket) {
    let id = match read_hello(&mut socket).await {
        Ok(id) => id,
        Err(reason) => {
            warn!("invalid hello: {reason}");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: PROTOCOL_VIOLATION,
                    reason: "invalid hello".into(),
                })))
                .await;
            return;
        }
    };

    let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
    let agent = Arc::new(Agent::new(id, outbox_tx, Arc::clone(&state.store)));

    if let Some(prior) = state.gateway.register(Arc::clone(&agent)).await {
        info!("Turtle {id}: evicting previous connection");
        prior.mark_dead().await;
    }
    info!("Turtle {id} connected");
    state.gateway.run_connect_hooks(&state, &agent).await;

    drive_socket(socket, outbox_rx, &agent).await;

    agent.mark_dead().await;
    let was_current = state.gateway.remove_if_current(&agent).await;
    if was_current {
        info!("Turtle {id} disconnected");
        state.gateway.run_disconnect_hooks(&state, id).await;
    }
}

/// Wait for and validate the hello frame. Returns the turtle id.
async fn read_hello(socket: &mut WebSocket) -> Result<TurtleId, String> {
    let frame = match tokio::time::timeout(HANDSHAKE_TIMEOUT, socket.recv()).await {
        Err(_) => return Err("handshake timed out".to_owned()),
        Ok(None) => return Err("connection closed before hello".to_owned()),
        Ok(Some(Err(e))) => return Err(format!("socket error: {e}")),
        Ok(Some(Ok(msg))) => msg,
    };
    let Message::Text(text) = frame else {
        return Err("first frame was not text".to_owned());
    };
    parse_hello(text.as_str())
}

/// Validate a hello frame: `{"type":"hello","computer_id":<positive int>}`.
pub(crate) fn parse_hello(text: &str) -> Result<TurtleId, String> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| format!("undecodable hello: {e}"))?;
    if value.get("type").and_then(Value::as_str) != Some("hello") {
        return Err(format!("unexpected hello payload: {value}"));
    }
    match value.get("computer_id").and_then(Value::as_i64) {
        Some(id) if id > 0 => Ok(id),
        _ => Err(format!("unexpected hello payload: {value}")),
    }
}

/// Pump the socket: outgoing command frames, inbound replies, and the
/// ping/pong keepalive. Returns when the connection is finished.
async fn drive_socket(
    socket: WebSocket,
    mut outbox_rx: mpsc::UnboundedReceiver<String>,
    agent: &Arc<Agent>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await; // the first tick fires immediately

    // Time of the ping still waiting for its pong, if any. A ping left
    // unanswered past the pong deadline counts as a disconnect.
    let mut pending_ping: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = agent.cancel.cancelled() => break,

            frame = outbox_rx.recv() => match frame {
                Some(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => agent.dispatch_reply(text.as_str()).await,
                Some(Ok(Message::Pong(_))) => pending_ping = None,
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws_tx.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                _ => {}
            },

            _ = ping.tick() => {
                if let Some(sent) = pending_ping {
                    if sent.elapsed() >= PONG_TIMEOUT {
                        warn!("Turtle {}: keepalive lapsed, dropping connection", agent.id);
                        break;
                    }
                }
                if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                pending_ping = Some(Instant::now());
            }
        }
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod gateway_tests;
