// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/events` — push stream of orchestrator events to dashboard clients.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use crate::state::AppState;

/// `GET /events` — WebSocket upgrade for event subscribers.
pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_events(state, socket))
}

async fn handle_events(state: Arc<AppState>, socket: WebSocket) {
    let (id, mut rx) = state.bus.subscribe().await;
    debug!("/events: subscriber {id} connected; total={}", state.bus.subscriber_count().await);
    let (mut ws_tx, mut ws_rx) = socket.split();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    let Ok(text) = serde_json::to_string(&event) else { continue };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                // Channel closed: the bus evicted this subscriber.
                None => break,
            },

            msg = ws_rx.next() => match msg {
                // Client frames are keep-alives at most; ignore them.
                Some(Ok(Message::Text(text))) => {
                    debug!("/events: ignoring client message: {}", text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(_)) => break,
                _ => {}
            },
        }
    }

    state.bus.unsubscribe(id).await;
    debug!("/events: subscriber {id} removed");
}
