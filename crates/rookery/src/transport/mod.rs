// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP + WebSocket transport for the orchestrator.

pub mod http;
pub mod ws;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::gateway;
use crate::state::AppState;

/// Build the axum `Router` with all orchestrator routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Operator REST surface
        .route("/turtles", get(http::list_turtles))
        .route("/turtles/{id}", get(http::turtle_status))
        .route("/routines", get(http::list_routines))
        .route("/turtles/{id}/execute", post(http::execute_routine))
        .route("/turtles/{id}/abort", post(http::abort_routine))
        .route("/turtles/{id}/continue", post(http::continue_routine))
        .route("/turtles/{id}/restart", post(http::restart_turtle))
        // Dashboard event stream
        .route("/events", get(ws::events_handler))
        // Agent gateway
        .route("/ws", get(gateway::agent_ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
