// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST handlers. These compose state store reads and scheduler writes;
//! they never talk to an agent directly.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::TurtleId;

#[derive(Debug, Serialize)]
pub struct RoutineInfo {
    pub name: String,
    pub description: String,
    pub config_template: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub routine: String,
    #[serde(default)]
    pub config: Value,
}

/// Shape a dynamic config payload into what routines consume: mappings pass
/// through, strings parse as YAML first and JSON second, and anything
/// unparseable survives as the raw string.
pub(crate) fn parse_config(raw: Value) -> Value {
    match raw {
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Value::Null;
            }
            if let Ok(parsed) = serde_yaml::from_str::<Value>(trimmed) {
                debug!("parsed config string as YAML");
                return parsed;
            }
            if let Ok(parsed) = serde_json::from_str::<Value>(trimmed) {
                debug!("parsed config string as JSON");
                return parsed;
            }
            debug!("config parsing failed; passing raw text");
            Value::String(trimmed.to_owned())
        }
        other => other,
    }
}

/// `GET /turtles` — all known turtles (persisted plus connected).
pub async fn list_turtles(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("GET /turtles");
    let mut ids: BTreeSet<TurtleId> = s.store.list_ids().await.into_iter().collect();
    ids.extend(s.gateway.connected_ids().await);
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        out.push(s.turtle_summary(id).await);
    }
    Json(out)
}

/// `GET /turtles/{id}` — liveness and assignment for a connected turtle.
pub async fn turtle_status(
    State(s): State<Arc<AppState>>,
    Path(id): Path<TurtleId>,
) -> impl IntoResponse {
    debug!("GET /turtles/{id}");
    match s.gateway.get(id).await {
        Some(agent) => Json(json!({
            "id": id,
            "alive": agent.is_alive(),
            "assignment": s.scheduler.assignment(id).await,
        }))
        .into_response(),
        None => ApiError::NotFound.to_http_response("turtle not connected").into_response(),
    }
}

/// `GET /routines` — registered routines.
pub async fn list_routines(State(s): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("GET /routines");
    let list: Vec<RoutineInfo> = s
        .scheduler
        .routines()
        .values()
        .map(|r| RoutineInfo {
            name: r.name().to_owned(),
            description: r.description().to_owned(),
            config_template: r.config_template().to_owned(),
        })
        .collect();
    Json(list)
}

/// `POST /turtles/{id}/execute` — start a routine on a turtle.
pub async fn execute_routine(
    State(s): State<Arc<AppState>>,
    Path(id): Path<TurtleId>,
    Json(req): Json<ExecuteRequest>,
) -> impl IntoResponse {
    info!("POST /turtles/{id}/execute routine={}", req.routine);
    let config = parse_config(req.config);
    match s.scheduler.start(Arc::clone(&s), id, &req.routine, config).await {
        Ok(()) => Json(json!({ "accepted": true })).into_response(),
        Err(e) => ApiError::NotFound.to_http_response(e.message()).into_response(),
    }
}

/// `POST /turtles/{id}/abort` — cancel a running routine.
pub async fn abort_routine(
    State(s): State<Arc<AppState>>,
    Path(id): Path<TurtleId>,
) -> impl IntoResponse {
    info!("POST /turtles/{id}/abort");
    let aborted = s.scheduler.cancel(id).await;
    Json(json!({ "aborted": aborted }))
}

/// `POST /turtles/{id}/continue` — re-run the last routine with its config.
pub async fn continue_routine(
    State(s): State<Arc<AppState>>,
    Path(id): Path<TurtleId>,
) -> impl IntoResponse {
    info!("POST /turtles/{id}/continue");
    match s.scheduler.continue_last(Arc::clone(&s), id).await {
        Ok(()) => Json(json!({ "accepted": true })).into_response(),
        Err(e) => ApiError::NotFound.to_http_response(e.message()).into_response(),
    }
}

/// `POST /turtles/{id}/restart` — reserved hook; validates connectivity
/// only.
pub async fn restart_turtle(
    State(s): State<Arc<AppState>>,
    Path(id): Path<TurtleId>,
) -> impl IntoResponse {
    info!("POST /turtles/{id}/restart");
    match s.gateway.get(id).await {
        Some(agent) if agent.is_alive() => Json(json!({ "accepted": true })).into_response(),
        _ => ApiError::NotFound.to_http_response("turtle not connected").into_response(),
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod http_tests;
