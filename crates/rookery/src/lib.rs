// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rookery: fleet orchestrator for turtle agents.
//!
//! Agents connect over WebSocket, identify themselves, and are driven by
//! routines running under a per-agent exclusive session. State persists in
//! SQLite; typed events stream to dashboard subscribers.

pub mod agent;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod routines;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod test_support;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::events::{Event, EventBus, LogRecord};
use crate::gateway::Gateway;
use crate::scheduler::Scheduler;
use crate::state::AppState;
use crate::store::{ConnectionStatus, Coords, StatePatch, StateStore};

/// Run the orchestrator until shutdown.
pub async fn run(config: Config, log_rx: mpsc::UnboundedReceiver<LogRecord>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let (change_tx, change_rx) = mpsc::unbounded_channel();
    let store = Arc::new(StateStore::open(&config.db_path(), change_tx)?);

    let state = Arc::new(AppState {
        config: config.clone(),
        store,
        bus: EventBus::new(),
        gateway: Gateway::new(),
        scheduler: Scheduler::new(routines::registry()),
        shutdown: shutdown.clone(),
    });
    tracing::info!(
        "discovered {} routines: {:?}",
        state.scheduler.routines().len(),
        state.scheduler.routines().keys().collect::<Vec<_>>()
    );

    register_lifecycle_hooks(&state).await;
    state::spawn_change_notifier(Arc::clone(&state), change_rx);
    state::spawn_log_forwarder(Arc::clone(&state), log_rx);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("rookery listening on {addr}");
    let router = transport::build_router(state);
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Wire the standard connect/disconnect behavior: seen/status bookkeeping,
/// lifecycle events, background state detection, and routine teardown.
/// Hooks receive the shared state by handle at call time, so nothing here
/// creates a reference cycle.
pub async fn register_lifecycle_hooks(state: &Arc<AppState>) {
    state
        .gateway
        .on_connect(Box::new(|app, agent| {
            Box::pin(async move {
                let id = agent.id;
                // Seen bookkeeping first: the row it creates stamps
                // first_seen_ms, which later patches must not pre-empt.
                app.store.upsert_seen(id).await?;
                app.store.set_connection_status(id, ConnectionStatus::Connected).await?;

                // First sighting: seed a usable pose. An existing record
                // keeps its fix; the background detection patches in
                // whatever it can confirm.
                let record = app.store.get(id).await;
                if record.coords.is_none() {
                    tracing::info!("Turtle {id}: no persisted state, seeding defaults");
                    let patch = StatePatch {
                        coords: Some(Coords::new(0, 0, 0)),
                        heading: Some(0),
                        fuel_level: Some(0),
                        ..Default::default()
                    };
                    app.store.update(id, patch).await?;
                }

                let summary = app.turtle_summary(id).await;
                app.bus.publish(Event::Connected { turtle_id: id, turtle: summary }).await;
                tokio::spawn(commands::detect_initial_state(agent));
                Ok(())
            })
        }))
        .await;

    state
        .gateway
        .on_disconnect(Box::new(|app, id| {
            Box::pin(async move {
                app.store.set_connection_status(id, ConnectionStatus::Disconnected).await?;
                let summary = app.turtle_summary(id).await;
                app.bus.publish(Event::Disconnected { turtle_id: id, turtle: summary }).await;
                app.scheduler.on_disconnect(id).await;
                Ok(())
            })
        }))
        .await;
}
