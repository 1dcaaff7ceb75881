// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end WebSocket tests: a real listener, a tungstenite client playing
//! the turtle firmware, and the full gateway/session/routine stack above it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;

use rookery::events::Event;
use rookery::state::AppState;
use rookery::store::Coords;
use rookery::test_support::{test_state, StubWorld};

const TIMEOUT: Duration = Duration::from_secs(10);

async fn spawn_server() -> anyhow::Result<(Arc<AppState>, SocketAddr)> {
    let (state, change_rx) = test_state();
    rookery::register_lifecycle_hooks(&state).await;
    rookery::state::spawn_change_notifier(Arc::clone(&state), change_rx);

    let router = rookery::transport::build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok((state, addr))
}

/// Connect a scripted turtle: performs the hello handshake, then answers
/// every command frame from the world model until the kill switch fires.
async fn connect_stub_turtle(
    addr: SocketAddr,
    id: i64,
    world: StubWorld,
) -> anyhow::Result<(Arc<Mutex<StubWorld>>, mpsc::Sender<()>)> {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await?;
    let (mut tx, mut rx) = ws.split();
    tx.send(Message::text(json!({ "type": "hello", "computer_id": id }).to_string())).await?;

    let world = Arc::new(Mutex::new(world));
    let task_world = Arc::clone(&world);
    let (kill_tx, mut kill_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = kill_rx.recv() => break,
                msg = rx.next() => {
                    let Some(Ok(msg)) = msg else { break };
                    let Message::Text(text) = msg else { continue };
                    let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else { continue };
                    let (Some(req_id), Some(command)) = (
                        value.get("id").and_then(Value::as_str),
                        value.get("command").and_then(Value::as_str),
                    ) else {
                        continue;
                    };
                    let (ok, reply_value) = task_world.lock().await.respond(command);
                    let reply =
                        json!({ "in_reply_to": req_id, "ok": ok, "value": reply_value }).to_string();
                    if tx.send(Message::text(reply)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });
    Ok((world, kill_tx))
}

async fn wait_for_event<F>(rx: &mut mpsc::Receiver<Event>, mut pred: F) -> anyhow::Result<Event>
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return Ok(event),
                Some(_) => continue,
                None => anyhow::bail!("event bus closed"),
            }
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("expected event never arrived"))?
}

async fn wait_until<F, Fut>(mut check: F) -> anyhow::Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("condition never became true"))
}

#[tokio::test]
async fn malformed_hello_closes_with_protocol_violation() -> anyhow::Result<()> {
    let (state, addr) = spawn_server().await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await?;
    ws.send(Message::text(json!({ "type": "helo" }).to_string())).await?;

    let frame = tokio::time::timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await?;
    let frame = frame.ok_or_else(|| anyhow::anyhow!("no close frame"))?;
    assert_eq!(u16::from(frame.code), 1002);
    assert_eq!(frame.reason.as_str(), "invalid hello");
    assert!(state.gateway.connected_ids().await.is_empty(), "no agent may be registered");
    Ok(())
}

#[tokio::test]
async fn non_hello_payloads_are_rejected_too() -> anyhow::Result<()> {
    let (state, addr) = spawn_server().await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await?;
    ws.send(Message::text(json!({ "type": "hello", "computer_id": "seven" }).to_string()))
        .await?;

    let frame = tokio::time::timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(frame))) => return frame,
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await?;
    let frame = frame.ok_or_else(|| anyhow::anyhow!("no close frame"))?;
    assert_eq!(u16::from(frame.code), 1002);
    assert!(state.gateway.connected_ids().await.is_empty());
    Ok(())
}

#[tokio::test]
async fn hello_registers_detects_state_and_drives_a_routine() -> anyhow::Result<()> {
    let (state, addr) = spawn_server().await?;
    let (_sub, mut events) = state.bus.subscribe().await;

    let mut world = StubWorld::new();
    world.pos = (0, 70, 0);
    let (world, _kill) = connect_stub_turtle(addr, 7, world).await?;

    wait_for_event(&mut events, |e| matches!(e, Event::Connected { turtle_id: 7, .. })).await?;
    assert!(state.gateway.get(7).await.is_some());

    // The connect flow stamps the seen columns before seeding defaults.
    let record = state.store.get(7).await;
    assert!(record.first_seen_ms > 0, "first connect must stamp first_seen_ms");
    assert!(record.last_seen_ms >= record.first_seen_ms);
    assert_eq!(record.connection_status, rookery::store::ConnectionStatus::Connected);

    // Background detection settles: GPS fix, fuel gauge, probed heading.
    wait_until(|| {
        let state = Arc::clone(&state);
        async move {
            let record = state.store.get(7).await;
            record.coords == Some(Coords::new(0, 70, 0))
                && record.heading == Some(0)
                && record.fuel_level.is_some()
        }
    })
    .await?;

    // Drive one block east and watch the persisted pose follow.
    state
        .scheduler
        .start(Arc::clone(&state), 7, "dig_to_coordinate", json!({ "x": 1, "y": 70, "z": 0 }))
        .await
        .map_err(|e| anyhow::anyhow!("start: {}", e.message()))?;

    wait_for_event(&mut events, |e| match e {
        Event::StateUpdated { turtle_id: 7, turtle } => {
            turtle.coords == Some(Coords::new(1, 70, 0))
        }
        _ => false,
    })
    .await?;
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineFinished { turtle_id: 7, .. }))
        .await?;

    let record = state.store.get(7).await;
    assert_eq!(record.coords, Some(Coords::new(1, 70, 0)));
    // Initial gauge was 10_000: the probe's forward+back burned two, the
    // routine's forward one more.
    assert_eq!(record.fuel_level, Some(9_997));
    assert_eq!(world.lock().await.pos, (1, 70, 0));
    Ok(())
}

#[tokio::test]
async fn dropping_the_socket_cancels_the_routine() -> anyhow::Result<()> {
    let (state, addr) = spawn_server().await?;
    let (_sub, mut events) = state.bus.subscribe().await;

    let mut world = StubWorld::new();
    world.pos = (0, 70, 0);
    world.fuel = 1_000_000;
    let (_world, kill) = connect_stub_turtle(addr, 9, world).await?;
    wait_for_event(&mut events, |e| matches!(e, Event::Connected { turtle_id: 9, .. })).await?;

    state
        .scheduler
        .start(
            Arc::clone(&state),
            9,
            "dig_to_coordinate",
            json!({ "x": 1_000_000, "y": 70, "z": 0 }),
        )
        .await
        .map_err(|e| anyhow::anyhow!("start: {}", e.message()))?;
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineStarted { turtle_id: 9, .. }))
        .await?;

    // Drop the client side; the gateway must tear everything down.
    kill.send(()).await?;

    wait_for_event(&mut events, |e| matches!(e, Event::Disconnected { turtle_id: 9, .. }))
        .await?;
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineAborted { turtle_id: 9, .. }))
        .await?;

    wait_until(|| {
        let state = Arc::clone(&state);
        async move { state.gateway.get(9).await.is_none() }
    })
    .await?;
    wait_until(|| {
        let state = Arc::clone(&state);
        async move {
            state.scheduler.assignment(9).await.map(|a| a.status)
                == Some(rookery::scheduler::AssignmentStatus::Disconnected)
        }
    })
    .await?;
    wait_until(|| {
        let state = Arc::clone(&state);
        async move {
            state.store.get(9).await.connection_status
                == rookery::store::ConnectionStatus::Disconnected
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn reconnect_evicts_the_previous_agent() -> anyhow::Result<()> {
    let (state, addr) = spawn_server().await?;
    let (_sub, mut events) = state.bus.subscribe().await;

    let (_world_a, _kill_a) = connect_stub_turtle(addr, 11, StubWorld::new()).await?;
    wait_for_event(&mut events, |e| matches!(e, Event::Connected { turtle_id: 11, .. })).await?;
    let first = state.gateway.get(11).await.ok_or_else(|| anyhow::anyhow!("registered"))?;

    let (_world_b, _kill_b) = connect_stub_turtle(addr, 11, StubWorld::new()).await?;
    wait_for_event(&mut events, |e| matches!(e, Event::Connected { turtle_id: 11, .. })).await?;

    wait_until(|| {
        let first = Arc::clone(&first);
        async move { !first.is_alive() }
    })
    .await?;
    let current = state.gateway.get(11).await.ok_or_else(|| anyhow::anyhow!("still mapped"))?;
    assert!(!Arc::ptr_eq(&current, &first), "the new connection replaces the old agent");
    assert!(current.is_alive());
    Ok(())
}

#[tokio::test]
async fn events_endpoint_streams_bus_events() -> anyhow::Result<()> {
    let (state, addr) = spawn_server().await?;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/events")).await?;
    // Client chatter is ignored by the server.
    ws.send(Message::text("keep-alive")).await?;
    wait_until(|| {
        let state = Arc::clone(&state);
        async move { state.bus.subscriber_count().await >= 1 }
    })
    .await?;

    state
        .bus
        .publish(Event::Log {
            turtle_id: Some(3),
            level: "INFO".to_owned(),
            message: "hello dashboards".to_owned(),
        })
        .await;

    let received = tokio::time::timeout(TIMEOUT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    if value["type"] == "log" && value["message"] == "hello dashboards" {
                        return Some(value);
                    }
                }
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => return None,
            }
        }
    })
    .await?;
    let value = received.ok_or_else(|| anyhow::anyhow!("log event not received"))?;
    assert_eq!(value["turtle_id"], 3);
    assert_eq!(value["level"], "INFO");
    Ok(())
}
