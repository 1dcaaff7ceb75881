// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the operator REST API.
//!
//! Uses `axum_test::TestServer` — no real TCP needed. Connected turtles are
//! scripted in-process stubs from `rookery::test_support`.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::{json, Value};

use rookery::state::AppState;
use rookery::store::{ConnectionStatus, Coords, StatePatch};
use rookery::test_support::{spawn_stub_agent, test_state, StubWorld};
use rookery::transport::build_router;

const TIMEOUT: Duration = Duration::from_secs(5);

fn server(state: Arc<AppState>) -> anyhow::Result<TestServer> {
    TestServer::new(build_router(state)).map_err(|e| anyhow::anyhow!("test server: {e}"))
}

/// Seed and register a scripted turtle so REST sees it as connected.
async fn connect_stub(state: &Arc<AppState>, id: i64) {
    state
        .store
        .update(
            id,
            StatePatch {
                coords: Some(Coords::new(0, 70, 0)),
                heading: Some(0),
                fuel_level: Some(1_000_000),
                connection_status: Some(ConnectionStatus::Connected),
                ..Default::default()
            },
        )
        .await
        .expect("seed");
    state.store.upsert_seen(id).await.expect("seen");
    let mut world = StubWorld::new();
    world.pos = (0, 70, 0);
    world.fuel = 1_000_000;
    let (agent, _world) = spawn_stub_agent(Arc::clone(&state.store), id, world);
    state.gateway.register(agent).await;
}

async fn wait_for_assignment_status(
    server: &TestServer,
    id: i64,
    status: &str,
) -> anyhow::Result<()> {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let body: Value = server.get(&format!("/turtles/{id}")).await.json();
            if body["assignment"]["status"] == status {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("assignment never reached {status}"))
}

#[tokio::test]
async fn routines_listing_exposes_the_registry() -> anyhow::Result<()> {
    let (state, _rx) = test_state();
    let server = server(state)?;

    let resp = server.get("/routines").await;
    resp.assert_status_ok();
    let list: Vec<Value> = resp.json();
    let names: Vec<&str> = list.iter().filter_map(|r| r["name"].as_str()).collect();
    assert_eq!(
        names,
        vec![
            "dig_to_coordinate",
            "move_to_coordinate",
            "execute_command",
            "set_label",
            "mine_full_chunk",
            "auto_chunk_miner",
            "smart_mine_full",
            "simple_dig",
            "simple_walk",
        ]
    );
    for routine in &list {
        assert!(routine["description"].as_str().is_some_and(|d| !d.is_empty()));
        assert!(routine["config_template"].as_str().is_some());
    }
    Ok(())
}

#[tokio::test]
async fn turtle_list_starts_empty() -> anyhow::Result<()> {
    let (state, _rx) = test_state();
    let server = server(state)?;

    let resp = server.get("/turtles").await;
    resp.assert_status_ok();
    let list: Vec<Value> = resp.json();
    assert!(list.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_turtles_are_not_found() -> anyhow::Result<()> {
    let (state, _rx) = test_state();
    let server = server(state)?;

    server.get("/turtles/5").await.assert_status_not_found();
    server.post("/turtles/5/restart").await.assert_status_not_found();
    server.post("/turtles/5/continue").await.assert_status_not_found();

    let resp = server
        .post("/turtles/5/execute")
        .json(&json!({ "routine": "set_label", "config": { "name": "x" } }))
        .await;
    resp.assert_status_not_found();
    let body: Value = resp.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    // Abort is not an error — there is simply nothing to cancel.
    let resp = server.post("/turtles/5/abort").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["aborted"], false);
    Ok(())
}

#[tokio::test]
async fn unknown_routines_are_not_found() -> anyhow::Result<()> {
    let (state, _rx) = test_state();
    connect_stub(&state, 7).await;
    let server = server(state)?;

    let resp = server
        .post("/turtles/7/execute")
        .json(&json!({ "routine": "definitely_not_real" }))
        .await;
    resp.assert_status_not_found();
    let body: Value = resp.json();
    assert_eq!(body["error"]["message"], "unknown routine");
    Ok(())
}

#[tokio::test]
async fn connected_turtle_appears_in_listings() -> anyhow::Result<()> {
    let (state, _rx) = test_state();
    connect_stub(&state, 7).await;
    let server = server(state)?;

    let list: Vec<Value> = server.get("/turtles").await.json();
    assert_eq!(list.len(), 1);
    let summary = &list[0];
    assert_eq!(summary["id"], 7);
    assert_eq!(summary["alive"], true);
    assert_eq!(summary["coords"]["x"], 0);
    assert_eq!(summary["heading"], 0);
    assert!(summary["last_seen_ms"].as_i64().is_some_and(|ms| ms > 0));
    assert!(summary["assignment"].is_null());

    let status: Value = server.get("/turtles/7").await.json();
    assert_eq!(status["id"], 7);
    assert_eq!(status["alive"], true);

    server.post("/turtles/7/restart").await.assert_status_ok();
    Ok(())
}

#[tokio::test]
async fn execute_runs_a_routine_to_completion() -> anyhow::Result<()> {
    let (state, _rx) = test_state();
    connect_stub(&state, 7).await;
    let server = server(Arc::clone(&state))?;

    let resp = server
        .post("/turtles/7/execute")
        .json(&json!({ "routine": "set_label", "config": { "name": "Webby" } }))
        .await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["accepted"], true);

    wait_for_assignment_status(&server, 7, "finished").await?;
    let list: Vec<Value> = server.get("/turtles").await.json();
    assert_eq!(list[0]["label"], "Webby");
    assert_eq!(list[0]["assignment"]["routine"], "set_label");
    Ok(())
}

#[tokio::test]
async fn string_configs_parse_as_yaml() -> anyhow::Result<()> {
    let (state, _rx) = test_state();
    connect_stub(&state, 7).await;
    let server = server(Arc::clone(&state))?;

    let resp = server
        .post("/turtles/7/execute")
        .json(&json!({ "routine": "set_label", "config": "name: Stringy\n" }))
        .await;
    resp.assert_status_ok();

    wait_for_assignment_status(&server, 7, "finished").await?;
    let list: Vec<Value> = server.get("/turtles").await.json();
    assert_eq!(list[0]["label"], "Stringy");
    Ok(())
}

#[tokio::test]
async fn abort_cancels_a_running_routine() -> anyhow::Result<()> {
    let (state, _rx) = test_state();
    connect_stub(&state, 7).await;
    let server = server(Arc::clone(&state))?;

    let resp = server
        .post("/turtles/7/execute")
        .json(&json!({
            "routine": "dig_to_coordinate",
            "config": { "x": 1_000_000, "y": 70, "z": 0 }
        }))
        .await;
    resp.assert_status_ok();
    wait_for_assignment_status(&server, 7, "running").await?;

    let resp = server.post("/turtles/7/abort").await;
    resp.assert_status_ok();
    let body: Value = resp.json();
    assert_eq!(body["aborted"], true);

    wait_for_assignment_status(&server, 7, "aborted").await?;

    // Continue re-issues the same routine; abort it again to finish.
    let resp = server.post("/turtles/7/continue").await;
    resp.assert_status_ok();
    wait_for_assignment_status(&server, 7, "running").await?;
    let resp = server.post("/turtles/7/abort").await;
    resp.assert_status_ok();
    wait_for_assignment_status(&server, 7, "aborted").await?;
    Ok(())
}
