// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::events::Event;
use crate::state::AppState;
use crate::store::{ConnectionStatus, Coords, StatePatch};
use crate::test_support::{spawn_stub_agent, test_state, StubWorld};
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Wire a stub turtle into a fresh app state, connected and ready to drive.
async fn state_with_stub(id: TurtleId) -> Arc<AppState> {
    let (state, _change_rx) = test_state();
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
    let mut world = StubWorld::new();
    world.pos = (0, 70, 0);
    world.fuel = 1_000_000;
    let (agent, _world) = spawn_stub_agent(Arc::clone(&state.store), id, world);
    state.gateway.register(agent).await;
    state
}

async fn wait_for_status(state: &Arc<AppState>, id: TurtleId, status: AssignmentStatus) {
    tokio::time::timeout(TIMEOUT, async {
        loop {
            if state.scheduler.assignment(id).await.map(|a| a.status) == Some(status) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("assignment never reached {status:?}"));
}

async fn wait_for_event<F>(rx: &mut mpsc::Receiver<Event>, mut pred: F) -> Event
where
    F: FnMut(&Event) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            match rx.recv().await {
                Some(event) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("event bus closed while waiting"),
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected event never arrived"))
}

#[tokio::test]
async fn start_rejects_unknown_routine() {
    let state = state_with_stub(7).await;
    let err = state
        .scheduler
        .start(Arc::clone(&state), 7, "not_a_routine", serde_json::Value::Null)
        .await
        .err();
    assert_eq!(err, Some(StartError::UnknownRoutine));
}

#[tokio::test]
async fn start_rejects_disconnected_turtle() {
    let (state, _change_rx) = test_state();
    let err = state
        .scheduler
        .start(Arc::clone(&state), 99, "set_label", serde_json::Value::Null)
        .await
        .err();
    assert_eq!(err, Some(StartError::NotConnected));
}

#[tokio::test]
async fn continue_without_history_is_not_found() {
    let state = state_with_stub(7).await;
    let err = state.scheduler.continue_last(Arc::clone(&state), 7).await.err();
    assert_eq!(err, Some(StartError::NoPrevious));
}

#[tokio::test]
async fn cancel_without_task_reports_false() {
    let state = state_with_stub(7).await;
    assert!(!state.scheduler.cancel(7).await);
}

#[tokio::test]
async fn finished_routine_settles_and_publishes() {
    let state = state_with_stub(7).await;
    let (_sub, mut events) = state.bus.subscribe().await;

    state
        .scheduler
        .start(Arc::clone(&state), 7, "set_label", json!({ "name": "Spot" }))
        .await
        .expect("start");

    wait_for_event(&mut events, |e| matches!(e, Event::RoutineStarted { turtle_id: 7, .. }))
        .await;
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineFinished { turtle_id: 7, .. }))
        .await;
    wait_for_status(&state, 7, AssignmentStatus::Finished).await;
    assert_eq!(state.store.get(7).await.label.as_deref(), Some("Spot"));

    // The finished assignment can be re-run as-is.
    state.scheduler.continue_last(Arc::clone(&state), 7).await.expect("continue");
    wait_for_status(&state, 7, AssignmentStatus::Finished).await;
}

#[tokio::test]
async fn aborted_routine_settles_and_publishes() {
    let state = state_with_stub(7).await;
    let (_sub, mut events) = state.bus.subscribe().await;

    // A target far along +X keeps the digger busy until cancelled.
    state
        .scheduler
        .start(
            Arc::clone(&state),
            7,
            "dig_to_coordinate",
            json!({ "x": 1_000_000, "y": 70, "z": 0 }),
        )
        .await
        .expect("start");
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineStarted { turtle_id: 7, .. }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(state.scheduler.cancel(7).await, "a running task must be cancellable");
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineAborted { turtle_id: 7, .. }))
        .await;
    wait_for_status(&state, 7, AssignmentStatus::Aborted).await;
}

#[tokio::test]
async fn failed_routine_settles_with_error_text() {
    let state = state_with_stub(7).await;
    let (_sub, mut events) = state.bus.subscribe().await;

    // Kill the agent under the routine: the first command errors out and the
    // routine fails.
    let agent = state.gateway.get(7).await.expect("agent");
    state
        .scheduler
        .start(
            Arc::clone(&state),
            7,
            "dig_to_coordinate",
            json!({ "x": 1_000_000, "y": 70, "z": 0 }),
        )
        .await
        .expect("start");
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineStarted { turtle_id: 7, .. }))
        .await;
    agent.mark_dead().await;

    let failed = wait_for_event(&mut events, |e| {
        matches!(e, Event::RoutineFailed { turtle_id: 7, .. })
    })
    .await;
    match failed {
        Event::RoutineFailed { error, .. } => assert!(error.contains("disconnected")),
        _ => panic!("matched wrong event"),
    }
    wait_for_status(&state, 7, AssignmentStatus::Failed).await;
}

#[tokio::test]
async fn disconnect_cancels_and_marks_disconnected() {
    let state = state_with_stub(7).await;
    let (_sub, mut events) = state.bus.subscribe().await;

    state
        .scheduler
        .start(
            Arc::clone(&state),
            7,
            "dig_to_coordinate",
            json!({ "x": 1_000_000, "y": 70, "z": 0 }),
        )
        .await
        .expect("start");
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineStarted { turtle_id: 7, .. }))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    state.scheduler.on_disconnect(7).await;
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineAborted { turtle_id: 7, .. }))
        .await;
    // The disconnect marker wins over the unwinding abort.
    wait_for_status(&state, 7, AssignmentStatus::Disconnected).await;
}

#[tokio::test]
async fn restart_replaces_a_running_task() {
    let state = state_with_stub(7).await;
    let (_sub, mut events) = state.bus.subscribe().await;

    state
        .scheduler
        .start(
            Arc::clone(&state),
            7,
            "dig_to_coordinate",
            json!({ "x": 1_000_000, "y": 70, "z": 0 }),
        )
        .await
        .expect("start");
    wait_for_event(&mut events, |e| matches!(e, Event::RoutineStarted { turtle_id: 7, .. }))
        .await;

    // Superseding start: the old task aborts, the new one runs to completion.
    // The two terminal events may interleave either way.
    state
        .scheduler
        .start(Arc::clone(&state), 7, "set_label", json!({ "name": "Replacement" }))
        .await
        .expect("restart");
    let mut saw_aborted = false;
    let mut saw_finished = false;
    for _ in 0..2 {
        let event = wait_for_event(&mut events, |e| {
            matches!(
                e,
                Event::RoutineAborted { turtle_id: 7, .. }
                    | Event::RoutineFinished { turtle_id: 7, .. }
            )
        })
        .await;
        match event {
            Event::RoutineAborted { .. } => saw_aborted = true,
            Event::RoutineFinished { .. } => saw_finished = true,
            _ => {}
        }
    }
    assert!(saw_aborted, "the superseded task must publish routine_aborted");
    assert!(saw_finished, "the replacement must publish routine_finished");
    wait_for_status(&state, 7, AssignmentStatus::Finished).await;
    let assignment = state.scheduler.assignment(7).await.expect("assignment");
    assert_eq!(assignment.routine, "set_label");
}
