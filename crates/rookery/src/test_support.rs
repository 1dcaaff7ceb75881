// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness: a scripted stub turtle that answers command frames from a
//! small world model, without any socket underneath.
//!
//! The stub drains an agent's outbox channel, interprets each Lua command
//! line against a block map and a pose, and feeds the reply straight back
//! through [`Agent::dispatch_reply`]. That exercises the real pending-map,
//! session, command, and routine layers end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::config::Config;
use crate::events::EventBus;
use crate::gateway::Gateway;
use crate::routines::registry;
use crate::scheduler::Scheduler;
use crate::state::AppState;
use crate::store::{StateStore, TurtleId};

pub type Vec3 = (i64, i64, i64);

const DIR_VECS: [Vec3; 4] = [(1, 0, 0), (0, 0, 1), (-1, 0, 0), (0, 0, -1)];

/// Scripted world state backing a stub turtle.
pub struct StubWorld {
    pub blocks: HashMap<Vec3, String>,
    pub pos: Vec3,
    pub heading: u8,
    pub fuel: i64,
    pub fuel_limit: i64,
    /// Raw firmware-shaped inventory: 0-indexed array of 16 entries.
    pub inventory: Value,
    pub label: Option<String>,
    pub selected: i64,
    pub digs: usize,
    pub moves: usize,
    pub refuels: usize,
    /// When true, `turtle.refuel` fills the tank to the limit.
    pub refuel_fills: bool,
}

impl Default for StubWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl StubWorld {
    pub fn new() -> Self {
        Self {
            blocks: HashMap::new(),
            pos: (0, 0, 0),
            heading: 0,
            fuel: 10_000,
            fuel_limit: 100_000,
            inventory: json!([
                null, null, null, null, null, null, null, null, null, null, null, null, null,
                null, null, null
            ]),
            label: None,
            selected: 1,
            digs: 0,
            moves: 0,
            refuels: 0,
            refuel_fills: true,
        }
    }

    fn ahead(&self) -> Vec3 {
        let d = DIR_VECS[self.heading as usize];
        (self.pos.0 + d.0, self.pos.1 + d.1, self.pos.2 + d.2)
    }

    fn behind(&self) -> Vec3 {
        let d = DIR_VECS[self.heading as usize];
        (self.pos.0 - d.0, self.pos.1 - d.1, self.pos.2 - d.2)
    }

    fn above(&self) -> Vec3 {
        (self.pos.0, self.pos.1 + 1, self.pos.2)
    }

    fn below(&self) -> Vec3 {
        (self.pos.0, self.pos.1 - 1, self.pos.2)
    }

    fn try_move(&mut self, target: Vec3) -> (bool, Value) {
        if self.blocks.contains_key(&target) {
            return (false, json!([false, "Movement obstructed"]));
        }
        if self.fuel <= 0 {
            return (false, json!([false, "Out of fuel"]));
        }
        self.pos = target;
        self.fuel -= 1;
        self.moves += 1;
        (true, Value::Bool(true))
    }

    fn try_dig(&mut self, target: Vec3) -> (bool, Value) {
        if self.blocks.remove(&target).is_some() {
            self.digs += 1;
            (true, Value::Bool(true))
        } else {
            (false, json!([false, "Nothing to dig here"]))
        }
    }

    fn inspect_reply(&self, target: Vec3) -> (bool, Value) {
        match self.blocks.get(&target) {
            Some(name) => {
                (true, json!({ "ok": true, "data": { "name": name, "tags": {} } }))
            }
            None => (true, json!({ "ok": false })),
        }
    }

    /// Interpret one command line and produce `(ok, value)` for the reply.
    pub fn respond(&mut self, command: &str) -> (bool, Value) {
        if command.contains("turtle.inspectUp()") {
            return self.inspect_reply(self.above());
        }
        if command.contains("turtle.inspectDown()") {
            return self.inspect_reply(self.below());
        }
        if command.contains("turtle.inspect()") {
            return self.inspect_reply(self.ahead());
        }
        if command.contains("gps.locate") {
            return (true, json!([self.pos.0, self.pos.1, self.pos.2]));
        }
        match command {
            "turtle.forward()" => {
                let target = self.ahead();
                self.try_move(target)
            }
            "turtle.back()" => {
                let target = self.behind();
                self.try_move(target)
            }
            "turtle.up()" => {
                let target = self.above();
                self.try_move(target)
            }
            "turtle.down()" => {
                let target = self.below();
                self.try_move(target)
            }
            "turtle.turnLeft()" => {
                self.heading = (self.heading + 3) % 4;
                (true, Value::Bool(true))
            }
            "turtle.turnRight()" => {
                self.heading = (self.heading + 1) % 4;
                (true, Value::Bool(true))
            }
            "turtle.dig()" => {
                let target = self.ahead();
                self.try_dig(target)
            }
            "turtle.digUp()" => {
                let target = self.above();
                self.try_dig(target)
            }
            "turtle.digDown()" => {
                let target = self.below();
                self.try_dig(target)
            }
            "turtle.place()" => {
                let target = self.ahead();
                if self.blocks.contains_key(&target) {
                    (false, json!([false, "Cannot place block here"]))
                } else {
                    (true, Value::Bool(true))
                }
            }
            "turtle.getFuelLevel()" => (true, json!(self.fuel)),
            "turtle.getFuelLimit()" => (true, json!(self.fuel_limit)),
            "turtle.getSelectedSlot()" => (true, json!(self.selected)),
            "turtle.getItemCount()" => {
                let idx = (self.selected - 1).max(0) as usize;
                let count = self
                    .inventory
                    .get(idx)
                    .and_then(|item| item.get("count"))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                (true, json!(count))
            }
            "turtle.getItemDetail()" => {
                let idx = (self.selected - 1).max(0) as usize;
                (true, self.inventory.get(idx).cloned().unwrap_or(Value::Null))
            }
            "get_inventory_details()" => (true, self.inventory.clone()),
            "get_name_tag()" => match &self.label {
                Some(label) => (true, json!(label)),
                None => (true, Value::Null),
            },
            other => {
                if let Some(rest) = other.strip_prefix("turtle.select(") {
                    if let Ok(slot) = rest.trim_end_matches(')').parse::<i64>() {
                        self.selected = slot;
                    }
                    return (true, Value::Bool(true));
                }
                if other.starts_with("turtle.refuel") {
                    self.refuels += 1;
                    if self.refuel_fills {
                        self.fuel = self.fuel_limit;
                    }
                    return (true, Value::Bool(true));
                }
                if let Some(rest) = other.strip_prefix("set_name_tag(\"") {
                    self.label = Some(rest.trim_end_matches("\")").to_owned());
                    return (true, Value::Bool(true));
                }
                if other.starts_with("turtle.drop") {
                    return (true, Value::Bool(true));
                }
                (true, Value::Null)
            }
        }
    }
}

/// Store over an in-memory database, plus its change channel.
pub fn stub_store() -> (Arc<StateStore>, mpsc::UnboundedReceiver<TurtleId>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let store = StateStore::open_in_memory(tx).expect("in-memory store");
    (Arc::new(store), rx)
}

/// Spawn an agent whose outbox is answered by a [`StubWorld`] responder
/// task. Returns the agent and a handle onto the world for assertions.
pub fn spawn_stub_agent(
    store: Arc<StateStore>,
    id: TurtleId,
    world: StubWorld,
) -> (Arc<Agent>, Arc<Mutex<StubWorld>>) {
    let (outbox_tx, mut outbox_rx) = mpsc::unbounded_channel::<String>();
    let agent = Arc::new(Agent::new(id, outbox_tx, store));
    let world = Arc::new(Mutex::new(world));

    let responder_world = Arc::clone(&world);
    let responder_agent = Arc::clone(&agent);
    tokio::spawn(async move {
        while let Some(frame) = outbox_rx.recv().await {
            let Ok(value) = serde_json::from_str::<Value>(&frame) else { continue };
            let Some(req_id) = value.get("id").and_then(Value::as_str) else { continue };
            let command = value.get("command").and_then(Value::as_str).unwrap_or_default();
            let (ok, reply_value) = responder_world.lock().await.respond(command);
            let reply =
                json!({ "in_reply_to": req_id, "ok": ok, "value": reply_value }).to_string();
            responder_agent.dispatch_reply(&reply).await;
        }
    });
    (agent, world)
}

/// Fully wired [`AppState`] over an in-memory store, plus the raw change
/// channel for tests that watch mutations directly.
pub fn test_state() -> (Arc<AppState>, mpsc::UnboundedReceiver<TurtleId>) {
    let (store, change_rx) = stub_store();
    let state = Arc::new(AppState {
        config: Config { host: "127.0.0.1".to_owned(), port: 0, data_dir: "data".into() },
        store,
        bus: EventBus::new(),
        gateway: Gateway::new(),
        scheduler: Scheduler::new(registry()),
        shutdown: CancellationToken::new(),
    });
    (state, change_rx)
}
