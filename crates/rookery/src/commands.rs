// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command vocabulary for a held agent session.
//!
//! Two base operations ride on the session: `send_command` treats the reply
//! `ok` flag as a boolean outcome, `eval` returns the reply `value` (or a
//! `false` sentinel when the remote evaluation failed — routines decide what
//! to do, nothing throws). On top of those, each primitive wraps one remote
//! call and, on success, applies its deterministic local state delta through
//! the store: movement shifts coordinates and burns fuel, turns rotate the
//! heading mod 4, refuel re-reads the gauge, GPS/label/inventory reads
//! persist what they saw. Every primitive also appends a row to the call
//! audit trail.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::agent::{Agent, Reply, Session};
use crate::error::CommandError;
use crate::store::{CallAudit, Coords, StatePatch, TurtleRecord};

const INSPECT_LINE: &str =
    "(function() local ok,data=turtle.inspect(); return {ok=ok, data=data} end)()";
const INSPECT_UP_LINE: &str =
    "(function() local ok,data=turtle.inspectUp(); return {ok=ok, data=data} end)()";
const INSPECT_DOWN_LINE: &str =
    "(function() local ok,data=turtle.inspectDown(); return {ok=ok, data=data} end)()";
const GPS_LINE: &str = "(function() local x,y,z=gps.locate(2); return x,y,z end)()";

/// Block facing a turtle, normalized from an inspect reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    pub name: String,
    #[serde(rename = "c:ores")]
    pub ores: bool,
    #[serde(rename = "minecraft:mineable/pickaxe")]
    pub pickaxe: bool,
}

impl BlockInfo {
    pub fn is_ore(&self) -> bool {
        self.name.to_lowercase().contains("ore")
    }
}

/// Interpret a reply as a command outcome. Movement replies may carry the
/// success as `value: bool` or `value: [ok, reason]`; the first element wins.
pub(crate) fn reply_success(reply: &Reply) -> bool {
    if !reply.ok {
        return false;
    }
    match &reply.value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Array(items)) => items.first().and_then(Value::as_bool).unwrap_or(true),
        _ => true,
    }
}

/// Loose truthiness for tag values: absent, `false`, `0`, and `""` all mean
/// the tag is not set.
fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn tag_set(tags: Option<&Value>, key: &str) -> bool {
    tags.and_then(|t| t.get(key)).map(truthy).unwrap_or(false)
}

/// Normalize an inspect reply `{ok, data: {name, tags}}`. `ok=false` (air)
/// normalizes to `None`.
pub fn normalize_inspect(value: &Value) -> Option<BlockInfo> {
    let obj = value.as_object()?;
    if !obj.get("ok").map(truthy).unwrap_or(false) {
        return None;
    }
    let data = obj.get("data")?;
    let tags = data.get("tags");
    Some(BlockInfo {
        name: data.get("name").and_then(Value::as_str).unwrap_or_default().to_owned(),
        ores: tag_set(tags, "c:ores"),
        pickaxe: tag_set(tags, "minecraft:mineable/pickaxe"),
    })
}

/// Normalize the firmware's 0-indexed 16-entry inventory array into the
/// persisted 16-slot map keyed `"1"..="16"`. Empty slots are `null`; items
/// carry name, display name, count, and the derived tag booleans.
pub fn normalize_inventory(raw: &Value) -> Value {
    let entries = raw.as_array();
    let mut slots = Map::new();
    for i in 0..16usize {
        let slot = i + 1;
        let entry = entries.and_then(|a| a.get(i)).filter(|v| !v.is_null());
        let value = match entry {
            None => Value::Null,
            Some(item) => {
                let tags = item.get("tags");
                json!({
                    "slot": slot,
                    "name": item.get("name").and_then(Value::as_str).unwrap_or_default(),
                    "displayName":
                        item.get("displayName").and_then(Value::as_str).unwrap_or_default(),
                    "count": item.get("count").and_then(Value::as_i64).unwrap_or(0),
                    "c:ores": tag_set(tags, "c:ores"),
                    "c:gems": tag_set(tags, "c:gems"),
                    "c:stones": tag_set(tags, "c:stones"),
                    "c:chests": tag_set(tags, "c:chests"),
                    "minecraft:building_blocks": tag_set(tags, "minecraft:building_blocks"),
                })
            }
        };
        slots.insert(slot.to_string(), value);
    }
    Value::Object(slots)
}

/// Parse a GPS reply: a sequence of at least three numbers.
pub(crate) fn parse_triple(value: &Value) -> Option<Coords> {
    let items = value.as_array()?;
    if items.len() < 3 {
        return None;
    }
    let mut nums = [0i64; 3];
    for (i, slot) in nums.iter_mut().enumerate() {
        *slot = items.get(i)?.as_f64()? as i64;
    }
    Some(Coords::new(nums[0], nums[1], nums[2]))
}

impl Session<'_> {
    /// Current persisted record for this turtle.
    pub async fn record(&self) -> TurtleRecord {
        self.store().get(self.id()).await
    }

    /// Send a line, audit it, and return the raw reply.
    async fn command(
        &self,
        name: &str,
        args: Value,
        line: &str,
    ) -> Result<Reply, CommandError> {
        let start = Instant::now();
        let (req_id, result) = self.agent().send_traced(line).await;
        let duration_ms = start.elapsed().as_millis() as i64;
        let audit = match &result {
            Ok(reply) => CallAudit {
                name,
                args: &args,
                ok: Some(reply.ok),
                result: reply.value.as_ref(),
                error: reply.error.as_deref(),
                request_id: Some(&req_id),
                duration_ms,
            },
            Err(e) => CallAudit {
                name,
                args: &args,
                ok: Some(false),
                result: None,
                error: Some(e.as_str()),
                request_id: Some(&req_id),
                duration_ms,
            },
        };
        if let Err(e) = self.store().log_call(self.id(), audit).await {
            tracing::debug!("Turtle {}: audit write failed: {e:#}", self.id());
        }
        result
    }

    /// Send a line and treat the reply `ok` flag as the outcome.
    pub async fn send_command(&self, line: &str) -> Result<bool, CommandError> {
        let reply = self.command("send_command", json!({ "line": line }), line).await?;
        Ok(reply_success(&reply))
    }

    /// Evaluate a Lua expression. A failed evaluation logs the reply and
    /// returns the `false` sentinel rather than an error.
    pub async fn eval(&self, line: &str) -> Result<Value, CommandError> {
        self.eval_named("eval", line).await
    }

    async fn eval_named(&self, name: &str, line: &str) -> Result<Value, CommandError> {
        let reply = self.command(name, json!({ "line": line }), line).await?;
        if !reply.ok {
            tracing::warn!(
                "Turtle {}: eval failed: {}",
                self.id(),
                serde_json::to_string(&reply).unwrap_or_default()
            );
            return Ok(Value::Bool(false));
        }
        Ok(reply.value.unwrap_or(Value::Null))
    }

    async fn simple(&self, name: &str, line: &str) -> Result<bool, CommandError> {
        let reply = self.command(name, Value::Null, line).await?;
        Ok(reply_success(&reply))
    }

    // -- movement -------------------------------------------------------------

    async fn apply_movement(&self, dx: i64, dy: i64, dz: i64, fuel_cost: i64) {
        let record = self.record().await;
        let c = record.coords.unwrap_or_default();
        let patch = StatePatch {
            coords: Some(Coords::new(c.x + dx, c.y + dy, c.z + dz)),
            fuel_level: if fuel_cost > 0 {
                record.fuel_level.map(|f| (f - fuel_cost).max(0))
            } else {
                None
            },
            ..Default::default()
        };
        if let Err(e) = self.store().update(self.id(), patch).await {
            tracing::warn!("Turtle {}: movement state write failed: {e:#}", self.id());
        }
    }

    async fn apply_heading(&self, delta: u8) {
        let record = self.record().await;
        let heading = match record.heading {
            Some(h) => (h + delta) % 4,
            None => delta % 4,
        };
        let patch = StatePatch { heading: Some(heading), ..Default::default() };
        if let Err(e) = self.store().update(self.id(), patch).await {
            tracing::warn!("Turtle {}: heading state write failed: {e:#}", self.id());
        }
    }

    pub async fn forward(&self) -> Result<bool, CommandError> {
        let ok = self.simple("forward", "turtle.forward()").await?;
        if ok {
            match self.record().await.heading {
                Some(0) => self.apply_movement(1, 0, 0, 1).await,
                Some(1) => self.apply_movement(0, 0, 1, 1).await,
                Some(2) => self.apply_movement(-1, 0, 0, 1).await,
                Some(3) => self.apply_movement(0, 0, -1, 1).await,
                // Heading unknown: at least account for the fuel burn.
                _ => self.apply_movement(0, 0, 0, 1).await,
            }
        }
        Ok(ok)
    }

    pub async fn back(&self) -> Result<bool, CommandError> {
        let ok = self.simple("back", "turtle.back()").await?;
        if ok {
            match self.record().await.heading {
                Some(0) => self.apply_movement(-1, 0, 0, 1).await,
                Some(1) => self.apply_movement(0, 0, -1, 1).await,
                Some(2) => self.apply_movement(1, 0, 0, 1).await,
                Some(3) => self.apply_movement(0, 0, 1, 1).await,
                _ => self.apply_movement(0, 0, 0, 1).await,
            }
        }
        Ok(ok)
    }

    pub async fn up(&self) -> Result<bool, CommandError> {
        let ok = self.simple("up", "turtle.up()").await?;
        if ok {
            self.apply_movement(0, 1, 0, 1).await;
        }
        Ok(ok)
    }

    pub async fn down(&self) -> Result<bool, CommandError> {
        let ok = self.simple("down", "turtle.down()").await?;
        if ok {
            self.apply_movement(0, -1, 0, 1).await;
        }
        Ok(ok)
    }

    pub async fn turn_left(&self) -> Result<bool, CommandError> {
        let ok = self.simple("turn_left", "turtle.turnLeft()").await?;
        if ok {
            self.apply_heading(3).await;
        }
        Ok(ok)
    }

    pub async fn turn_right(&self) -> Result<bool, CommandError> {
        let ok = self.simple("turn_right", "turtle.turnRight()").await?;
        if ok {
            self.apply_heading(1).await;
        }
        Ok(ok)
    }

    // -- digging / placing / item handling ------------------------------------

    pub async fn dig(&self) -> Result<bool, CommandError> {
        self.simple("dig", "turtle.dig()").await
    }

    pub async fn dig_up(&self) -> Result<bool, CommandError> {
        self.simple("dig_up", "turtle.digUp()").await
    }

    pub async fn dig_down(&self) -> Result<bool, CommandError> {
        self.simple("dig_down", "turtle.digDown()").await
    }

    pub async fn place(&self) -> Result<bool, CommandError> {
        self.simple("place", "turtle.place()").await
    }

    pub async fn place_up(&self) -> Result<bool, CommandError> {
        self.simple("place_up", "turtle.placeUp()").await
    }

    pub async fn place_down(&self) -> Result<bool, CommandError> {
        self.simple("place_down", "turtle.placeDown()").await
    }

    pub async fn suck(&self) -> Result<bool, CommandError> {
        self.simple("suck", "turtle.suck()").await
    }

    pub async fn suck_up(&self) -> Result<bool, CommandError> {
        self.simple("suck_up", "turtle.suckUp()").await
    }

    pub async fn suck_down(&self) -> Result<bool, CommandError> {
        self.simple("suck_down", "turtle.suckDown()").await
    }

    pub async fn drop(&self, count: Option<i64>) -> Result<bool, CommandError> {
        let line = match count {
            Some(n) => format!("turtle.drop({n})"),
            None => "turtle.drop()".to_owned(),
        };
        let reply = self.command("drop", json!({ "count": count }), &line).await?;
        Ok(reply_success(&reply))
    }

    pub async fn drop_up(&self, count: Option<i64>) -> Result<bool, CommandError> {
        let line = match count {
            Some(n) => format!("turtle.dropUp({n})"),
            None => "turtle.dropUp()".to_owned(),
        };
        let reply = self.command("drop_up", json!({ "count": count }), &line).await?;
        Ok(reply_success(&reply))
    }

    pub async fn drop_down(&self, count: Option<i64>) -> Result<bool, CommandError> {
        let line = match count {
            Some(n) => format!("turtle.dropDown({n})"),
            None => "turtle.dropDown()".to_owned(),
        };
        let reply = self.command("drop_down", json!({ "count": count }), &line).await?;
        Ok(reply_success(&reply))
    }

    pub async fn select(&self, slot: i64) -> Result<bool, CommandError> {
        let reply =
            self.command("select", json!({ "slot": slot }), &format!("turtle.select({slot})")).await?;
        Ok(reply_success(&reply))
    }

    pub async fn compare(&self) -> Result<bool, CommandError> {
        self.simple("compare", "turtle.compare()").await
    }

    pub async fn compare_up(&self) -> Result<bool, CommandError> {
        self.simple("compare_up", "turtle.compareUp()").await
    }

    pub async fn compare_down(&self) -> Result<bool, CommandError> {
        self.simple("compare_down", "turtle.compareDown()").await
    }

    pub async fn compare_to(&self, slot: i64) -> Result<bool, CommandError> {
        let reply = self
            .command("compare_to", json!({ "slot": slot }), &format!("turtle.compareTo({slot})"))
            .await?;
        Ok(reply_success(&reply))
    }

    pub async fn transfer_to(&self, slot: i64, count: Option<i64>) -> Result<bool, CommandError> {
        let line = match count {
            Some(n) => format!("turtle.transferTo({slot},{n})"),
            None => format!("turtle.transferTo({slot})"),
        };
        let reply =
            self.command("transfer_to", json!({ "slot": slot, "count": count }), &line).await?;
        Ok(reply_success(&reply))
    }

    pub async fn equip_left(&self) -> Result<bool, CommandError> {
        self.simple("equip_left", "turtle.equipLeft()").await
    }

    pub async fn equip_right(&self) -> Result<bool, CommandError> {
        self.simple("equip_right", "turtle.equipRight()").await
    }

    // -- fuel -----------------------------------------------------------------

    pub async fn get_fuel_level(&self) -> Result<Option<i64>, CommandError> {
        let value = self.eval_named("get_fuel_level", "turtle.getFuelLevel()").await?;
        Ok(value.as_i64())
    }

    pub async fn get_fuel_limit(&self) -> Result<Option<i64>, CommandError> {
        let value = self.eval_named("get_fuel_limit", "turtle.getFuelLimit()").await?;
        Ok(value.as_i64())
    }

    /// Refuel from the selected slot; on success the gauge is re-read and
    /// persisted.
    pub async fn refuel(&self, count: Option<i64>) -> Result<bool, CommandError> {
        let line = match count {
            Some(n) => format!("turtle.refuel({n})"),
            None => "turtle.refuel()".to_owned(),
        };
        let reply = self.command("refuel", json!({ "count": count }), &line).await?;
        let ok = reply_success(&reply);
        if ok {
            if let Some(fuel) = self.get_fuel_level().await? {
                let patch = StatePatch { fuel_level: Some(fuel), ..Default::default() };
                if let Err(e) = self.store().update(self.id(), patch).await {
                    tracing::warn!("Turtle {}: fuel state write failed: {e:#}", self.id());
                }
            }
        }
        Ok(ok)
    }

    // -- slots ----------------------------------------------------------------

    pub async fn get_selected_slot(&self) -> Result<Option<i64>, CommandError> {
        let value = self.eval_named("get_selected_slot", "turtle.getSelectedSlot()").await?;
        Ok(value.as_i64())
    }

    pub async fn get_item_count(&self, slot: Option<i64>) -> Result<Option<i64>, CommandError> {
        let line = match slot {
            Some(s) => format!("turtle.getItemCount({s})"),
            None => "turtle.getItemCount()".to_owned(),
        };
        let value = self.eval_named("get_item_count", &line).await?;
        Ok(value.as_i64())
    }

    pub async fn get_item_space(&self, slot: Option<i64>) -> Result<Option<i64>, CommandError> {
        let line = match slot {
            Some(s) => format!("turtle.getItemSpace({s})"),
            None => "turtle.getItemSpace()".to_owned(),
        };
        let value = self.eval_named("get_item_space", &line).await?;
        Ok(value.as_i64())
    }

    /// Item stack details for a slot (or the selected one). `None` for an
    /// empty slot.
    pub async fn get_item_detail(&self, slot: Option<i64>) -> Result<Option<Value>, CommandError> {
        let line = match slot {
            Some(s) => format!("turtle.getItemDetail({s})"),
            None => "turtle.getItemDetail()".to_owned(),
        };
        let value = self.eval_named("get_item_detail", &line).await?;
        Ok(match value {
            Value::Object(_) => Some(value),
            _ => None,
        })
    }

    // -- inspection -----------------------------------------------------------

    /// Inspect the block ahead. `None` means air (or a failed inspect).
    pub async fn inspect(&self) -> Result<Option<BlockInfo>, CommandError> {
        let value = self.eval_named("inspect", INSPECT_LINE).await?;
        Ok(normalize_inspect(&value))
    }

    pub async fn inspect_up(&self) -> Result<Option<BlockInfo>, CommandError> {
        let value = self.eval_named("inspect_up", INSPECT_UP_LINE).await?;
        Ok(normalize_inspect(&value))
    }

    pub async fn inspect_down(&self) -> Result<Option<BlockInfo>, CommandError> {
        let value = self.eval_named("inspect_down", INSPECT_DOWN_LINE).await?;
        Ok(normalize_inspect(&value))
    }

    // -- firmware helpers -----------------------------------------------------

    /// GPS query. A valid triple is persisted and returned.
    pub async fn get_location(&self) -> Result<Option<Coords>, CommandError> {
        let value = self.eval_named("get_location", "gps.locate()").await?;
        let coords = parse_triple(&value);
        if let Some(c) = coords {
            let patch = StatePatch { coords: Some(c), ..Default::default() };
            if let Err(e) = self.store().update(self.id(), patch).await {
                tracing::warn!("Turtle {}: coords state write failed: {e:#}", self.id());
            }
        }
        Ok(coords)
    }

    /// Set the turtle's name tag; the label is persisted on success.
    pub async fn set_label(&self, label: &str) -> Result<bool, CommandError> {
        let escaped = label.replace('\\', "\\\\").replace('"', "\\\"");
        let line = format!("set_name_tag(\"{escaped}\")");
        let reply = self.command("set_label", json!({ "label": label }), &line).await?;
        let ok = reply_success(&reply);
        if ok {
            if let Err(e) = self.store().set_label(self.id(), label).await {
                tracing::warn!("Turtle {}: label state write failed: {e:#}", self.id());
            }
        }
        Ok(ok)
    }

    pub async fn get_name_tag(&self) -> Result<Option<String>, CommandError> {
        let value = self.eval_named("get_name_tag", "get_name_tag()").await?;
        Ok(match value {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Fetch the full inventory from firmware; the normalized 16-slot map is
    /// persisted and returned. `None` when the helper is unavailable.
    pub async fn get_inventory_details(&self) -> Result<Option<Value>, CommandError> {
        let value = self.eval_named("get_inventory_details", "get_inventory_details()").await?;
        if !value.is_array() {
            return Ok(None);
        }
        let normalized = normalize_inventory(&value);
        let patch = StatePatch { inventory: Some(normalized.clone()), ..Default::default() };
        if let Err(e) = self.store().update(self.id(), patch).await {
            tracing::warn!("Turtle {}: inventory state write failed: {e:#}", self.id());
        }
        Ok(Some(normalized))
    }
}

// -- connect-time detection ---------------------------------------------------

/// One-time background state detection for a freshly connected turtle:
/// fuel gauge, GPS fix, inventory, label, and a movement-based heading probe.
/// Everything is best-effort; whatever was detected is patched in.
pub async fn detect_initial_state(agent: Arc<Agent>) {
    tracing::info!("Turtle {}: detecting state", agent.id);
    let session = agent.session().await;
    if let Err(e) = run_detection(&session).await {
        tracing::warn!("Turtle {}: state detection failed: {e}", agent.id);
    }
}

async fn run_detection(sess: &Session<'_>) -> Result<(), CommandError> {
    if let Some(fuel) = sess.get_fuel_level().await? {
        let patch = StatePatch { fuel_level: Some(fuel), ..Default::default() };
        if let Err(e) = sess.store().update(sess.id(), patch).await {
            tracing::warn!("Turtle {}: fuel state write failed: {e:#}", sess.id());
        }
    }

    let coords = parse_triple(&sess.eval_named("get_location", GPS_LINE).await?);
    match coords {
        Some(c) => {
            tracing::info!("Turtle {}: GPS fix at ({},{},{})", sess.id(), c.x, c.y, c.z);
            let patch = StatePatch { coords: Some(c), ..Default::default() };
            if let Err(e) = sess.store().update(sess.id(), patch).await {
                tracing::warn!("Turtle {}: coords state write failed: {e:#}", sess.id());
            }
        }
        None => tracing::warn!("Turtle {}: GPS detection failed (no fix)", sess.id()),
    }

    let _ = sess.get_inventory_details().await?;

    if let Some(label) = sess.get_name_tag().await? {
        if let Err(e) = sess.store().set_label(sess.id(), &label).await {
            tracing::warn!("Turtle {}: label state write failed: {e:#}", sess.id());
        }
    }

    match coords {
        Some(c) if c != Coords::new(0, 0, 0) => probe_heading(sess, c).await?,
        Some(_) => tracing::info!("Turtle {}: skipping heading probe at origin", sess.id()),
        None => tracing::info!("Turtle {}: skipping heading probe without GPS", sess.id()),
    }
    Ok(())
}

fn heading_from_delta(dx: i64, dz: i64) -> Option<u8> {
    match (dx, dz) {
        (1, 0) => Some(0),
        (-1, 0) => Some(2),
        (0, 1) => Some(1),
        (0, -1) => Some(3),
        _ => None,
    }
}

/// Movement-based heading probe: rotate right until an air face is found,
/// step into it, compare GPS fixes, step back, restore the facing. The
/// persisted heading is the measured direction minus the probe rotations,
/// i.e. the facing the turtle was restored to.
async fn probe_heading(sess: &Session<'_>, c1: Coords) -> Result<(), CommandError> {
    let mut rotations: u8 = 0;
    let mut found_air = false;
    for _ in 0..4 {
        if sess.inspect().await?.is_none() {
            found_air = true;
            break;
        }
        sess.turn_right().await?;
        rotations += 1;
    }
    if !found_air {
        tracing::info!("Turtle {}: no air face for heading probe", sess.id());
        return Ok(());
    }

    let probe = async {
        sess.forward().await?;
        let c2 = parse_triple(&sess.eval_named("get_location", GPS_LINE).await?);
        sess.back().await?;
        for _ in 0..rotations {
            sess.turn_left().await?;
        }
        Ok::<Option<Coords>, CommandError>(c2)
    };

    match probe.await {
        Ok(Some(c2)) => {
            let measured = heading_from_delta(c2.x - c1.x, c2.z - c1.z);
            if let Some(m) = measured {
                let heading = (m + 4 - rotations % 4) % 4;
                tracing::info!("Turtle {}: heading detected: {heading}", sess.id());
                let patch = StatePatch { heading: Some(heading), ..Default::default() };
                if let Err(e) = sess.store().update(sess.id(), patch).await {
                    tracing::warn!("Turtle {}: heading state write failed: {e:#}", sess.id());
                }
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            tracing::warn!("Turtle {}: heading probe failed: {e}", sess.id());
            for _ in 0..rotations {
                let _ = sess.turn_left().await;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod commands_tests;
