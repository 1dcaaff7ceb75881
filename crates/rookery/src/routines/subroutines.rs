// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reusable helpers invoked by routines: straight-line and obstacle-aware
//! traversal, BFS ore-vein flood-fill, chest dumping, refueling, and the
//! named dispatch used by the `execute_command` routine.
//!
//! All pathing here tracks pose locally (relative to wherever the helper
//! started) and only consults the store for the initial fix; the command
//! layer keeps the persisted coordinates in step as moves succeed.

use std::collections::{HashMap, HashSet, VecDeque};

use futures_util::future::BoxFuture;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::Session;
use crate::error::CommandError;
use crate::store::Coords;

/// Heading unit vectors, indexed 0:+X, 1:+Z, 2:-X, 3:-Z.
pub(crate) const DIR_VECS: [(i64, i64, i64); 4] = [(1, 0, 0), (0, 0, 1), (-1, 0, 0), (0, 0, -1)];

/// Default action budget for one vein flood-fill.
pub(crate) const DEFAULT_VEIN_ACTIONS: usize = 2000;

/// Fuel headroom kept below the tank limit before refueling kicks in.
const FUEL_HEADROOM: i64 = 5000;

/// "All of it": the refuel call consumes at most what the slot holds.
const REFUEL_BATCH: i64 = 100_000;

const SAFE_CORRIDOR_Y: i64 = 150;

pub(crate) type Vec3 = (i64, i64, i64);

fn add(a: Vec3, b: Vec3) -> Vec3 {
    (a.0 + b.0, a.1 + b.1, a.2 + b.2)
}

/// (min_x, min_z) of the 16x16 chunk containing (x, z).
pub(crate) fn chunk_origin(x: i64, z: i64) -> (i64, i64) {
    (x.div_euclid(16) * 16, z.div_euclid(16) * 16)
}

// -- facing -------------------------------------------------------------------

/// Rotate from `heading` to `target` by the shortest turn sequence.
/// Returns the new heading (always `target`).
pub(crate) async fn face_heading(
    sess: &Session<'_>,
    mut heading: u8,
    target: u8,
) -> Result<u8, CommandError> {
    while heading != target {
        let cw = (target + 4 - heading) % 4;
        match cw {
            1 => {
                sess.turn_right().await?;
                heading = (heading + 1) % 4;
            }
            2 => {
                sess.turn_right().await?;
                sess.turn_right().await?;
                heading = (heading + 2) % 4;
            }
            _ => {
                sess.turn_left().await?;
                heading = (heading + 3) % 4;
            }
        }
    }
    Ok(heading)
}

/// Rotate right until the persisted heading matches `target` (at most four
/// turns). Used where the caller trusts the store rather than local
/// bookkeeping.
pub(crate) async fn face_stored_heading(
    sess: &Session<'_>,
    target: u8,
) -> Result<(), CommandError> {
    for _ in 0..4 {
        if sess.record().await.heading == Some(target) {
            return Ok(());
        }
        sess.turn_right().await?;
    }
    Ok(())
}

// -- forward movement ---------------------------------------------------------

/// One traversal step: clear the block ahead and the headroom above, then
/// move. Returns whether the move succeeded.
pub(crate) async fn step_dig_forward(sess: &Session<'_>) -> Result<bool, CommandError> {
    if sess.inspect().await?.is_some() {
        sess.dig().await?;
    }
    if sess.inspect_up().await?.is_some() {
        sess.dig_up().await?;
    }
    sess.forward().await
}

/// Keep digging and stepping until the move lands, for falling gravel and
/// other re-filling blocks. Gives up after 20 attempts.
pub(crate) async fn force_dig_forward(sess: &Session<'_>) -> Result<bool, CommandError> {
    const MAX_ATTEMPTS: usize = 20;
    for attempt in 0..MAX_ATTEMPTS {
        if sess.forward().await? {
            debug!("Turtle {}: forced forward after {} attempts", sess.id(), attempt + 1);
            return Ok(true);
        }
        sess.dig().await?;
    }
    warn!("Turtle {}: forward still blocked after {MAX_ATTEMPTS} attempts", sess.id());
    Ok(false)
}

// -- dig_to_coordinate --------------------------------------------------------

/// Straight-line traversal to `target`, digging through everything: X leg,
/// then Z, then Y. Each leg stops early when a move fails even after
/// digging.
pub async fn dig_to_coordinate(sess: &Session<'_>, target: Coords) -> Result<(), CommandError> {
    let record = sess.record().await;
    let c = record.coords.unwrap_or_default();
    let (mut x, mut y, mut z) = (c.x, c.y, c.z);
    let mut heading = record.heading.unwrap_or(0);

    while x != target.x {
        let toward = if target.x > x { 0 } else { 2 };
        heading = face_heading(sess, heading, toward).await?;
        if step_dig_forward(sess).await? {
            x += if target.x > x { 1 } else { -1 };
        } else {
            warn!("Turtle {}: X movement blocked", sess.id());
            break;
        }
    }

    while z != target.z {
        let toward = if target.z > z { 1 } else { 3 };
        heading = face_heading(sess, heading, toward).await?;
        if step_dig_forward(sess).await? {
            z += if target.z > z { 1 } else { -1 };
        } else {
            warn!("Turtle {}: Z movement blocked", sess.id());
            break;
        }
    }

    while y < target.y {
        sess.dig_up().await?;
        if sess.up().await? {
            y += 1;
        } else {
            warn!("Turtle {}: Y upward movement blocked", sess.id());
            break;
        }
    }
    while y > target.y {
        sess.dig_down().await?;
        if sess.down().await? {
            y -= 1;
        } else {
            warn!("Turtle {}: Y downward movement blocked", sess.id());
            break;
        }
    }

    info!(
        "Turtle {}: dig_to_coordinate finished at ({x},{y},{z}) target=({},{},{})",
        sess.id(),
        target.x,
        target.y,
        target.z
    );
    Ok(())
}

// -- move_to_coordinate -------------------------------------------------------

struct Walker {
    x: i64,
    y: i64,
    z: i64,
    heading: u8,
    steps: u64,
    threshold: u64,
}

impl Walker {
    async fn face(&mut self, sess: &Session<'_>, target: u8) -> Result<(), CommandError> {
        self.heading = face_heading(sess, self.heading, target).await?;
        Ok(())
    }

    /// Try to advance one block: dig ahead and overhead, move, and on
    /// failure climb one block and retry, then fall back to a one-block
    /// right side-step.
    fn step_forward_checked<'a, 'b: 'a>(
        &'a mut self,
        sess: &'a Session<'b>,
    ) -> BoxFuture<'a, Result<bool, CommandError>> {
        Box::pin(async move {
            if sess.inspect().await?.is_some() {
                sess.dig().await?;
            }
            if sess.inspect_up().await?.is_some() {
                sess.dig_up().await?;
            }
            if sess.forward().await? {
                let (vx, _, vz) = DIR_VECS[self.heading as usize];
                self.x += vx;
                self.z += vz;
                if sess.inspect_up().await?.is_some() {
                    sess.dig_up().await?;
                }
                self.steps += 1;
                return Ok(true);
            }

            // Up and over.
            if sess.inspect_up().await?.is_some() {
                sess.dig_up().await?;
            }
            if sess.up().await? {
                self.steps += 1;
                if self.step_forward_checked(sess).await? {
                    sess.down().await?;
                    self.steps += 1;
                    return Ok(true);
                }
                sess.down().await?;
                self.steps += 1;
            }

            // One-block side-step to the right, then face back.
            sess.turn_right().await?;
            self.heading = (self.heading + 1) % 4;
            if sess.inspect().await?.is_some() {
                sess.dig().await?;
            }
            if sess.forward().await? {
                let (vx, _, vz) = DIR_VECS[self.heading as usize];
                self.x += vx;
                self.z += vz;
                self.steps += 1;
                sess.turn_left().await?;
                self.heading = (self.heading + 3) % 4;
                return Ok(true);
            }
            sess.turn_left().await?;
            self.heading = (self.heading + 3) % 4;
            Ok(false)
        })
    }

    async fn step_vertical(&mut self, sess: &Session<'_>, to_up: bool) -> Result<bool, CommandError> {
        let ok = if to_up {
            if sess.inspect_up().await?.is_some() {
                sess.dig_up().await?;
            }
            let ok = sess.up().await?;
            if ok {
                self.y += 1;
            }
            ok
        } else {
            if sess.inspect_down().await?.is_some() {
                sess.dig_down().await?;
            }
            let ok = sess.down().await?;
            if ok {
                self.y -= 1;
            }
            ok
        };
        if ok {
            self.steps += 1;
        }
        Ok(ok)
    }
}

/// Obstacle-aware travel to `target`: rise to a high corridor, cross X, then
/// Z, then settle to the target altitude. Every stage is bounded by a step
/// threshold of `max(500, 4 * L1 distance)`.
pub async fn move_to_coordinate(sess: &Session<'_>, target: Coords) -> Result<(), CommandError> {
    let Some(start) = sess.get_location().await? else {
        warn!("Turtle {}: could not get current position", sess.id());
        return Ok(());
    };

    let record = sess.record().await;
    let heading = record.heading.unwrap_or(0);
    let l1 = (start.x - target.x).abs() + (start.y - target.y).abs() + (start.z - target.z).abs();
    let threshold = (4 * l1).max(500) as u64;
    let mut w = Walker { x: start.x, y: start.y, z: start.z, heading, steps: 0, threshold };

    // Stage 1: rise into the travel corridor.
    while w.y < SAFE_CORRIDOR_Y && w.steps < w.threshold {
        if !w.step_vertical(sess, true).await? {
            break;
        }
    }

    // Stage 2: cross along X.
    while w.x != target.x && w.steps < w.threshold {
        let toward = if target.x > w.x { 0 } else { 2 };
        w.face(sess, toward).await?;
        if !w.step_forward_checked(sess).await? {
            if !w.step_vertical(sess, true).await? {
                w.step_vertical(sess, false).await?;
            }
        }
    }

    // Stage 3: cross along Z.
    while w.z != target.z && w.steps < w.threshold {
        let toward = if target.z > w.z { 1 } else { 3 };
        w.face(sess, toward).await?;
        if !w.step_forward_checked(sess).await? {
            if !w.step_vertical(sess, true).await? {
                w.step_vertical(sess, false).await?;
            }
        }
    }

    // Stage 4: settle to the target altitude.
    while w.y < target.y && w.steps < w.threshold {
        if !w.step_vertical(sess, true).await? {
            break;
        }
    }
    while w.y > target.y && w.steps < w.threshold {
        if !w.step_vertical(sess, false).await? {
            break;
        }
    }

    info!(
        "Turtle {}: move_to_coordinate finished at ({},{},{}) target=({},{},{}) steps={} threshold={}",
        sess.id(),
        w.x,
        w.y,
        w.z,
        target.x,
        target.y,
        target.z,
        w.steps,
        w.threshold
    );
    Ok(())
}

// -- vein flood-fill ----------------------------------------------------------

fn is_ore_name(name: Option<&Option<String>>) -> bool {
    matches!(name, Some(Some(n)) if n.to_lowercase().contains("ore"))
}

/// Shortest path from `start` to `goal` walking only over `mined` cells
/// (6-connected). `goal` must itself be mined to be reachable.
pub(crate) fn bfs_path(mined: &HashSet<Vec3>, start: Vec3, goal: Vec3) -> Option<Vec<Vec3>> {
    if start == goal {
        return Some(vec![start]);
    }
    const NEIGHBORS: [Vec3; 6] =
        [(1, 0, 0), (-1, 0, 0), (0, 0, 1), (0, 0, -1), (0, 1, 0), (0, -1, 0)];
    let mut queue = VecDeque::from([start]);
    let mut came: HashMap<Vec3, Option<Vec3>> = HashMap::from([(start, None)]);
    while let Some(cur) = queue.pop_front() {
        if cur == goal {
            break;
        }
        for dv in NEIGHBORS {
            let next = add(cur, dv);
            if mined.contains(&next) && !came.contains_key(&next) {
                came.insert(next, Some(cur));
                queue.push_back(next);
            }
        }
    }
    if !came.contains_key(&goal) {
        return None;
    }
    let mut path = Vec::new();
    let mut cur = Some(goal);
    while let Some(cell) = cur {
        path.push(cell);
        cur = came.get(&cell).copied().flatten();
    }
    path.reverse();
    Some(path)
}

struct VeinMiner {
    pos: Vec3,
    dir: u8,
    mined: HashSet<Vec3>,
    frontier: HashSet<Vec3>,
    inspected: HashMap<Vec3, Option<String>>,
    actions: usize,
    max_actions: usize,
}

impl VeinMiner {
    async fn turn_left_local(&mut self, sess: &Session<'_>) -> Result<(), CommandError> {
        sess.turn_left().await?;
        self.dir = (self.dir + 3) % 4;
        Ok(())
    }

    async fn turn_right_local(&mut self, sess: &Session<'_>) -> Result<(), CommandError> {
        sess.turn_right().await?;
        self.dir = (self.dir + 1) % 4;
        Ok(())
    }

    async fn face_dir(&mut self, sess: &Session<'_>, target: u8) -> Result<(), CommandError> {
        while self.dir != target {
            match (target + 4 - self.dir) % 4 {
                1 => self.turn_right_local(sess).await?,
                2 => {
                    self.turn_right_local(sess).await?;
                    self.turn_right_local(sess).await?;
                }
                _ => self.turn_left_local(sess).await?,
            }
        }
        Ok(())
    }

    async fn step_forward(&mut self, sess: &Session<'_>) -> Result<bool, CommandError> {
        let ok = force_dig_forward(sess).await?;
        if ok {
            self.pos = add(self.pos, DIR_VECS[self.dir as usize]);
        }
        Ok(ok)
    }

    async fn step_up(&mut self, sess: &Session<'_>) -> Result<bool, CommandError> {
        let ok = sess.up().await?;
        if ok {
            self.pos = (self.pos.0, self.pos.1 + 1, self.pos.2);
        }
        Ok(ok)
    }

    async fn step_down(&mut self, sess: &Session<'_>) -> Result<bool, CommandError> {
        let ok = sess.down().await?;
        if ok {
            self.pos = (self.pos.0, self.pos.1 - 1, self.pos.2);
        }
        Ok(ok)
    }

    /// Inspect the six neighbors of the current cell (rotating through the
    /// horizontals and restoring the facing), cache what was seen, and add
    /// unmined ore cells to the frontier.
    async fn refresh_frontier(&mut self, sess: &Session<'_>) -> Result<(), CommandError> {
        for _ in 0..4 {
            let adj = add(self.pos, DIR_VECS[self.dir as usize]);
            if !self.inspected.contains_key(&adj) {
                let name = sess.inspect().await?.map(|b| b.name);
                self.inspected.insert(adj, name);
            }
            if is_ore_name(self.inspected.get(&adj)) && !self.mined.contains(&adj) {
                self.frontier.insert(adj);
            }
            self.turn_right_local(sess).await?;
        }

        let above = (self.pos.0, self.pos.1 + 1, self.pos.2);
        if !self.inspected.contains_key(&above) {
            let name = sess.inspect_up().await?.map(|b| b.name);
            self.inspected.insert(above, name);
        }
        if is_ore_name(self.inspected.get(&above)) && !self.mined.contains(&above) {
            self.frontier.insert(above);
        }

        let below = (self.pos.0, self.pos.1 - 1, self.pos.2);
        if !self.inspected.contains_key(&below) {
            let name = sess.inspect_down().await?.map(|b| b.name);
            self.inspected.insert(below, name);
        }
        if is_ore_name(self.inspected.get(&below)) && !self.mined.contains(&below) {
            self.frontier.insert(below);
        }
        Ok(())
    }

    /// Mined cells adjacent to `target`, with the delta and the heading
    /// index to face when digging horizontally (-1 for vertical).
    fn adjacent_mined(&self, target: Vec3) -> Vec<(Vec3, Vec3, i8)> {
        const CANDIDATES: [(Vec3, i8); 6] = [
            ((1, 0, 0), 0),
            ((0, 0, 1), 1),
            ((-1, 0, 0), 2),
            ((0, 0, -1), 3),
            ((0, 1, 0), -1),
            ((0, -1, 0), -1),
        ];
        let mut out = Vec::new();
        for (dv, face) in CANDIDATES {
            let adj = (target.0 - dv.0, target.1 - dv.1, target.2 - dv.2);
            if self.mined.contains(&adj) {
                out.push((adj, dv, face));
            }
        }
        out
    }

    async fn walk_path(&mut self, sess: &Session<'_>, path: &[Vec3]) -> Result<(), CommandError> {
        for step in path.iter().skip(1) {
            let dv = (step.0 - self.pos.0, step.1 - self.pos.1, step.2 - self.pos.2);
            if dv == (0, 1, 0) {
                self.step_up(sess).await?;
            } else if dv == (0, -1, 0) {
                self.step_down(sess).await?;
            } else {
                for (i, v) in DIR_VECS.iter().enumerate() {
                    if *v == dv {
                        self.face_dir(sess, i as u8).await?;
                        break;
                    }
                }
                self.step_forward(sess).await?;
            }
            self.actions += 1;
            if self.actions >= self.max_actions {
                break;
            }
        }
        Ok(())
    }
}

/// Flood-fill mine the connected vein of "ore"-named blocks around the
/// turtle. Pathfinds over already-mined cells to each newly discovered ore,
/// and finally returns to the starting cell and facing. Bounded by
/// `max_actions` moves-plus-digs.
pub async fn mine_ore_vein(sess: &Session<'_>, max_actions: usize) -> Result<(), CommandError> {
    let start_pos: Vec3 = (0, 0, 0);
    let start_dir: u8 = 0;
    let mut miner = VeinMiner {
        pos: start_pos,
        dir: start_dir,
        mined: HashSet::from([start_pos]),
        frontier: HashSet::new(),
        inspected: HashMap::new(),
        actions: 0,
        max_actions,
    };

    miner.refresh_frontier(sess).await?;

    while !miner.frontier.is_empty() && miner.actions < miner.max_actions {
        // Pick the frontier cell with the shortest walk over mined cells to
        // any of its mined neighbors. First found wins ties.
        let mut best: Option<(Vec<Vec3>, Vec3, Vec3, i8)> = None;
        for target in miner.frontier.iter().copied().collect::<Vec<_>>() {
            for (adj, dv, face) in miner.adjacent_mined(target) {
                if let Some(path) = bfs_path(&miner.mined, miner.pos, adj) {
                    if best.as_ref().map_or(true, |(b, _, _, _)| path.len() < b.len()) {
                        best = Some((path, target, dv, face));
                    }
                }
            }
        }
        let Some((path, target, delta, face)) = best else {
            info!(
                "Turtle {}: no reachable ore frontier; mined={} frontier={}",
                sess.id(),
                miner.mined.len(),
                miner.frontier.len()
            );
            break;
        };

        miner.walk_path(sess, &path).await?;
        if miner.actions >= miner.max_actions {
            break;
        }

        if face >= 0 {
            miner.face_dir(sess, face as u8).await?;
            sess.dig().await?;
            miner.step_forward(sess).await?;
        } else if delta == (0, 1, 0) {
            sess.dig_up().await?;
            miner.step_up(sess).await?;
        } else {
            sess.dig_down().await?;
            miner.step_down(sess).await?;
        }
        miner.mined.insert(miner.pos);
        miner.inspected.insert(miner.pos, None);
        miner.frontier.remove(&target);
        miner.actions += 1;

        miner.refresh_frontier(sess).await?;
    }

    // Walk home over the mined cells and restore the starting facing.
    if miner.pos != start_pos {
        if let Some(path) = bfs_path(&miner.mined, miner.pos, start_pos) {
            miner.walk_path(sess, &path).await?;
        }
    }
    miner.face_dir(sess, start_dir).await?;
    info!("Turtle {}: mine_ore_vein complete ({} actions)", sess.id(), miner.actions);
    Ok(())
}

// -- inventory maintenance ----------------------------------------------------

/// Empty slots in the last persisted inventory snapshot. Without a snapshot
/// every slot counts as empty, which keeps dump loops from thrashing.
pub async fn count_empty_slots(sess: &Session<'_>) -> i64 {
    let record = sess.record().await;
    match record.inventory.as_ref().and_then(Value::as_object) {
        Some(slots) => slots.values().filter(|v| v.is_null()).count() as i64,
        None => 16,
    }
}

fn find_coal_slot(inventory: Option<&Value>) -> Option<i64> {
    let slots = inventory?.as_object()?;
    for (key, item) in slots {
        if item.is_null() {
            continue;
        }
        if item.get("name").and_then(Value::as_str) == Some("minecraft:coal") {
            if let Ok(slot) = key.parse::<i64>() {
                return Some(slot);
            }
        }
    }
    None
}

/// Burn coal from the inventory until the tank is within [`FUEL_HEADROOM`]
/// of its limit, or no coal remains.
pub async fn refuel_if_possible(sess: &Session<'_>) -> Result<(), CommandError> {
    sess.get_inventory_details().await?;
    loop {
        let fuel = sess.get_fuel_level().await?.unwrap_or(0);
        let limit = sess.get_fuel_limit().await?.unwrap_or(0);
        if fuel + FUEL_HEADROOM >= limit {
            info!("Turtle {}: fuel level is sufficient", sess.id());
            return Ok(());
        }
        let record = sess.record().await;
        let Some(slot) = find_coal_slot(record.inventory.as_ref()) else {
            warn!("Turtle {}: no coal to burn, could be losing fuel over time", sess.id());
            return Ok(());
        };
        sess.select(slot).await?;
        if !sess.refuel(Some(REFUEL_BATCH)).await? {
            warn!("Turtle {}: refuel from slot {slot} failed", sess.id());
            return Ok(());
        }
        sess.get_inventory_details().await?;
    }
}

/// Place a chest one block to the left and drop everything into it except
/// the chest slot itself. Restores the original facing.
pub async fn dump_to_left_chest(sess: &Session<'_>, chest_slot: i64) -> Result<(), CommandError> {
    let chest_slot = chest_slot.clamp(1, 16);
    sess.select(chest_slot).await?;
    let count = sess.get_item_count(None).await?.unwrap_or(0);
    if count <= 0 {
        warn!("Turtle {}: no chests in slot {chest_slot}", sess.id());
        return Ok(());
    }

    info!("Turtle {}: dumping inventory to left chest", sess.id());
    sess.turn_left().await?;
    if sess.inspect().await?.is_some() {
        sess.dig().await?;
    }
    let placed = sess.place().await?;
    // Clear a column above so the chest stays accessible.
    sess.dig_up().await?;
    sess.up().await?;
    sess.dig().await?;
    sess.down().await?;

    if !placed {
        warn!("Turtle {}: failed to place chest", sess.id());
        sess.turn_right().await?;
        return Ok(());
    }

    for slot in 1..=16 {
        if slot == chest_slot {
            continue;
        }
        sess.select(slot).await?;
        sess.drop(None).await?;
    }
    sess.turn_right().await?;
    Ok(())
}

/// Dispatch a dump strategy by name. Unknown strategies fall back to the
/// left-chest dump.
pub(crate) async fn run_dump_strategy(
    sess: &Session<'_>,
    strategy: &str,
    chest_slot: i64,
) -> Result<(), CommandError> {
    if strategy != "dump_to_left_chest" {
        warn!("Turtle {}: unknown dump strategy '{strategy}', using left chest", sess.id());
    }
    dump_to_left_chest(sess, chest_slot).await
}

// -- named dispatch -----------------------------------------------------------

/// Run a single subroutine or primitive by name, for the `execute_command`
/// routine. Unknown names log and return.
pub async fn run_named(sess: &Session<'_>, name: &str) -> Result<(), CommandError> {
    match name {
        "forward" => {
            sess.forward().await?;
        }
        "back" => {
            sess.back().await?;
        }
        "up" => {
            sess.up().await?;
        }
        "down" => {
            sess.down().await?;
        }
        "turn_left" => {
            sess.turn_left().await?;
        }
        "turn_right" => {
            sess.turn_right().await?;
        }
        "dig" => {
            sess.dig().await?;
        }
        "dig_up" => {
            sess.dig_up().await?;
        }
        "dig_down" => {
            sess.dig_down().await?;
        }
        "place" => {
            sess.place().await?;
        }
        "place_up" => {
            sess.place_up().await?;
        }
        "place_down" => {
            sess.place_down().await?;
        }
        "suck" => {
            sess.suck().await?;
        }
        "suck_up" => {
            sess.suck_up().await?;
        }
        "suck_down" => {
            sess.suck_down().await?;
        }
        "drop" => {
            sess.drop(None).await?;
        }
        "get_location" => {
            sess.get_location().await?;
        }
        "get_inventory_details" => {
            sess.get_inventory_details().await?;
        }
        "force_dig_forward" => {
            force_dig_forward(sess).await?;
        }
        "mine_ore_vein" => mine_ore_vein(sess, DEFAULT_VEIN_ACTIONS).await?,
        "dump_to_left_chest" => dump_to_left_chest(sess, 1).await?,
        "refuel_if_possible" => refuel_if_possible(sess).await?,
        _ => {
            tracing::error!("Turtle {}: unknown subroutine '{name}'", sess.id());
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "subroutines_tests.rs"]
mod subroutines_tests;
