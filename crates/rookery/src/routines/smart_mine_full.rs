// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rectangle miner built on vertical chutes.
//!
//! The rectangle is tiled with column anchors computed from diagonal offset
//! arithmetic; anchors landing just outside the rectangle are snapped one
//! block inward. Each anchor gets a chute, mined alternately top-down and
//! bottom-up, and at every level the turtle digs a pattern shaped by where
//! the anchor sits: a full cross inside the rectangle, a T along an edge, an
//! L in a corner, nothing for snapped points (their neighbors cover them).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::agent::Session;
use crate::error::CommandError;
use crate::routines::subroutines::{
    self, count_empty_slots, face_stored_heading, refuel_if_possible, run_dump_strategy,
};
use crate::routines::{Routine, RoutineCtx};
use crate::store::Coords;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct SmartConfig {
    corner_1: Vec<i64>,
    corner_2: Vec<i64>,
    start_y: i64,
    stop_y: i64,
    empty_slots_threshold: i64,
    chest_slot: i64,
    dump_strategy: String,
}

impl Default for SmartConfig {
    fn default() -> Self {
        Self {
            corner_1: vec![0, 0],
            corner_2: vec![15, 15],
            start_y: 50,
            stop_y: 20,
            empty_slots_threshold: 4,
            chest_slot: 1,
            dump_strategy: "dump_to_left_chest".to_owned(),
        }
    }
}

fn corner(v: &[i64]) -> (i64, i64) {
    (v.first().copied().unwrap_or(0), v.get(1).copied().unwrap_or(0))
}

// -- dig point tiling ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointClass {
    /// Snapped inward from just outside the rectangle; covered by neighbors.
    Moved,
    Corner,
    Edge,
    Inside,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDir {
    None,
    Top,
    Right,
    Bottom,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerDir {
    None,
    BottomLeft,
    TopLeft,
    TopRight,
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigPoint {
    pub x: i64,
    pub z: i64,
    pub class: PointClass,
    pub edge: EdgeDir,
    pub corner: CornerDir,
}

/// Tile a `width` x `height` rectangle anchored at (`start_x`, `start_z`)
/// with chute anchor points.
///
/// Candidates start on the diagonals `(-i, 3i)` and advance by `(2, -1)`;
/// everything inside the rectangle expanded by one block survives. Points on
/// the one-block rim are snapped inward and marked [`PointClass::Moved`];
/// the rest are classified by where they sit so the chute knows which dig
/// pattern covers the remaining blocks.
pub fn dig_points(start_x: i64, start_z: i64, width: i64, height: i64) -> Vec<DigPoint> {
    let span = width + height;
    let mut candidates = Vec::new();
    for i in 0..span {
        for k in 0..span {
            candidates.push((-i + 2 * k, 3 * i - k));
        }
    }

    let mut out = Vec::new();
    for (px, pz) in candidates {
        if px < -1 || px > width || pz < -1 || pz > height {
            continue;
        }
        let (x, z, class, edge, corner) = if px < 0 {
            (px + 1, pz, PointClass::Moved, EdgeDir::Left, CornerDir::None)
        } else if pz < 0 {
            (px, pz + 1, PointClass::Moved, EdgeDir::Bottom, CornerDir::None)
        } else if px > width - 1 {
            (px - 1, pz, PointClass::Moved, EdgeDir::Right, CornerDir::None)
        } else if pz > height - 1 {
            (px, pz - 1, PointClass::Moved, EdgeDir::Top, CornerDir::None)
        } else {
            let on_x_edge = px == 0 || px == width - 1;
            let on_z_edge = pz == 0 || pz == height - 1;
            if on_x_edge && on_z_edge {
                let corner = match (px == 0, pz == 0) {
                    (true, true) => CornerDir::BottomLeft,
                    (true, false) => CornerDir::TopLeft,
                    (false, false) => CornerDir::TopRight,
                    (false, true) => CornerDir::BottomRight,
                };
                (px, pz, PointClass::Corner, EdgeDir::None, corner)
            } else if on_x_edge {
                let edge = if px == 0 { EdgeDir::Left } else { EdgeDir::Right };
                (px, pz, PointClass::Edge, edge, CornerDir::None)
            } else if on_z_edge {
                let edge = if pz == 0 { EdgeDir::Bottom } else { EdgeDir::Top };
                (px, pz, PointClass::Edge, edge, CornerDir::None)
            } else {
                (px, pz, PointClass::Inside, EdgeDir::None, CornerDir::None)
            }
        };
        out.push(DigPoint { x: x + start_x, z: z + start_z, class, edge, corner });
    }
    out
}

// -- chute mining -------------------------------------------------------------

/// Dig the per-level pattern for this anchor. The turtle must be facing
/// east (heading 0) on entry; every pattern restores that facing.
async fn dig_pattern(sess: &Session<'_>, point: &DigPoint) -> Result<(), CommandError> {
    match point.class {
        PointClass::Moved => Ok(()),
        PointClass::Inside => {
            // Full cross.
            sess.dig().await?;
            sess.turn_left().await?;
            sess.dig().await?;
            sess.turn_left().await?;
            sess.dig().await?;
            sess.turn_left().await?;
            sess.dig().await?;
            sess.turn_left().await?;
            Ok(())
        }
        PointClass::Edge => match point.edge {
            EdgeDir::Right => {
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                Ok(())
            }
            EdgeDir::Top => {
                sess.dig().await?;
                sess.turn_left().await?;
                sess.dig().await?;
                sess.turn_left().await?;
                sess.dig().await?;
                sess.turn_left().await?;
                sess.turn_left().await?;
                Ok(())
            }
            EdgeDir::Left => {
                sess.turn_left().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_left().await?;
                Ok(())
            }
            EdgeDir::Bottom => {
                sess.dig().await?;
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                sess.turn_right().await?;
                Ok(())
            }
            EdgeDir::None => Ok(()),
        },
        PointClass::Corner => match point.corner {
            CornerDir::BottomLeft => {
                sess.dig().await?;
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_left().await?;
                Ok(())
            }
            CornerDir::BottomRight => {
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                sess.dig().await?;
                sess.turn_left().await?;
                sess.turn_left().await?;
                Ok(())
            }
            CornerDir::TopRight => {
                sess.turn_left().await?;
                sess.dig().await?;
                sess.turn_left().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                sess.turn_right().await?;
                Ok(())
            }
            CornerDir::TopLeft => {
                sess.dig().await?;
                sess.turn_left().await?;
                sess.dig().await?;
                sess.turn_right().await?;
                Ok(())
            }
            CornerDir::None => Ok(()),
        },
    }
}

async fn checks_and_breaks(sess: &Session<'_>, cfg: &SmartConfig) -> Result<(), CommandError> {
    refuel_if_possible(sess).await?;
    if count_empty_slots(sess).await <= cfg.empty_slots_threshold {
        info!("Turtle {}: inventory low on space, dumping", sess.id());
        run_dump_strategy(sess, &cfg.dump_strategy, cfg.chest_slot).await?;
    }
    Ok(())
}

async fn dig_chute(
    sess: &Session<'_>,
    top_down: bool,
    point: &DigPoint,
    cfg: &SmartConfig,
) -> Result<(), CommandError> {
    face_stored_heading(sess, 0).await?;
    let levels = (cfg.start_y - cfg.stop_y).max(0);
    for _ in 0..levels {
        dig_pattern(sess, point).await?;
        checks_and_breaks(sess, cfg).await?;
        if top_down {
            sess.dig_down().await?;
            sess.down().await?;
        } else {
            sess.dig_up().await?;
            sess.up().await?;
        }
    }
    dig_pattern(sess, point).await?;
    checks_and_breaks(sess, cfg).await?;
    Ok(())
}

/// Mine a rectangle given by two corners, chute by chute.
pub struct SmartMineFull;

#[async_trait]
impl Routine for SmartMineFull {
    fn name(&self) -> &'static str {
        "smart_mine_full"
    }

    fn label(&self) -> &'static str {
        "Smart Full Miner"
    }

    fn description(&self) -> &'static str {
        "Mine a rectangle between two corners with patterned vertical chutes"
    }

    fn config_template(&self) -> &'static str {
        "\
# Rectangle mining configuration.
corner_1: [296, 9]    # (x, z) of one corner of the area to mine
corner_2: [315, -11]  # (x, z) of the opposite corner
start_y: 63
stop_y: -20
empty_slots_threshold: 4
chest_slot: 1
dump_strategy: dump_to_left_chest
"
    }

    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()> {
        let cfg: SmartConfig = ctx.parse_config();
        let sess = ctx.session;

        let c1 = corner(&cfg.corner_1);
        let c2 = corner(&cfg.corner_2);
        let bottom_left = (c1.0.min(c2.0), c1.1.min(c2.1));
        let top_right = (c1.0.max(c2.0), c1.1.max(c2.1));
        let width = top_right.0 - bottom_left.0 + 1;
        let height = top_right.1 - bottom_left.1 + 1;

        let points = dig_points(bottom_left.0, bottom_left.1, width, height);
        info!(
            "Turtle {}: smart miner from y={} to y={} over ({},{})..({},{}); {} chutes",
            sess.id(),
            cfg.start_y,
            cfg.stop_y,
            bottom_left.0,
            bottom_left.1,
            top_right.0,
            top_right.1,
            points.len()
        );

        sess.get_location().await?;
        subroutines::dig_to_coordinate(
            sess,
            Coords::new(bottom_left.0, cfg.start_y, bottom_left.1),
        )
        .await?;

        let mut top_down = true;
        for (i, point) in points.iter().enumerate() {
            let entry_y = if top_down { cfg.start_y } else { cfg.stop_y };
            info!(
                "Turtle {}: chute {}/{} at ({},{},{})",
                sess.id(),
                i + 1,
                points.len(),
                point.x,
                entry_y,
                point.z
            );
            subroutines::dig_to_coordinate(sess, Coords::new(point.x, entry_y, point.z)).await?;
            dig_chute(sess, top_down, point, &cfg).await?;
            top_down = !top_down;
        }

        info!("Turtle {}: smart miner completed", sess.id());
        Ok(())
    }
}

#[cfg(test)]
#[path = "smart_mine_full_tests.rs"]
mod smart_mine_full_tests;
