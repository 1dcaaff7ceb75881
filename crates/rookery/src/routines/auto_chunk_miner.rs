// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Strip miner over a rectangle of chunks with opportunistic vein mining:
//! snake along spaced tunnels per layer, scan the neighbors of every mined
//! cell for ore, and flood-fill any vein found before resuming the strip.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::agent::Session;
use crate::commands::BlockInfo;
use crate::error::CommandError;
use crate::routines::subroutines::{
    self, chunk_origin, count_empty_slots, face_stored_heading, mine_ore_vein,
    refuel_if_possible, run_dump_strategy, DEFAULT_VEIN_ACTIONS,
};
use crate::routines::{Routine, RoutineCtx};
use crate::store::Coords;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct AutoChunkConfig {
    start_y: i64,
    stop_y: i64,
    empty_slots_threshold: i64,
    chest_slot: i64,
    dump_strategy: String,
    chunks_x: i64,
    chunks_z: i64,
    tunnel_spacing: i64,
    layer_step: i64,
}

impl Default for AutoChunkConfig {
    fn default() -> Self {
        Self {
            start_y: 50,
            stop_y: 20,
            empty_slots_threshold: 4,
            chest_slot: 1,
            dump_strategy: "dump_to_left_chest".to_owned(),
            chunks_x: 1,
            chunks_z: 1,
            tunnel_spacing: 3,
            layer_step: 3,
        }
    }
}

/// Strip-mine a rectangle of chunks, chasing ore veins as they appear.
pub struct AutoChunkMiner;

#[async_trait]
impl Routine for AutoChunkMiner {
    fn name(&self) -> &'static str {
        "auto_chunk_miner"
    }

    fn label(&self) -> &'static str {
        "Auto Chunk Miner"
    }

    fn description(&self) -> &'static str {
        "Strip-mine chunks in spaced tunnels per layer, flood-filling ore veins on sight"
    }

    fn config_template(&self) -> &'static str {
        "\
# Auto chunk mining configuration.
start_y: 50
stop_y: 20
empty_slots_threshold: 4
chest_slot: 1
dump_strategy: dump_to_left_chest
chunks_x: 1
chunks_z: 1
tunnel_spacing: 3
layer_step: 3
"
    }

    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()> {
        let cfg: AutoChunkConfig = ctx.parse_config();
        let sess = ctx.session;

        let record = sess.record().await;
        let here = record.coords.unwrap_or_default();
        let (cx, cz) = chunk_origin(here.x, here.z);
        let width = 16 * cfg.chunks_x.max(1);
        let depth = 16 * cfg.chunks_z.max(1);
        let (se_x, se_z) = (cx + width - 1, cz + depth - 1);
        let tunnel_spacing = cfg.tunnel_spacing.max(1);
        let layer_step = cfg.layer_step.max(1);

        info!(
            "Turtle {}: auto chunk miner start at ({},{},{}); area x:[{cx}..{se_x}] z:[{cz}..{se_z}]",
            sess.id(),
            here.x,
            here.y,
            here.z,
        );

        // Anchor at the south-east corner, then run north-facing tunnels
        // spaced across X, layer by layer.
        subroutines::dig_to_coordinate(sess, Coords::new(se_x, cfg.start_y, se_z)).await?;

        let mut y = cfg.start_y;
        while y >= cfg.stop_y {
            info!("Turtle {}: mining layer {y}", sess.id());

            let mut strip_x = se_x;
            while strip_x >= cx {
                subroutines::dig_to_coordinate(sess, Coords::new(strip_x, y, se_z)).await?;
                face_stored_heading(sess, 3).await?;

                for _ in 0..(depth - 1).max(0) {
                    if sess.inspect().await?.is_some() {
                        sess.dig().await?;
                    }
                    if !sess.forward().await? {
                        break;
                    }
                    scan_and_maybe_mine(sess, &cfg).await?;
                    if sess.inspect_up().await?.is_some() {
                        sess.dig_up().await?;
                    }
                }

                sess.get_inventory_details().await?;
                if count_empty_slots(sess).await <= cfg.empty_slots_threshold {
                    run_dump_strategy(sess, &cfg.dump_strategy, cfg.chest_slot).await?;
                }
                refuel_if_possible(sess).await?;

                strip_x -= tunnel_spacing;
            }

            for _ in 0..layer_step {
                if sess.inspect_down().await?.is_some() {
                    sess.dig_down().await?;
                }
                if !sess.down().await? {
                    break;
                }
            }
            y -= layer_step;
        }

        info!("Turtle {}: auto chunk miner completed down to layer {y}", sess.id());
        Ok(())
    }
}

/// Inspect ahead, above, below, left, and right; a sighted ore triggers a
/// vein flood-fill followed by inventory maintenance.
async fn scan_and_maybe_mine(sess: &Session<'_>, cfg: &AutoChunkConfig) -> Result<(), CommandError> {
    debug!("Turtle {}: scanning for ores", sess.id());

    let ahead = sess.inspect().await?;
    if check_and_trigger(sess, cfg, ahead).await? {
        return Ok(());
    }
    let above = sess.inspect_up().await?;
    if check_and_trigger(sess, cfg, above).await? {
        return Ok(());
    }
    let below = sess.inspect_down().await?;
    if check_and_trigger(sess, cfg, below).await? {
        return Ok(());
    }

    sess.turn_left().await?;
    let left = sess.inspect().await?;
    let left_found = check_and_trigger(sess, cfg, left).await?;
    sess.turn_right().await?;
    if left_found {
        return Ok(());
    }

    sess.turn_right().await?;
    let right = sess.inspect().await?;
    check_and_trigger(sess, cfg, right).await?;
    sess.turn_left().await?;
    Ok(())
}

async fn check_and_trigger(
    sess: &Session<'_>,
    cfg: &AutoChunkConfig,
    block: Option<BlockInfo>,
) -> Result<bool, CommandError> {
    let Some(block) = block else {
        return Ok(false);
    };
    if !block.is_ore() {
        return Ok(false);
    }
    info!("Turtle {}: ore detected ({}), triggering vein mining", sess.id(), block.name);
    mine_ore_vein(sess, DEFAULT_VEIN_ACTIONS).await?;
    sess.get_inventory_details().await?;
    refuel_if_possible(sess).await?;
    if count_empty_slots(sess).await <= cfg.empty_slots_threshold {
        run_dump_strategy(sess, &cfg.dump_strategy, cfg.chest_slot).await?;
    }
    Ok(true)
}
