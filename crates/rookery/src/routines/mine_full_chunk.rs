// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Systematic mining of the turtle's current 16x16 chunk: zig-zag rows per
//! layer, stepping down between layers, dumping and refueling under
//! inventory pressure.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::agent::Session;
use crate::error::CommandError;
use crate::routines::subroutines::{
    self, chunk_origin, count_empty_slots, face_stored_heading, refuel_if_possible,
    run_dump_strategy, step_dig_forward,
};
use crate::routines::{Routine, RoutineCtx};
use crate::store::Coords;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ChunkConfig {
    start_y: i64,
    stop_y: i64,
    empty_slots_threshold: i64,
    chest_slot: i64,
    dump_strategy: String,
    row_spacing: i64,
    layer_step: i64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            start_y: 50,
            stop_y: 20,
            empty_slots_threshold: 4,
            chest_slot: 1,
            dump_strategy: "dump_to_left_chest".to_owned(),
            row_spacing: 1,
            layer_step: 1,
        }
    }
}

/// Mine the full chunk the turtle is standing in.
pub struct MineFullChunk;

#[async_trait]
impl Routine for MineFullChunk {
    fn name(&self) -> &'static str {
        "mine_full_chunk"
    }

    fn label(&self) -> &'static str {
        "Full Chunk Miner"
    }

    fn description(&self) -> &'static str {
        "Systematically mine the current 16x16 chunk, layer by layer"
    }

    fn config_template(&self) -> &'static str {
        "\
# Chunk mining configuration.
start_y: 50
stop_y: 20
empty_slots_threshold: 4
chest_slot: 1
dump_strategy: dump_to_left_chest
row_spacing: 1
layer_step: 1
"
    }

    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()> {
        let cfg: ChunkConfig = ctx.parse_config();
        let sess = ctx.session;

        let record = sess.record().await;
        let here = record.coords.unwrap_or_default();
        let (cx, cz) = chunk_origin(here.x, here.z);
        let (se_x, se_z) = (cx + 15, cz + 15);
        let layer_step = cfg.layer_step.max(1);

        info!(
            "Turtle {}: chunk miner start; chunk x:[{cx}..{se_x}] z:[{cz}..{se_z}] y:{}..{}",
            sess.id(),
            cfg.start_y,
            cfg.stop_y
        );

        let mut y = cfg.start_y;
        while y >= cfg.stop_y {
            info!("Turtle {}: mining layer {y}", sess.id());
            // Re-anchor at the south-east corner of this layer, facing north.
            subroutines::dig_to_coordinate(sess, Coords::new(se_x, y, se_z)).await?;
            face_stored_heading(sess, 3).await?;
            mine_layer(sess, &cfg).await?;

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

        info!("Turtle {}: chunk miner completed", sess.id());
        Ok(())
    }
}

/// Zig-zag one 16x16 layer: rows run along Z from the south-east corner,
/// shifted west by `row_spacing` between passes.
async fn mine_layer(sess: &Session<'_>, cfg: &ChunkConfig) -> Result<(), CommandError> {
    let spacing = cfg.row_spacing.max(1);
    let mut northward = true;
    let mut col: i64 = 0;
    loop {
        for _ in 0..15 {
            if !step_dig_forward(sess).await? {
                break;
            }
        }
        relieve_inventory_pressure(sess, cfg).await?;

        col += spacing;
        if col >= 16 {
            break;
        }

        // Shift one row west and turn around.
        if northward {
            sess.turn_left().await?;
        } else {
            sess.turn_right().await?;
        }
        for _ in 0..spacing {
            step_dig_forward(sess).await?;
        }
        if northward {
            sess.turn_left().await?;
        } else {
            sess.turn_right().await?;
        }
        northward = !northward;
    }
    Ok(())
}

async fn relieve_inventory_pressure(
    sess: &Session<'_>,
    cfg: &ChunkConfig,
) -> Result<(), CommandError> {
    sess.get_inventory_details().await?;
    if count_empty_slots(sess).await <= cfg.empty_slots_threshold {
        refuel_if_possible(sess).await?;
        info!("Turtle {}: inventory low on space, dumping", sess.id());
        run_dump_strategy(sess, &cfg.dump_strategy, cfg.chest_slot).await?;
    }
    Ok(())
}
