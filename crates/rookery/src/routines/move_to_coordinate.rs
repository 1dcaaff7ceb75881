// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::routines::{subroutines, Routine, RoutineCtx};
use crate::store::Coords;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct TargetConfig {
    x: i64,
    y: i64,
    z: i64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self { x: 0, y: 70, z: 0 }
    }
}

/// Obstacle-aware travel to the target coordinates.
pub struct MoveToCoordinate;

#[async_trait]
impl Routine for MoveToCoordinate {
    fn name(&self) -> &'static str {
        "move_to_coordinate"
    }

    fn label(&self) -> &'static str {
        "Move To Coordinate"
    }

    fn description(&self) -> &'static str {
        "Move to target coordinates with obstacle-aware pathing"
    }

    fn config_template(&self) -> &'static str {
        "\
# The turtle lifts to a high corridor first to avoid terrain, crosses
# horizontally, then settles to the target altitude.
x: 0
y: 70
z: 0
"
    }

    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()> {
        let cfg: TargetConfig = ctx.parse_config();
        info!(
            "Turtle {}: moving to ({},{},{})",
            ctx.session.id(),
            cfg.x,
            cfg.y,
            cfg.z
        );
        subroutines::move_to_coordinate(ctx.session, Coords::new(cfg.x, cfg.y, cfg.z)).await?;
        Ok(())
    }
}
