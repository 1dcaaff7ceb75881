// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use serde::Deserialize;

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

/// Dig a straight tunnel to the target coordinates.
pub struct DigToCoordinate;

#[async_trait]
impl Routine for DigToCoordinate {
    fn name(&self) -> &'static str {
        "dig_to_coordinate"
    }

    fn label(&self) -> &'static str {
        "Dig To Coordinate"
    }

    fn description(&self) -> &'static str {
        "Dig a straight path to target coordinates (X, then Z, then Y)"
    }

    fn config_template(&self) -> &'static str {
        "\
# Target coordinates; the turtle digs through anything in the way,
# moving along X first, then Z, then Y.
x: 0
y: 70
z: 0
"
    }

    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()> {
        let cfg: TargetConfig = ctx.parse_config();
        subroutines::dig_to_coordinate(ctx.session, Coords::new(cfg.x, cfg.y, cfg.z)).await?;
        Ok(())
    }
}
