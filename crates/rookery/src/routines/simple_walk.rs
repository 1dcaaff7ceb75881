// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::routines::{Routine, RoutineCtx};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct WalkConfig {
    steps: i64,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self { steps: 100 }
    }
}

/// Walking and turning pattern, useful for smoke-testing movement.
pub struct SimpleWalk;

#[async_trait]
impl Routine for SimpleWalk {
    fn name(&self) -> &'static str {
        "simple_walk"
    }

    fn label(&self) -> &'static str {
        "Simple Walk"
    }

    fn description(&self) -> &'static str {
        "Simple walking and turning pattern"
    }

    fn config_template(&self) -> &'static str {
        "\
steps: 100
"
    }

    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()> {
        let cfg: WalkConfig = ctx.parse_config();
        let sess = ctx.session;
        info!("Turtle {}: simple walk for {} steps", sess.id(), cfg.steps);

        for _ in 0..cfg.steps.max(0) {
            sess.forward().await?;
            sess.forward().await?;
            sess.up().await?;
            sess.turn_left().await?;
            sess.down().await?;

            match sess.get_fuel_level().await? {
                Some(fuel) => info!("Turtle {}: fuel level {fuel}", sess.id()),
                None => warn!("Turtle {}: failed to read fuel level", sess.id()),
            }
        }
        Ok(())
    }
}
