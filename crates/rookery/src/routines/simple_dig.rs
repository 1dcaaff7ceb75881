// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};

use crate::routines::{Routine, RoutineCtx};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct DigConfig {
    iterations: i64,
}

impl Default for DigConfig {
    fn default() -> Self {
        Self { iterations: 100 }
    }
}

/// Dig-and-place burn-in pattern, useful for exercising a fresh turtle.
pub struct SimpleDig;

#[async_trait]
impl Routine for SimpleDig {
    fn name(&self) -> &'static str {
        "simple_dig"
    }

    fn label(&self) -> &'static str {
        "Simple Dig"
    }

    fn description(&self) -> &'static str {
        "Simple dig and place pattern"
    }

    fn config_template(&self) -> &'static str {
        "\
iterations: 100
"
    }

    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()> {
        let cfg: DigConfig = ctx.parse_config();
        let sess = ctx.session;
        info!("Turtle {}: simple dig for {} iterations", sess.id(), cfg.iterations);

        for _ in 0..cfg.iterations.max(0) {
            sess.select(1).await?;
            sess.dig().await?;
            sess.forward().await?;
            sess.turn_right().await?;
            sess.turn_right().await?;
            sess.place().await?;
            sess.turn_right().await?;
            sess.turn_right().await?;

            sess.dig().await?;
            sess.forward().await?;
            sess.turn_right().await?;
            sess.turn_right().await?;
            sess.place().await?;
            sess.turn_right().await?;
            sess.turn_right().await?;

            sess.turn_left().await?;

            match sess.get_fuel_level().await? {
                Some(fuel) => info!("Turtle {}: fuel level {fuel}", sess.id()),
                None => warn!("Turtle {}: failed to read fuel level", sess.id()),
            }
        }
        Ok(())
    }
}
