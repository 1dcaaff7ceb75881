// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::routines::{subroutines, Routine, RoutineCtx};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ExecuteConfig {
    subroutine: String,
}

/// Run a single named subroutine once.
pub struct ExecuteCommand;

#[async_trait]
impl Routine for ExecuteCommand {
    fn name(&self) -> &'static str {
        "execute_command"
    }

    fn label(&self) -> &'static str {
        "Execute Command"
    }

    fn description(&self) -> &'static str {
        "Execute a single subroutine by name"
    }

    fn config_template(&self) -> &'static str {
        "\
# Execute a single subroutine.
subroutine: forward

# Examples: forward, turn_left, dig, mine_ore_vein, dump_to_left_chest,
# refuel_if_possible
"
    }

    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()> {
        let cfg: ExecuteConfig = ctx.parse_config();
        if cfg.subroutine.is_empty() {
            error!("Turtle {}: execute_command missing 'subroutine' parameter", ctx.session.id());
            return Ok(());
        }
        info!("Turtle {}: executing subroutine '{}'", ctx.session.id(), cfg.subroutine);
        subroutines::run_named(ctx.session, &cfg.subroutine).await?;
        Ok(())
    }
}
