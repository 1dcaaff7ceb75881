// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{error, info};

use crate::routines::{Routine, RoutineCtx};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct LabelConfig {
    name: String,
}

/// Set the turtle's label.
pub struct SetLabel;

#[async_trait]
impl Routine for SetLabel {
    fn name(&self) -> &'static str {
        "set_label"
    }

    fn label(&self) -> &'static str {
        "Set Label"
    }

    fn description(&self) -> &'static str {
        "Set the turtle's label (name tag)"
    }

    fn config_template(&self) -> &'static str {
        "\
# Set the turtle's label (name tag).
name: \"My Turtle\"
"
    }

    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()> {
        let cfg: LabelConfig = ctx.parse_config();
        if cfg.name.is_empty() {
            error!("Turtle {}: set_label missing 'name' parameter", ctx.session.id());
            return Ok(());
        }
        ctx.session.set_label(&cfg.name).await?;
        info!("Turtle {}: label set to '{}'", ctx.session.id(), cfg.name);
        Ok(())
    }
}
