// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routine registry.
//!
//! A routine is a named behavior that runs against one turtle under an
//! exclusive session. The registry is assembled once at startup and is
//! immutable afterwards; the scheduler resolves names against it.

pub mod auto_chunk_miner;
pub mod dig_to_coordinate;
pub mod execute_command;
pub mod mine_full_chunk;
pub mod move_to_coordinate;
pub mod set_label;
pub mod simple_dig;
pub mod simple_walk;
pub mod smart_mine_full;
pub mod subroutines;

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::agent::Session;

/// Everything a running routine gets to work with: the held session and the
/// parsed config payload (a mapping, or `Null` when none was given).
pub struct RoutineCtx<'a> {
    pub session: &'a Session<'a>,
    pub config: Value,
}

impl RoutineCtx<'_> {
    /// Deserialize the config into a typed struct, falling back to its
    /// defaults when the payload is missing or malformed.
    pub fn parse_config<T>(&self) -> T
    where
        T: DeserializeOwned + Default,
    {
        if self.config.is_null() {
            return T::default();
        }
        match serde_json::from_value(self.config.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    "Turtle {}: config not usable ({e}), falling back to defaults",
                    self.session.id()
                );
                T::default()
            }
        }
    }
}

/// A named orchestrator-side behavior runnable against one turtle.
#[async_trait]
pub trait Routine: Send + Sync {
    fn name(&self) -> &'static str;
    fn label(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// YAML template shown to operators as a starting point for the config.
    fn config_template(&self) -> &'static str;
    async fn run(&self, ctx: &RoutineCtx<'_>) -> anyhow::Result<()>;
}

/// Build the registry of all known routines, in presentation order.
pub fn registry() -> IndexMap<String, Arc<dyn Routine>> {
    let routines: Vec<Arc<dyn Routine>> = vec![
        Arc::new(dig_to_coordinate::DigToCoordinate),
        Arc::new(move_to_coordinate::MoveToCoordinate),
        Arc::new(execute_command::ExecuteCommand),
        Arc::new(set_label::SetLabel),
        Arc::new(mine_full_chunk::MineFullChunk),
        Arc::new(auto_chunk_miner::AutoChunkMiner),
        Arc::new(smart_mine_full::SmartMineFull),
        Arc::new(simple_dig::SimpleDig),
        Arc::new(simple_walk::SimpleWalk),
    ];
    routines.into_iter().map(|r| (r.name().to_owned(), r)).collect()
}
