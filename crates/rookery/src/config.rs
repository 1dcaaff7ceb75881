// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

/// Configuration for the rookery orchestrator.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "rookery", version, about = "Fleet orchestrator for turtle agents.")]
pub struct Config {
    /// Host to bind on.
    #[arg(long, default_value = "0.0.0.0", env = "ROOKERY_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8000, env = "ROOKERY_PORT")]
    pub port: u16,

    /// Directory for the persistent state database.
    #[arg(long, default_value = "data", env = "ROOKERY_DATA_DIR")]
    pub data_dir: PathBuf,
}

impl Config {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("turtles.db")
    }
}
