// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rookery::config::Config;
use rookery::events::BusLogLayer;

#[tokio::main]
async fn main() {
    let config = Config::parse();

    let (bus_layer, log_rx) = BusLogLayer::new();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(bus_layer)
        .init();

    if let Err(e) = rookery::run(config, log_rx).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
