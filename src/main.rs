// src/main.rs
//! Fleet Engine daemon
//!
//! Supervises agent worker processes, monitors their resource usage and
//! serves runtime caches until interrupted.

use anyhow::{Context, Result};
use fleet_engine::observability::{init_metrics, init_tracing};
use fleet_engine::utils::config::EngineConfig;
use fleet_engine::{BuildInfo, FleetController, SysinfoProbe};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = EngineConfig::load().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.logging)?;
    init_metrics(&config.metrics)?;

    let build = BuildInfo::current();
    info!(
        "Starting Fleet Engine v{} ({}, built {} with {})",
        build.version, build.git_hash, build.build_timestamp, build.rustc_version
    );
    info!("Configuration loaded: {:?}", config);

    let controller = FleetController::new(config, Arc::new(SysinfoProbe::new()), None);
    controller.start();

    tokio::signal::ctrl_c()
        .await
        .context("failed to install CTRL+C signal handler")?;
    info!("Received shutdown signal, cleaning up...");

    controller.shutdown().await;
    info!("Fleet Engine stopped");
    Ok(())
}
