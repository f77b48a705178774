// src/observability/exporter.rs
//! Prometheus exporter for the `metrics` facade
//!
//! Metric names:
//!
//! - `fleet_workers_spawned_total`, `fleet_workers_exited_total`
//! - `fleet_worker_messages_sent_total`, `fleet_worker_messages_dropped_total`
//! - `fleet_pending_requests_resolved_total{table}`
//! - `fleet_probe_failures_total`, `fleet_probe_duration_seconds`
//! - `fleet_agent_cpu_percent{agent_id}`, `fleet_agent_memory_megabytes{agent_id}`
//! - `fleet_plugin_ui_topics`, `fleet_bot_config_loads_total`
//!
//! Without an installed recorder the macros are no-ops.

use crate::utils::config::MetricsConfig;
use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

/// Install the exporter's HTTP listener when metrics are enabled.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr = config.listen_addr()?;
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::RuntimeError(format!("failed to install metrics exporter: {}", e)))?;

    info!("Prometheus metrics listening on {}", addr);
    Ok(())
}
