// src/observability/logging.rs
//! Tracing subscriber installation

use crate::utils::config::LoggingConfig;
use crate::utils::errors::{EngineError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter from `RUST_LOG` when set, otherwise from the configured level
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| EngineError::ConfigError(format!("invalid log level '{}': {}", config.level, e))),
    }
}

/// Install the global subscriber, human-readable or JSON lines
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    installed.map_err(|e| EngineError::RuntimeError(format!("tracing already initialized: {}", e)))
}
