// src/utils/config.rs
//! Engine configuration
//!
//! Sources are layered, later ones overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. `config/fleet.{toml,yaml,json}` (optional)
//! 3. The file named by `FLEET_CONFIG` (optional)
//! 4. Environment variables, e.g. `FLEET__MONITOR__INTERVAL_MS=1000`

use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub supervisor: SupervisorConfig,
    pub cache: CacheConfig,
    pub monitor: MonitorConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Worker process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Worker entry point, resolved on `PATH` when it is a bare name
    pub worker_program: String,

    /// Arguments passed to every worker
    pub worker_args: Vec<String>,

    /// Extra environment for every worker
    pub worker_env: HashMap<String, String>,

    /// How long `shutdown` waits for workers to exit before SIGKILL
    pub kill_grace_ms: u64,

    /// Capacity of the worker event broadcast channel
    pub event_buffer: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            worker_program: "fleet-worker".to_string(),
            worker_args: vec![],
            worker_env: HashMap::new(),
            kill_grace_ms: 5_000,
            event_buffer: 256,
        }
    }
}

impl SupervisorConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }
}

/// Runtime cache sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub token_capacity: u64,
    pub token_ttl_secs: u64,
    pub player_list_capacity: u64,
    pub player_list_ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            token_capacity: 500,
            token_ttl_secs: 300,
            player_list_capacity: 100,
            player_list_ttl_ms: 2_000,
        }
    }
}

impl CacheConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn player_list_ttl(&self) -> Duration {
        Duration::from_millis(self.player_list_ttl_ms)
    }
}

/// Resource monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Polling period
    pub interval_ms: u64,

    /// Start polling as soon as the controller starts
    pub autostart: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            autostart: true,
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Prometheus scrape endpoint
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9464".to_string(),
        }
    }
}

impl MetricsConfig {
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| EngineError::ConfigError(format!("invalid metrics.listen '{}': {}", self.listen, e)))
    }
}

impl EngineConfig {
    /// Load configuration from the default locations and the environment
    pub fn load() -> Result<Self> {
        let explicit = std::env::var("FLEET_CONFIG").ok();
        Self::load_with(explicit.as_deref().map(Path::new))
    }

    /// Load configuration, layering `path` over the default locations
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&EngineConfig::default())?)
            .add_source(File::with_name("config/fleet").required(false));

        if let Some(path) = path {
            debug!("Layering configuration file {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: EngineConfig = builder
            .add_source(
                Environment::with_prefix("FLEET")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make a component unusable
    pub fn validate(&self) -> Result<()> {
        if self.supervisor.worker_program.trim().is_empty() {
            return Err(EngineError::ConfigError("supervisor.worker_program cannot be empty".into()));
        }
        if self.supervisor.event_buffer == 0 {
            return Err(EngineError::ConfigError("supervisor.event_buffer cannot be 0".into()));
        }
        if self.cache.token_capacity == 0 || self.cache.player_list_capacity == 0 {
            return Err(EngineError::ConfigError("cache capacities cannot be 0".into()));
        }
        if self.cache.token_ttl_secs == 0 || self.cache.player_list_ttl_ms == 0 {
            return Err(EngineError::ConfigError("cache TTLs cannot be 0".into()));
        }
        if self.monitor.interval_ms == 0 {
            return Err(EngineError::ConfigError("monitor.interval_ms cannot be 0".into()));
        }
        if self.metrics.enabled {
            self.metrics.listen_addr()?;
        }
        Ok(())
    }
}
