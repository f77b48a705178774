// src/lib.rs
//! Fleet Engine Library
//!
//! Process orchestration and runtime caching for a fleet of agent workers.
//!
//! # Architecture
//!
//! - **runtime**: Worker processes, message channel, request correlation,
//!   plugin UI fan-out
//! - **cache**: Tokens, player lists and per-agent bot configuration
//! - **monitor**: Periodic CPU/memory attribution per agent
//! - **controller**: Owner of one instance of each of the above
//! - **observability**: Tracing subscriber and Prometheus exporter
//! - **utils**: Configuration and errors

// Public module exports
pub mod cache;
pub mod controller;
pub mod monitor;
pub mod observability;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use cache::RuntimeCache;
pub use controller::{FleetController, Providers};
pub use monitor::{ResourceMonitor, ResourceSnapshot, SysinfoProbe};
pub use runtime::{AgentConfig, AgentId, ControllerMessage, ProcessSupervisor, Subscriber, WorkerEvent, WorkerMessage};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Engine build information
pub struct BuildInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: VERSION,
            git_hash: GIT_HASH,
            build_timestamp: env!("BUILD_TIMESTAMP"),
            rustc_version: env!("RUSTC_VERSION"),
        }
    }
}
