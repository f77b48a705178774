// src/utils/errors.rs
//! Engine error type
//!
//! "Not found" conditions (unknown agent, topic or correlation id) are never
//! errors: they surface as `false`, `None` or a silent no-op at the call site.

use thiserror::Error;

/// Errors raised by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The OS refused to create a worker process
    #[error("failed to spawn worker process: {0}")]
    ProcessSpawnFailed(String),

    #[error("runtime error: {0}")]
    RuntimeError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The bot configuration cache was used without its data providers.
    /// This is a wiring defect and must not be retried.
    #[error("bot configuration cache is missing its {0} provider")]
    CacheNotConfigured(&'static str),

    #[error("configuration provider failed: {0}")]
    ProviderFailed(String),

    #[error("resource probe failed: {0}")]
    ProbeFailed(String),

    /// A worker reported a failure for a specific request
    #[error("{0}")]
    RequestRejected(String),

    #[error("request timed out")]
    RequestTimeout,

    /// The pending entry was dropped without being settled
    #[error("request cancelled")]
    RequestCancelled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(err.to_string())
    }
}

/// Engine result alias
pub type Result<T> = std::result::Result<T, EngineError>;
