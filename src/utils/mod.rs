// src/utils/mod.rs
//! Common utilities shared by every engine component
//!
//! - **config**: Layered engine configuration (defaults, files, environment)
//! - **errors**: Engine error type and `Result` alias

pub mod config;
pub mod errors;

pub use config::EngineConfig;
pub use errors::{EngineError, Result};
