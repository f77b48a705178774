// src/observability/mod.rs
//! Logging and metrics setup
//!
//! Both initializers are meant to run once, early in `main`.

pub mod exporter;
pub mod logging;

pub use exporter::init_metrics;
pub use logging::init_tracing;
