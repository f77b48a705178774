// src/monitor/mod.rs
//! Resource monitoring for agent workers
//!
//! The monitor polls the supervisor's registry on a fixed interval and
//! attributes CPU and memory usage back to agent ids.

pub mod probe;
pub mod resource_monitor;

pub use probe::{ProcessProbe, ProcessStat, SysinfoProbe};
pub use resource_monitor::{bytes_to_megabytes, round_to_tenth, ResourceMonitor, ResourceSnapshot};
