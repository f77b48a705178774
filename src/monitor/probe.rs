// src/monitor/probe.rs
//! Point-in-time process metrics probes
//!
//! A probe measures a whole batch of PIDs in one call. PIDs it cannot
//! measure are left out of the result; a failure rejects the whole batch.

use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::trace;

/// Raw measurement of one process
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessStat {
    /// CPU usage in percent of one core
    pub cpu: f64,

    /// Resident memory in bytes
    pub memory: u64,
}

/// Batch process metrics source
#[async_trait]
pub trait ProcessProbe: Send + Sync {
    async fn sample(&self, pids: &[u32]) -> Result<HashMap<u32, ProcessStat>>;
}

/// Probe backed by `sysinfo`
///
/// One `System` is kept across calls so CPU usage is measured over the
/// interval between two samples. The first sample of a process reports 0%.
pub struct SysinfoProbe {
    system: Arc<Mutex<System>>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessProbe for SysinfoProbe {
    async fn sample(&self, pids: &[u32]) -> Result<HashMap<u32, ProcessStat>> {
        let system = Arc::clone(&self.system);
        let pids = pids.to_vec();

        tokio::task::spawn_blocking(move || {
            let targets: Vec<Pid> = pids.iter().map(|pid| Pid::from_u32(*pid)).collect();
            let mut system = system.lock();
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&targets),
                true,
                ProcessRefreshKind::new().with_cpu().with_memory(),
            );

            let stats: HashMap<u32, ProcessStat> = pids
                .iter()
                .filter_map(|pid| {
                    system.process(Pid::from_u32(*pid)).map(|process| {
                        (
                            *pid,
                            ProcessStat {
                                cpu: process.cpu_usage() as f64,
                                memory: process.memory(),
                            },
                        )
                    })
                })
                .collect();

            trace!("Sampled {}/{} processes", stats.len(), pids.len());
            stats
        })
        .await
        .map_err(|e| EngineError::ProbeFailed(format!("sampling task failed: {}", e)))
    }
}
