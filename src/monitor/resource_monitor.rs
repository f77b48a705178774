// src/monitor/resource_monitor.rs
//! Periodic CPU/memory attribution for agent workers
//!
//! Each cycle runs strictly in this order:
//!
//! 1. read the supervisor's registry
//! 2. probe all collected PIDs in one batch
//! 3. map every measured PID back to its agent through the registry
//!
//! A worker removed between steps 1 and 3 is skipped at step 3.

use crate::monitor::probe::ProcessProbe;
use crate::runtime::protocol::AgentId;
use crate::runtime::supervisor::ProcessSupervisor;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

const BYTES_PER_MEGABYTE: f64 = 1024.0 * 1024.0;

/// Latest resource measurement of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSnapshot {
    pub agent_id: AgentId,

    /// Rounded to one decimal place
    pub cpu_percent: f64,

    /// Rounded to one decimal place
    pub memory_megabytes: f64,

    pub measured_at: DateTime<Utc>,
}

/// Round to one decimal place
pub fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn bytes_to_megabytes(bytes: u64) -> f64 {
    round_to_tenth(bytes as f64 / BYTES_PER_MEGABYTE)
}

/// State shared between the monitor handles and the polling task
struct MonitorCore {
    supervisor: ProcessSupervisor,
    probe: Arc<dyn ProcessProbe>,
    snapshots: DashMap<AgentId, ResourceSnapshot>,
}

impl MonitorCore {
    async fn update_all(&self) -> Vec<ResourceSnapshot> {
        let processes = self.supervisor.get_all_processes();
        if processes.is_empty() {
            self.snapshots.clear();
            return vec![];
        }

        let mut pids: Vec<u32> = processes
            .values()
            .filter(|handle| !handle.is_killed())
            .filter_map(|handle| handle.pid())
            .collect();
        pids.sort_unstable();
        pids.dedup();

        if pids.is_empty() {
            return vec![];
        }

        let started = Instant::now();
        let stats = match self.probe.sample(&pids).await {
            Ok(stats) => stats,
            Err(e) => {
                error!("Failed to measure {} worker process(es): {}", pids.len(), e);
                metrics::counter!("fleet_probe_failures_total").increment(1);
                return vec![];
            }
        };
        metrics::histogram!("fleet_probe_duration_seconds").record(started.elapsed().as_secs_f64());

        let measured_at = Utc::now();
        let mut results = Vec::with_capacity(stats.len());

        for pid in &pids {
            let Some(stat) = stats.get(pid) else {
                continue;
            };
            let Some(agent_id) = self.supervisor.find_agent_by_pid(*pid) else {
                debug!("PID {} left the registry during the cycle", pid);
                continue;
            };

            let snapshot = ResourceSnapshot {
                agent_id,
                cpu_percent: round_to_tenth(stat.cpu),
                memory_megabytes: bytes_to_megabytes(stat.memory),
                measured_at,
            };

            let agent_label = agent_id.to_string();
            metrics::gauge!("fleet_agent_cpu_percent", "agent_id" => agent_label.clone()).set(snapshot.cpu_percent);
            metrics::gauge!("fleet_agent_memory_megabytes", "agent_id" => agent_label).set(snapshot.memory_megabytes);

            self.snapshots.insert(agent_id, snapshot.clone());
            results.push(snapshot);
        }

        results
    }
}

/// Polling task slot; the task is aborted when the last monitor handle goes away
#[derive(Default)]
struct TimerSlot(Mutex<Option<JoinHandle<()>>>);

impl Drop for TimerSlot {
    fn drop(&mut self) {
        if let Some(handle) = self.0.get_mut().take() {
            handle.abort();
        }
    }
}

/// Resource monitor for supervised workers
///
/// Cheap to clone; clones share snapshots and the polling timer.
#[derive(Clone)]
pub struct ResourceMonitor {
    core: Arc<MonitorCore>,
    timer: Arc<TimerSlot>,
}

impl ResourceMonitor {
    pub fn new(supervisor: ProcessSupervisor, probe: Arc<dyn ProcessProbe>) -> Self {
        Self {
            core: Arc::new(MonitorCore {
                supervisor,
                probe,
                snapshots: DashMap::new(),
            }),
            timer: Arc::new(TimerSlot::default()),
        }
    }

    /// (Re)start polling every `interval`; a running timer is replaced.
    /// Must be called from within a Tokio runtime.
    pub fn start_monitoring(&self, interval: Duration) {
        let mut timer = self.timer.0.lock();
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let core = Arc::clone(&self.core);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                core.update_all().await;
            }
        });

        *timer = Some(handle);
        info!("Resource monitoring started (interval {:?})", interval);
    }

    /// Cancel the polling timer, if any
    pub fn stop_monitoring(&self) {
        if let Some(handle) = self.timer.0.lock().take() {
            handle.abort();
            info!("Resource monitoring stopped");
        }
    }

    pub fn is_monitoring(&self) -> bool {
        self.timer.0.lock().is_some()
    }

    /// Run one measurement cycle and return the snapshots it produced
    pub async fn update_all_resource_usage(&self) -> Vec<ResourceSnapshot> {
        self.core.update_all().await
    }

    /// Agent whose registered worker has this PID
    pub fn get_bot_id_by_pid(&self, pid: u32) -> Option<AgentId> {
        self.core.supervisor.find_agent_by_pid(pid)
    }

    pub fn get_resource_usage(&self, agent_id: AgentId) -> Option<ResourceSnapshot> {
        self.core.snapshots.get(&agent_id).map(|entry| entry.value().clone())
    }

    pub fn get_all_resource_usage(&self) -> Vec<ResourceSnapshot> {
        self.core.snapshots.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn clear_resource_usage(&self, agent_id: AgentId) {
        self.core.snapshots.remove(&agent_id);
    }
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("snapshots", &self.core.snapshots.len())
            .field("monitoring", &self.is_monitoring())
            .finish()
    }
}
