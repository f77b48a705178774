// src/runtime/supervisor.rs
//! Process supervisor: the single source of truth for worker processes
//!
//! Owns the worker registry, the three pending-request tables and the
//! plugin UI topic registry, and multiplexes request/response and
//! publish/subscribe traffic over each worker's message channel.
//!
//! Absence is never an error here. Asking about, messaging or killing an
//! unknown agent yields `false` / `None` and has no side effects.
//!
//! Killing a worker does not settle its outstanding requests; they stay
//! pending until their own timeout fires.

use crate::runtime::pending::{PendingHandler, PendingRequests};
use crate::runtime::process_manager::{parse_signal, ProcessManager, SpawnConfig, AGENT_ID_ENV};
use crate::runtime::protocol::{
    AgentConfig, AgentId, ControllerMessage, PluginUiUpdate, WorkerEvent, WorkerMessage,
};
use crate::runtime::subscriptions::{PluginUiSubscriptions, Subscriber};
use crate::runtime::worker::{WorkerHandle, WorkerRouter};
use crate::utils::config::SupervisorConfig;
use crate::utils::errors::{EngineError, Result};
use dashmap::DashMap;
use nix::sys::signal::Signal;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

struct SupervisorInner {
    config: SupervisorConfig,
    manager: ProcessManager,
    processes: DashMap<AgentId, WorkerHandle>,
    player_list_requests: Arc<PendingRequests>,
    command_requests: Arc<PendingRequests>,
    nearby_entities_requests: Arc<PendingRequests>,
    subscriptions: PluginUiSubscriptions,
    events: broadcast::Sender<WorkerEvent>,
}

impl WorkerRouter for SupervisorInner {
    fn route(&self, agent_id: AgentId, message: WorkerMessage) {
        trace!("Agent {} sent {:?}", agent_id, message);

        match &message {
            WorkerMessage::PlayerList { request_id, players } => {
                self.player_list_requests.resolve(request_id, players.clone(), None);
            }
            WorkerMessage::CommandResult {
                request_id,
                result,
                error,
            } => {
                let payload = result.clone().unwrap_or(Value::Null);
                self.command_requests.resolve(request_id, payload, error.clone());
            }
            WorkerMessage::NearbyEntities { request_id, entities } => {
                self.nearby_entities_requests
                    .resolve(request_id, entities.clone(), None);
            }
            WorkerMessage::PluginUiUpdate { plugin_name, payload } => {
                let update = PluginUiUpdate {
                    agent_id,
                    plugin_name: plugin_name.clone(),
                    payload: payload.clone(),
                };
                let delivered = self.subscriptions.publish(&update);
                trace!("Plugin {} update for agent {} delivered to {}", plugin_name, agent_id, delivered);
            }
            WorkerMessage::Log { level, message } => match level.as_str() {
                "error" => error!(agent_id, "{}", message),
                "warn" => warn!(agent_id, "{}", message),
                "debug" | "trace" => debug!(agent_id, "{}", message),
                _ => info!(agent_id, "{}", message),
            },
            WorkerMessage::Ready => info!("Agent {} worker is ready", agent_id),
            WorkerMessage::Status { status } => debug!("Agent {} status: {}", agent_id, status),
            WorkerMessage::Application { .. } => {}
        }

        // No receivers is fine
        let _ = self.events.send(WorkerEvent::Message { agent_id, message });
    }

    fn exited(&self, agent_id: AgentId, pid: Option<u32>, code: Option<i32>) {
        metrics::counter!("fleet_workers_exited_total").increment(1);
        let _ = self.events.send(WorkerEvent::Exited { agent_id, pid, code });
    }
}

/// Number of outstanding requests in each pending table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingCounts {
    pub player_list: usize,
    pub command: usize,
    pub nearby_entities: usize,
}

/// Supervisor for agent worker processes
///
/// Cheap to clone; clones share one registry.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));

        Self {
            inner: Arc::new(SupervisorInner {
                config,
                manager: ProcessManager::new(),
                processes: DashMap::new(),
                player_list_requests: Arc::new(PendingRequests::new("player_list")),
                command_requests: Arc::new(PendingRequests::new("command")),
                nearby_entities_requests: Arc::new(PendingRequests::new("nearby_entities")),
                subscriptions: PluginUiSubscriptions::new(),
                events,
            }),
        }
    }

    /// Launch a worker for `agent_config.id` and register it.
    ///
    /// `full_config` is delivered to the worker as its `start` message.
    /// Only a failure to create the OS process is reported here; anything
    /// that goes wrong later surfaces as a [`WorkerEvent::Exited`]. An
    /// existing registry entry for the same agent is replaced.
    pub fn spawn(&self, agent_config: AgentConfig, full_config: Value) -> Result<WorkerHandle> {
        let agent_id = agent_config.id;
        let config = &self.inner.config;

        let mut env_vars: Vec<(String, String)> = config
            .worker_env
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        env_vars.push((AGENT_ID_ENV.to_string(), agent_id.to_string()));

        let spawn_config = SpawnConfig {
            program: config.worker_program.clone(),
            args: config.worker_args.clone(),
            env_vars,
            work_dir: None,
        };

        let child = self.inner.manager.spawn(&spawn_config)?;
        let router: Arc<dyn WorkerRouter> = self.inner.clone();
        let handle = WorkerHandle::attach(child, agent_config, router);

        handle.send(ControllerMessage::Start {
            agent_id,
            config: full_config,
        });

        if let Some(previous) = self.inner.processes.insert(agent_id, handle.clone()) {
            if !previous.is_killed() {
                warn!("Agent {} was re-spawned while its previous worker is still running", agent_id);
            }
        }

        metrics::counter!("fleet_workers_spawned_total").increment(1);
        info!("Spawned worker for agent {} (PID {:?})", agent_id, handle.pid());

        Ok(handle)
    }

    /// `true` iff a handle is registered and not marked killed
    pub fn is_running(&self, agent_id: AgentId) -> bool {
        self.inner
            .processes
            .get(&agent_id)
            .map(|handle| !handle.is_killed())
            .unwrap_or(false)
    }

    pub fn get_process(&self, agent_id: AgentId) -> Option<WorkerHandle> {
        self.inner.processes.get(&agent_id).map(|handle| handle.clone())
    }

    /// Snapshot of the registry
    pub fn get_all_processes(&self) -> HashMap<AgentId, WorkerHandle> {
        self.inner
            .processes
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect()
    }

    /// Ids of all agents whose worker is running
    pub fn running_agents(&self) -> Vec<AgentId> {
        self.inner
            .processes
            .iter()
            .filter(|entry| !entry.value().is_killed())
            .map(|entry| *entry.key())
            .collect()
    }

    /// Agent owning the registered worker with this PID
    pub fn find_agent_by_pid(&self, pid: u32) -> Option<AgentId> {
        self.inner
            .processes
            .iter()
            .find(|entry| entry.value().pid() == Some(pid))
            .map(|entry| *entry.key())
    }

    /// Best-effort delivery to a live worker.
    ///
    /// Returns `false` when no live worker exists; there is no
    /// acknowledgement either way.
    pub fn send_message(&self, agent_id: AgentId, message: ControllerMessage) -> bool {
        let Some(handle) = self.get_process(agent_id) else {
            metrics::counter!("fleet_worker_messages_dropped_total").increment(1);
            return false;
        };

        if handle.is_killed() || !handle.send(message) {
            metrics::counter!("fleet_worker_messages_dropped_total").increment(1);
            return false;
        }

        metrics::counter!("fleet_worker_messages_sent_total").increment(1);
        true
    }

    /// Signal a live worker to terminate.
    ///
    /// `signal` accepts names such as `terminate` (the usual choice), `kill`
    /// or `SIGINT`. The handle stays registered so its exit code can be
    /// inspected; call [`remove`](Self::remove) afterwards.
    pub fn kill(&self, agent_id: AgentId, signal: &str) -> bool {
        let Some(handle) = self.get_process(agent_id) else {
            return false;
        };
        if handle.is_killed() {
            return false;
        }
        let Some(pid) = handle.pid() else {
            return false;
        };

        match self.inner.manager.signal(pid, parse_signal(signal)) {
            Ok(()) => {
                handle.mark_killed();
                info!("Killed worker for agent {} (PID {})", agent_id, pid);
                true
            }
            Err(e) => {
                warn!("Failed to kill worker for agent {}: {}", agent_id, e);
                false
            }
        }
    }

    /// Delete the registry entry unconditionally
    pub fn remove(&self, agent_id: AgentId) {
        if self.inner.processes.remove(&agent_id).is_some() {
            debug!("Removed agent {} from the registry", agent_id);
        }
    }

    /// Stream of worker messages and exits
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.inner.events.subscribe()
    }

    // ---------------------------------------------------------------------
    // Plugin UI pub/sub
    // ---------------------------------------------------------------------

    /// Join a plugin UI topic and ask the worker to start producing updates
    pub fn subscribe_to_plugin_ui(&self, agent_id: AgentId, plugin_name: &str, subscriber: Subscriber) {
        self.inner.subscriptions.subscribe(agent_id, plugin_name, subscriber);
        self.record_topic_count();

        self.send_message(
            agent_id,
            ControllerMessage::PluginUiStartUpdates {
                plugin_name: plugin_name.to_string(),
            },
        );
    }

    /// Leave a plugin UI topic; the last subscriber out stops the updates
    pub fn unsubscribe_from_plugin_ui(&self, agent_id: AgentId, plugin_name: &str, subscriber: &Subscriber) {
        if !self.inner.subscriptions.unsubscribe(agent_id, plugin_name, subscriber) {
            return;
        }
        self.record_topic_count();

        debug!("Topic ({}, {}) has no subscribers left", agent_id, plugin_name);
        self.send_message(
            agent_id,
            ControllerMessage::PluginUiStopUpdates {
                plugin_name: plugin_name.to_string(),
            },
        );
    }

    pub fn get_plugin_subscribers(&self, agent_id: AgentId, plugin_name: &str) -> Option<HashSet<Subscriber>> {
        self.inner.subscriptions.subscribers(agent_id, plugin_name)
    }

    /// Remove a subscriber from every topic of every agent
    pub fn handle_subscriber_disconnect(&self, subscriber: &Subscriber) {
        let topics = self.inner.subscriptions.topics_of(subscriber);
        debug!("Subscriber {} disconnected from {} topic(s)", subscriber.id(), topics.len());

        for (agent_id, plugin_name) in topics {
            self.unsubscribe_from_plugin_ui(agent_id, &plugin_name, subscriber);
        }
    }

    fn record_topic_count(&self) {
        metrics::gauge!("fleet_plugin_ui_topics").set(self.inner.subscriptions.topic_count() as f64);
    }

    // ---------------------------------------------------------------------
    // Pending-request correlation
    // ---------------------------------------------------------------------

    /// Fresh correlation id for an outgoing request
    pub fn next_correlation_id(&self) -> String {
        ulid::Ulid::new().to_string()
    }

    pub fn player_list_requests(&self) -> &Arc<PendingRequests> {
        &self.inner.player_list_requests
    }

    pub fn command_requests(&self) -> &Arc<PendingRequests> {
        &self.inner.command_requests
    }

    pub fn nearby_entities_requests(&self) -> &Arc<PendingRequests> {
        &self.inner.nearby_entities_requests
    }

    /// Outstanding requests per table
    pub fn pending_count(&self) -> PendingCounts {
        PendingCounts {
            player_list: self.inner.player_list_requests.len(),
            command: self.inner.command_requests.len(),
            nearby_entities: self.inner.nearby_entities_requests.len(),
        }
    }

    pub fn add_player_list_request(&self, correlation_id: impl Into<String>, handler: PendingHandler) {
        self.inner.player_list_requests.add(correlation_id, handler);
    }

    pub fn resolve_player_list_request(&self, correlation_id: &str, players: Value) {
        self.inner.player_list_requests.resolve(correlation_id, players, None);
    }

    pub fn add_command_request(&self, correlation_id: impl Into<String>, handler: PendingHandler) {
        self.inner.command_requests.add(correlation_id, handler);
    }

    /// Settle a command request; an `error` rejects it with that message
    pub fn resolve_command_request(&self, correlation_id: &str, result: Value, error: Option<String>) {
        self.inner.command_requests.resolve(correlation_id, result, error);
    }

    pub fn add_nearby_entities_request(&self, correlation_id: impl Into<String>, handler: PendingHandler) {
        self.inner.nearby_entities_requests.add(correlation_id, handler);
    }

    pub fn resolve_nearby_entities_request(&self, correlation_id: &str, entities: Value) {
        self.inner.nearby_entities_requests.resolve(correlation_id, entities, None);
    }

    /// Ask a worker for its player list
    pub async fn request_player_list(&self, agent_id: AgentId, timeout: Duration) -> Result<Value> {
        let request_id = self.next_correlation_id();
        let message = ControllerMessage::GetPlayerList {
            request_id: request_id.clone(),
        };
        self.request(&self.inner.player_list_requests, agent_id, request_id, message, timeout)
            .await
    }

    /// Run a command on a worker; a worker-reported error becomes
    /// [`EngineError::RequestRejected`]
    pub async fn execute_command(
        &self,
        agent_id: AgentId,
        command: &str,
        args: Value,
        user: Option<String>,
        timeout: Duration,
    ) -> Result<Value> {
        let request_id = self.next_correlation_id();
        let message = ControllerMessage::ExecuteCommand {
            request_id: request_id.clone(),
            command: command.to_string(),
            args,
            user,
        };
        self.request(&self.inner.command_requests, agent_id, request_id, message, timeout)
            .await
    }

    /// Ask a worker for entities within `radius`
    pub async fn request_nearby_entities(&self, agent_id: AgentId, radius: f64, timeout: Duration) -> Result<Value> {
        let request_id = self.next_correlation_id();
        let message = ControllerMessage::GetNearbyEntities {
            request_id: request_id.clone(),
            radius,
        };
        self.request(&self.inner.nearby_entities_requests, agent_id, request_id, message, timeout)
            .await
    }

    async fn request(
        &self,
        table: &Arc<PendingRequests>,
        agent_id: AgentId,
        request_id: String,
        message: ControllerMessage,
        timeout: Duration,
    ) -> Result<Value> {
        let reply = table.register(request_id.clone(), timeout);

        if !self.send_message(agent_id, message) {
            table.remove(&request_id);
            return Err(EngineError::RuntimeError(format!("worker for agent {} is not running", agent_id)));
        }

        reply.await
    }

    // ---------------------------------------------------------------------
    // Shutdown
    // ---------------------------------------------------------------------

    /// Stop every worker: ask politely, wait out the grace period, then
    /// SIGKILL whatever is left and clear the registry.
    pub async fn shutdown(&self) {
        let running = self.running_agents();
        info!("Shutting down {} worker(s)", running.len());

        for agent_id in &running {
            self.send_message(*agent_id, ControllerMessage::Stop);
        }

        let deadline = tokio::time::Instant::now() + self.inner.config.kill_grace();
        while tokio::time::Instant::now() < deadline {
            let all_exited = self
                .inner
                .processes
                .iter()
                .all(|entry| entry.value().has_exited());
            if all_exited {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for entry in self.inner.processes.iter() {
            let handle = entry.value();
            if handle.has_exited() {
                continue;
            }
            if let Some(pid) = handle.pid() {
                warn!("Agent {} did not exit in time, sending SIGKILL", handle.agent_id());
                if let Err(e) = self.inner.manager.signal(pid, Signal::SIGKILL) {
                    warn!("Failed to SIGKILL agent {}: {}", handle.agent_id(), e);
                }
            }
            handle.mark_killed();
        }

        self.inner.processes.clear();
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("processes", &self.inner.processes.len())
            .field("topics", &self.inner.subscriptions.topic_count())
            .finish()
    }
}
