// src/controller.rs
//! Fleet controller
//!
//! Owns exactly one supervisor, one resource monitor and one runtime cache.
//! Nothing here is global; two controllers never share state.

use crate::cache::bot_config::{CommandProvider, PermissionProvider};
use crate::cache::runtime_cache::RuntimeCache;
use crate::monitor::probe::ProcessProbe;
use crate::monitor::resource_monitor::ResourceMonitor;
use crate::runtime::protocol::AgentId;
use crate::runtime::supervisor::ProcessSupervisor;
use crate::utils::config::EngineConfig;
use std::sync::Arc;
use tracing::info;

/// Configuration sources for the bot config cache
#[derive(Clone)]
pub struct Providers {
    pub commands: Arc<dyn CommandProvider>,
    pub permissions: Arc<dyn PermissionProvider>,
}

/// Top-level owner of the orchestration components
#[derive(Debug)]
pub struct FleetController {
    config: EngineConfig,
    supervisor: ProcessSupervisor,
    monitor: ResourceMonitor,
    cache: RuntimeCache,
}

impl FleetController {
    pub fn new(config: EngineConfig, probe: Arc<dyn ProcessProbe>, providers: Option<Providers>) -> Self {
        let supervisor = ProcessSupervisor::new(config.supervisor.clone());
        let monitor = ResourceMonitor::new(supervisor.clone(), probe);
        let cache = match providers {
            Some(providers) => RuntimeCache::with_providers(&config.cache, providers.commands, providers.permissions),
            None => RuntimeCache::new(&config.cache),
        };

        Self {
            config,
            supervisor,
            monitor,
            cache,
        }
    }

    /// Start background work; monitoring only when configured to autostart
    pub fn start(&self) {
        if self.config.monitor.autostart {
            self.monitor.start_monitoring(self.config.monitor.interval());
        }
        info!("Fleet controller started");
    }

    pub async fn shutdown(&self) {
        self.monitor.stop_monitoring();
        self.supervisor.shutdown().await;
        info!("Fleet controller stopped");
    }

    /// Forget an agent everywhere: registry entry, resource snapshot and
    /// cached configuration
    pub async fn remove_agent(&self, agent_id: AgentId) {
        self.supervisor.remove(agent_id);
        self.monitor.clear_resource_usage(agent_id);
        self.cache.clear_bot_cache(agent_id).await;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn monitor(&self) -> &ResourceMonitor {
        &self.monitor
    }

    pub fn cache(&self) -> &RuntimeCache {
        &self.cache
    }
}
