// src/cache/bot_config.rs
//! Per-agent command and permission configuration cache
//!
//! Entries are built on first access from two read-only providers and live
//! until explicitly invalidated. There is no TTL: callers invalidate an
//! agent whenever its installed commands or permissions change.

use crate::runtime::protocol::AgentId;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// A command installed on an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub id: i64,
    pub name: String,

    /// JSON array of alias strings, as stored
    #[serde(default)]
    pub aliases: Option<String>,

    #[serde(default)]
    pub permission_id: Option<i64>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A permission defined for an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRecord {
    pub id: i64,
    pub name: String,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Source of an agent's commands
#[async_trait]
pub trait CommandProvider: Send + Sync {
    async fn commands_for_agent(&self, agent_id: AgentId) -> Result<Vec<CommandRecord>>;
}

/// Source of an agent's permissions
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    async fn permissions_for_agent(&self, agent_id: AgentId) -> Result<Vec<PermissionRecord>>;
}

/// Compiled command/permission view of one agent
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BotConfig {
    pub commands_by_name: HashMap<String, CommandRecord>,
    pub permissions_by_id: HashMap<i64, PermissionRecord>,
    pub alias_to_command_name: HashMap<String, String>,
}

impl BotConfig {
    /// Index commands and permissions.
    ///
    /// A command whose alias list cannot be parsed still gets indexed by
    /// name; it just contributes no aliases.
    pub fn build(commands: Vec<CommandRecord>, permissions: Vec<PermissionRecord>) -> Self {
        let mut alias_to_command_name = HashMap::new();

        for command in &commands {
            match parse_aliases(command.aliases.as_deref()) {
                Ok(aliases) => {
                    for alias in aliases {
                        alias_to_command_name.insert(alias, command.name.clone());
                    }
                }
                Err(e) => warn!("Ignoring malformed aliases of command '{}': {}", command.name, e),
            }
        }

        Self {
            commands_by_name: commands
                .into_iter()
                .map(|command| (command.name.clone(), command))
                .collect(),
            permissions_by_id: permissions
                .into_iter()
                .map(|permission| (permission.id, permission))
                .collect(),
            alias_to_command_name,
        }
    }

    /// Look a command up by name, falling back to its aliases
    pub fn resolve_command(&self, name_or_alias: &str) -> Option<&CommandRecord> {
        self.commands_by_name.get(name_or_alias).or_else(|| {
            self.alias_to_command_name
                .get(name_or_alias)
                .and_then(|name| self.commands_by_name.get(name))
        })
    }

    pub fn permission(&self, id: i64) -> Option<&PermissionRecord> {
        self.permissions_by_id.get(&id)
    }
}

/// Parse a stored alias list. Missing or blank input means no aliases.
pub fn parse_aliases(raw: Option<&str>) -> std::result::Result<Vec<String>, serde_json::Error> {
    match raw.map(str::trim) {
        None | Some("") => Ok(vec![]),
        Some(raw) => {
            let aliases: Option<Vec<String>> = serde_json::from_str(raw)?;
            Ok(aliases.unwrap_or_default())
        }
    }
}

/// Lazily populated cache of [`BotConfig`]s keyed by agent
#[derive(Clone, Default)]
pub struct BotConfigCache {
    entries: Arc<DashMap<AgentId, Arc<BotConfig>>>,
    commands: Option<Arc<dyn CommandProvider>>,
    permissions: Option<Arc<dyn PermissionProvider>>,
}

impl BotConfigCache {
    /// Cache without providers; only explicit `insert`s can populate it
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_providers(commands: Arc<dyn CommandProvider>, permissions: Arc<dyn PermissionProvider>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            commands: Some(commands),
            permissions: Some(permissions),
        }
    }

    pub fn get(&self, agent_id: AgentId) -> Option<Arc<BotConfig>> {
        self.entries.get(&agent_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn insert(&self, agent_id: AgentId, config: BotConfig) {
        self.entries.insert(agent_id, Arc::new(config));
    }

    pub fn remove(&self, agent_id: AgentId) -> bool {
        self.entries.remove(&agent_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached configuration, loading it on a miss.
    ///
    /// Both providers are queried concurrently. Calling this on a cache built
    /// without providers is a wiring defect and yields
    /// [`EngineError::CacheNotConfigured`].
    pub async fn get_or_load(&self, agent_id: AgentId) -> Result<Arc<BotConfig>> {
        if let Some(config) = self.get(agent_id) {
            return Ok(config);
        }

        let Some(commands) = &self.commands else {
            error!("Bot configuration cache used without a command provider");
            return Err(EngineError::CacheNotConfigured("command"));
        };
        let Some(permissions) = &self.permissions else {
            error!("Bot configuration cache used without a permission provider");
            return Err(EngineError::CacheNotConfigured("permission"));
        };

        debug!("Loading bot configuration for agent {}", agent_id);
        let (commands, permissions) = tokio::try_join!(
            commands.commands_for_agent(agent_id),
            permissions.permissions_for_agent(agent_id)
        )?;

        metrics::counter!("fleet_bot_config_loads_total").increment(1);

        let config = Arc::new(BotConfig::build(commands, permissions));
        self.entries.insert(agent_id, Arc::clone(&config));
        Ok(config)
    }
}

impl std::fmt::Debug for BotConfigCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfigCache")
            .field("entries", &self.entries.len())
            .field("has_providers", &(self.commands.is_some() && self.permissions.is_some()))
            .finish()
    }
}
