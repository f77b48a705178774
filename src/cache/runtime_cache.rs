// src/cache/runtime_cache.rs
//! Runtime cache façade
//!
//! Three independent stores behind one get/set/delete surface:
//!
//! | store        | key      | bound    | expiry              |
//! |--------------|----------|----------|---------------------|
//! | tokens       | token    | LRU      | 5 min (default)     |
//! | player lists | agent id | LRU      | 2 s (default)       |
//! | bot configs  | agent id | none     | explicit only       |

use crate::cache::bot_config::{BotConfig, BotConfigCache, CommandProvider, PermissionProvider};
use crate::cache::ttl_cache::TtlCache;
use crate::runtime::protocol::AgentId;
use crate::utils::config::CacheConfig;
use crate::utils::errors::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Entry counts of the runtime caches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub tokens: u64,
    pub player_lists: u64,
    pub bot_configs: usize,
}

/// In-memory caches for tokens, near-real-time agent data and bot configuration
#[derive(Debug, Clone)]
pub struct RuntimeCache {
    tokens: TtlCache<String, Value>,
    player_lists: TtlCache<AgentId, Value>,
    bot_configs: BotConfigCache,
}

impl RuntimeCache {
    /// Cache without configuration providers
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_bot_configs(config, BotConfigCache::new())
    }

    /// Cache that loads bot configuration on demand from the given providers
    pub fn with_providers(
        config: &CacheConfig,
        commands: Arc<dyn CommandProvider>,
        permissions: Arc<dyn PermissionProvider>,
    ) -> Self {
        Self::with_bot_configs(config, BotConfigCache::with_providers(commands, permissions))
    }

    fn with_bot_configs(config: &CacheConfig, bot_configs: BotConfigCache) -> Self {
        Self {
            tokens: TtlCache::new("tokens", config.token_capacity, config.token_ttl()),
            player_lists: TtlCache::new("player_lists", config.player_list_capacity, config.player_list_ttl()),
            bot_configs,
        }
    }

    // Tokens

    pub async fn get_token(&self, token: &str) -> Option<Value> {
        self.tokens.get(token).await
    }

    pub async fn set_token(&self, token: impl Into<String>, data: Value) {
        self.tokens.insert(token.into(), data).await;
    }

    pub async fn delete_token(&self, token: &str) {
        self.tokens.remove(token).await;
    }

    // Player lists

    pub async fn get_player_list(&self, agent_id: AgentId) -> Option<Value> {
        self.player_lists.get(&agent_id).await
    }

    pub async fn set_player_list(&self, agent_id: AgentId, players: Value) {
        self.player_lists.insert(agent_id, players).await;
    }

    // Bot configuration

    pub fn get_bot_config(&self, agent_id: AgentId) -> Option<Arc<BotConfig>> {
        self.bot_configs.get(agent_id)
    }

    pub fn set_bot_config(&self, agent_id: AgentId, config: BotConfig) {
        self.bot_configs.insert(agent_id, config);
    }

    pub fn delete_bot_config(&self, agent_id: AgentId) {
        self.bot_configs.remove(agent_id);
    }

    /// Cached configuration for `agent_id`, loaded from the providers on a miss
    pub async fn get_or_load_bot_config(&self, agent_id: AgentId) -> Result<Arc<BotConfig>> {
        self.bot_configs.get_or_load(agent_id).await
    }

    /// Forget everything cached for an agent's commands and permissions
    pub async fn clear_bot_cache(&self, agent_id: AgentId) {
        debug!("Clearing cached configuration for agent {}", agent_id);
        self.bot_configs.remove(agent_id);
        self.player_lists.remove(&agent_id).await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            tokens: self.tokens.entry_count(),
            player_lists: self.player_lists.entry_count(),
            bot_configs: self.bot_configs.len(),
        }
    }
}
