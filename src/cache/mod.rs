// src/cache/mod.rs
//! Runtime caches
//!
//! - **Runtime Cache**: Façade used by the API layer and command dispatch
//! - **TTL Cache**: LRU eviction plus per-instance time-to-live
//! - **Bot Config**: Lazily built, explicitly invalidated per-agent command
//!   and permission index

pub mod bot_config;
pub mod runtime_cache;
pub mod ttl_cache;

// Re-export commonly used types
pub use bot_config::{
    parse_aliases, BotConfig, BotConfigCache, CommandProvider, CommandRecord, PermissionProvider,
    PermissionRecord,
};
pub use runtime_cache::{CacheStats, RuntimeCache};
pub use ttl_cache::TtlCache;
