// src/runtime/mod.rs
//! Worker process orchestration
//!
//! This module owns every agent worker process and all traffic with them:
//!
//! - **Supervisor**: Registry of workers, spawn/kill/remove, message routing
//! - **Process Manager**: OS process spawning and signalling
//! - **Worker**: Per-process handle plus stdin/stdout/stderr/exit pumps
//! - **Pending**: Correlation tables for request/response traffic
//! - **Subscriptions**: Plugin UI topics and their subscribers
//! - **Protocol**: Closed message unions spoken over the worker channel
//!
//! # Architecture
//!
//! ```text
//!   API layer ──spawn/kill/send──▶ ProcessSupervisor
//!                                   │   registry: agent id → WorkerHandle
//!                                   │   pending: player list │ command │ nearby
//!                                   │   topics: (agent, plugin) → {subscriber}
//!                                   ▼
//!                 ┌────────────┬────────────┬────────────┐
//!                 │ worker #1  │ worker #2  │ worker #3  │  (OS processes)
//!                 └────────────┴────────────┴────────────┘
//!                     JSON lines over stdin / stdout
//! ```

pub mod pending;
pub mod process_manager;
pub mod protocol;
pub mod subscriptions;
pub mod supervisor;
pub mod worker;

// Re-export commonly used types
pub use pending::{PendingHandler, PendingReply, PendingRequests};
pub use process_manager::{parse_signal, ProcessManager, SpawnConfig};
pub use protocol::{AgentConfig, AgentId, ControllerMessage, PluginUiUpdate, WorkerEvent, WorkerMessage};
pub use subscriptions::{PluginUiSubscriptions, Subscriber};
pub use supervisor::{PendingCounts, ProcessSupervisor};
pub use worker::WorkerHandle;
