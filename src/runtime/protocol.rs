// src/runtime/protocol.rs
//! Controller ⇄ worker wire protocol
//!
//! Workers exchange newline-delimited JSON over their standard streams.
//! Both directions are closed unions tagged by `type`, so adding a message
//! kind is a compile-time change on both sides.
//!
//! ```text
//! controller ── stdin  ──▶ {"type":"plugin:ui:start-updates","pluginName":"map"}
//! controller ◀── stdout ── {"type":"command-result","requestId":"01H…","result":{…}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Logical agent identifier
pub type AgentId = i64;

/// Per-agent configuration attached to a worker handle at spawn time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentId,

    #[serde(default)]
    pub name: String,

    /// Anything else the caller wants to keep alongside the handle
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl AgentConfig {
    pub fn new(id: AgentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            extra: serde_json::Map::new(),
        }
    }
}

/// Messages sent from the controller to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum ControllerMessage {
    /// Initial configuration, sent right after spawn
    #[serde(rename = "start")]
    Start { agent_id: AgentId, config: Value },

    #[serde(rename = "plugin:ui:start-updates")]
    PluginUiStartUpdates { plugin_name: String },

    #[serde(rename = "plugin:ui:stop-updates")]
    PluginUiStopUpdates { plugin_name: String },

    #[serde(rename = "get-player-list")]
    GetPlayerList { request_id: String },

    #[serde(rename = "execute-command")]
    ExecuteCommand {
        request_id: String,
        command: String,
        #[serde(default)]
        args: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<String>,
    },

    #[serde(rename = "get-nearby-entities")]
    GetNearbyEntities { request_id: String, radius: f64 },

    /// Ask the worker to exit on its own
    #[serde(rename = "stop")]
    Stop,

    /// Caller-defined traffic, delivered verbatim
    #[serde(rename = "application")]
    Application { action: String, payload: Value },
}

impl ControllerMessage {
    pub fn application(action: impl Into<String>, payload: Value) -> Self {
        ControllerMessage::Application {
            action: action.into(),
            payload,
        }
    }
}

/// Messages emitted by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum WorkerMessage {
    #[serde(rename = "ready")]
    Ready,

    #[serde(rename = "status")]
    Status { status: String },

    #[serde(rename = "log")]
    Log { level: String, message: String },

    #[serde(rename = "player-list")]
    PlayerList { request_id: String, players: Value },

    #[serde(rename = "command-result")]
    CommandResult {
        request_id: String,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },

    #[serde(rename = "nearby-entities")]
    NearbyEntities { request_id: String, entities: Value },

    #[serde(rename = "plugin:ui:update")]
    PluginUiUpdate { plugin_name: String, payload: Value },

    #[serde(rename = "application")]
    Application { action: String, payload: Value },
}

/// A plugin UI update delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginUiUpdate {
    pub agent_id: AgentId,
    pub plugin_name: String,
    pub payload: Value,
}

/// Lifecycle and traffic notifications published by the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A message arrived from a worker
    Message { agent_id: AgentId, message: WorkerMessage },

    /// A worker process exited; `code` is `None` when killed by a signal
    Exited {
        agent_id: AgentId,
        pid: Option<u32>,
        code: Option<i32>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_control_messages_wire_shape() {
        let start = ControllerMessage::PluginUiStartUpdates {
            plugin_name: "map".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&start).unwrap(),
            json!({"type": "plugin:ui:start-updates", "pluginName": "map"})
        );

        let stop = ControllerMessage::PluginUiStopUpdates {
            plugin_name: "map".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&stop).unwrap(),
            json!({"type": "plugin:ui:stop-updates", "pluginName": "map"})
        );
    }

    #[test]
    fn test_command_result_parses_error_branch() {
        let line = r#"{"type":"command-result","requestId":"x","error":"boom"}"#;
        let message: WorkerMessage = serde_json::from_str(line).unwrap();
        assert_eq!(
            message,
            WorkerMessage::CommandResult {
                request_id: "x".to_string(),
                result: None,
                error: Some("boom".to_string()),
            }
        );
    }

    #[test]
    fn test_unknown_worker_message_is_rejected() {
        let line = r#"{"type":"teleport","x":1}"#;
        assert!(serde_json::from_str::<WorkerMessage>(line).is_err());
    }

    #[test]
    fn test_agent_config_keeps_extra_fields() {
        let config: AgentConfig =
            serde_json::from_value(json!({"id": 7, "name": "miner", "server": "mc.local"})).unwrap();
        assert_eq!(config.id, 7);
        assert_eq!(config.extra.get("server"), Some(&json!("mc.local")));
    }
}
