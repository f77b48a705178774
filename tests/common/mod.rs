//! Stand-in worker processes for end-to-end tests

#![allow(dead_code)]

use fleet_engine::runtime::WorkerEvent;
use fleet_engine::utils::config::SupervisorConfig;
use fleet_engine::{AgentId, ProcessSupervisor, WorkerMessage};
use std::time::Duration;
use tokio::sync::broadcast;

/// A POSIX shell worker speaking the JSON-lines protocol.
///
/// - `start` answers `ready`
/// - `get-player-list` answers alice and bob
/// - `execute-command` fails for the command `fail`, otherwise echoes the name
/// - `get-nearby-entities` answers one zombie
/// - `plugin:ui:start-updates` emits one update for that plugin
/// - `plugin:ui:stop-updates` answers an `application` message with action
///   `stopped-updates` naming the plugin
/// - `stop` exits with code 0
/// - anything else is echoed back as an `application` message
pub const SCRIPTED_WORKER: &str = r#"
field() { printf '%s' "$2" | sed "s/.*\"$1\":\"\([^\"]*\)\".*/\1/"; }
while IFS= read -r line; do
  case "$line" in
    *'"type":"start"'*)
      printf '{"type":"ready"}\n';;
    *'"type":"get-player-list"'*)
      id=$(field requestId "$line")
      printf '{"type":"player-list","requestId":"%s","players":["alice","bob"]}\n' "$id";;
    *'"type":"execute-command"'*)
      id=$(field requestId "$line")
      cmd=$(field command "$line")
      if [ "$cmd" = "fail" ]; then
        printf '{"type":"command-result","requestId":"%s","error":"unknown command"}\n' "$id"
      else
        printf '{"type":"command-result","requestId":"%s","result":{"ran":"%s"}}\n' "$id" "$cmd"
      fi;;
    *'"type":"get-nearby-entities"'*)
      id=$(field requestId "$line")
      printf '{"type":"nearby-entities","requestId":"%s","entities":[{"name":"zombie","distance":4.5}]}\n' "$id";;
    *'"type":"plugin:ui:start-updates"'*)
      plugin=$(field pluginName "$line")
      printf '{"type":"plugin:ui:update","pluginName":"%s","payload":{"tick":1}}\n' "$plugin";;
    *'"type":"plugin:ui:stop-updates"'*)
      plugin=$(field pluginName "$line")
      printf '{"type":"application","action":"stopped-updates","payload":"%s"}\n' "$plugin";;
    *'"type":"stop"'*)
      exit 0;;
    *)
      printf '{"type":"application","action":"echo","payload":%s}\n' "$line";;
  esac
done
"#;

pub fn scripted_supervisor() -> ProcessSupervisor {
    ProcessSupervisor::new(SupervisorConfig {
        worker_program: "sh".to_string(),
        worker_args: vec!["-c".to_string(), SCRIPTED_WORKER.to_string()],
        kill_grace_ms: 2_000,
        ..Default::default()
    })
}

/// Supervisor whose workers run an arbitrary `sh -c` script
pub fn shell_supervisor(script: &str) -> ProcessSupervisor {
    ProcessSupervisor::new(SupervisorConfig {
        worker_program: "sh".to_string(),
        worker_args: vec!["-c".to_string(), script.to_string()],
        kill_grace_ms: 500,
        ..Default::default()
    })
}

pub fn cat_supervisor() -> ProcessSupervisor {
    ProcessSupervisor::new(SupervisorConfig {
        worker_program: "cat".to_string(),
        kill_grace_ms: 500,
        ..Default::default()
    })
}

/// Next message event from `agent`, skipping everything else
pub async fn next_message(events: &mut broadcast::Receiver<WorkerEvent>, agent: AgentId) -> WorkerMessage {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a worker message")
            .expect("event channel closed");
        if let WorkerEvent::Message { agent_id, message } = event {
            if agent_id == agent {
                return message;
            }
        }
    }
}

/// Exit code of `agent`, waiting up to five seconds
pub async fn wait_for_exit(events: &mut broadcast::Receiver<WorkerEvent>, agent: AgentId) -> Option<i32> {
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for exit")
            .expect("event channel closed");
        if let WorkerEvent::Exited { agent_id, code, .. } = event {
            if agent_id == agent {
                return code;
            }
        }
    }
}
