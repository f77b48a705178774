// src/runtime/process_manager.rs
//! OS-level process spawning and signalling for worker processes
//!
//! Workers run as isolated child processes with all three standard streams
//! piped: stdin/stdout carry the JSON-lines protocol, stderr is forwarded
//! to the controller's log.

use crate::utils::errors::{EngineError, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

/// Environment variable carrying the agent id into the worker
pub const AGENT_ID_ENV: &str = "FLEET_AGENT_ID";

/// Configuration for spawning one worker process
#[derive(Debug, Clone, Default)]
pub struct SpawnConfig {
    /// Program to execute; bare names are looked up on `PATH`
    pub program: String,

    pub args: Vec<String>,

    pub env_vars: Vec<(String, String)>,

    /// Working directory
    pub work_dir: Option<PathBuf>,
}

/// Spawns worker processes and delivers signals to them
pub struct ProcessManager {
    /// Resolved executables, keyed by configured program name
    executable_paths: Mutex<HashMap<String, PathBuf>>,
}

impl ProcessManager {
    pub fn new() -> Self {
        Self {
            executable_paths: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the executable for `program`
    fn find_executable(&self, program: &str) -> Result<PathBuf> {
        if program.contains(std::path::MAIN_SEPARATOR) {
            return Ok(PathBuf::from(program));
        }

        if let Some(path) = self.executable_paths.lock().get(program) {
            return Ok(path.clone());
        }

        match which::which(program) {
            Ok(path) => {
                info!("Found worker program {} at {:?}", program, path);
                self.executable_paths.lock().insert(program.to_string(), path.clone());
                Ok(path)
            }
            Err(e) => Err(EngineError::ProcessSpawnFailed(format!(
                "Executable '{}' not found in PATH: {}",
                program, e
            ))),
        }
    }

    /// Spawn a new worker process. Must be called within a Tokio runtime.
    pub fn spawn(&self, config: &SpawnConfig) -> Result<Child> {
        let executable = self.find_executable(&config.program)?;

        debug!("Spawning worker process: {:?} {:?}", executable, config.args);

        let mut command = Command::new(executable);
        command.args(&config.args);

        if let Some(work_dir) = &config.work_dir {
            command.current_dir(work_dir);
        }

        for (key, value) in &config.env_vars {
            command.env(key, value);
        }

        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|e| EngineError::ProcessSpawnFailed(format!("Failed to spawn process: {}", e)))?;

        debug!("Process spawned with PID: {:?}", child.id());

        Ok(child)
    }

    /// Send `signal` to a process
    pub fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        let target = Pid::from_raw(pid as i32);
        debug!("Sending {} to PID {}", signal, pid);
        kill(target, signal)
            .map_err(|e| EngineError::RuntimeError(format!("Failed to send {} to {}: {}", signal, pid, e)))
    }

    /// Whether a process with this PID exists
    pub fn is_alive(&self, pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a signal name to a signal.
///
/// Accepts friendly names (`terminate`, `kill`, `interrupt`, `hangup`) and
/// POSIX names with or without the `SIG` prefix. Unknown names fall back to
/// SIGTERM.
pub fn parse_signal(name: &str) -> Signal {
    let lowered = name.trim().to_ascii_lowercase();
    match lowered.trim_start_matches("sig") {
        "term" | "terminate" => Signal::SIGTERM,
        "kill" => Signal::SIGKILL,
        "int" | "interrupt" => Signal::SIGINT,
        "hup" | "hangup" => Signal::SIGHUP,
        "quit" => Signal::SIGQUIT,
        "usr1" => Signal::SIGUSR1,
        "usr2" => Signal::SIGUSR2,
        _ => {
            warn!("Unknown signal '{}', using SIGTERM", name);
            Signal::SIGTERM
        }
    }
}
