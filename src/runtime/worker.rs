// src/runtime/worker.rs
//! Worker handles and their I/O pumps
//!
//! Every spawned worker gets four tasks:
//!
//! - **writer**: drains the handle's outbox into the child's stdin
//! - **reader**: parses stdout lines into [`WorkerMessage`]s for the router
//! - **stderr**: forwards diagnostic output to the log
//!
//! Both readers survive any line content. Invalid UTF-8, unparseable JSON
//! and over-long lines are logged and skipped; only a closed pipe ends them.
//! - **waiter**: records the exit status and flips liveness
//!
//! ```text
//! send() ─▶ outbox ─▶ writer ─▶ stdin ┐
//!                                      worker process
//! router ◀─ reader ◀─ stdout ─────────┘
//! ```

use crate::runtime::protocol::{AgentConfig, AgentId, ControllerMessage, WorkerMessage};
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::mpsc;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, trace, warn};

/// Longest accepted protocol line
const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// Receives everything a worker emits
pub trait WorkerRouter: Send + Sync + 'static {
    /// A protocol message arrived on the worker's stdout
    fn route(&self, agent_id: AgentId, message: WorkerMessage);

    /// The worker process exited
    fn exited(&self, agent_id: AgentId, pid: Option<u32>, code: Option<i32>);
}

#[derive(Debug, Default)]
struct WorkerState {
    killed: AtomicBool,
    exited: AtomicBool,
    exit_code: Mutex<Option<i32>>,
}

/// One spawned worker process bound to one agent
///
/// Clones share liveness state with the registry entry but cannot change it.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    agent_id: AgentId,
    pid: Option<u32>,
    config: AgentConfig,
    started_at: DateTime<Utc>,
    state: Arc<WorkerState>,
    outbox: mpsc::UnboundedSender<ControllerMessage>,
}

impl WorkerHandle {
    pub fn agent_id(&self) -> AgentId {
        self.agent_id
    }

    /// OS process id, if the OS reported one at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Agent configuration the worker was spawned with
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Killed by the controller or exited on its own
    pub fn is_killed(&self) -> bool {
        self.state.killed.load(Ordering::Acquire)
    }

    pub fn has_exited(&self) -> bool {
        self.state.exited.load(Ordering::Acquire)
    }

    /// Exit code once the process has exited normally
    pub fn exit_code(&self) -> Option<i32> {
        *self.state.exit_code.lock()
    }

    pub(crate) fn mark_killed(&self) {
        self.state.killed.store(true, Ordering::Release);
    }

    /// Queue a message for the worker's stdin; `false` if the writer is gone
    pub(crate) fn send(&self, message: ControllerMessage) -> bool {
        self.outbox.send(message).is_ok()
    }

    fn record_exit(&self, code: Option<i32>) {
        *self.state.exit_code.lock() = code;
        self.state.exited.store(true, Ordering::Release);
        self.mark_killed();
    }

    /// Take ownership of a freshly spawned child and start its pumps
    pub(crate) fn attach(mut child: Child, config: AgentConfig, router: Arc<dyn WorkerRouter>) -> Self {
        let agent_id = config.id;
        let pid = child.id();
        let (outbox, inbox) = mpsc::unbounded_channel();

        let handle = Self {
            agent_id,
            pid,
            config,
            started_at: Utc::now(),
            state: Arc::new(WorkerState::default()),
            outbox,
        };

        match child.stdin.take() {
            Some(stdin) => {
                tokio::spawn(write_loop(agent_id, stdin, inbox));
            }
            None => warn!("Agent {} worker has no stdin, messages will be dropped", agent_id),
        }

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(read_loop(agent_id, stdout, Arc::clone(&router)));
        }

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(stderr_loop(agent_id, stderr));
        }

        let waiter = handle.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => {
                    info!("Agent {} worker (PID {:?}) exited: {}", agent_id, pid, status);
                    status.code()
                }
                Err(e) => {
                    warn!("Failed to wait for agent {} worker: {}", agent_id, e);
                    None
                }
            };
            waiter.record_exit(code);
            router.exited(agent_id, pid, code);
        });

        handle
    }
}

async fn write_loop(
    agent_id: AgentId,
    stdin: ChildStdin,
    mut inbox: mpsc::UnboundedReceiver<ControllerMessage>,
) {
    let mut sink = FramedWrite::new(stdin, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    while let Some(message) = inbox.recv().await {
        let line = match serde_json::to_string(&message) {
            Ok(line) => line,
            Err(e) => {
                warn!("Dropping unserializable message for agent {}: {}", agent_id, e);
                continue;
            }
        };

        if let Err(e) = sink.send(line).await {
            debug!("Agent {} stdin closed: {}", agent_id, e);
            break;
        }
    }

    trace!("Agent {} writer finished", agent_id);
}

/// One newline-delimited frame read from a worker stream
#[derive(Debug, PartialEq)]
enum Frame {
    /// Raw line content without the delimiter
    Line(Bytes),

    /// A line longer than the limit; its bytes were discarded
    Oversized,
}

/// Newline framing that reports over-long lines as frames instead of errors.
///
/// `FramedRead` stops after the first decode error, so only real I/O
/// failures are surfaced as `Err`.
struct LineFrames {
    inner: AnyDelimiterCodec,
}

impl LineFrames {
    fn new(max_length: usize) -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), max_length),
        }
    }

    fn map(result: Result<Option<Bytes>, AnyDelimiterCodecError>) -> io::Result<Option<Frame>> {
        match result {
            Ok(line) => Ok(line.map(Frame::Line)),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Frame::Oversized)),
            Err(AnyDelimiterCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for LineFrames {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        Self::map(self.inner.decode(buf))
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        Self::map(self.inner.decode_eof(buf))
    }
}

async fn read_loop(agent_id: AgentId, stdout: ChildStdout, router: Arc<dyn WorkerRouter>) {
    let mut frames = FramedRead::new(stdout, LineFrames::new(MAX_LINE_LENGTH));

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Frame::Line(bytes)) => {
                let line = String::from_utf8_lossy(&bytes);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<WorkerMessage>(line) {
                    Ok(message) => router.route(agent_id, message),
                    Err(e) => warn!("Unparseable message from agent {}: {} ({})", agent_id, e, line),
                }
            }
            Ok(Frame::Oversized) => {
                warn!("Agent {} sent a line longer than {} bytes, skipped", agent_id, MAX_LINE_LENGTH);
            }
            Err(e) => {
                debug!("Agent {} stdout closed: {}", agent_id, e);
                break;
            }
        }
    }

    trace!("Agent {} reader finished", agent_id);
}

/// Drains stderr until the pipe closes; dropping it early would SIGPIPE the worker
async fn stderr_loop(agent_id: AgentId, stderr: ChildStderr) {
    let mut frames = FramedRead::new(stderr, LineFrames::new(MAX_LINE_LENGTH));

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Frame::Line(bytes)) => debug!(agent_id, "worker stderr: {}", String::from_utf8_lossy(&bytes).trim_end()),
            Ok(Frame::Oversized) => debug!(agent_id, "worker stderr: <line over {} bytes>", MAX_LINE_LENGTH),
            Err(e) => {
                debug!("Agent {} stderr closed: {}", agent_id, e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_tolerate_invalid_utf8() {
        let mut codec = LineFrames::new(64);
        let mut buf = BytesMut::from(&b"\xff\xfe\n{\"type\":\"ready\"}\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Line(Bytes::from_static(b"\xff\xfe"))));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Line(Bytes::from_static(br#"{"type":"ready"}"#)))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_oversized_line_is_reported_then_skipped() {
        let mut codec = LineFrames::new(8);
        let mut buf = BytesMut::from(&b"aaaaaaaaaaaaaaaaaaaa"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Oversized));

        buf.extend_from_slice(b"aaaa\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Line(Bytes::from_static(b"ok"))));
    }

    #[test]
    fn test_unterminated_tail_is_flushed_at_eof() {
        let mut codec = LineFrames::new(64);
        let mut buf = BytesMut::from(&b"last"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), Some(Frame::Line(Bytes::from_static(b"last"))));
    }
}
