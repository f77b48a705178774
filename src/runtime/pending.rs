// src/runtime/pending.rs
//! Correlation tables for in-flight worker requests
//!
//! Each table maps a caller-generated correlation id to the handler that
//! settles it. The table never expires entries on its own: whoever issues a
//! request owns its timeout. A response for an unknown id (late, duplicate,
//! or already timed out) is dropped silently.

use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

type ResolveFn = Box<dyn FnOnce(Value) + Send>;
type RejectFn = Box<dyn FnOnce(EngineError) + Send>;

/// Settlement callbacks for one pending request
pub struct PendingHandler {
    resolve: ResolveFn,
    reject: Option<RejectFn>,
    timeout: Option<AbortHandle>,
}

impl PendingHandler {
    pub fn new(resolve: impl FnOnce(Value) + Send + 'static) -> Self {
        Self {
            resolve: Box::new(resolve),
            reject: None,
            timeout: None,
        }
    }

    pub fn with_reject(mut self, reject: impl FnOnce(EngineError) + Send + 'static) -> Self {
        self.reject = Some(Box::new(reject));
        self
    }

    /// Attach the task backing this request's timeout; it is aborted on settlement
    pub fn with_timeout(mut self, timeout: AbortHandle) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn settle(self, payload: Value, error: Option<String>) {
        if let Some(timeout) = &self.timeout {
            timeout.abort();
        }

        match (error, self.reject) {
            (Some(message), Some(reject)) => reject(EngineError::RequestRejected(message)),
            (Some(message), None) => {
                warn!("Request failed with '{}' but has no reject handler, resolving instead", message);
                (self.resolve)(payload)
            }
            (None, _) => (self.resolve)(payload),
        }
    }
}

impl std::fmt::Debug for PendingHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingHandler")
            .field("has_reject", &self.reject.is_some())
            .field("has_timeout", &self.timeout.is_some())
            .finish()
    }
}

/// One correlation table
#[derive(Debug)]
pub struct PendingRequests {
    /// Table name, used in logs and metric labels
    name: &'static str,

    entries: Mutex<HashMap<String, PendingHandler>>,
}

impl PendingRequests {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Register a handler, replacing any previous handler for the same id
    pub fn add(&self, correlation_id: impl Into<String>, handler: PendingHandler) {
        let correlation_id = correlation_id.into();
        trace!("[{}] pending request {}", self.name, correlation_id);
        let previous = self.entries.lock().insert(correlation_id.clone(), handler);
        if let Some(previous) = previous {
            if let Some(timeout) = previous.timeout {
                timeout.abort();
            }
            warn!("[{}] correlation id {} was reused", self.name, correlation_id);
        }
    }

    /// Settle a pending request.
    ///
    /// With `error` set the handler's reject path runs, otherwise its resolve
    /// path. Returns `false` when no request with this id is pending.
    pub fn resolve(&self, correlation_id: &str, payload: Value, error: Option<String>) -> bool {
        // Callbacks run after the table lock is released
        let removed = self.entries.lock().remove(correlation_id);
        let Some(handler) = removed else {
            debug!("[{}] no pending request for {}, ignoring response", self.name, correlation_id);
            return false;
        };

        metrics::counter!("fleet_pending_requests_resolved_total", "table" => self.name).increment(1);
        handler.settle(payload, error);
        true
    }

    /// Drop a pending entry without settling it
    pub fn remove(&self, correlation_id: &str) -> bool {
        let removed = self.entries.lock().remove(correlation_id);
        match removed {
            Some(handler) => {
                if let Some(timeout) = handler.timeout {
                    timeout.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.entries.lock().contains_key(correlation_id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Register a request whose reply is awaited as a future.
    ///
    /// The returned [`PendingReply`] owns the timeout: when it fires the
    /// entry is removed and the reply yields [`EngineError::RequestTimeout`].
    /// Must be called from within a Tokio runtime.
    pub fn register(self: &Arc<Self>, correlation_id: impl Into<String>, timeout: Duration) -> PendingReply {
        let correlation_id = correlation_id.into();
        let (tx, rx) = oneshot::channel::<Result<Value>>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let on_resolve = Arc::clone(&tx);
        let on_reject = Arc::clone(&tx);
        let handler = PendingHandler::new(move |payload| {
            if let Some(tx) = on_resolve.lock().take() {
                let _ = tx.send(Ok(payload));
            }
        })
        .with_reject(move |err| {
            if let Some(tx) = on_reject.lock().take() {
                let _ = tx.send(Err(err));
            }
        });
        self.add(correlation_id.clone(), handler);

        let table = Arc::clone(self);
        let id = correlation_id.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = table.entries.lock().remove(&id);
            if let Some(handler) = expired {
                debug!("[{}] request {} timed out after {:?}", table.name, id, timeout);
                if let Some(reject) = handler.reject {
                    reject(EngineError::RequestTimeout);
                }
            }
        });

        // The response may already have settled the entry; the timer then finds nothing
        if let Some(entry) = self.entries.lock().get_mut(&correlation_id) {
            entry.timeout = Some(timer.abort_handle());
        }

        PendingReply { correlation_id, rx }
    }
}

/// Future resolving to the worker's reply for one registered request
#[derive(Debug)]
pub struct PendingReply {
    correlation_id: String,
    rx: oneshot::Receiver<Result<Value>>,
}

impl PendingReply {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl Future for PendingReply {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(EngineError::RequestCancelled)))
    }
}
