//! Realtime channel to the diagnosis backend.
//!
//! ARCHITECTURE
//! ============
//! [`RealtimeHandle::connect`] spawns one background task that owns the
//! websocket and speaks Socket.IO over Engine.IO v4. The handle is cheap to
//! clone and talks to the task through three channels:
//!
//! - outbound sends go through a bounded mpsc queue,
//! - connection state is published on a `watch`,
//! - inbound events fan out on a `broadcast`.
//!
//! READINESS
//! =========
//! Sends issued before the namespace connect is acknowledged stay in the
//! queue and are flushed in order once the state turns `Connected`. A full
//! queue rejects the send instead of blocking. Callers that need the link
//! up first use [`RealtimeHandle::wait_connected`].

mod connection;
pub mod tls;

use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::RealtimeConfig;

/// Event the server answers `send_message` with.
pub const RESPONSE_EVENT: &str = "response";
/// Event carrying `{ "message": ... }` to the server.
pub const SEND_MESSAGE_EVENT: &str = "send_message";

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("tls setup failed: {0}")]
    Tls(String),
    #[error("packet codec failed: {0}")]
    Codec(#[from] wire::CodecError),
    #[error("server refused namespace `{namespace}`: {message}")]
    Refused { namespace: String, message: String },
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("no traffic for {0} ms")]
    Timeout(u64),
    #[error("send queue is full ({0} pending)")]
    QueueFull(usize),
    #[error("realtime connection is closed")]
    Closed,
    #[error("realtime connection failed: {0}")]
    Failed(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Connect(Box::new(error))
    }
}

/// Lifecycle of the single realtime connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected { sid: String },
    Errored(String),
    Closed,
}

/// Inbound notification fanned out to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    Connected { sid: String },
    /// Payload of a `response` event.
    Response(Value),
    /// Any other server event.
    Event { name: String, args: Vec<Value> },
    ConnectError(String),
    Disconnected { reason: String },
}

#[derive(Debug, Clone)]
pub(crate) struct Outbound {
    pub event: String,
    pub payload: Value,
}

#[derive(Clone)]
pub struct RealtimeHandle {
    outbound: mpsc::Sender<Outbound>,
    state: watch::Receiver<ConnectionState>,
    events: broadcast::Sender<RealtimeEvent>,
    shutdown: Arc<Notify>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
    capacity: usize,
}

impl RealtimeHandle {
    /// Spawn the connection task. Returns immediately in `Connecting`.
    ///
    /// Must be called inside a tokio runtime. `config` must already be
    /// validated.
    #[must_use]
    pub fn connect(config: &RealtimeConfig) -> Self {
        let capacity = config.send_queue_capacity.max(1);
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let shutdown = Arc::new(Notify::new());

        let driver = connection::Driver {
            config: config.clone(),
            outbound: outbound_rx,
            state: state_tx,
            events: events_tx.clone(),
            shutdown: Arc::clone(&shutdown),
        };
        let task = tokio::spawn(driver.run());

        Self {
            outbound: outbound_tx,
            state: state_rx,
            events: events_tx,
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
            capacity,
        }
    }

    /// Emit `send_message` with `{ "message": message }`.
    ///
    /// # Errors
    ///
    /// See [`RealtimeHandle::emit`].
    pub fn send_message(&self, message: &str) -> Result<(), RealtimeError> {
        self.emit(SEND_MESSAGE_EVENT, json!({ "message": message }))
    }

    /// Queue an event for the server. Never waits for readiness.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::QueueFull`] when the bounded queue is full and
    /// [`RealtimeError::Closed`] after shutdown.
    pub fn emit(&self, event: &str, payload: Value) -> Result<(), RealtimeError> {
        let item = Outbound { event: event.to_owned(), payload };
        self.outbound.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RealtimeError::QueueFull(self.capacity),
            mpsc::error::TrySendError::Closed(_) => RealtimeError::Closed,
        })?;
        tracing::debug!(event, connected = self.is_connected(), "realtime send queued");
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(*self.state.borrow(), ConnectionState::Connected { .. })
    }

    /// Receiver for inbound events. Events sent before subscribing are not
    /// replayed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeEvent> {
        self.events.subscribe()
    }

    /// Resolve once the namespace connect is acknowledged.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Failed`] if the task gave up after an error
    /// and [`RealtimeError::Closed`] after shutdown.
    pub async fn wait_connected(&self) -> Result<String, RealtimeError> {
        let mut state = self.state.clone();
        let outcome = state
            .wait_for(|s| matches!(s, ConnectionState::Connected { .. } | ConnectionState::Closed))
            .await
            .map(|s| s.clone());
        match outcome {
            Ok(ConnectionState::Connected { sid }) => Ok(sid),
            Ok(_) => Err(RealtimeError::Closed),
            Err(_) => match state.borrow().clone() {
                ConnectionState::Errored(reason) => Err(RealtimeError::Failed(reason)),
                _ => Err(RealtimeError::Closed),
            },
        }
    }

    /// Disconnect politely and wait for the task to finish.
    pub async fn close(&self) {
        self.shutdown.notify_one();
        let task = self.task.lock().ok().and_then(|mut guard| guard.take());
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "realtime task ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for RealtimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeHandle").field("state", &*self.state.borrow()).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
