//! Session state
//!
//! A [`BridgeSession`] binds a client-visible id to one provider process, the
//! FIFO of output not yet delivered and at most one attached push sink. All
//! mutable state sits behind one lock so append, drain, attach and detach
//! never interleave.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::delivery::{DeliverySink, PollBuffer, StreamReceiver, StreamSink, stream_channel};
use crate::error::{BridgeError, Result};
use crate::transport::ProcessExit;
use crate::types::{ProviderKind, SessionId, SessionStatus};

use super::commands::SessionCommand;
use super::helpers::{is_handshake_response, session_label};

/// Mutable part of a session
#[derive(Debug)]
struct SessionState {
    /// Output waiting for a poll or an attach
    pending: PollBuffer,
    /// Attached push sink, if any
    sink: Option<StreamSink>,
    /// Bumped on every attach; identifies the current subscription
    generation: u64,
    /// Provider has answered its handshake
    initialized: bool,
    /// Last inbound or outbound message
    last_activity: Instant,
}

/// One client session bound to one provider process
pub struct BridgeSession {
    id: SessionId,
    kind: ProviderKind,
    label: String,
    created_at: DateTime<Utc>,
    pid: Option<u32>,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    exit_rx: watch::Receiver<Option<ProcessExit>>,
    /// Force-kill handle of the provider process
    kill: CancellationToken,
    /// How long a graceful shutdown may take before the process is killed
    shutdown_grace: Duration,
    state: Mutex<SessionState>,
    output_ready: Notify,
}

impl BridgeSession {
    pub(crate) fn new(
        id: SessionId,
        kind: ProviderKind,
        pid: Option<u32>,
        command_tx: mpsc::UnboundedSender<SessionCommand>,
        exit_rx: watch::Receiver<Option<ProcessExit>>,
        kill: CancellationToken,
        shutdown_grace: Duration,
    ) -> Self {
        let label = session_label(&kind, &id);
        Self {
            id,
            kind,
            label,
            created_at: Utc::now(),
            pid,
            command_tx,
            exit_rx,
            kill,
            shutdown_grace,
            state: Mutex::new(SessionState {
                pending: PollBuffer::new(),
                sink: None,
                generation: 0,
                initialized: false,
                last_activity: Instant::now(),
            }),
            output_ready: Notify::new(),
        }
    }

    /// Session identifier
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Provider kind this session is bound to
    #[must_use]
    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }

    /// Log prefix, `<kind>/<short id>`
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// When the session was created
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// OS process id of the provider
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit information once the provider has terminated
    #[must_use]
    pub fn exit(&self) -> Option<ProcessExit> {
        *self.exit_rx.borrow()
    }

    /// Whether the provider process is still running
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.exit_rx.borrow().is_none()
    }

    /// Whether the provider has answered its handshake
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    /// Whether a push stream is attached
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state.lock().sink.is_some()
    }

    /// Number of messages waiting for a poll
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Time since the last inbound or outbound message
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.state.lock().last_activity.elapsed()
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Forward a message to the provider's stdin
    ///
    /// # Errors
    /// Returns `BridgeError::ProcessGone` if the provider has exited or the
    /// session's collector has stopped
    pub async fn write(&self, message: Value) -> Result<()> {
        if !self.is_alive() {
            return Err(BridgeError::process_gone(self.id.as_str()));
        }
        self.touch();

        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Write {
                message,
                response_tx,
            })
            .map_err(|_| BridgeError::process_gone(self.id.as_str()))?;

        response_rx
            .await
            .map_err(|_| BridgeError::process_gone(self.id.as_str()))?
            .map_err(|e| match e {
                BridgeError::ProcessGone(_) => BridgeError::process_gone(self.id.as_str()),
                other => other,
            })
    }

    /// Ask the collector to close the provider and wait for it
    ///
    /// # Errors
    /// Returns error if closing the transport fails
    pub(crate) async fn shutdown(&self) -> Result<()> {
        let (response_tx, response_rx) = oneshot::channel();
        if self
            .command_tx
            .send(SessionCommand::Shutdown { response_tx })
            .is_err()
        {
            // Collector already gone
            return Ok(());
        }
        response_rx.await.unwrap_or(Ok(()))
    }

    /// Time a graceful [`shutdown`](Self::shutdown) is allowed before the
    /// provider is killed
    pub(crate) fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }

    /// Kill the provider process without waiting for the collector
    ///
    /// Pending writes fail with `ProcessGone`; the exit is published once the
    /// process has been reaped.
    pub fn kill(&self) {
        self.kill.cancel();
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Route one decoded provider message to the sink or the poll buffer
    pub(crate) fn accept_output(&self, message: Value) {
        {
            let mut state = self.state.lock();
            state.last_activity = Instant::now();
            if !state.initialized && is_handshake_response(&message) {
                state.initialized = true;
                log::debug!("[{}] provider initialized", self.label);
            }

            let undelivered = match state.sink.as_mut() {
                Some(sink) => sink.deliver(vec![message]).err(),
                None => Some(vec![message]),
            };
            if let Some(messages) = undelivered {
                if let Some(sink) = state.sink.take() {
                    log::debug!(
                        "[{}] stream sink {} closed, buffering",
                        self.label,
                        sink.generation()
                    );
                }
                // PollBuffer::deliver never refuses
                let _ = state.pending.deliver(messages);
            }
        }
        self.output_ready.notify_waiters();
    }

    /// Take the oldest buffered message
    pub fn poll_one(&self) -> Option<Value> {
        let mut state = self.state.lock();
        state.last_activity = Instant::now();
        state.pending.pop_front()
    }

    /// Take every buffered message, oldest first
    pub fn poll_all(&self) -> Vec<Value> {
        let mut state = self.state.lock();
        state.last_activity = Instant::now();
        state.pending.drain_all()
    }

    /// Wait until output is buffered, at most `grace`
    pub async fn wait_for_output(&self, grace: Duration) {
        let notified = self.output_ready.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.pending_count() > 0 {
            return;
        }
        let _ = tokio::time::timeout(grace, notified).await;
    }

    // ========================================================================
    // Push sinks
    // ========================================================================

    /// Attach a new push sink, replacing any current one
    ///
    /// Everything the previous sink had not emitted and everything buffered
    /// is handed to the new sink in order. Returns the attach generation and
    /// the receiving half.
    pub(crate) fn attach_sink(&self) -> (u64, StreamReceiver) {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;
        let (mut sink, receiver) = stream_channel(generation);

        let mut backlog = state.sink.take().map(|old| old.close()).unwrap_or_default();
        backlog.extend(state.pending.drain_all());
        if !backlog.is_empty() {
            log::debug!(
                "[{}] flushing {} buffered messages to stream {generation}",
                self.label,
                backlog.len()
            );
            if let Err(messages) = sink.deliver(backlog) {
                state.pending.prepend(messages);
            }
        }

        state.sink = Some(sink);
        state.last_activity = Instant::now();
        (generation, receiver)
    }

    /// Detach the sink of a given generation, keeping its undelivered output
    ///
    /// Returns false if that sink was already replaced or detached.
    pub(crate) fn detach_sink(&self, generation: u64) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        let Some(sink) = state.sink.take() else {
            return false;
        };
        let residue = sink.close();
        if !residue.is_empty() {
            log::debug!(
                "[{}] requeueing {} undelivered messages",
                self.label,
                residue.len()
            );
            state.pending.prepend(residue);
        }
        true
    }

    /// Detach whatever sink is attached so its stream ends
    pub(crate) fn close_stream(&self) {
        let generation = self.state.lock().generation;
        self.detach_sink(generation);
    }

    fn touch(&self) {
        self.state.lock().last_activity = Instant::now();
    }

    /// Point-in-time status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        let exit = self.exit();
        let state = self.state.lock();
        SessionStatus {
            session_id: self.id.clone(),
            kind: self.kind.clone(),
            alive: exit.is_none(),
            initialized: state.initialized,
            response_count: state.pending.len(),
            streaming: state.sink.is_some(),
            pid: self.pid,
            exit,
            created_at: self.created_at,
            idle_seconds: state.last_activity.elapsed().as_secs(),
        }
    }
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}
