//! Subprocess transport implementation

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::transport::{ProcessExit, Transport};

use super::config::{LaunchSpec, TransportOptions};

/// Subprocess transport for one provider process
pub struct SubprocessTransport {
    pub(super) spec: LaunchSpec,
    /// Prefix for log lines, `<kind>/<short session id>`
    pub(super) label: String,
    pub(super) options: TransportOptions,
    pub(super) stdin: Option<ChildStdin>,
    pub(super) stdout: Option<ChildStdout>,
    pub(super) pid: Option<u32>,
    pub(super) ready: Arc<AtomicBool>,
    pub(super) reader_task: Option<JoinHandle<()>>,
    pub(super) stderr_task: Option<JoinHandle<()>>,
    pub(super) exit_task: Option<JoinHandle<()>>,
    /// Handed to the exit task on connect
    pub(super) exit_tx: Option<watch::Sender<Option<ProcessExit>>>,
    pub(super) exit_rx: watch::Receiver<Option<ProcessExit>>,
    /// Cancelling it makes the exit task kill the child
    pub(super) kill: CancellationToken,
}

impl SubprocessTransport {
    /// Create a transport for a provider; nothing is started until `connect`
    pub fn new(spec: LaunchSpec, label: impl Into<String>, options: TransportOptions) -> Self {
        let (exit_tx, exit_rx) = watch::channel(None);
        Self {
            spec,
            label: label.into(),
            options,
            stdin: None,
            stdout: None,
            pid: None,
            ready: Arc::new(AtomicBool::new(false)),
            reader_task: None,
            stderr_task: None,
            exit_task: None,
            exit_tx: Some(exit_tx),
            exit_rx,
            kill: CancellationToken::new(),
        }
    }

    /// OS process id, once connected
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Launch parameters this transport was built from
    #[must_use]
    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// Handle that force-kills the process when cancelled
    ///
    /// Usable from outside the task that owns the transport, e.g. while a
    /// write to a provider that stopped reading is still pending.
    #[must_use]
    pub fn kill_handle(&self) -> CancellationToken {
        self.kill.clone()
    }

    /// Whether the process has been observed to exit
    #[must_use]
    pub fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }
}

impl Transport for SubprocessTransport {
    async fn connect(&mut self) -> Result<()> {
        self.connect_impl().await
    }

    async fn write(&mut self, message: &serde_json::Value) -> Result<()> {
        if self.has_exited() {
            return Err(BridgeError::process_gone(&self.label));
        }

        let label = self.label.clone();
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| BridgeError::process_gone(&label))?;

        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        stdin
            .write_all(&line)
            .await
            .map_err(|e| write_error(&label, e))?;
        stdin.flush().await.map_err(|e| write_error(&label, e))?;

        Ok(())
    }

    fn read_messages(&mut self) -> mpsc::UnboundedReceiver<serde_json::Value> {
        self.read_messages_impl()
    }

    fn exit_status(&self) -> watch::Receiver<Option<ProcessExit>> {
        self.exit_rx.clone()
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst) && !self.has_exited()
    }

    async fn close(&mut self) -> Result<()> {
        self.close_impl().await
    }
}

fn write_error(label: &str, e: io::Error) -> BridgeError {
    if e.kind() == io::ErrorKind::BrokenPipe {
        BridgeError::process_gone(label)
    } else {
        BridgeError::Io(e)
    }
}

impl Drop for SubprocessTransport {
    fn drop(&mut self) {
        self.drop_impl();
    }
}
