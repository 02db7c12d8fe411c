//! Background task for provider sessions
//!
//! Each session has one collector task. It owns the transport, applies
//! commands from the session in order and routes decoded output back to it.

use std::sync::Weak;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::commands::SessionCommand;
use super::session::BridgeSession;
use crate::error::BridgeError;
use crate::transport::{ProcessExit, Transport};

/// Spawn the collector for one session
///
/// The task runs until it receives `Shutdown`, the session is dropped, or
/// its command channel closes. Output keeps flowing after the process exits
/// until stdout is fully drained, so replies written just before exit are
/// still delivered.
///
/// A write to a provider that stopped reading its input never completes on
/// its own; it is abandoned once `kill` is cancelled so the collector can
/// still receive `Shutdown`.
///
/// # Arguments
/// * `transport` - Connected transport (task takes ownership)
/// * `messages_rx` - Decoded stdout messages from the transport
/// * `exit_rx` - Exit watch from the transport
/// * `command_rx` - Commands from the session
/// * `kill` - Force-kill handle of the transport
/// * `session` - Session receiving output; held weakly so the registry alone
///   decides its lifetime
pub(crate) fn spawn_message_collector<T>(
    mut transport: T,
    mut messages_rx: mpsc::UnboundedReceiver<serde_json::Value>,
    mut exit_rx: watch::Receiver<Option<ProcessExit>>,
    mut command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    kill: CancellationToken,
    session: Weak<BridgeSession>,
) -> JoinHandle<()>
where
    T: Transport + 'static,
{
    tokio::spawn(async move {
        let label = session
            .upgrade()
            .map(|s| s.label().to_string())
            .unwrap_or_default();
        let mut stdout_open = true;
        let mut running = exit_rx.borrow().is_none();

        loop {
            tokio::select! {
                biased;

                // Handle commands from the session
                cmd = command_rx.recv() => match cmd {
                    Some(SessionCommand::Write { message, response_tx }) => {
                        log::trace!("[{label}] -> {message}");
                        let result = tokio::select! {
                            result = transport.write(&message) => result,
                            () = kill.cancelled() => {
                                log::debug!("[{label}] write abandoned, provider killed");
                                Err(BridgeError::process_gone(&label))
                            }
                        };
                        let _ = response_tx.send(result);
                    }
                    Some(SessionCommand::Shutdown { response_tx }) => {
                        let result = transport.close().await;
                        let _ = response_tx.send(result);
                        break;
                    }
                    None => {
                        // Session dropped from the registry
                        if let Err(e) = transport.close().await {
                            log::warn!("[{label}] close failed: {e}");
                        }
                        break;
                    }
                },

                // Process decoded output
                msg = messages_rx.recv(), if stdout_open => match msg {
                    Some(message) => {
                        log::trace!("[{label}] <- {message}");
                        let Some(session) = session.upgrade() else {
                            break;
                        };
                        session.accept_output(message);
                    }
                    None => {
                        log::debug!("[{label}] output stream ended");
                        stdout_open = false;
                    }
                },

                // Surface process termination
                changed = exit_rx.changed(), if running => {
                    running = false;
                    if changed.is_ok() {
                        let exit = *exit_rx.borrow();
                        if let Some(exit) = exit {
                            log::debug!("[{label}] provider process ended with {exit}");
                        }
                    }
                }
            }
        }

        log::debug!("[{label}] collector stopped");
    })
}
