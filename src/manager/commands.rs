//! Session command protocol
//!
//! Defines the command messages sent to a session's collector task, which
//! owns the provider transport, so writes never need a lock on it.

use tokio::sync::oneshot;

use crate::error::Result;

/// Commands that can be sent to a session collector task
pub(crate) enum SessionCommand {
    /// Write one message to the provider's stdin
    Write {
        /// Opaque message to forward
        message: serde_json::Value,
        /// Channel to send the write result back
        response_tx: oneshot::Sender<Result<()>>,
    },

    /// Close the provider and stop the collector
    Shutdown {
        /// Channel to send the shutdown confirmation back
        response_tx: oneshot::Sender<Result<()>>,
    },
}
