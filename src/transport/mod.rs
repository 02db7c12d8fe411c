//! Transport layer for communicating with provider processes
//!
//! This module provides the transport abstraction and the subprocess
//! implementation used for every provider kind.

pub mod subprocess;

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};

use crate::error::Result;

/// How a provider process terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessExit {
    /// Exit code, if the process exited normally
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    /// Terminating signal, if the process was killed by one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// Exit with nothing known about the status
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            code: None,
            signal: None,
        }
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit code {code}"),
            (None, Some(signal)) => write!(f, "signal {signal}"),
            (None, None) => f.write_str("unknown status"),
        }
    }
}

/// Transport trait for communicating with a provider
///
/// Messages are opaque JSON values: one value per line on the way in, one
/// decoded line per value on the way out.
pub trait Transport: Send + Sync {
    /// Launch the provider and wire up its pipes
    ///
    /// # Errors
    /// Returns error if the process cannot be started
    fn connect(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Write one message to the provider's input
    ///
    /// # Errors
    /// Returns `BridgeError::ProcessGone` once the provider has exited
    fn write(
        &mut self,
        message: &serde_json::Value,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Take the stream of decoded output messages
    ///
    /// Spawns the background reader on first call. Malformed lines are logged
    /// by the reader and never appear on this channel. The channel closes when
    /// the provider's output ends.
    fn read_messages(&mut self) -> mpsc::UnboundedReceiver<serde_json::Value>;

    /// Watch that flips from `None` to `Some` exactly once, when the process exits
    fn exit_status(&self) -> watch::Receiver<Option<ProcessExit>>;

    /// Check if the transport is ready for communication
    fn is_ready(&self) -> bool;

    /// Close the transport: end input, wait briefly, then force termination
    ///
    /// # Errors
    /// Returns error if cleanup fails
    fn close(&mut self) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub use subprocess::{DecodedLine, LaunchSpec, LineCodec, SubprocessTransport};
