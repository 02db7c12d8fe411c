//! Error types for the provider bridge

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Main error type for the provider bridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Requested provider kind has no entry in the provider table
    #[error("Unknown provider kind: {0}")]
    UnknownProviderKind(String),

    /// Provider process could not be launched
    #[error("Failed to spawn provider '{kind}': {message}")]
    Spawn {
        /// Provider kind that failed to launch
        kind: String,
        /// Error message
        message: String,
    },

    /// Provider process has exited; the session cannot be used any more
    #[error("Provider process for session {0} is gone")]
    ProcessGone(String),

    /// Provider emitted a line that is not a JSON message
    #[error("Malformed output line: {reason}")]
    MalformedOutputLine {
        /// Parser error
        reason: String,
        /// The offending line (possibly truncated)
        line: String,
    },

    /// Session identifier is unknown, expired or bound to another provider
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Request requires a session identifier but none was supplied
    #[error("Missing session identifier")]
    MissingSession,

    /// Inbound request body is not a JSON message
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Authentication gate rejected the request
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Maximum concurrent sessions reached
    #[error("Maximum active sessions reached: {0}")]
    SessionLimit(usize),

    /// Secret lookup failed while building a provider environment
    #[error("Secret error: {0}")]
    Secret(String),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Create an unknown provider kind error
    pub fn unknown_provider(kind: impl Into<String>) -> Self {
        Self::UnknownProviderKind(kind.into())
    }

    /// Create a spawn error
    pub fn spawn(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Spawn {
            kind: kind.into(),
            message: msg.into(),
        }
    }

    /// Create a process gone error
    pub fn process_gone(session_id: impl Into<String>) -> Self {
        Self::ProcessGone(session_id.into())
    }

    /// Create a malformed output line error
    pub fn malformed_line(reason: impl Into<String>, line: impl Into<String>) -> Self {
        Self::MalformedOutputLine {
            reason: reason.into(),
            line: line.into(),
        }
    }

    /// Create an invalid session error
    pub fn invalid_session(msg: impl Into<String>) -> Self {
        Self::InvalidSession(msg.into())
    }

    /// Create an invalid message error
    pub fn invalid_message(msg: impl Into<String>) -> Self {
        Self::InvalidMessage(msg.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a session limit error
    #[must_use]
    pub fn session_limit(max: usize) -> Self {
        Self::SessionLimit(max)
    }

    /// Create a secret error
    pub fn secret(msg: impl Into<String>) -> Self {
        Self::Secret(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Stable taxonomy name reported to clients
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownProviderKind(_) => "UnknownProviderKind",
            Self::Spawn { .. } | Self::Secret(_) => "SpawnError",
            Self::ProcessGone(_) => "ProcessGone",
            Self::MalformedOutputLine { .. } => "MalformedOutputLine",
            Self::InvalidSession(_) | Self::MissingSession => "InvalidSession",
            Self::InvalidMessage(_) | Self::JsonDecode(_) => "InvalidMessage",
            Self::Unauthorized(_) => "Unauthorized",
            Self::SessionLimit(_) => "SessionLimit",
            Self::Io(_) | Self::InvalidConfig(_) => "InternalError",
        }
    }

    /// HTTP status used when the error reaches a client
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::UnknownProviderKind(_)
            | Self::InvalidSession(_)
            | Self::MissingSession
            | Self::InvalidMessage(_)
            | Self::JsonDecode(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::ProcessGone(_) => StatusCode::GONE,
            Self::SessionLimit(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Spawn { .. }
            | Self::Secret(_)
            | Self::MalformedOutputLine { .. }
            | Self::Io(_)
            | Self::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("Request failed: {self}");
        } else {
            log::debug!("Request rejected: {self}");
        }
        let body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
