//! Response types reported by the bridge
//!
//! Health snapshots, poll results and the "accepted, no data yet" reply.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifiers::{ProviderKind, SessionId};
use crate::transport::ProcessExit;

/// Point-in-time view of one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    /// Session identifier
    pub session_id: SessionId,
    /// Provider kind the session is bound to
    pub kind: ProviderKind,
    /// Whether the provider process is still running
    pub alive: bool,
    /// Whether the provider answered its protocol handshake
    pub initialized: bool,
    /// Messages waiting for a poll or stream attach
    pub response_count: usize,
    /// Whether a push stream is currently attached
    pub streaming: bool,
    /// OS process id of the provider, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    /// Exit information once the provider has terminated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit: Option<ProcessExit>,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// Seconds since the last inbound or outbound message
    pub idle_seconds: u64,
}

/// Body of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always "OK" while the service is answering
    pub status: String,
    /// Crate version
    pub version: String,
    /// Seconds since the server started
    pub uptime_seconds: u64,
    /// Number of registered sessions
    pub active_sessions: usize,
    /// Per-session status keyed by `<kind>-<short id>`
    pub sessions: BTreeMap<String, SessionStatus>,
    /// Provider kinds available in the provider table
    pub available_servers: Vec<String>,
}

/// Body returned by the poll endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    /// Session the messages belong to
    pub session_id: SessionId,
    /// Buffered provider messages, oldest first
    pub responses: Vec<serde_json::Value>,
}

/// Body of a `202 Accepted` pull-mode reply
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedResponse {
    /// Session to poll for the eventual reply
    pub session_id: SessionId,
}
