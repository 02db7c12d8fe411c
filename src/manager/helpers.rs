//! Helper functions for message processing
//!
//! Pure functions; the bridge never interprets payloads beyond these.

use serde_json::Value;

use crate::types::{ProviderKind, SessionId};

/// Whether a provider message is the reply to the protocol handshake
///
/// Only informational: the first such reply marks a session initialized.
pub(crate) fn is_handshake_response(message: &Value) -> bool {
    message
        .get("result")
        .and_then(|result| result.get("protocolVersion"))
        .is_some()
}

/// Log prefix for a session, `<kind>/<short id>`
pub(crate) fn session_label(kind: &ProviderKind, id: &SessionId) -> String {
    format!("{kind}/{}", id.short())
}

/// Key used for a session in the health report, `<kind>-<short id>`
pub(crate) fn health_key(kind: &ProviderKind, id: &SessionId) -> String {
    format!("{kind}-{}", id.short())
}
