//! Session resolution, lookup and deletion

use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::types::{ProviderKind, SessionId};

use super::super::session::BridgeSession;
use super::core::{SessionManager, teardown};

/// Outcome of [`SessionManager::resolve`]
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The live session
    pub session: Arc<BridgeSession>,
    /// Whether it was created by this call
    pub created: bool,
}

impl SessionManager {
    /// Find the session a request refers to, creating one when needed
    ///
    /// An absent or unregistered id creates a new session for `kind`.
    ///
    /// # Errors
    /// - `BridgeError::InvalidSession` if the id belongs to another kind
    /// - `BridgeError::ProcessGone` if the id's provider has exited; the
    ///   session is deleted
    /// - any error of [`SessionManager::create`]
    pub async fn resolve(&self, id: Option<&SessionId>, kind: &ProviderKind) -> Result<Resolved> {
        if let Some(id) = id {
            if let Some(session) = self.get(id).await {
                ensure_kind(&session, kind)?;
                if !session.is_alive() {
                    log::info!("[{}] request for exited session", session.label());
                    self.delete(id).await;
                    return Err(BridgeError::process_gone(id.as_str()));
                }
                return Ok(Resolved {
                    session,
                    created: false,
                });
            }
            log::debug!("Unknown session {id} for '{kind}', creating a new one");
        }

        let session = self.create(kind).await?;
        Ok(Resolved {
            session,
            created: true,
        })
    }

    /// Look up a registered session of a given kind
    ///
    /// # Errors
    /// Returns `BridgeError::InvalidSession` if the id is not registered or
    /// belongs to another kind
    pub async fn lookup(&self, id: &SessionId, kind: &ProviderKind) -> Result<Arc<BridgeSession>> {
        let session = self
            .get(id)
            .await
            .ok_or_else(|| BridgeError::invalid_session(format!("unknown session {id}")))?;
        ensure_kind(&session, kind)?;
        Ok(session)
    }

    /// Look up a registered session by id
    pub async fn get(&self, id: &SessionId) -> Option<Arc<BridgeSession>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session and terminate its provider
    ///
    /// Idempotent; returns whether a session was removed.
    pub async fn delete(&self, id: &SessionId) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                log::info!("[{}] deleting session", session.label());
                teardown(&session).await;
                true
            }
            None => false,
        }
    }
}

fn ensure_kind(session: &BridgeSession, kind: &ProviderKind) -> Result<()> {
    if session.kind() == kind {
        Ok(())
    } else {
        Err(BridgeError::invalid_session(format!(
            "session {} belongs to provider '{}'",
            session.id(),
            session.kind()
        )))
    }
}
