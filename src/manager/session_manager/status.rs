//! Session iteration and status snapshots

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::types::SessionStatus;

use super::super::helpers::health_key;
use super::super::session::BridgeSession;
use super::core::SessionManager;

impl SessionManager {
    /// Number of registered sessions
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Visit every registered session
    ///
    /// The registry is read-locked for the duration; the visitor must not
    /// call back into the manager.
    pub async fn for_each<F>(&self, mut visitor: F)
    where
        F: FnMut(&Arc<BridgeSession>),
    {
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            visitor(session);
        }
    }

    /// Status of every session keyed by `<kind>-<short id>`
    ///
    /// Sessions whose short ids collide are keyed by their full id instead.
    pub async fn status(&self) -> BTreeMap<String, SessionStatus> {
        let mut report = BTreeMap::new();
        self.for_each(|session| {
            let key = health_key(session.kind(), session.id());
            let key = if report.contains_key(&key) {
                format!("{}-{}", session.kind(), session.id())
            } else {
                key
            };
            report.insert(key, session.status());
        })
        .await;
        report
    }
}
