//! Core session manager structure and lifecycle management
//!
//! Provides the main `SessionManager` struct with initialization, the reaper
//! and shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;

use crate::config::{DisconnectPolicy, SessionConfig};
use crate::provider::{ProviderTable, SecretProvider};
use crate::types::SessionId;

use super::super::session::BridgeSession;
use super::super::subscription::SessionSubscription;

/// Registry map shared with the reaper and with subscriptions
pub(crate) type SessionMap = Arc<RwLock<HashMap<SessionId, Arc<BridgeSession>>>>;

// ============================================================================
// SESSION MANAGER CORE
// ============================================================================

/// Registry of live provider sessions
///
/// The `SessionManager` coordinates every session of the bridge:
/// - Session lifecycle (create, resolve, delete)
/// - Push stream attachment
/// - Periodic reaping of sessions whose process has exited
///
/// It must be created inside a Tokio runtime; the reaper task starts
/// immediately and stops when the manager is dropped.
pub struct SessionManager {
    pub(crate) sessions: SessionMap,
    pub(crate) providers: Arc<ProviderTable>,
    pub(crate) secrets: Arc<dyn SecretProvider>,
    pub(crate) config: SessionConfig,
    reaper_handle: Option<tokio::task::JoinHandle<()>>,
}

impl SessionManager {
    /// Create a new `SessionManager` with its background reaper
    pub fn new(
        providers: ProviderTable,
        secrets: Arc<dyn SecretProvider>,
        config: SessionConfig,
    ) -> Self {
        if let Err(e) = config.validate() {
            log::warn!("{e}; falling back to safe minimums");
        }
        let sessions: SessionMap = Arc::new(RwLock::new(HashMap::new()));

        let reaper_sessions = Arc::clone(&sessions);
        let interval = config.reap_interval();
        let idle_ttl = config.idle_ttl();
        let reaper_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                reap_sessions(&reaper_sessions, idle_ttl).await;
            }
        });

        Self {
            sessions,
            providers: Arc::new(providers),
            secrets,
            config,
            reaper_handle: Some(reaper_handle),
        }
    }

    /// Provider table backing this registry
    #[must_use]
    pub fn providers(&self) -> &ProviderTable {
        &self.providers
    }

    /// Session settings
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run one reaper sweep now
    ///
    /// Returns the number of sessions removed.
    pub async fn reap(&self) -> usize {
        reap_sessions(&self.sessions, self.config.idle_ttl()).await
    }

    /// Attach a push stream to a session
    ///
    /// Buffered output is flushed to the new stream first. A previously
    /// attached stream ends once it has emitted what it already held.
    pub fn subscribe(&self, session: &Arc<BridgeSession>) -> SessionSubscription {
        let (generation, receiver) = session.attach_sink();
        log::debug!("[{}] stream {generation} attached", session.label());
        let registry = match self.config.disconnect_policy {
            DisconnectPolicy::Retain => None,
            DisconnectPolicy::Terminate => Some(Arc::clone(&self.sessions)),
        };
        SessionSubscription::new(Arc::clone(session), generation, receiver, registry)
    }

    /// Gracefully shut down every session
    ///
    /// Stops the reaper, ends all push streams and terminates every provider
    /// (graceful, then forced).
    pub async fn shutdown(&self) {
        log::info!("Shutting down SessionManager...");
        if let Some(handle) = &self.reaper_handle {
            handle.abort();
        }

        let sessions: Vec<Arc<BridgeSession>> = {
            let mut map = self.sessions.write().await;
            map.drain().map(|(_, session)| session).collect()
        };
        let count = sessions.len();

        futures::future::join_all(sessions.iter().map(|session| teardown(session))).await;

        log::info!("SessionManager shutdown complete ({count} sessions terminated)");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.reaper_handle.take() {
            handle.abort();
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// End a session's stream and terminate its provider
///
/// The graceful path is bounded by the session's shutdown grace; past it the
/// provider is killed outright.
pub(crate) async fn teardown(session: &BridgeSession) {
    session.close_stream();
    let grace = session.shutdown_grace();
    match tokio::time::timeout(grace, session.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("[{}] failed to terminate provider: {e}", session.label()),
        Err(_) => {
            log::warn!(
                "[{}] provider did not stop within {grace:?}, killing",
                session.label()
            );
            session.kill();
        }
    }
}

/// Remove sessions whose process exited, and idle ones past `idle_ttl`
async fn reap_sessions(sessions: &SessionMap, idle_ttl: Option<Duration>) -> usize {
    let reaped: Vec<Arc<BridgeSession>> = {
        let mut map = sessions.write().await;
        let expired: Vec<SessionId> = map
            .iter()
            .filter(|(_, session)| {
                !session.is_alive()
                    || idle_ttl.is_some_and(|ttl| {
                        !session.is_streaming() && session.idle_for() > ttl
                    })
            })
            .map(|(id, _)| id.clone())
            .collect();
        expired.iter().filter_map(|id| map.remove(id)).collect()
    };

    if reaped.is_empty() {
        return 0;
    }

    for session in &reaped {
        match session.exit() {
            Some(exit) => log::info!("[{}] reaped ({exit})", session.label()),
            None => log::info!("[{}] reaped after idling", session.label()),
        }
    }
    futures::future::join_all(reaped.iter().map(|session| teardown(session))).await;

    reaped.len()
}
