//! Session creation
//!
//! Spawns the provider process and registers the session in one step.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};
use crate::transport::{LaunchSpec, SubprocessTransport, Transport};
use crate::types::{ProviderKind, SessionId};

use super::super::background::spawn_message_collector;
use super::super::helpers::session_label;
use super::super::session::BridgeSession;
use super::core::{SessionManager, teardown};

/// Extra time over the transport's terminate timeout before a teardown kills
const TEARDOWN_MARGIN: Duration = Duration::from_secs(1);

impl SessionManager {
    /// Create a session for a provider kind
    ///
    /// Resolves the provider's environment (including secrets), launches the
    /// process, starts its collector and registers the session. The session
    /// only becomes visible to lookups once the process is running.
    ///
    /// # Errors
    /// - `BridgeError::UnknownProviderKind` if the kind is not configured
    /// - `BridgeError::SessionLimit` if `max_sessions` sessions are live
    /// - `BridgeError::Spawn` / `BridgeError::Secret` if the process cannot
    ///   be launched
    pub async fn create(&self, kind: &ProviderKind) -> Result<Arc<BridgeSession>> {
        let spec = self.providers.get(kind)?;
        let max_sessions = self.config.max_sessions;
        if self.session_count().await >= max_sessions {
            return Err(BridgeError::session_limit(max_sessions));
        }

        // Generate unique session ID
        let id = SessionId::generate();
        let label = session_label(kind, &id);

        let env = spec.resolve_env(self.secrets.as_ref()).await.map_err(|e| {
            log::error!("[{label}] failed to resolve provider environment: {e}");
            e
        })?;
        let launch = LaunchSpec::from_provider(kind.as_str(), spec, env)?;

        let options = self.config.transport_options();
        let mut transport = SubprocessTransport::new(launch, label.clone(), options);
        transport.connect().await.map_err(|e| {
            log::error!("[{label}] {e}");
            e
        })?;
        let messages_rx = transport.read_messages();
        let exit_rx = transport.exit_status();
        let pid = transport.pid();
        let kill = transport.kill_handle();

        // Create command channel
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let session = Arc::new(BridgeSession::new(
            id.clone(),
            kind.clone(),
            pid,
            command_tx,
            exit_rx.clone(),
            kill.clone(),
            options.terminate_timeout + TEARDOWN_MARGIN,
        ));

        // Spawn background message collector
        spawn_message_collector(
            transport,
            messages_rx,
            exit_rx,
            command_rx,
            kill,
            Arc::downgrade(&session),
        );

        {
            let mut sessions = self.sessions.write().await;
            if sessions.len() >= max_sessions {
                drop(sessions);
                log::warn!("[{label}] session limit reached while spawning, discarding");
                teardown(&session).await;
                return Err(BridgeError::session_limit(max_sessions));
            }
            sessions.insert(id, Arc::clone(&session));
        }

        log::info!("[{label}] session created");
        Ok(session)
    }
}
