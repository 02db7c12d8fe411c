#![recursion_limit = "256"]

//! # Provider Bridge
//!
//! A stateful HTTP bridge for line-delimited JSON-RPC tool providers. Each
//! provider runs as a child process speaking one JSON message per line on
//! stdin/stdout; the bridge gives every client session its own process and
//! delivers output either as a server-sent event stream (push) or through
//! polling (pull).
//!
//! ## Quick Start
//!
//! ```no_run
//! use provider_bridge::{BridgeConfig, start_server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::from_file("bridge.toml")?;
//!     let handle = start_server(config).await?;
//!     tokio::signal::ctrl_c().await?;
//!     handle.shutdown().await
//! }
//! ```
//!
//! ## Using the registry directly
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use provider_bridge::{EnvSecretProvider, ProviderSpec, ProviderTable, SessionConfig, SessionManager};
//! # async fn example() -> provider_bridge::Result<()> {
//! let providers = ProviderTable::new()
//!     .with_provider("echo", ProviderSpec::new("echo-provider", ["--stdio"]));
//! let manager = SessionManager::new(
//!     providers,
//!     Arc::new(EnvSecretProvider::default()),
//!     SessionConfig::default(),
//! );
//!
//! let session = manager.create(&"echo".into()).await?;
//! session.write(serde_json::json!({"id": 1, "op": "ping"})).await?;
//! let replies = session.poll_all();
//! # let _ = replies;
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`transport`] - Subprocess transport and line codec
//! - [`manager`] - Sessions, registry and reaper
//! - [`delivery`] - Push and pull delivery sinks
//! - [`server`] - HTTP routes
//! - [`provider`] - Provider table and secret lookup
//! - [`auth`] - Authentication gate
//! - [`config`] - TOML configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod config;
pub mod delivery;
pub mod error;
pub mod manager;
pub mod provider;
pub mod server;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use auth::{AllowAll, ApiKeyGate, AuthGate, Credentials};
pub use config::{AuthConfig, BridgeConfig, DisconnectPolicy, ServerConfig, SessionConfig};
pub use delivery::{DeliveryMode, DeliverySink, PollBuffer, StreamSink};
pub use error::{BridgeError, Result};
pub use manager::{BridgeSession, Resolved, SessionManager, SessionSubscription};
pub use provider::{
    EnvSecretProvider, EnvValue, ProviderSpec, ProviderTable, SecretProvider, SecretValue,
    StaticSecretProvider,
};
pub use server::{AppState, ServerHandle, build_router};
pub use transport::{LaunchSpec, LineCodec, ProcessExit, SubprocessTransport, Transport};
pub use types::{ProviderKind, SessionId, SessionStatus};

/// Version of the bridge
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// EMBEDDED SERVER FUNCTION
// ============================================================================

use std::sync::Arc;

/// Start the bridge HTTP server
///
/// Returns a [`ServerHandle`] for graceful shutdown control. This function
/// is non-blocking; the server runs in background tasks. Secrets are read
/// from the environment.
///
/// # Errors
/// Returns error if the configuration is invalid or the address cannot be
/// bound
pub async fn start_server(config: BridgeConfig) -> anyhow::Result<ServerHandle> {
    let addr = config.server.listen;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    start_server_with_listener(listener, config, Arc::new(EnvSecretProvider::default())).await
}

/// Start the bridge HTTP server on a pre-bound listener
///
/// # Errors
/// Returns error if the configuration is invalid
pub async fn start_server_with_listener(
    listener: tokio::net::TcpListener,
    config: BridgeConfig,
    secrets: Arc<dyn SecretProvider>,
) -> anyhow::Result<ServerHandle> {
    config.validate()?;
    let local_addr = listener.local_addr()?;
    let auth = auth::gate_from_config(&config.auth)?;

    let manager = Arc::new(SessionManager::new(
        config.providers.clone(),
        secrets,
        config.sessions.clone(),
    ));
    let state = AppState::new(Arc::clone(&manager), auth, &config.sessions);
    let router = build_router(state, &config.server);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    log::info!(
        "Provider bridge listening on {local_addr} (providers: {})",
        config.providers.kinds().join(", ")
    );
    Ok(ServerHandle::new(local_addr, shutdown_tx, task, manager))
}
