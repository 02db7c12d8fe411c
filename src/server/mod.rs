//! HTTP surface of the bridge
//!
//! Routes:
//! - `POST /bridge/{kind}` forward a message; stream or poll the reply
//! - `GET /bridge/{kind}` attach a stream or drain buffered output
//! - `GET /bridge/{kind}/poll` drain buffered output
//! - `DELETE /bridge/{kind}` end a session
//! - `GET /health` unauthenticated status report

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::HeaderValue;
use axum::http::header::WWW_AUTHENTICATE;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::auth::{AuthGate, Credentials};
use crate::config::{ServerConfig, SessionConfig};
use crate::error::BridgeError;
use crate::manager::SessionManager;

/// Header carrying the session identifier in both directions
pub const SESSION_HEADER: &str = "mcp-session-id";

/// How long shutdown waits for open connections to finish
const SERVER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// STATE
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Session registry
    pub manager: Arc<SessionManager>,
    /// Authentication gate for bridge routes
    pub auth: Arc<dyn AuthGate>,
    /// When the server started, for uptime reporting
    pub started_at: Instant,
    /// Silence before a push stream gets a keep-alive
    pub keepalive: Duration,
    /// Wait applied to pull requests on uninitialized sessions
    pub poll_grace: Duration,
}

impl AppState {
    /// Create state for a manager and gate using session timings
    pub fn new(
        manager: Arc<SessionManager>,
        auth: Arc<dyn AuthGate>,
        sessions: &SessionConfig,
    ) -> Self {
        Self {
            manager,
            auth,
            started_at: Instant::now(),
            keepalive: sessions.keepalive_interval(),
            poll_grace: sessions.poll_grace(),
        }
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Build the bridge router
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    let bridge = Router::new()
        .route(
            "/bridge/{kind}",
            get(handlers::get_bridge)
                .post(handlers::post_bridge)
                .delete(handlers::delete_session),
        )
        .route("/bridge/{kind}/poll", get(handlers::poll))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let router = Router::new()
        .route("/health", get(handlers::health))
        .merge(bridge)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .with_state(state);

    if config.cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

/// Reject requests whose credentials the gate refuses
async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let credentials = Credentials::from_headers(request.headers());
    if !state.auth.check(&credentials) {
        log::debug!("Rejected {} {}", request.method(), request.uri().path());
        let mut response =
            BridgeError::unauthorized("missing or invalid credentials").into_response();
        response.headers_mut().insert(
            WWW_AUTHENTICATE,
            HeaderValue::from_static("Basic realm=\"provider-bridge\""),
        );
        return response;
    }
    next.run(request).await
}

// ============================================================================
// SERVER HANDLE
// ============================================================================

/// Running bridge server
///
/// Dropping the handle leaves the server running; call
/// [`ServerHandle::shutdown`] to stop it.
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
    manager: Arc<SessionManager>,
}

impl ServerHandle {
    pub(crate) fn new(
        local_addr: SocketAddr,
        shutdown_tx: oneshot::Sender<()>,
        task: JoinHandle<std::io::Result<()>>,
        manager: Arc<SessionManager>,
    ) -> Self {
        Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
            task,
            manager,
        }
    }

    /// Address the server is bound to
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Session registry used by the server
    #[must_use]
    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Stop accepting connections, terminate every session and wait for the
    /// server to finish
    ///
    /// # Errors
    /// Returns error if the server task failed
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        log::info!("Stopping provider bridge on {}", self.local_addr);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        // Open push streams end once their sessions are torn down
        self.manager.shutdown().await;

        match tokio::time::timeout(SERVER_DRAIN_TIMEOUT, &mut self.task).await {
            Ok(joined) => joined??,
            Err(_) => {
                log::warn!("Connections still open after {SERVER_DRAIN_TIMEOUT:?}, aborting");
                self.task.abort();
            }
        }
        Ok(())
    }
}
