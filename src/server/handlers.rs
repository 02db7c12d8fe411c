//! Request handlers

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde_json::Value;

use super::{AppState, SESSION_HEADER};
use crate::delivery::DeliveryMode;
use crate::error::{BridgeError, Result};
use crate::manager::{BridgeSession, Resolved};
use crate::types::{AcceptedResponse, HealthResponse, PollResponse, ProviderKind, SessionId};

// ============================================================================
// BRIDGE ROUTES
// ============================================================================

/// `POST /bridge/{kind}` forward one message to the session's provider
pub async fn post_bridge(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let kind = ProviderKind::new(kind);
    let message: Value = serde_json::from_slice(&body)
        .map_err(|e| BridgeError::invalid_message(format!("body is not JSON: {e}")))?;
    let mode = DeliveryMode::from_headers(&headers);
    let requested = session_id(&headers);

    let Resolved { session, created } = state.manager.resolve(requested.as_ref(), &kind).await?;
    log::debug!(
        "[{}] POST ({mode:?}{})",
        session.label(),
        if created { ", new session" } else { "" }
    );

    if let Err(e) = session.write(message).await {
        if matches!(e, BridgeError::ProcessGone(_)) {
            state.manager.delete(session.id()).await;
        }
        return Err(e);
    }

    match mode {
        DeliveryMode::Push => Ok(stream_response(&state, &session)),
        DeliveryMode::Pull => {
            if !session.is_initialized() {
                session.wait_for_output(state.poll_grace).await;
            }
            let response = match session.poll_one() {
                Some(message) => Json(message).into_response(),
                None => (
                    StatusCode::ACCEPTED,
                    Json(AcceptedResponse {
                        session_id: session.id().clone(),
                    }),
                )
                    .into_response(),
            };
            Ok(with_session_header(response, session.id()))
        }
    }
}

/// `GET /bridge/{kind}` attach a stream, or drain buffered output
pub async fn get_bridge(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let session = existing_session(&state, &kind, &headers).await?;

    match DeliveryMode::from_headers(&headers) {
        DeliveryMode::Push => {
            if !session.is_alive() {
                state.manager.delete(session.id()).await;
                return Err(BridgeError::process_gone(session.id().as_str()));
            }
            Ok(stream_response(&state, &session))
        }
        DeliveryMode::Pull => Ok(drain_response(&session)),
    }
}

/// `GET /bridge/{kind}/poll` drain buffered output
pub async fn poll(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let session = existing_session(&state, &kind, &headers).await?;
    Ok(drain_response(&session))
}

/// `DELETE /bridge/{kind}` end a session; unknown ids are ignored
pub async fn delete_session(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let id = session_id(&headers).ok_or(BridgeError::MissingSession)?;
    if let Some(session) = state.manager.get(&id).await {
        if session.kind().as_str() != kind {
            return Err(BridgeError::invalid_session(format!(
                "session {id} belongs to provider '{}'",
                session.kind()
            )));
        }
        state.manager.delete(&id).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// HEALTH
// ============================================================================

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let sessions = state.manager.status().await;
    Json(HealthResponse {
        status: "OK".to_string(),
        version: crate::VERSION.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_sessions: state.manager.session_count().await,
        sessions,
        available_servers: state.manager.providers().kinds(),
    })
}

// ============================================================================
// HELPERS
// ============================================================================

/// Session id from the request header, if present and non-empty
fn session_id(headers: &HeaderMap) -> Option<SessionId> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(SessionId::from)
}

async fn existing_session(
    state: &AppState,
    kind: &str,
    headers: &HeaderMap,
) -> Result<Arc<BridgeSession>> {
    let id = session_id(headers).ok_or(BridgeError::MissingSession)?;
    state.manager.lookup(&id, &ProviderKind::new(kind)).await
}

fn drain_response(session: &BridgeSession) -> Response {
    let body = PollResponse {
        session_id: session.id().clone(),
        responses: session.poll_all(),
    };
    with_session_header(Json(body).into_response(), session.id())
}

/// Attach a push stream and render it as server-sent events
fn stream_response(state: &AppState, session: &Arc<BridgeSession>) -> Response {
    let subscription = state.manager.subscribe(session);
    let events = subscription
        .map(|message| Ok::<Event, Infallible>(Event::default().data(message.to_string())));
    let keep_alive = KeepAlive::new()
        .interval(state.keepalive)
        .text("heartbeat");

    let mut response = Sse::new(events).keep_alive(keep_alive).into_response();
    response.headers_mut().insert(
        HeaderName::from_static("x-accel-buffering"),
        HeaderValue::from_static("no"),
    );
    with_session_header(response, session.id())
}

fn with_session_header(mut response: Response, id: &SessionId) -> Response {
    match HeaderValue::from_str(id.as_str()) {
        Ok(value) => {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
        Err(e) => log::warn!("Session id {id} is not a valid header value: {e}"),
    }
    response
}
