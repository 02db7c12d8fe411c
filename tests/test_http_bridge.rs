//! Integration tests for the HTTP routes
//!
//! Requests go straight to the router with `tower::ServiceExt::oneshot`.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http_body_util::BodyExt;
use provider_bridge::server::SESSION_HEADER;
use provider_bridge::{
    AllowAll, ApiKeyGate, AppState, AuthGate, ServerConfig, SessionManager, build_router,
};
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{init_logging, manager, session_config};

fn app_with(manager: Arc<SessionManager>, auth: Arc<dyn AuthGate>) -> Router {
    let state = AppState::new(manager, auth, &session_config());
    build_router(state, &ServerConfig::default())
}

fn app() -> (Router, Arc<SessionManager>) {
    let manager = Arc::new(manager(session_config()));
    (app_with(Arc::clone(&manager), Arc::new(AllowAll)), manager)
}

fn post(uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let session = response
        .headers()
        .get(SESSION_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, session, body)
}

#[tokio::test]
async fn test_health_reports_providers() {
    init_logging();
    let (router, _manager) = app();
    let request = Request::get("/health").body(Body::empty()).unwrap();

    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["activeSessions"], 0);
    let servers = body["availableServers"].as_array().unwrap();
    assert!(servers.contains(&json!("echo")));
}

#[tokio::test]
async fn test_health_counts_registered_sessions() {
    let (router, manager) = app();
    for _ in 0..3 {
        manager.create(&"silent".into()).await.unwrap();
    }
    let request = Request::get("/health").body(Body::empty()).unwrap();

    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["activeSessions"], manager.session_count().await);
    assert_eq!(body["activeSessions"], 3);
    assert_eq!(body["sessions"].as_object().unwrap().len(), 3);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_unknown_kind_is_bad_request() {
    let (router, manager) = app();
    let request = post("/bridge/nope")
        .body(Body::from(r#"{"id":1}"#))
        .unwrap();

    let (status, session, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(session.is_none());
    assert_eq!(body["error"]["kind"], "UnknownProviderKind");
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
    let (router, manager) = app();
    let request = post("/bridge/echo").body(Body::from("{not json")).unwrap();

    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "InvalidMessage");
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn test_poll_requires_session() {
    let (router, _manager) = app();

    let missing = Request::get("/bridge/echo/poll").body(Body::empty()).unwrap();
    let (status, _, body) = send(&router, missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "InvalidSession");

    let unknown = Request::get("/bridge/echo/poll")
        .header(SESSION_HEADER, "not-a-session")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&router, unknown).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pull_round_trip() {
    let (router, manager) = app();

    // First reply on a fresh session is awaited within the grace period
    let handshake = json!({"id": 0, "result": {"protocolVersion": "2024-11-05"}});
    let request = post("/bridge/echo")
        .body(Body::from(handshake.to_string()))
        .unwrap();
    let (status, session, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, handshake);
    let session_id = session.expect("session header");

    let request = post("/bridge/echo")
        .header(SESSION_HEADER, &session_id)
        .body(Body::from(r#"{"id":1,"op":"ping"}"#))
        .unwrap();
    let (status, echoed, body) = send(&router, request).await;
    assert_eq!(echoed.as_deref(), Some(session_id.as_str()));
    let mut replies = Vec::new();
    match status {
        StatusCode::OK => replies.push(body),
        StatusCode::ACCEPTED => assert_eq!(body["sessionId"], session_id.as_str()),
        other => panic!("unexpected status {other}"),
    }

    for _ in 0..100 {
        if !replies.is_empty() {
            break;
        }
        let poll = Request::get("/bridge/echo/poll")
            .header(SESSION_HEADER, &session_id)
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&router, poll).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionId"], session_id.as_str());
        replies.extend(body["responses"].as_array().unwrap().iter().cloned());
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(replies, vec![json!({"id": 1, "op": "pong"})]);
    assert_eq!(manager.session_count().await, 1);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_push_stream_delivers_reply() {
    let (router, manager) = app();
    let request = post("/bridge/echo")
        .header("accept", "text/event-stream")
        .body(Body::from(r#"{"id":1,"op":"ping"}"#))
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key(SESSION_HEADER));
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/event-stream"));

    let mut body = response.into_body();
    let mut text = String::new();
    while !text.contains("\n\n") {
        let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
            .await
            .expect("stream frame")
            .expect("stream open")
            .unwrap();
        if let Ok(data) = frame.into_data() {
            text.push_str(&String::from_utf8_lossy(&data));
        }
    }
    assert_eq!(text, "data: {\"id\":1,\"op\":\"pong\"}\n\n");

    drop(body);
    manager.shutdown().await;
}

/// Read one server-sent event from a streaming body
async fn next_event(body: &mut Body) -> String {
    let mut text = String::new();
    while !text.contains("\n\n") {
        let frame = body.frame().await.expect("stream open").unwrap();
        if let Ok(data) = frame.into_data() {
            text.push_str(&String::from_utf8_lossy(&data));
        }
    }
    text
}

fn attach(kind: &str, session_id: &str) -> Request<Body> {
    Request::get(format!("/bridge/{kind}"))
        .header(SESSION_HEADER, session_id)
        .header("accept", "text/event-stream")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_idle_stream_gets_keepalive() {
    let (router, manager) = app();
    let session = manager.create(&"silent".into()).await.unwrap();

    tokio::time::pause();
    let started = tokio::time::Instant::now();
    let response = router
        .clone()
        .oneshot(attach("silent", session.id().as_str()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    let event = tokio::time::timeout(Duration::from_secs(35), next_event(&mut body))
        .await
        .expect("a keep-alive within 35s");
    assert!(event.starts_with(':'), "got {event:?}");
    assert!(event.contains("heartbeat"));
    assert!(started.elapsed() >= Duration::from_secs(30));

    tokio::time::resume();
    drop(body);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_buffered_message_precedes_keepalive_exactly_once() {
    let (router, manager) = app();
    let session = manager.create(&"echo".into()).await.unwrap();
    session.write(json!({"id": 1, "op": "ping"})).await.unwrap();
    assert!(common::wait_until(|| session.pending_count() == 1).await);

    tokio::time::pause();
    let started = tokio::time::Instant::now();
    let response = router
        .clone()
        .oneshot(attach("echo", session.id().as_str()))
        .await
        .unwrap();
    let mut body = response.into_body();

    let first = next_event(&mut body).await;
    assert_eq!(first, "data: {\"id\":1,\"op\":\"pong\"}\n\n");
    assert!(started.elapsed() < Duration::from_secs(30));

    let second = next_event(&mut body).await;
    assert!(second.starts_with(':'), "got {second:?}");
    assert!(!second.contains("pong"));
    assert!(started.elapsed() >= Duration::from_secs(30));
    assert_eq!(session.pending_count(), 0);

    tokio::time::resume();
    drop(body);
    manager.shutdown().await;
}

#[tokio::test]
async fn test_exited_session_is_gone() {
    let (router, manager) = app();
    let request = post("/bridge/exiting")
        .body(Body::from(r#"{"go":true}"#))
        .unwrap();
    let (status, session, _) = send(&router, request).await;
    assert!(status == StatusCode::OK || status == StatusCode::ACCEPTED);
    let session_id = session.unwrap();

    let session = manager.get(&session_id.as_str().into()).await.unwrap();
    assert!(common::wait_until(|| !session.is_alive()).await);

    let request = post("/bridge/exiting")
        .header(SESSION_HEADER, &session_id)
        .body(Body::from(r#"{"again":true}"#))
        .unwrap();
    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["error"]["kind"], "ProcessGone");
    assert_eq!(manager.session_count().await, 0);
}

#[tokio::test]
async fn test_delete_session() {
    let (router, manager) = app();
    let session = manager.create(&"silent".into()).await.unwrap();
    let id = session.id().to_string();

    let missing = Request::delete("/bridge/silent").body(Body::empty()).unwrap();
    let (status, _, _) = send(&router, missing).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let wrong_kind = Request::delete("/bridge/echo")
        .header(SESSION_HEADER, &id)
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(&router, wrong_kind).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    for _ in 0..2 {
        let request = Request::delete("/bridge/silent")
            .header(SESSION_HEADER, &id)
            .body(Body::empty())
            .unwrap();
        let (status, _, _) = send(&router, request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    assert_eq!(manager.session_count().await, 0);
    assert!(!session.is_alive());
}

#[tokio::test]
async fn test_auth_gate() {
    let manager = Arc::new(manager(session_config()));
    let gate = Arc::new(ApiKeyGate::new("s3cr3t", Some("bridge".to_string())));
    let router = app_with(Arc::clone(&manager), gate);

    // Health stays open
    let health = Request::get("/health").body(Body::empty()).unwrap();
    let (status, _, _) = send(&router, health).await;
    assert_eq!(status, StatusCode::OK);

    let anonymous = post("/bridge/nope").body(Body::from("{}")).unwrap();
    let response = router.clone().oneshot(anonymous).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));

    let wrong = format!("Basic {}", STANDARD.encode("bridge:wrong"));
    let request = post("/bridge/nope")
        .header("authorization", wrong)
        .body(Body::from("{}"))
        .unwrap();
    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "Unauthorized");

    // Accepted credentials reach the handler, which rejects the unknown kind
    let basic = format!("Basic {}", STANDARD.encode("bridge:s3cr3t"));
    let request = post("/bridge/nope")
        .header("authorization", basic)
        .body(Body::from("{}"))
        .unwrap();
    let (status, _, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = post("/bridge/nope")
        .header("authorization", "Bearer s3cr3t")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
