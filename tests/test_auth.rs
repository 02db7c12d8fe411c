//! Unit tests for credentials, auth gates and secret lookup

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use provider_bridge::{
    AllowAll, ApiKeyGate, AuthGate, Credentials, EnvSecretProvider, SecretProvider, SecretValue,
    StaticSecretProvider,
};

fn headers(authorization: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, authorization.parse().unwrap());
    headers
}

#[test]
fn test_credentials_from_headers() {
    assert_eq!(Credentials::from_headers(&HeaderMap::new()), Credentials::None);

    let basic = format!("Basic {}", STANDARD.encode("user:pa:ss"));
    assert_eq!(
        Credentials::from_headers(&headers(&basic)),
        Credentials::Basic {
            username: "user".to_string(),
            password: "pa:ss".to_string(),
        }
    );

    assert_eq!(
        Credentials::from_headers(&headers("Bearer abc123")),
        Credentials::Bearer("abc123".to_string())
    );
    assert_eq!(
        Credentials::from_headers(&headers("Basic !!!not-base64")),
        Credentials::None
    );
    assert_eq!(
        Credentials::from_headers(&headers("Digest whatever")),
        Credentials::None
    );
}

#[test]
fn test_api_key_gate() {
    let gate = ApiKeyGate::new("key", Some("bridge".to_string()));

    assert!(!gate.check(&Credentials::None));
    assert!(gate.check(&Credentials::Bearer("key".to_string())));
    assert!(!gate.check(&Credentials::Bearer("nope".to_string())));
    assert!(gate.check(&Credentials::Basic {
        username: "bridge".to_string(),
        password: "key".to_string(),
    }));
    assert!(!gate.check(&Credentials::Basic {
        username: "someone".to_string(),
        password: "key".to_string(),
    }));

    let any_user = ApiKeyGate::new("key", None);
    assert!(any_user.check(&Credentials::Basic {
        username: "someone".to_string(),
        password: "key".to_string(),
    }));
    assert!(format!("{gate:?}").contains("<redacted>"));
}

#[test]
fn test_allow_all() {
    assert!(AllowAll.check(&Credentials::None));
}

#[test]
fn test_secret_value_resolution() {
    let object = SecretValue::parse(r#"{"api":"k1","port":8080}"#.to_string());
    assert_eq!(object.resolve("s", Some("api")).unwrap(), "k1");
    assert_eq!(object.resolve("s", Some("port")).unwrap(), "8080");
    assert!(object.resolve("s", Some("missing")).is_err());

    let text = SecretValue::parse("plain".to_string());
    assert_eq!(text, SecretValue::Text("plain".to_string()));
    assert_eq!(text.resolve("s", None).unwrap(), "plain");
    assert!(text.resolve("s", Some("api")).is_err());
}

#[test]
fn test_env_secret_variable_names() {
    let provider = EnvSecretProvider::default();
    assert_eq!(provider.variable_name("tool/notion/api"), "TOOL_NOTION_API");

    let prefixed = EnvSecretProvider::with_prefix("BRIDGE_SECRET_");
    assert_eq!(prefixed.variable_name("db-pass"), "BRIDGE_SECRET_DB_PASS");
}

#[tokio::test]
async fn test_static_secret_provider() {
    let secrets =
        StaticSecretProvider::new().with_secret("token", SecretValue::Text("t".to_string()));

    assert_eq!(
        secrets.get_secret("token").await.unwrap(),
        SecretValue::Text("t".to_string())
    );
    let err = secrets.get_secret("other").await.unwrap_err();
    assert_eq!(err.kind(), "SpawnError");
}
