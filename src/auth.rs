//! Authentication gate for inbound requests
//!
//! The gate only sees the credentials pulled from the `Authorization`
//! header; it runs before any session is resolved. Two schemes are read:
//! `Basic base64(user:key)` and `Bearer key`.

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::config::AuthConfig;
use crate::error::{BridgeError, Result};

/// Credentials presented by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// No usable `Authorization` header
    None,
    /// HTTP Basic credentials
    Basic {
        /// User name
        username: String,
        /// Password (the API key)
        password: String,
    },
    /// Bearer token
    Bearer(String),
}

impl Credentials {
    /// Extract credentials from request headers
    ///
    /// Malformed headers yield `Credentials::None`.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) else {
            return Self::None;
        };
        let value = value.trim();

        if let Some(token) = value.strip_prefix("Bearer ") {
            return Self::Bearer(token.trim().to_string());
        }

        value
            .strip_prefix("Basic ")
            .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
            .and_then(|decoded| String::from_utf8(decoded).ok())
            .and_then(|pair| {
                pair.split_once(':').map(|(user, pass)| Self::Basic {
                    username: user.to_string(),
                    password: pass.to_string(),
                })
            })
            .unwrap_or(Self::None)
    }
}

/// Pass/fail check applied to every bridge request
pub trait AuthGate: Send + Sync {
    /// Whether the credentials are accepted
    fn check(&self, credentials: &Credentials) -> bool;
}

/// Gate that accepts every request
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthGate for AllowAll {
    fn check(&self, _credentials: &Credentials) -> bool {
        true
    }
}

/// Gate accepting a single API key
///
/// The key may be presented as a Bearer token or as the Basic password. When
/// a username is configured, Basic credentials must also match it.
#[derive(Clone)]
pub struct ApiKeyGate {
    username: Option<String>,
    api_key: String,
}

impl ApiKeyGate {
    /// Create a gate for a key and optional username
    pub fn new(api_key: impl Into<String>, username: Option<String>) -> Self {
        Self {
            username,
            api_key: api_key.into(),
        }
    }

    /// Build a gate from configuration, reading the key from the environment
    ///
    /// # Errors
    /// Returns `BridgeError::InvalidConfig` if the key variable is unset or
    /// empty
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                BridgeError::invalid_config(format!(
                    "auth is enabled but {} is not set",
                    config.api_key_env
                ))
            })?;
        Ok(Self::new(api_key, config.username.clone()))
    }
}

impl std::fmt::Debug for ApiKeyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyGate")
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AuthGate for ApiKeyGate {
    fn check(&self, credentials: &Credentials) -> bool {
        match credentials {
            Credentials::None => false,
            Credentials::Bearer(token) => *token == self.api_key,
            Credentials::Basic { username, password } => {
                self.username.as_ref().is_none_or(|expected| expected == username)
                    && *password == self.api_key
            }
        }
    }
}

/// Build the gate described by configuration
///
/// # Errors
/// Returns `BridgeError::InvalidConfig` if auth is enabled without a key
pub fn gate_from_config(config: &AuthConfig) -> Result<std::sync::Arc<dyn AuthGate>> {
    if config.enabled {
        Ok(std::sync::Arc::new(ApiKeyGate::from_config(config)?))
    } else {
        log::warn!("Authentication is disabled; every request is accepted");
        Ok(std::sync::Arc::new(AllowAll))
    }
}
