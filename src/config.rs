//! Bridge configuration
//!
//! Loaded from a TOML file with four sections, all optional:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:3000"
//!
//! [sessions]
//! max_sessions = 64
//! disconnect_policy = "retain"
//!
//! [auth]
//! enabled = true
//! username = "bridge"
//! api_key_env = "BRIDGE_API_KEY"
//!
//! [providers.echo]
//! command = "echo-provider"
//! args = ["--stdio"]
//! env = { TOKEN = { secret = "echo/token" } }
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::provider::ProviderTable;
use crate::transport::subprocess::{DEFAULT_MAX_LINE_BYTES, TransportOptions};

// ============================================================================
// TOP LEVEL
// ============================================================================

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// HTTP listener settings
    pub server: ServerConfig,
    /// Session registry settings
    pub sessions: SessionConfig,
    /// Authentication gate settings
    pub auth: AuthConfig,
    /// Provider kind to executable mapping
    pub providers: ProviderTable,
}

impl BridgeConfig {
    /// Read and validate a configuration file
    ///
    /// # Errors
    /// Returns `BridgeError::Io` if the file cannot be read and
    /// `BridgeError::InvalidConfig` if it does not parse or validate
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)
            .map_err(|e| BridgeError::invalid_config(format!("{}: {e}", path.display())))?;
        log::debug!(
            "Loaded configuration from {} ({} providers)",
            path.display(),
            config.providers.len()
        );
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    /// Returns `BridgeError::InvalidConfig` if the text does not parse or
    /// validate
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| BridgeError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    ///
    /// # Errors
    /// Returns `BridgeError::InvalidConfig` describing the first violation
    pub fn validate(&self) -> Result<()> {
        if self.server.max_body_bytes == 0 {
            return Err(BridgeError::invalid_config("server.max_body_bytes must be positive"));
        }
        self.sessions.validate()?;
        if self.auth.enabled && self.auth.api_key_env.trim().is_empty() {
            return Err(BridgeError::invalid_config(
                "auth.api_key_env must name a variable when auth is enabled",
            ));
        }
        self.providers.validate()
    }

    /// Apply overrides taken from the process environment
    ///
    /// `PORT` replaces the listen port, keeping the configured address.
    ///
    /// # Errors
    /// Returns `BridgeError::InvalidConfig` if `PORT` is not a port number
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| BridgeError::invalid_config(format!("PORT is not a port: {port}")))?;
            self.server.listen.set_port(port);
        }
        Ok(())
    }
}

// ============================================================================
// [server]
// ============================================================================

/// HTTP listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    pub listen: SocketAddr,
    /// Largest accepted request body
    pub max_body_bytes: usize,
    /// Whether to answer cross-origin requests
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            max_body_bytes: 4 * 1024 * 1024,
            cors: true,
        }
    }
}

// ============================================================================
// [sessions]
// ============================================================================

/// What happens to a session when its streaming client goes away
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectPolicy {
    /// Keep the session; undelivered messages stay buffered for polling
    #[default]
    Retain,
    /// Tear the session and its process down
    Terminate,
}

/// Session registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of live sessions
    pub max_sessions: usize,
    /// Seconds between reaper sweeps
    pub reap_interval_secs: u64,
    /// Reap sessions without a stream that have been idle this long
    pub idle_ttl_secs: Option<u64>,
    /// Seconds of silence before a push stream gets a keep-alive
    pub keepalive_interval_secs: u64,
    /// Milliseconds a pull request waits for a fresh session's first reply
    pub poll_grace_ms: u64,
    /// Behaviour when a streaming client disconnects
    pub disconnect_policy: DisconnectPolicy,
    /// Seconds a provider gets to exit after its input is closed
    pub terminate_timeout_secs: u64,
    /// Longest provider output line accepted
    pub max_line_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 64,
            reap_interval_secs: 60,
            idle_ttl_secs: None,
            keepalive_interval_secs: 30,
            poll_grace_ms: 100,
            disconnect_policy: DisconnectPolicy::Retain,
            terminate_timeout_secs: 5,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl SessionConfig {
    /// Set max sessions
    #[must_use]
    pub const fn with_max_sessions(mut self, max: usize) -> Self {
        self.max_sessions = max;
        self
    }

    /// Set the disconnect policy
    #[must_use]
    pub const fn with_disconnect_policy(mut self, policy: DisconnectPolicy) -> Self {
        self.disconnect_policy = policy;
        self
    }

    /// Set the idle TTL in seconds
    #[must_use]
    pub const fn with_idle_ttl_secs(mut self, secs: u64) -> Self {
        self.idle_ttl_secs = Some(secs);
        self
    }

    /// Interval between reaper sweeps, never shorter than one second
    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }

    /// Idle TTL, if configured
    #[must_use]
    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl_secs.map(Duration::from_secs)
    }

    /// Keep-alive interval for push streams
    #[must_use]
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    /// Grace period for pull requests on uninitialized sessions
    #[must_use]
    pub fn poll_grace(&self) -> Duration {
        Duration::from_millis(self.poll_grace_ms)
    }

    /// Options for the provider transport
    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            max_line_bytes: self.max_line_bytes,
            terminate_timeout: Duration::from_secs(self.terminate_timeout_secs),
        }
    }

    /// Check that every limit and interval is positive
    ///
    /// # Errors
    /// Returns `BridgeError::InvalidConfig` describing the first violation
    pub fn validate(&self) -> Result<()> {
        if self.max_sessions == 0 {
            return Err(BridgeError::invalid_config("sessions.max_sessions must be positive"));
        }
        if self.reap_interval_secs == 0 {
            return Err(BridgeError::invalid_config(
                "sessions.reap_interval_secs must be positive",
            ));
        }
        if self.keepalive_interval_secs == 0 {
            return Err(BridgeError::invalid_config(
                "sessions.keepalive_interval_secs must be positive",
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(BridgeError::invalid_config("sessions.max_line_bytes must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// [auth]
// ============================================================================

/// Authentication gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether requests must carry credentials
    pub enabled: bool,
    /// Required Basic username; any username is accepted when unset
    pub username: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: None,
            api_key_env: "BRIDGE_API_KEY".to_string(),
        }
    }
}
