//! Secret lookup seam used while building provider environments

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::{BridgeError, Result};

/// Value returned by a secret store
#[derive(Debug, Clone, PartialEq)]
pub enum SecretValue {
    /// Plain string secret
    Text(String),
    /// Structured secret (JSON object)
    Object(serde_json::Map<String, serde_json::Value>),
}

impl SecretValue {
    /// Parse a raw secret string, treating JSON objects as structured secrets
    #[must_use]
    pub fn parse(raw: String) -> Self {
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Object(map)) => Self::Object(map),
            _ => Self::Text(raw),
        }
    }

    /// Reduce the secret to a single string, optionally selecting a field
    ///
    /// # Errors
    /// Returns `BridgeError::Secret` if the field is missing or a structured
    /// secret is used without selecting a field
    pub fn resolve(&self, name: &str, key: Option<&str>) -> Result<String> {
        match (self, key) {
            (Self::Text(text), None) => Ok(text.clone()),
            (Self::Text(_), Some(key)) => Err(BridgeError::secret(format!(
                "secret '{name}' is a plain string; cannot select field '{key}'"
            ))),
            (Self::Object(map), Some(key)) => match map.get(key) {
                Some(serde_json::Value::String(s)) => Ok(s.clone()),
                Some(other) => Ok(other.to_string()),
                None => Err(BridgeError::secret(format!(
                    "secret '{name}' has no field '{key}'"
                ))),
            },
            (Self::Object(map), None) => Ok(serde_json::Value::Object(map.clone()).to_string()),
        }
    }
}

/// Boxed future returned by [`SecretProvider::get_secret`]
pub type SecretFuture<'a> = Pin<Box<dyn Future<Output = Result<SecretValue>> + Send + 'a>>;

/// Source of secrets referenced by provider environment entries
pub trait SecretProvider: Send + Sync {
    /// Fetch the secret with the given logical name
    fn get_secret<'a>(&'a self, name: &'a str) -> SecretFuture<'a>;
}

/// Reads secrets from the bridge's own environment
///
/// A logical name such as `tool/notion/api` maps to the variable
/// `TOOL_NOTION_API` (non-alphanumerics become `_`, letters upper-cased),
/// optionally prefixed.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretProvider {
    prefix: String,
}

impl EnvSecretProvider {
    /// Create a provider reading variables with the given prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable name used for a logical secret name
    #[must_use]
    pub fn variable_name(&self, name: &str) -> String {
        let mapped: String = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{mapped}", self.prefix)
    }
}

impl SecretProvider for EnvSecretProvider {
    fn get_secret<'a>(&'a self, name: &'a str) -> SecretFuture<'a> {
        Box::pin(async move {
            let var = self.variable_name(name);
            std::env::var(&var)
                .map(SecretValue::parse)
                .map_err(|_| BridgeError::secret(format!("secret '{name}' not found (${var})")))
        })
    }
}

/// Fixed in-memory secrets, mostly useful for tests and local runs
#[derive(Debug, Clone, Default)]
pub struct StaticSecretProvider {
    secrets: HashMap<String, SecretValue>,
}

impl StaticSecretProvider {
    /// Create an empty secret set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret
    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, value: SecretValue) -> Self {
        self.secrets.insert(name.into(), value);
        self
    }
}

impl SecretProvider for StaticSecretProvider {
    fn get_secret<'a>(&'a self, name: &'a str) -> SecretFuture<'a> {
        Box::pin(async move {
            self.secrets
                .get(name)
                .cloned()
                .ok_or_else(|| BridgeError::secret(format!("secret '{name}' not found")))
        })
    }
}
