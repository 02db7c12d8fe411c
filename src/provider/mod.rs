//! Provider table: which executable backs each provider kind
//!
//! The table is read from the `[providers.<kind>]` sections of the bridge
//! configuration. Environment entries are either literals, references to
//! secrets resolved through a [`SecretProvider`], or values copied from the
//! bridge's own environment.

pub mod secrets;

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::transport::subprocess::DANGEROUS_ENV_VARS;
use crate::types::ProviderKind;

pub use secrets::{EnvSecretProvider, SecretProvider, SecretValue, StaticSecretProvider};

/// One environment variable override for a provider process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    /// Literal value
    Literal(String),
    /// Value fetched from the secret provider, optionally a field of it
    Secret {
        /// Logical secret name
        secret: String,
        /// Field to select from a structured secret
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key: Option<String>,
    },
    /// Value copied from the bridge's environment
    FromEnv {
        /// Variable to read
        from_env: String,
        /// Used when the variable is unset
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
}

/// Launch description for one provider kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSpec {
    /// Executable name or path
    pub command: String,
    /// Arguments passed to the executable
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment overrides applied on top of the bridge's environment
    #[serde(default)]
    pub env: BTreeMap<String, EnvValue>,
    /// Working directory for the process
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
}

impl ProviderSpec {
    /// Create a spec for an executable with arguments and no overrides
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Add an environment override
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: EnvValue) -> Self {
        self.env.insert(key.into(), value);
        self
    }

    /// Resolve every environment override to a concrete string
    ///
    /// # Errors
    /// Returns `BridgeError::Secret` if a referenced secret or variable is
    /// unavailable
    pub async fn resolve_env(&self, secrets: &dyn SecretProvider) -> Result<Vec<(String, String)>> {
        let mut resolved = Vec::with_capacity(self.env.len());
        for (key, value) in &self.env {
            let value = match value {
                EnvValue::Literal(s) => s.clone(),
                EnvValue::Secret { secret, key: field } => secrets
                    .get_secret(secret)
                    .await?
                    .resolve(secret, field.as_deref())?,
                EnvValue::FromEnv { from_env, default } => match std::env::var(from_env) {
                    Ok(v) => v,
                    Err(_) => default.clone().ok_or_else(|| {
                        BridgeError::secret(format!("environment variable {from_env} is not set"))
                    })?,
                },
            };
            resolved.push((key.clone(), value));
        }
        Ok(resolved)
    }
}

/// Static mapping from provider kind to launch description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderTable {
    entries: BTreeMap<ProviderKind, ProviderSpec>,
}

impl ProviderTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry
    #[must_use]
    pub fn with_provider(mut self, kind: impl Into<ProviderKind>, spec: ProviderSpec) -> Self {
        self.entries.insert(kind.into(), spec);
        self
    }

    /// Look up the spec for a kind
    ///
    /// # Errors
    /// Returns `BridgeError::UnknownProviderKind` if the kind has no entry
    pub fn get(&self, kind: &ProviderKind) -> Result<&ProviderSpec> {
        self.entries
            .get(kind)
            .ok_or_else(|| BridgeError::unknown_provider(kind.as_str()))
    }

    /// Names of all configured kinds, sorted
    #[must_use]
    pub fn kinds(&self) -> Vec<String> {
        self.entries.keys().map(ToString::to_string).collect()
    }

    /// Number of configured kinds
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reject entries that cannot be launched safely
    ///
    /// # Errors
    /// Returns `BridgeError::InvalidConfig` for empty commands or overrides of
    /// loader-controlling variables
    pub fn validate(&self) -> Result<()> {
        for (kind, spec) in &self.entries {
            if spec.command.trim().is_empty() {
                return Err(BridgeError::invalid_config(format!(
                    "provider '{kind}' has an empty command"
                )));
            }
            if let Some(key) = spec
                .env
                .keys()
                .find(|key| DANGEROUS_ENV_VARS.contains(&key.as_str()))
            {
                return Err(BridgeError::invalid_config(format!(
                    "provider '{kind}' may not override {key}"
                )));
            }
        }
        Ok(())
    }
}
