//! Command building logic for subprocess transport

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{BridgeError, Result};
use crate::provider::ProviderSpec;

use super::config::LaunchSpec;

impl LaunchSpec {
    /// Build launch parameters from a provider table entry
    ///
    /// `env` holds the entry's overrides with secrets already resolved.
    ///
    /// # Errors
    /// Returns `BridgeError::Spawn` if the executable cannot be located
    pub fn from_provider(
        kind: &str,
        spec: &ProviderSpec,
        env: Vec<(String, String)>,
    ) -> Result<Self> {
        let program = resolve_program(&spec.command, spec.cwd.as_deref())
            .ok_or_else(|| BridgeError::spawn(kind, format!("executable not found: {}", spec.command)))?;

        Ok(Self {
            kind: kind.to_string(),
            program,
            args: spec.args.clone(),
            env,
            cwd: spec.cwd.clone(),
        })
    }
}

/// Locate an executable
///
/// Bare names are searched on `PATH`; anything containing a path separator is
/// taken relative to `cwd` (or the bridge's working directory) and must exist.
fn resolve_program(command: &str, cwd: Option<&Path>) -> Option<PathBuf> {
    let path = Path::new(command);
    if path.components().count() > 1 || path.is_absolute() {
        let candidate = match cwd {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };
        return candidate.is_file().then_some(candidate);
    }
    which::which(command).ok()
}

/// Command builder for provider processes
pub struct CommandBuilder<'a> {
    spec: &'a LaunchSpec,
}

impl<'a> CommandBuilder<'a> {
    /// Create a new command builder
    pub fn new(spec: &'a LaunchSpec) -> Self {
        Self { spec }
    }

    /// Build the command with piped stdio
    ///
    /// The provider inherits the bridge's environment with the spec's
    /// overrides applied on top. The child is killed if its handle is dropped.
    pub fn build(&self) -> Command {
        let mut cmd = Command::new(&self.spec.program);
        cmd.args(&self.spec.args);

        for (key, value) in &self.spec.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.spec.cwd {
            cmd.current_dir(cwd);
        }

        // stderr is piped so the provider never writes to the bridge's terminal
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        cmd
    }
}
