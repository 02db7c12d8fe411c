//! Configuration constants and types for subprocess transport

use std::path::PathBuf;
use std::time::Duration;

/// Default maximum size of a single output line (1MB)
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Default time a provider gets to exit after its input is closed
pub const DEFAULT_TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Characters of an offending line kept in log output
pub(crate) const LOG_SNIPPET_CHARS: usize = 200;

/// Environment variables a provider table may not override
///
/// These variables change how the subprocess loads and executes code.
pub const DANGEROUS_ENV_VARS: &[&str] = &[
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    "NODE_OPTIONS",
];

/// Fully resolved launch parameters for one provider process
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    /// Provider kind (for logging and errors)
    pub kind: String,
    /// Executable to run
    pub program: PathBuf,
    /// Arguments
    pub args: Vec<String>,
    /// Environment overrides, secrets already resolved
    pub env: Vec<(String, String)>,
    /// Working directory
    pub cwd: Option<PathBuf>,
}

/// Tunables for a subprocess transport
#[derive(Debug, Clone, Copy)]
pub struct TransportOptions {
    /// Longest output line accepted before it is discarded
    pub max_line_bytes: usize,
    /// Grace period between closing stdin and killing the process
    pub terminate_timeout: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            terminate_timeout: DEFAULT_TERMINATE_TIMEOUT,
        }
    }
}
