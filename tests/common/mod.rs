//! Shared helpers for integration tests
//!
//! Providers are small POSIX shell loops run through `sh -c`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use provider_bridge::{
    ProviderSpec, ProviderTable, SessionConfig, SessionManager, StaticSecretProvider,
};

/// Answers `{"op":"ping"}` with a pong and echoes every other line
pub const ECHO: &str = r#"while IFS= read -r line; do
  case "$line" in
    *'"op":"ping"'*) printf '{"id":1,"op":"pong"}\n' ;;
    *) printf '%s\n' "$line" ;;
  esac
done"#;

/// Emits a malformed line between two valid ones per input line
pub const MALFORMED: &str = r#"while IFS= read -r line; do
  printf '{"n":1}\nnot json\n{"n":2}\n'
done"#;

/// Emits one message in two writes with a pause in between
pub const SPLIT: &str = r#"while IFS= read -r line; do
  printf '{"par'
  sleep 0.2
  printf 'tial":true}\n'
done"#;

/// Answers the first line, then exits with code 3
pub const EXITING: &str = r#"IFS= read -r line
printf '{"bye":true}\n'
exit 3"#;

/// Reads input and never answers
pub const SILENT: &str = r#"while IFS= read -r line; do :; done"#;

/// Never reads its input, so large writes fill the pipe and block
pub const STALLED: &str = "sleep 100";

/// Reports the TOKEN variable for every input line
pub const TOKEN: &str = r#"while IFS= read -r line; do
  printf '{"token":"%s"}\n' "$TOKEN"
done"#;

/// Writes to stderr, then behaves like the echo provider
pub const NOISY: &str = r#"echo "starting up" >&2
while IFS= read -r line; do
  echo "got a line" >&2
  printf '%s\n' "$line"
done"#;

/// Provider spec running a shell script
pub fn sh(script: &str) -> ProviderSpec {
    ProviderSpec::new("sh", ["-c", script])
}

/// Provider table with every test provider
pub fn providers() -> ProviderTable {
    ProviderTable::new()
        .with_provider("echo", sh(ECHO))
        .with_provider("malformed", sh(MALFORMED))
        .with_provider("split", sh(SPLIT))
        .with_provider("exiting", sh(EXITING))
        .with_provider("silent", sh(SILENT))
        .with_provider("noisy", sh(NOISY))
        .with_provider("stalled", sh(STALLED))
}

/// Session settings with short timings for tests
pub fn session_config() -> SessionConfig {
    SessionConfig {
        terminate_timeout_secs: 1,
        poll_grace_ms: 2000,
        ..SessionConfig::default()
    }
}

/// Manager over the test providers
pub fn manager(config: SessionConfig) -> SessionManager {
    SessionManager::new(providers(), Arc::new(StaticSecretProvider::new()), config)
}

/// Poll `condition` until it holds or five seconds pass
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Install a test logger
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
