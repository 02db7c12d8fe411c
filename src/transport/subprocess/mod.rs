//! Subprocess transport for provider processes
//!
//! Each provider runs as a child process speaking newline-delimited JSON on
//! stdin/stdout. Stderr is forwarded to the bridge log.

mod codec;
mod command;
mod config;
mod lifecycle;
mod reader;
mod transport;

// Re-export public types
pub use codec::{DecodedLine, LineCodec};
pub use command::CommandBuilder;
pub use config::{
    DANGEROUS_ENV_VARS, DEFAULT_MAX_LINE_BYTES, DEFAULT_TERMINATE_TIMEOUT, LaunchSpec,
    TransportOptions,
};
pub use transport::SubprocessTransport;
