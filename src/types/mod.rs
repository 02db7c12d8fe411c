//! Type definitions for the provider bridge
//!
//! - [`identifiers`] - Type-safe ID wrappers (`SessionId`, `ProviderKind`)
//! - [`status`] - Health, poll and accepted response bodies

pub mod identifiers;
pub mod status;

pub use identifiers::{ProviderKind, SessionId};
pub use status::{AcceptedResponse, HealthResponse, PollResponse, SessionStatus};
