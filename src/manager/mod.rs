//! Provider session management
//!
//! Provides `SessionManager` for creating, resolving and reaping sessions,
//! each bound to one provider process with its own output buffer and at
//! most one attached push stream.
//!
//! # Module Structure
//!
//! - `session_manager` - Core `SessionManager` with public API
//! - `session` - Per-session state
//! - `subscription` - Push stream subscriptions
//! - `commands` - Command protocol for the collector task
//! - `background` - Collector task spawning
//! - `helpers` - Pure helper functions for message processing

mod background;
mod commands;
mod helpers;
mod session;
mod session_manager;
mod subscription;

pub use session::BridgeSession;
pub use session_manager::{Resolved, SessionManager};
pub use subscription::SessionSubscription;
