//! Session registry implementation
//!
//! This module is organized into logical submodules:
//! - `core`: Core struct, constructor, reaper and shutdown
//! - `spawn`: Session creation
//! - `lookup`: Resolution, lookup and deletion
//! - `status`: Iteration and status snapshots

mod core;
mod lookup;
mod spawn;
mod status;

// Re-export public API
pub use self::core::SessionManager;
pub use lookup::Resolved;

pub(crate) use self::core::{SessionMap, teardown};
