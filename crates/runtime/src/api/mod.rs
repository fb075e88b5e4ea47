//! Public runtime API surface.
//!
//! This module gathers the types exposed to feature code so other layers can
//! stay focused on orchestration, workers, or infrastructure.

pub mod errors;
pub mod handle;

pub use errors::{Result, RuntimeError};
pub use handle::{PendingHandle, SessionHandle};
