//! Speculative overlay over the authoritative cache.
//!
//! [`AuthoritativeCache`] holds confirmed snapshots; [`OverlayStore`] holds
//! the ordered speculative modifiers per address and folds the two into the
//! effective view. The two structures have independent locks.

mod cache;
mod store;

pub use cache::AuthoritativeCache;
pub use store::{OverlayStore, RetiredModifier};

use game_core::{ActionId, EntityAddress};

/// Errors raised by the overlay store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OverlayError {
    #[error("action {action} already installed this modifier at {address}")]
    DuplicateSpeculation {
        action: ActionId,
        address: EntityAddress,
    },
}

pub type Result<T> = std::result::Result<T, OverlayError>;
