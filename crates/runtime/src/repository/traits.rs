//! Repository contract for actions without a known outcome.

use super::Result;
use crate::queue::PendingAction;

/// Durable store for actions accepted but not yet evaluated, whether
/// queued or already broadcast.
///
/// `save` replaces the stored snapshot as a whole. A crash during `save`
/// must leave the previous snapshot readable.
pub trait PendingActionRepository: Send + Sync {
    /// Replace the stored snapshot with `actions`.
    fn save(&self, actions: &[PendingAction]) -> Result<()>;

    /// Load the stored snapshot, skipping records that cannot be decoded.
    fn load(&self) -> Result<Vec<PendingAction>>;

    /// Remove the stored snapshot.
    fn clear(&self) -> Result<()>;
}
