//! Repository layer for data that must outlive a session.
//!
//! Only the queue of actions not yet broadcast is persisted. Everything else
//! the runtime holds (cache, overlay, completions) is rebuilt from the
//! ledger on start.

mod error;
mod file;
mod memory;
mod traits;

pub use error::{RepositoryError, Result};
pub use file::FilePendingStore;
pub use memory::InMemoryPendingStore;
pub use traits::PendingActionRepository;
