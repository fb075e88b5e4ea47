//! File-based repository implementations.

mod pending;

pub use pending::FilePendingStore;
