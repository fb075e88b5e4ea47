//! In-memory repository implementations for testing and sessions without a
//! data directory.

mod pending;

pub use pending::InMemoryPendingStore;
