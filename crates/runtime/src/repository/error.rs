//! Error types raised by repository implementations.

use thiserror::Error;

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository lock was poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("record of {len} bytes exceeds limit of {limit}")]
    RecordTooLarge { len: usize, limit: usize },
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
