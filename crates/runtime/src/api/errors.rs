//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from the overlay, the repositories, and the ledger
//! transport so callers can bubble them up with consistent context.

use thiserror::Error;

use client_blockchain_core::TransportError;
use game_core::{ActionId, EntityAddress};

pub use crate::overlay::OverlayError;
pub use crate::repository::RepositoryError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("session has been shut down")]
    ShutDown,

    #[error("action {0} was already submitted")]
    DuplicateAction(ActionId),

    #[error("no signer registered for {0}")]
    UnknownSigner(EntityAddress),

    #[error("session requires a ledger transport before building")]
    MissingLedger,

    #[error("session requires at least one signer before building")]
    MissingSigner,

    #[error("worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
