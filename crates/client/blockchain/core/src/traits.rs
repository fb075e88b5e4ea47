//! Ledger abstraction traits.
//!
//! - Layer 0: [`LedgerTransport`] (node RPC: submit, query, stream)
//! - Layer 1: [`TransactionSigner`] (key custody)
//!
//! The runtime only talks to these traits, so a real node client and the
//! in-memory mock are interchangeable.

use async_trait::async_trait;
use tokio::sync::broadcast;

use game_core::{ActionId, BlockIndex, EntityAddress, EntityState};

use crate::types::{
    ActionEvaluation, EvaluationEvent, Signature, SignedTransaction, Transaction, TxId,
};

// ============================================================================
// Error Types
// ============================================================================

/// Transport layer errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Nonce conflict for {signer}: submitted {submitted}, expected {expected}")]
    NonceConflict {
        signer: EntityAddress,
        submitted: u64,
        expected: u64,
    },

    #[error("Transaction rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Backend-specific error: {0}")]
    BackendError(String),
}

impl TransportError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::Timeout)
    }
}

/// Errors raised while building or encoding a transaction.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error("Transaction must contain at least one action")]
    Empty,

    #[error("Action signer {found} does not match transaction signer {expected}")]
    SignerMismatch {
        expected: EntityAddress,
        found: EntityAddress,
    },

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Signing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("Signer {signer} cannot sign for {requested}")]
    WrongSigner {
        signer: EntityAddress,
        requested: EntityAddress,
    },

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

// ============================================================================
// Layer 0: Pure Infrastructure
// ============================================================================

/// Node-facing operations the client depends on.
#[async_trait]
pub trait LedgerTransport: Send + Sync {
    /// Broadcast a signed transaction to the network.
    async fn submit_transaction(&self, tx: SignedTransaction) -> Result<TxId, TransportError>;

    /// Next nonce the ledger expects from `signer`, counting pooled transactions.
    async fn next_nonce(&self, signer: &EntityAddress) -> Result<u64, TransportError>;

    /// Authoritative snapshot at `address`, or `None` if nothing is stored there.
    async fn query_state(
        &self,
        address: &EntityAddress,
    ) -> Result<Option<EntityState>, TransportError>;

    /// Index of the latest block.
    async fn tip(&self) -> Result<BlockIndex, TransportError>;

    /// Subscribe to every confirmed and rolled-back action evaluation.
    fn subscribe_evaluations(&self) -> broadcast::Receiver<EvaluationEvent>;

    /// Confirmed evaluation of `action_id`, or `None` if the action is not
    /// (or no longer) included in a block.
    async fn evaluation_of(
        &self,
        action_id: ActionId,
    ) -> Result<Option<ActionEvaluation>, TransportError>;

    /// Check if the node is reachable.
    async fn health_check(&self) -> Result<(), TransportError> {
        self.tip().await.map(|_| ())
    }
}

// ============================================================================
// Layer 1: Keys
// ============================================================================

/// Holds the private key for one agent.
pub trait TransactionSigner: Send + Sync {
    /// Agent address this signer signs for.
    fn address(&self) -> EntityAddress;

    fn sign(&self, transaction: &Transaction) -> Result<Signature, SignerError>;
}
