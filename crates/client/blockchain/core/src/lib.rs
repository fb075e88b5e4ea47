//! Ledger abstraction layer for the game client.
//!
//! # Architecture
//!
//! ```text
//! Layer 1: TransactionSigner  (key custody)
//!
//! Layer 0: LedgerTransport    (submit, nonce, query, evaluation stream)
//! ```
//!
//! The reconciliation runtime only depends on these traits. The `mock`
//! feature adds an in-memory [`MockLedger`] that executes actions, produces
//! blocks on demand and can roll them back, which is how the runtime is
//! tested without a node.
//!
//! # Usage
//!
//! ```ignore
//! use client_blockchain_core::{LedgerTransport, Transaction, SignedTransaction};
//!
//! async fn broadcast(ledger: &dyn LedgerTransport, signer: &dyn TransactionSigner, actions: Vec<Action>) {
//!     let nonce = ledger.next_nonce(&signer.address()).await?;
//!     let tx = Transaction::new(signer.address(), nonce, actions)?;
//!     let signature = signer.sign(&tx)?;
//!     ledger.submit_transaction(SignedTransaction { transaction: tx, signature }).await?;
//! }
//! ```

pub mod traits;
pub mod types;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use traits::{
    LedgerTransport, SignerError, TransactionError, TransactionSigner, TransportError,
};

pub use types::{
    ActionEvaluation, ActionException, EvaluationDirection, EvaluationEvent, LedgerPosition,
    Signature, SignedTransaction, Transaction, TxId,
};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockLedger, MockSigner};
