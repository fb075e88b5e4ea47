//! Worker tasks that back a session.
//!
//! The batcher broadcasts queued actions, the evaluation worker feeds the
//! ledger's evaluation stream into the router, and the persistence worker
//! checkpoints queued and in-flight actions.

mod batcher;
mod evaluation;
mod persistence;

pub use batcher::{BatchSettings, TransactionBatcher};
pub use evaluation::{EvaluationWorker, recover_outcomes};
pub use persistence::PersistenceWorker;
