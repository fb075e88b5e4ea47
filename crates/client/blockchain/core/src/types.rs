//! Common types for ledger interactions.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use game_core::{Action, ActionId, ActionKind, BlockIndex, EntityAddress, EntityState};

use crate::traits::TransactionError;

/// Transaction identifier: SHA-256 of the bincode-encoded unsigned transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub [u8; 32]);

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", &hex::encode(self.0)[..12])
    }
}

/// Opaque signature bytes produced by a [`TransactionSigner`](crate::TransactionSigner).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(pub Vec<u8>);

/// An ordered, non-empty batch of actions from one signer.
///
/// Executed atomically by the ledger; every contained action still yields
/// its own [`ActionEvaluation`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    signer: EntityAddress,
    nonce: u64,
    actions: Vec<Action>,
    timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Builds a transaction.
    ///
    /// # Errors
    ///
    /// - [`TransactionError::Empty`] if `actions` is empty
    /// - [`TransactionError::SignerMismatch`] if an action belongs to another signer
    pub fn new(
        signer: EntityAddress,
        nonce: u64,
        actions: Vec<Action>,
    ) -> Result<Self, TransactionError> {
        if actions.is_empty() {
            return Err(TransactionError::Empty);
        }
        if let Some(action) = actions.iter().find(|a| a.signer() != signer) {
            return Err(TransactionError::SignerMismatch {
                expected: signer,
                found: action.signer(),
            });
        }

        Ok(Self {
            signer,
            nonce,
            actions,
            timestamp: Utc::now(),
        })
    }

    pub fn signer(&self) -> EntityAddress {
        self.signer
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Canonical bytes covered by the signature.
    pub fn signing_payload(&self) -> Result<Vec<u8>, TransactionError> {
        bincode::serialize(self).map_err(|e| TransactionError::Encoding(e.to_string()))
    }

    pub fn id(&self) -> Result<TxId, TransactionError> {
        let digest = Sha256::digest(self.signing_payload()?);
        Ok(TxId(digest.into()))
    }
}

/// A transaction together with its signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub transaction: Transaction,
    pub signature: Signature,
}

impl SignedTransaction {
    pub fn action_ids(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.transaction.actions().iter().map(Action::id)
    }
}

/// Domain failure produced by the ledger while executing an action
/// (e.g. insufficient balance).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{name}: {message}")]
pub struct ActionException {
    pub name: String,
    pub message: String,
}

impl ActionException {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Execution position of an action on the ledger.
///
/// Ordered by block, then by the action's ordinal inside the block, so two
/// evaluations of the same block compare in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LedgerPosition {
    pub block_index: BlockIndex,
    pub ordinal: u32,
}

impl LedgerPosition {
    pub const fn new(block_index: BlockIndex, ordinal: u32) -> Self {
        Self {
            block_index,
            ordinal,
        }
    }

    /// Position after every action of `block_index`; what a state query
    /// made at that tip reflects.
    pub const fn end_of(block_index: BlockIndex) -> Self {
        Self::new(block_index, u32::MAX)
    }
}

/// Authoritative outcome of one action's execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvaluation {
    pub action: Action,
    /// Block the action was included in.
    pub block_index: BlockIndex,
    /// Execution index of the action within its block, counted across every
    /// transaction of the block.
    pub ordinal: u32,
    pub tx_id: Option<TxId>,
    /// Snapshots of every address the action wrote, after execution.
    pub output_states: BTreeMap<EntityAddress, EntityState>,
    /// Snapshots of the same addresses before execution (absent if created).
    pub previous_states: BTreeMap<EntityAddress, EntityState>,
    pub exception: Option<ActionException>,
}

impl ActionEvaluation {
    pub fn action_id(&self) -> ActionId {
        self.action.id()
    }

    pub fn signer(&self) -> EntityAddress {
        self.action.signer()
    }

    pub fn position(&self) -> LedgerPosition {
        LedgerPosition::new(self.block_index, self.ordinal)
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn is_success(&self) -> bool {
        self.exception.is_none()
    }

    pub fn updated_addresses(&self) -> impl Iterator<Item = &EntityAddress> {
        self.output_states.keys()
    }

    pub fn touches(&self, address: &EntityAddress) -> bool {
        self.output_states.contains_key(address)
    }

    pub fn output(&self, address: &EntityAddress) -> Option<&EntityState> {
        self.output_states.get(address)
    }

    pub fn previous(&self, address: &EntityAddress) -> Option<&EntityState> {
        self.previous_states.get(address)
    }
}

/// Whether an evaluation became authoritative or was invalidated by a reorg.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluationDirection {
    /// Render: the evaluation is now authoritative.
    Confirm,
    /// Unrender: a previously confirmed evaluation was rolled back.
    Rollback,
}

/// One item of the network-wide evaluation stream.
#[derive(Clone, Debug)]
pub struct EvaluationEvent {
    pub evaluation: Arc<ActionEvaluation>,
    pub direction: EvaluationDirection,
}

impl EvaluationEvent {
    pub fn confirm(evaluation: ActionEvaluation) -> Self {
        Self {
            evaluation: Arc::new(evaluation),
            direction: EvaluationDirection::Confirm,
        }
    }

    pub fn rollback(evaluation: ActionEvaluation) -> Self {
        Self {
            evaluation: Arc::new(evaluation),
            direction: EvaluationDirection::Rollback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_core::TransferAssetAction;

    fn transfer(signer: EntityAddress) -> Action {
        Action::new(
            signer,
            TransferAssetAction {
                recipient: EntityAddress::shared("friend"),
                amount: 1,
                memo: None,
            },
        )
    }

    #[test]
    fn empty_transactions_are_rejected() {
        let signer = EntityAddress::shared("signer");
        assert!(matches!(
            Transaction::new(signer, 0, vec![]),
            Err(TransactionError::Empty)
        ));
    }

    #[test]
    fn foreign_actions_are_rejected() {
        let signer = EntityAddress::shared("signer");
        let other = EntityAddress::shared("other");
        assert!(matches!(
            Transaction::new(signer, 0, vec![transfer(signer), transfer(other)]),
            Err(TransactionError::SignerMismatch { .. })
        ));
    }

    #[test]
    fn id_is_stable_for_same_transaction() {
        let signer = EntityAddress::shared("signer");
        let tx = Transaction::new(signer, 3, vec![transfer(signer)]).unwrap();
        assert_eq!(tx.id().unwrap(), tx.clone().id().unwrap());
        assert_eq!(tx.nonce(), 3);
    }
}
