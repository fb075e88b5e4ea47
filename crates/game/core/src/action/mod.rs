//! Action domain - client-originated state-change intents.
//!
//! # Module Structure
//!
//! - `id`: [`ActionId`], the client-generated unique identifier
//! - `kind`: [`ActionKind`], the discriminant used to route evaluations
//! - `types`: [`ActionInput`] and the per-kind parameter structs
//! - `effects`: anticipated effects used to build speculative modifiers
//!
//! An [`Action`] is immutable once created; the ledger reports its outcome
//! under the same [`ActionId`].

pub mod effects;
mod id;
mod kind;
mod types;

pub use effects::{EffectContext, anticipate};
pub use id::ActionId;
pub use kind::ActionKind;
pub use types::{
    ActionInput, BuyListingAction, ClaimRewardAction, ClearStageAction, CombineEquipmentAction,
    EnhanceEquipmentAction, JoinArenaAction, RedeemMailAction, RegisterListingAction,
    TransferAssetAction,
};

use crate::address::EntityAddress;

/// A state-change intent signed by `signer`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Action {
    id: ActionId,
    signer: EntityAddress,
    input: ActionInput,
}

impl Action {
    /// Creates an action with a freshly generated identifier.
    pub fn new(signer: EntityAddress, input: impl Into<ActionInput>) -> Self {
        Self::with_id(ActionId::generate(), signer, input)
    }

    /// Creates an action with an explicit identifier (restored or test actions).
    pub fn with_id(id: ActionId, signer: EntityAddress, input: impl Into<ActionInput>) -> Self {
        Self {
            id,
            signer,
            input: input.into(),
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    pub fn signer(&self) -> EntityAddress {
        self.signer
    }

    pub fn input(&self) -> &ActionInput {
        &self.input
    }

    pub fn kind(&self) -> ActionKind {
        self.input.kind()
    }

    /// Avatar the action operates on, if any.
    pub fn avatar(&self) -> Option<EntityAddress> {
        self.input.avatar()
    }
}
