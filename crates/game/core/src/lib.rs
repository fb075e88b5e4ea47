//! Pure domain model shared by the client layers.
//!
//! `game-core` defines the addresses, actions, entity snapshots and the
//! speculative [`StateModifier`]s folded over them. It performs no I/O: the
//! ledger interface and the reconciliation runtime depend on the types
//! re-exported here.
pub mod action;
pub mod address;
pub mod error;
pub mod modifier;
pub mod state;

pub use action::{
    Action, ActionId, ActionInput, ActionKind, BuyListingAction, ClaimRewardAction,
    ClearStageAction, CombineEquipmentAction, EffectContext, EnhanceEquipmentAction,
    JoinArenaAction, RedeemMailAction, RegisterListingAction, TransferAssetAction, anticipate,
};
pub use address::{ADDRESS_LEN, AddressParseError, EntityAddress};
pub use error::ModifierError;
pub use modifier::{ModifierTarget, Speculation, StateModifier, UnlockEstimate, diff};
pub use state::{
    AgentState, AvatarState, BlockIndex, BoardState, EntityState, Equipment, Inventory, ItemId,
    Listing, ListingId, Mail, MailId, MailKind, MarketState, NonFungibleId, SlotState,
};
