//! Cached ledger state representation.
//!
//! Each [`EntityAddress`](crate::EntityAddress) resolves to one
//! [`EntityState`] snapshot. The runtime stores the last authoritative snapshot
//! per address and folds speculative modifiers over it; nothing in this module
//! talks to the ledger.
mod agent;
mod avatar;
mod shared;

pub use agent::AgentState;
pub use avatar::{AvatarState, Equipment, Inventory, Mail, MailKind, SlotState};
pub use shared::{BoardState, Listing, MarketState};

/// Height of a block on the ledger.
pub type BlockIndex = u64;

/// Identifier of a fungible (stackable) item.
pub type ItemId = u32;

/// Identifier of a non-fungible item instance.
pub type NonFungibleId = u64;

/// Identifier of a mail inside an avatar's mailbox.
pub type MailId = u64;

/// Identifier of a market listing.
pub type ListingId = u64;

/// Snapshot of a single addressable piece of ledger state.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EntityState {
    /// Signer-level account state (currency, avatar slots).
    Agent(AgentState),
    /// A playable character owned by an agent.
    Avatar(AvatarState),
    /// The globally shared market board.
    Market(MarketState),
    /// A shared score board (stage ranking, arena bucket).
    Board(BoardState),
}

impl EntityState {
    pub fn as_agent(&self) -> Option<&AgentState> {
        match self {
            EntityState::Agent(agent) => Some(agent),
            _ => None,
        }
    }

    pub fn as_avatar(&self) -> Option<&AvatarState> {
        match self {
            EntityState::Avatar(avatar) => Some(avatar),
            _ => None,
        }
    }

    pub fn as_market(&self) -> Option<&MarketState> {
        match self {
            EntityState::Market(market) => Some(market),
            _ => None,
        }
    }

    pub fn as_board(&self) -> Option<&BoardState> {
        match self {
            EntityState::Board(board) => Some(board),
            _ => None,
        }
    }

    /// Short label of the variant, used in logs.
    pub const fn label(&self) -> &'static str {
        match self {
            EntityState::Agent(_) => "agent",
            EntityState::Avatar(_) => "avatar",
            EntityState::Market(_) => "market",
            EntityState::Board(_) => "board",
        }
    }
}

impl From<AgentState> for EntityState {
    fn from(state: AgentState) -> Self {
        EntityState::Agent(state)
    }
}

impl From<AvatarState> for EntityState {
    fn from(state: AvatarState) -> Self {
        EntityState::Avatar(state)
    }
}

impl From<MarketState> for EntityState {
    fn from(state: MarketState) -> Self {
        EntityState::Market(state)
    }
}

impl From<BoardState> for EntityState {
    fn from(state: BoardState) -> Self {
        EntityState::Board(state)
    }
}
