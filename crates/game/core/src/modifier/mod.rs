//! Speculative state modifiers.
//!
//! A [`StateModifier`] is a typed, invertible delta over one [`EntityState`].
//! The runtime installs modifiers the moment a user-visible effect should
//! appear and folds them over the authoritative snapshot to produce the
//! effective view. The same type describes authoritative changes: [`diff`]
//! turns a `(previous, output)` snapshot pair into the modifiers that connect
//! them, which is what lets a rollback undo exactly one evaluation without
//! reverting whole snapshots.
//!
//! # Invariants
//!
//! - [`StateModifier::apply`] is pure: it never mutates its input.
//! - `m.inverse().apply(&m.apply(s)) == s` whenever `m` actually changed `s`.
//! - A modifier whose target variant does not match the snapshot is a no-op.
mod diff;
mod estimate;

pub use diff::diff;
pub use estimate::UnlockEstimate;

use crate::address::EntityAddress;
use crate::state::{
    AgentState, AvatarState, BlockIndex, BoardState, EntityState, Equipment, ItemId, Listing,
    Mail, MailId, MarketState, NonFungibleId, SlotState,
};

/// Which snapshot variant a modifier applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum ModifierTarget {
    Agent,
    Avatar,
    Market,
    Board,
}

/// One speculative (or diffed authoritative) change to one cached entity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StateModifier {
    // ========================================================================
    // Agent
    // ========================================================================
    /// Add (positive) or subtract (negative) currency. Saturates at zero.
    AdjustBalance { amount: i64 },

    /// Point an avatar slot at a new address (or clear it).
    SetAvatarAddress {
        index: u8,
        from: Option<EntityAddress>,
        to: Option<EntityAddress>,
    },

    // ========================================================================
    // Avatar
    // ========================================================================
    AdjustActionPoint { amount: i64 },

    SetLevel { from: u32, to: u32 },

    AddFungibleItem { item_id: ItemId, count: u32 },

    RemoveFungibleItem { item_id: ItemId, count: u32 },

    AddNonFungibleItem { item: Equipment },

    /// Removes the equipment with `item.id`. The full item is carried so the
    /// removal can be inverted.
    RemoveNonFungibleItem { item: Equipment },

    SetEquipmentLevel {
        id: NonFungibleId,
        from: u8,
        to: u8,
    },

    AddMail { mail: Mail },

    RemoveMail { mail: Mail },

    SetMailRead { mail_id: MailId, read: bool },

    /// Flags store only `true`; setting `false` removes the key.
    SetFlag { key: String, value: bool },

    SetSlot {
        slot: u8,
        from: Option<SlotState>,
        to: Option<SlotState>,
    },

    SetDailyRewardIndex { from: BlockIndex, to: BlockIndex },

    // ========================================================================
    // Shared entities
    // ========================================================================
    AddListing { listing: Listing },

    RemoveListing { listing: Listing },

    SetBoardEntry {
        avatar: EntityAddress,
        from: Option<u64>,
        to: Option<u64>,
    },
}

impl StateModifier {
    /// Snapshot variant this modifier applies to.
    pub const fn target(&self) -> ModifierTarget {
        match self {
            StateModifier::AdjustBalance { .. } | StateModifier::SetAvatarAddress { .. } => {
                ModifierTarget::Agent
            }
            StateModifier::AddListing { .. } | StateModifier::RemoveListing { .. } => {
                ModifierTarget::Market
            }
            StateModifier::SetBoardEntry { .. } => ModifierTarget::Board,
            _ => ModifierTarget::Avatar,
        }
    }

    /// Returns the snapshot with this modifier applied.
    pub fn apply(&self, snapshot: &EntityState) -> EntityState {
        let mut next = snapshot.clone();
        self.apply_in_place(&mut next);
        next
    }

    /// Folds `modifiers` over `snapshot` in order.
    pub fn fold<'a>(
        snapshot: &EntityState,
        modifiers: impl IntoIterator<Item = &'a StateModifier>,
    ) -> EntityState {
        let mut next = snapshot.clone();
        for modifier in modifiers {
            modifier.apply_in_place(&mut next);
        }
        next
    }

    fn apply_in_place(&self, state: &mut EntityState) {
        match state {
            EntityState::Agent(agent) => self.apply_agent(agent),
            EntityState::Avatar(avatar) => self.apply_avatar(avatar),
            EntityState::Market(market) => self.apply_market(market),
            EntityState::Board(board) => self.apply_board(board),
        }
    }

    fn apply_agent(&self, agent: &mut AgentState) {
        match self {
            StateModifier::AdjustBalance { amount } => {
                agent.gold = adjust_u64(agent.gold, *amount);
            }
            StateModifier::SetAvatarAddress { index, to, .. } => match to {
                Some(address) => {
                    agent.avatars.insert(*index, *address);
                }
                None => {
                    agent.avatars.remove(index);
                }
            },
            _ => {}
        }
    }

    fn apply_avatar(&self, avatar: &mut AvatarState) {
        match self {
            StateModifier::AdjustActionPoint { amount } => {
                let next = adjust_u64(u64::from(avatar.action_point), *amount);
                avatar.action_point = u32::try_from(next).unwrap_or(u32::MAX);
            }
            StateModifier::SetLevel { to, .. } => avatar.level = *to,
            StateModifier::AddFungibleItem { item_id, count } => {
                avatar.inventory.add_fungible(*item_id, *count);
            }
            StateModifier::RemoveFungibleItem { item_id, count } => {
                avatar.inventory.remove_fungible(*item_id, *count);
            }
            StateModifier::AddNonFungibleItem { item } => {
                avatar.inventory.equipment.insert(item.id, item.clone());
            }
            StateModifier::RemoveNonFungibleItem { item } => {
                avatar.inventory.equipment.remove(&item.id);
            }
            StateModifier::SetEquipmentLevel { id, to, .. } => {
                if let Some(equipment) = avatar.inventory.equipment.get_mut(id) {
                    equipment.level = *to;
                }
            }
            StateModifier::AddMail { mail } => {
                avatar.mailbox.insert(mail.id, mail.clone());
            }
            StateModifier::RemoveMail { mail } => {
                avatar.mailbox.remove(&mail.id);
            }
            StateModifier::SetMailRead { mail_id, read } => {
                if let Some(mail) = avatar.mailbox.get_mut(mail_id) {
                    mail.read = *read;
                }
            }
            StateModifier::SetFlag { key, value } => {
                if *value {
                    avatar.flags.insert(key.clone(), true);
                } else {
                    avatar.flags.remove(key);
                }
            }
            StateModifier::SetSlot { slot, to, .. } => match to {
                Some(state) => {
                    avatar.combination_slots.insert(*slot, state.clone());
                }
                None => {
                    avatar.combination_slots.remove(slot);
                }
            },
            StateModifier::SetDailyRewardIndex { to, .. } => {
                avatar.daily_reward_received_index = *to;
            }
            _ => {}
        }
    }

    fn apply_market(&self, market: &mut MarketState) {
        match self {
            StateModifier::AddListing { listing } => {
                market.listings.insert(listing.id, listing.clone());
            }
            StateModifier::RemoveListing { listing } => {
                market.listings.remove(&listing.id);
            }
            _ => {}
        }
    }

    fn apply_board(&self, board: &mut BoardState) {
        if let StateModifier::SetBoardEntry { avatar, to, .. } = self {
            match to {
                Some(score) => {
                    board.entries.insert(*avatar, *score);
                }
                None => {
                    board.entries.remove(avatar);
                }
            }
        }
    }

    /// Returns the modifier that undoes this one.
    pub fn inverse(&self) -> StateModifier {
        match self {
            StateModifier::AdjustBalance { amount } => StateModifier::AdjustBalance {
                amount: amount.saturating_neg(),
            },
            StateModifier::SetAvatarAddress { index, from, to } => {
                StateModifier::SetAvatarAddress {
                    index: *index,
                    from: *to,
                    to: *from,
                }
            }
            StateModifier::AdjustActionPoint { amount } => StateModifier::AdjustActionPoint {
                amount: amount.saturating_neg(),
            },
            StateModifier::SetLevel { from, to } => StateModifier::SetLevel {
                from: *to,
                to: *from,
            },
            StateModifier::AddFungibleItem { item_id, count } => {
                StateModifier::RemoveFungibleItem {
                    item_id: *item_id,
                    count: *count,
                }
            }
            StateModifier::RemoveFungibleItem { item_id, count } => {
                StateModifier::AddFungibleItem {
                    item_id: *item_id,
                    count: *count,
                }
            }
            StateModifier::AddNonFungibleItem { item } => {
                StateModifier::RemoveNonFungibleItem { item: item.clone() }
            }
            StateModifier::RemoveNonFungibleItem { item } => {
                StateModifier::AddNonFungibleItem { item: item.clone() }
            }
            StateModifier::SetEquipmentLevel { id, from, to } => StateModifier::SetEquipmentLevel {
                id: *id,
                from: *to,
                to: *from,
            },
            StateModifier::AddMail { mail } => StateModifier::RemoveMail { mail: mail.clone() },
            StateModifier::RemoveMail { mail } => StateModifier::AddMail { mail: mail.clone() },
            StateModifier::SetMailRead { mail_id, read } => StateModifier::SetMailRead {
                mail_id: *mail_id,
                read: !*read,
            },
            StateModifier::SetFlag { key, value } => StateModifier::SetFlag {
                key: key.clone(),
                value: !*value,
            },
            StateModifier::SetSlot { slot, from, to } => StateModifier::SetSlot {
                slot: *slot,
                from: to.clone(),
                to: from.clone(),
            },
            StateModifier::SetDailyRewardIndex { from, to } => StateModifier::SetDailyRewardIndex {
                from: *to,
                to: *from,
            },
            StateModifier::AddListing { listing } => StateModifier::RemoveListing {
                listing: listing.clone(),
            },
            StateModifier::RemoveListing { listing } => StateModifier::AddListing {
                listing: listing.clone(),
            },
            StateModifier::SetBoardEntry { avatar, from, to } => StateModifier::SetBoardEntry {
                avatar: *avatar,
                from: *to,
                to: *from,
            },
        }
    }
}

/// A modifier bound to the address it applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Speculation {
    pub address: EntityAddress,
    pub modifier: StateModifier,
}

impl Speculation {
    pub fn new(address: EntityAddress, modifier: StateModifier) -> Self {
        Self { address, modifier }
    }
}

fn adjust_u64(value: u64, amount: i64) -> u64 {
    if amount >= 0 {
        value.saturating_add(amount.unsigned_abs())
    } else {
        value.saturating_sub(amount.unsigned_abs())
    }
}
