//! Avatar snapshot: inventory, mailbox, crafting slots.

use std::collections::BTreeMap;

use super::{BlockIndex, ItemId, MailId, NonFungibleId};
use crate::address::EntityAddress;

/// A single non-fungible equipment instance.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Equipment {
    pub id: NonFungibleId,
    pub item_id: ItemId,
    pub level: u8,
}

/// Items held by an avatar.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Inventory {
    /// Stackable materials: item id → count. Zero counts are never stored.
    pub fungible: BTreeMap<ItemId, u32>,
    /// Equipment instances keyed by their non-fungible id.
    pub equipment: BTreeMap<NonFungibleId, Equipment>,
}

impl Inventory {
    pub fn count(&self, item_id: ItemId) -> u32 {
        self.fungible.get(&item_id).copied().unwrap_or(0)
    }

    pub fn add_fungible(&mut self, item_id: ItemId, count: u32) {
        if count == 0 {
            return;
        }
        let entry = self.fungible.entry(item_id).or_insert(0);
        *entry = entry.saturating_add(count);
    }

    /// Removes up to `count` items; never underflows.
    pub fn remove_fungible(&mut self, item_id: ItemId, count: u32) {
        if let Some(held) = self.fungible.get_mut(&item_id) {
            *held = held.saturating_sub(count);
            if *held == 0 {
                self.fungible.remove(&item_id);
            }
        }
    }
}

/// Category of a mail delivered to an avatar.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::AsRefStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case")]
pub enum MailKind {
    Reward,
    Combination,
    Sale,
    Transfer,
}

/// A mailbox entry.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mail {
    pub id: MailId,
    pub kind: MailKind,
    pub block_index: BlockIndex,
    /// Attached fungible items, delivered on redemption.
    pub attachments: Vec<(ItemId, u32)>,
    pub read: bool,
}

/// Occupancy of a crafting slot.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotState {
    /// Block at which the slot's result can be collected.
    pub unlock_block_index: BlockIndex,
    /// `true` when `unlock_block_index` is a client-side guess rather than
    /// ledger state. See [`UnlockEstimate`](crate::modifier::UnlockEstimate).
    pub estimated: bool,
    /// Item being crafted, if known.
    pub result: Option<Equipment>,
}

/// Playable character owned by an agent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AvatarState {
    pub agent: EntityAddress,
    pub name: String,
    pub level: u32,
    pub action_point: u32,
    pub inventory: Inventory,
    pub mailbox: BTreeMap<MailId, Mail>,
    /// Named boolean flags (tutorial steps, unlocked content).
    pub flags: BTreeMap<String, bool>,
    pub combination_slots: BTreeMap<u8, SlotState>,
    pub daily_reward_received_index: BlockIndex,
}

impl AvatarState {
    pub fn new(agent: EntityAddress, name: impl Into<String>) -> Self {
        Self {
            agent,
            name: name.into(),
            level: 1,
            ..Self::default()
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        self.flags.get(key).copied().unwrap_or(false)
    }

    pub fn unread_mail(&self) -> impl Iterator<Item = &Mail> {
        self.mailbox.values().filter(|mail| !mail.read)
    }
}
