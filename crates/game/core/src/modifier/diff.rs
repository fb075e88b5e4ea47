//! Snapshot diffing.
//!
//! [`diff`] expresses the change between two snapshots of the same entity as
//! a list of [`StateModifier`]s, so that
//! `StateModifier::fold(previous, &diff(previous, output)?) == output`.
//! Avatar `name`/`agent` are identity fields and are not diffed.

use std::collections::{BTreeMap, BTreeSet};

use super::StateModifier;
use crate::error::ModifierError;
use crate::state::{AgentState, AvatarState, BoardState, EntityState, MarketState};

/// Computes the modifiers that turn `previous` into `output`.
///
/// # Errors
///
/// Returns [`ModifierError::VariantMismatch`] if the snapshots are of
/// different variants (the address was re-purposed, which never happens for
/// deterministically derived addresses).
pub fn diff(
    previous: &EntityState,
    output: &EntityState,
) -> Result<Vec<StateModifier>, ModifierError> {
    let mut changes = Vec::new();
    match (previous, output) {
        (EntityState::Agent(before), EntityState::Agent(after)) => {
            diff_agent(before, after, &mut changes)
        }
        (EntityState::Avatar(before), EntityState::Avatar(after)) => {
            diff_avatar(before, after, &mut changes)
        }
        (EntityState::Market(before), EntityState::Market(after)) => {
            diff_market(before, after, &mut changes)
        }
        (EntityState::Board(before), EntityState::Board(after)) => {
            diff_board(before, after, &mut changes)
        }
        _ => {
            return Err(ModifierError::VariantMismatch {
                previous: previous.label(),
                output: output.label(),
            });
        }
    }
    Ok(changes)
}

fn diff_agent(before: &AgentState, after: &AgentState, out: &mut Vec<StateModifier>) {
    push_balance_delta(i128::from(after.gold) - i128::from(before.gold), out);

    for index in keys_of(&before.avatars, &after.avatars) {
        let from = before.avatars.get(&index).copied();
        let to = after.avatars.get(&index).copied();
        if from != to {
            out.push(StateModifier::SetAvatarAddress { index, from, to });
        }
    }
}

fn diff_avatar(before: &AvatarState, after: &AvatarState, out: &mut Vec<StateModifier>) {
    if before.level != after.level {
        out.push(StateModifier::SetLevel {
            from: before.level,
            to: after.level,
        });
    }

    let ap_delta = i64::from(after.action_point) - i64::from(before.action_point);
    if ap_delta != 0 {
        out.push(StateModifier::AdjustActionPoint { amount: ap_delta });
    }

    // Fungible items
    let (before_inv, after_inv) = (&before.inventory.fungible, &after.inventory.fungible);
    for item_id in keys_of(before_inv, after_inv) {
        let from = before_inv.get(&item_id).copied().unwrap_or(0);
        let to = after_inv.get(&item_id).copied().unwrap_or(0);
        if to > from {
            out.push(StateModifier::AddFungibleItem {
                item_id,
                count: to - from,
            });
        } else if from > to {
            out.push(StateModifier::RemoveFungibleItem {
                item_id,
                count: from - to,
            });
        }
    }

    // Equipment
    let (before_eq, after_eq) = (&before.inventory.equipment, &after.inventory.equipment);
    for id in keys_of(before_eq, after_eq) {
        match (before_eq.get(&id), after_eq.get(&id)) {
            (Some(from), Some(to)) if from == to => {}
            (Some(from), Some(to)) if from.item_id == to.item_id => {
                out.push(StateModifier::SetEquipmentLevel {
                    id,
                    from: from.level,
                    to: to.level,
                });
            }
            (from, to) => {
                if let Some(item) = from {
                    out.push(StateModifier::RemoveNonFungibleItem { item: item.clone() });
                }
                if let Some(item) = to {
                    out.push(StateModifier::AddNonFungibleItem { item: item.clone() });
                }
            }
        }
    }

    // Mailbox
    for mail_id in keys_of(&before.mailbox, &after.mailbox) {
        match (before.mailbox.get(&mail_id), after.mailbox.get(&mail_id)) {
            (Some(from), Some(to)) if from == to => {}
            (Some(from), Some(to))
                if from.kind == to.kind
                    && from.block_index == to.block_index
                    && from.attachments == to.attachments =>
            {
                out.push(StateModifier::SetMailRead {
                    mail_id,
                    read: to.read,
                });
            }
            (from, to) => {
                if let Some(mail) = from {
                    out.push(StateModifier::RemoveMail { mail: mail.clone() });
                }
                if let Some(mail) = to {
                    out.push(StateModifier::AddMail { mail: mail.clone() });
                }
            }
        }
    }

    for key in keys_of(&before.flags, &after.flags) {
        let (from, to) = (before.flag(&key), after.flag(&key));
        if from != to {
            out.push(StateModifier::SetFlag { key, value: to });
        }
    }

    for slot in keys_of(&before.combination_slots, &after.combination_slots) {
        let from = before.combination_slots.get(&slot).cloned();
        let to = after.combination_slots.get(&slot).cloned();
        if from != to {
            out.push(StateModifier::SetSlot { slot, from, to });
        }
    }

    if before.daily_reward_received_index != after.daily_reward_received_index {
        out.push(StateModifier::SetDailyRewardIndex {
            from: before.daily_reward_received_index,
            to: after.daily_reward_received_index,
        });
    }
}

fn diff_market(before: &MarketState, after: &MarketState, out: &mut Vec<StateModifier>) {
    for id in keys_of(&before.listings, &after.listings) {
        match (before.listings.get(&id), after.listings.get(&id)) {
            (Some(from), Some(to)) if from == to => {}
            (from, to) => {
                if let Some(listing) = from {
                    out.push(StateModifier::RemoveListing {
                        listing: listing.clone(),
                    });
                }
                if let Some(listing) = to {
                    out.push(StateModifier::AddListing {
                        listing: listing.clone(),
                    });
                }
            }
        }
    }
}

fn diff_board(before: &BoardState, after: &BoardState, out: &mut Vec<StateModifier>) {
    for avatar in keys_of(&before.entries, &after.entries) {
        let from = before.entries.get(&avatar).copied();
        let to = after.entries.get(&avatar).copied();
        if from != to {
            out.push(StateModifier::SetBoardEntry { avatar, from, to });
        }
    }
}

fn push_balance_delta(mut delta: i128, out: &mut Vec<StateModifier>) {
    // A u64 balance change can exceed i64; split it into saturating chunks.
    while delta != 0 {
        let chunk = delta.clamp(i128::from(i64::MIN), i128::from(i64::MAX));
        out.push(StateModifier::AdjustBalance {
            amount: chunk as i64,
        });
        delta -= chunk;
    }
}

fn keys_of<K: Ord + Clone, V>(a: &BTreeMap<K, V>, b: &BTreeMap<K, V>) -> BTreeSet<K> {
    a.keys().chain(b.keys()).cloned().collect()
}
