//! Anticipated effects of an action.
//!
//! [`anticipate`] derives the speculative modifiers a feature installs when it
//! submits an action. It reads the current effective views through
//! [`EffectContext`] but performs no validation: the ledger decides whether
//! the action succeeds, and a domain rejection retires these modifiers.
//!
//! Globally shared entities (market, boards) are never speculated on.

use super::{Action, ActionInput};
use crate::address::EntityAddress;
use crate::modifier::{Speculation, StateModifier, UnlockEstimate};
use crate::state::{BlockIndex, EntityState};

/// Inputs available while deriving anticipated effects.
pub struct EffectContext<'a> {
    /// Last block index observed by the client.
    pub tip: BlockIndex,
    /// Heuristic used for speculative crafting slots.
    pub unlock: UnlockEstimate,
    /// Current effective view of an address.
    pub view: &'a dyn Fn(&EntityAddress) -> Option<EntityState>,
}

impl EffectContext<'_> {
    fn avatar_view(&self, avatar: &EntityAddress) -> Option<crate::state::AvatarState> {
        (self.view)(avatar).and_then(|state| state.as_avatar().cloned())
    }
}

/// Returns the speculative modifiers for `action`, in installation order.
pub fn anticipate(action: &Action, ctx: &EffectContext<'_>) -> Vec<Speculation> {
    let agent = action.signer();
    let mut effects = Vec::new();

    match action.input() {
        ActionInput::TransferAsset(transfer) => {
            effects.push(Speculation::new(
                agent,
                StateModifier::AdjustBalance {
                    amount: -clamp_i64(transfer.amount),
                },
            ));
        }
        ActionInput::CombineEquipment(combine) => {
            if combine.cost > 0 {
                effects.push(Speculation::new(
                    agent,
                    StateModifier::AdjustBalance {
                        amount: -clamp_i64(combine.cost),
                    },
                ));
            }
            for (item_id, count) in &combine.materials {
                effects.push(Speculation::new(
                    combine.avatar,
                    StateModifier::RemoveFungibleItem {
                        item_id: *item_id,
                        count: *count,
                    },
                ));
            }
            let from = ctx
                .avatar_view(&combine.avatar)
                .and_then(|avatar| avatar.combination_slots.get(&combine.slot).cloned());
            effects.push(Speculation::new(
                combine.avatar,
                StateModifier::SetSlot {
                    slot: combine.slot,
                    from,
                    to: Some(ctx.unlock.slot(ctx.tip, combine.required_blocks, None)),
                },
            ));
        }
        ActionInput::EnhanceEquipment(enhance) => {
            if enhance.cost > 0 {
                effects.push(Speculation::new(
                    agent,
                    StateModifier::AdjustBalance {
                        amount: -clamp_i64(enhance.cost),
                    },
                ));
            }
            effects.push(Speculation::new(
                enhance.avatar,
                StateModifier::RemoveNonFungibleItem {
                    item: enhance.material.clone(),
                },
            ));
            effects.push(Speculation::new(
                enhance.avatar,
                StateModifier::SetEquipmentLevel {
                    id: enhance.target.id,
                    from: enhance.target.level,
                    to: enhance.target.level.saturating_add(1),
                },
            ));
        }
        ActionInput::ClaimReward(claim) => {
            let from = ctx
                .avatar_view(&claim.avatar)
                .map(|avatar| avatar.daily_reward_received_index)
                .unwrap_or_default();
            effects.push(Speculation::new(
                claim.avatar,
                StateModifier::AdjustActionPoint {
                    amount: i64::from(claim.action_point),
                },
            ));
            effects.push(Speculation::new(
                claim.avatar,
                StateModifier::SetDailyRewardIndex { from, to: ctx.tip },
            ));
        }
        ActionInput::RedeemMail(redeem) => {
            let Some(avatar) = ctx.avatar_view(&redeem.avatar) else {
                return effects;
            };
            for mail in redeem
                .mail_ids
                .iter()
                .filter_map(|id| avatar.mailbox.get(id))
                .filter(|mail| !mail.read)
            {
                effects.push(Speculation::new(
                    redeem.avatar,
                    StateModifier::SetMailRead {
                        mail_id: mail.id,
                        read: true,
                    },
                ));
                for (item_id, count) in &mail.attachments {
                    effects.push(Speculation::new(
                        redeem.avatar,
                        StateModifier::AddFungibleItem {
                            item_id: *item_id,
                            count: *count,
                        },
                    ));
                }
            }
        }
        ActionInput::RegisterListing(register) => {
            effects.push(Speculation::new(
                register.avatar,
                StateModifier::RemoveFungibleItem {
                    item_id: register.item_id,
                    count: register.count,
                },
            ));
        }
        ActionInput::BuyListing(buy) => {
            effects.push(Speculation::new(
                agent,
                StateModifier::AdjustBalance {
                    amount: -clamp_i64(buy.listing.price),
                },
            ));
            effects.push(Speculation::new(
                buy.avatar,
                StateModifier::AddFungibleItem {
                    item_id: buy.listing.item_id,
                    count: buy.listing.count,
                },
            ));
        }
        ActionInput::ClearStage(stage) => {
            effects.push(Speculation::new(
                stage.avatar,
                StateModifier::AdjustActionPoint {
                    amount: -i64::from(stage.action_point_cost),
                },
            ));
        }
        ActionInput::JoinArena(arena) => {
            if arena.fee > 0 {
                effects.push(Speculation::new(
                    agent,
                    StateModifier::AdjustBalance {
                        amount: -clamp_i64(arena.fee),
                    },
                ));
            }
        }
    }

    effects
}

fn clamp_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{ClaimRewardAction, CombineEquipmentAction, TransferAssetAction};
    use crate::state::{AgentState, AvatarState};

    fn agent() -> EntityAddress {
        EntityAddress::shared("agent")
    }

    #[test]
    fn transfer_debits_signer() {
        let action = Action::new(
            agent(),
            TransferAssetAction {
                recipient: EntityAddress::shared("friend"),
                amount: 30,
                memo: None,
            },
        );
        let view = |_: &EntityAddress| Some(EntityState::Agent(AgentState::with_gold(100)));
        let ctx = EffectContext {
            tip: 10,
            unlock: UnlockEstimate::default(),
            view: &view,
        };

        assert_eq!(
            anticipate(&action, &ctx),
            vec![Speculation::new(
                agent(),
                StateModifier::AdjustBalance { amount: -30 }
            )]
        );
    }

    #[test]
    fn combine_occupies_slot_with_estimated_unlock() {
        let avatar = EntityAddress::avatar(&agent(), 0);
        let action = Action::new(
            agent(),
            CombineEquipmentAction {
                avatar,
                slot: 1,
                recipe_id: 3,
                result_item_id: 10_111_000,
                materials: vec![(303_000, 2)],
                cost: 0,
                required_blocks: 100,
            },
        );
        let view = |_: &EntityAddress| Some(EntityState::Avatar(AvatarState::new(agent(), "a")));
        let ctx = EffectContext {
            tip: 1_000,
            unlock: UnlockEstimate::default(),
            view: &view,
        };

        let effects = anticipate(&action, &ctx);
        assert_eq!(effects.len(), 2);
        match &effects[1].modifier {
            StateModifier::SetSlot {
                slot: 1,
                from: None,
                to: Some(slot),
            } => {
                assert!(slot.estimated);
                assert_eq!(slot.unlock_block_index, 1_110);
            }
            other => panic!("unexpected modifier {other:?}"),
        }
    }

    #[test]
    fn claim_reward_uses_current_index_as_from() {
        let avatar_address = EntityAddress::avatar(&agent(), 0);
        let mut avatar = AvatarState::new(agent(), "a");
        avatar.daily_reward_received_index = 40;
        let view = move |_: &EntityAddress| Some(EntityState::Avatar(avatar.clone()));
        let ctx = EffectContext {
            tip: 90,
            unlock: UnlockEstimate::default(),
            view: &view,
        };
        let action = Action::new(
            agent(),
            ClaimRewardAction {
                avatar: avatar_address,
                action_point: 120,
            },
        );

        let effects = anticipate(&action, &ctx);
        assert_eq!(
            effects[1].modifier,
            StateModifier::SetDailyRewardIndex { from: 40, to: 90 }
        );
    }
}
