//! Per-kind reconciliation handlers.
//!
//! A handler is a pure mapping from an authoritative evaluation to a
//! [`Reconciliation`] plan: which addresses to refresh in the cache, whether
//! to retire the action's speculative modifiers, and which notifications to
//! publish. The router executes the plan; handlers never touch shared state.

mod crafting;
mod market;
mod ranking;
mod registry;
mod rewards;
mod transfer;

pub use crafting::{CombineEquipmentHandler, EnhanceEquipmentHandler};
pub use market::{BuyListingHandler, RegisterListingHandler};
pub use ranking::{ClearStageHandler, JoinArenaHandler};
pub use registry::HandlerRegistry;
pub use rewards::{ClaimRewardHandler, RedeemMailHandler};
pub use transfer::TransferAssetHandler;

use std::collections::HashSet;

use client_blockchain_core::ActionEvaluation;
use game_core::{ActionKind, AvatarState, EntityAddress};

use crate::events::Notification;

/// Session facts a handler may consult.
#[derive(Clone, Debug)]
pub struct ReconcileContext {
    /// Agent this session acts for.
    pub agent: EntityAddress,
    /// Addresses the session observes.
    pub observed: HashSet<EntityAddress>,
    /// Addresses where the evaluated action has speculation installed.
    pub speculated: Vec<EntityAddress>,
    /// Whether the action is known locally (speculation or a waiter).
    pub local: bool,
}

impl ReconcileContext {
    /// Whether the cache should follow `address`.
    pub fn tracks(&self, address: &EntityAddress) -> bool {
        self.observed.contains(address) || self.speculated.contains(address)
    }

    /// Whether the evaluated action was submitted by this session.
    pub fn is_own(&self, evaluation: &ActionEvaluation) -> bool {
        self.local || evaluation.signer() == self.agent
    }
}

/// What the router should do for one evaluation.
///
/// Executed in a fixed order: cache refreshes, then retirement, then
/// watcher publication, then notifications.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub refresh: Vec<EntityAddress>,
    pub retire: bool,
    pub notifications: Vec<Notification>,
}

impl Reconciliation {
    /// The plan every kind starts from.
    ///
    /// - A domain exception refreshes nothing, retires the action's
    ///   modifiers and reports [`Notification::ActionFailed`] for own actions.
    /// - A success refreshes every tracked address the evaluation wrote and
    ///   retires the action's modifiers if it is ours.
    pub fn standard(evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Self {
        let own = ctx.is_own(evaluation);

        if let Some(exception) = &evaluation.exception {
            let mut plan = Self {
                retire: own,
                ..Self::default()
            };
            if own {
                plan.notifications.push(Notification::ActionFailed {
                    action_id: evaluation.action_id(),
                    kind: evaluation.kind(),
                    exception: exception.clone(),
                });
            }
            return plan;
        }

        let mut plan = Self {
            refresh: evaluation
                .updated_addresses()
                .filter(|address| ctx.tracks(address))
                .copied()
                .collect(),
            retire: own,
            notifications: Vec::new(),
        };
        if own {
            plan.notifications.push(Notification::ActionConfirmed {
                action_id: evaluation.action_id(),
                kind: evaluation.kind(),
                block_index: evaluation.block_index,
            });
        }
        plan
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
    }
}

/// Maps evaluations of one [`ActionKind`] to reconciliation plans.
///
/// Implementations must be deterministic: the same evaluation and context
/// always yield the same plan, which is what makes duplicate delivery safe.
pub trait ReconciliationHandler: Send + Sync {
    /// Returns the name of this handler for logging.
    fn name(&self) -> &'static str;

    /// Kind this handler is registered for.
    fn kind(&self) -> ActionKind;

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation;
}

/// Avatar snapshot the evaluation wrote at `address`.
fn output_avatar<'a>(
    evaluation: &'a ActionEvaluation,
    address: &EntityAddress,
) -> Option<&'a AvatarState> {
    evaluation.output(address).and_then(|state| state.as_avatar())
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::BTreeMap;

    use super::*;
    use client_blockchain_core::ActionException;
    use game_core::{Action, EntityState};

    pub fn agent() -> EntityAddress {
        EntityAddress::shared("handler-agent")
    }

    pub fn stranger() -> EntityAddress {
        EntityAddress::shared("handler-stranger")
    }

    pub fn ctx(local: bool) -> ReconcileContext {
        ReconcileContext {
            agent: agent(),
            observed: [agent()].into_iter().collect(),
            speculated: Vec::new(),
            local,
        }
    }

    pub fn evaluation(
        action: Action,
        outputs: impl IntoIterator<Item = (EntityAddress, EntityState)>,
    ) -> ActionEvaluation {
        ActionEvaluation {
            action,
            block_index: 42,
            ordinal: 0,
            tx_id: None,
            output_states: outputs.into_iter().collect(),
            previous_states: BTreeMap::new(),
            exception: None,
        }
    }

    pub fn failed(action: Action) -> ActionEvaluation {
        ActionEvaluation {
            exception: Some(ActionException::new("InsufficientBalance", "no gold")),
            ..evaluation(action, [])
        }
    }
}
