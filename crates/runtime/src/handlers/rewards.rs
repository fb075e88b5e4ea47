//! Daily rewards and mail.

use client_blockchain_core::ActionEvaluation;
use game_core::{ActionInput, ActionKind};

use super::{ReconcileContext, Reconciliation, ReconciliationHandler};
use crate::events::Notification;

#[derive(Debug, Clone, Copy)]
pub struct ClaimRewardHandler;

impl ReconciliationHandler for ClaimRewardHandler {
    fn name(&self) -> &'static str {
        "claim_reward"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::ClaimReward
    }

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation {
        let mut plan = Reconciliation::standard(evaluation, ctx);
        if let ActionInput::ClaimReward(claim) = evaluation.action.input()
            && evaluation.is_success()
            && ctx.is_own(evaluation)
        {
            plan.notify(Notification::RewardClaimed {
                avatar: claim.avatar,
                action_point: claim.action_point,
                block_index: evaluation.block_index,
            });
        }
        plan
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RedeemMailHandler;

impl ReconciliationHandler for RedeemMailHandler {
    fn name(&self) -> &'static str {
        "redeem_mail"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::RedeemMail
    }

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation {
        let mut plan = Reconciliation::standard(evaluation, ctx);
        if let ActionInput::RedeemMail(redeem) = evaluation.action.input()
            && evaluation.is_success()
            && ctx.is_own(evaluation)
        {
            plan.notify(Notification::MailRedeemed {
                avatar: redeem.avatar,
                mail_ids: redeem.mail_ids.clone(),
            });
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use game_core::{Action, AvatarState, ClaimRewardAction, EntityAddress, RedeemMailAction};

    #[test]
    fn claim_reports_block() {
        let avatar = EntityAddress::avatar(&agent(), 1);
        let action = Action::new(
            agent(),
            ClaimRewardAction {
                avatar,
                action_point: 120,
            },
        );
        let ev = evaluation(action, [(avatar, AvatarState::new(agent(), "r").into())]);
        let plan = ClaimRewardHandler.reconcile(&ev, &ctx(true));

        assert!(plan.notifications.contains(&Notification::RewardClaimed {
            avatar,
            action_point: 120,
            block_index: 42,
        }));
    }

    #[test]
    fn foreign_mail_redemption_is_silent() {
        let avatar = EntityAddress::avatar(&stranger(), 0);
        let action = Action::new(
            stranger(),
            RedeemMailAction {
                avatar,
                mail_ids: vec![1, 2],
            },
        );
        let plan = RedeemMailHandler.reconcile(&evaluation(action, []), &ctx(false));

        assert_eq!(plan, Reconciliation::default());
    }
}
