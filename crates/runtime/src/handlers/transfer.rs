//! Currency transfers between agents.

use client_blockchain_core::ActionEvaluation;
use game_core::{ActionInput, ActionKind};

use super::{ReconcileContext, Reconciliation, ReconciliationHandler};
use crate::events::Notification;

/// Refreshes both agents and reports incoming transfers from other agents.
#[derive(Debug, Clone, Copy)]
pub struct TransferAssetHandler;

impl ReconciliationHandler for TransferAssetHandler {
    fn name(&self) -> &'static str {
        "transfer_asset"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::TransferAsset
    }

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation {
        let mut plan = Reconciliation::standard(evaluation, ctx);

        if let ActionInput::TransferAsset(transfer) = evaluation.action.input()
            && evaluation.is_success()
            && transfer.recipient == ctx.agent
            && evaluation.signer() != ctx.agent
        {
            plan.notify(Notification::AssetReceived {
                sender: evaluation.signer(),
                recipient: transfer.recipient,
                amount: transfer.amount,
                memo: transfer.memo.clone(),
            });
        }
        plan
    }
}
