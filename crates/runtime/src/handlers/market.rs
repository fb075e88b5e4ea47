//! Shared market board.
//!
//! No client speculates on the market itself, so these handlers only refresh
//! it (when observed) and retire the seller's or buyer's own item modifiers.

use client_blockchain_core::ActionEvaluation;
use game_core::{ActionInput, ActionKind};

use super::{ReconcileContext, Reconciliation, ReconciliationHandler};
use crate::events::Notification;

#[derive(Debug, Clone, Copy)]
pub struct RegisterListingHandler;

impl ReconciliationHandler for RegisterListingHandler {
    fn name(&self) -> &'static str {
        "register_listing"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::RegisterListing
    }

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation {
        Reconciliation::standard(evaluation, ctx)
    }
}

/// Also tells a seller that one of their listings was bought.
#[derive(Debug, Clone, Copy)]
pub struct BuyListingHandler;

impl ReconciliationHandler for BuyListingHandler {
    fn name(&self) -> &'static str {
        "buy_listing"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::BuyListing
    }

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation {
        let mut plan = Reconciliation::standard(evaluation, ctx);

        if let ActionInput::BuyListing(buy) = evaluation.action.input()
            && evaluation.is_success()
            && evaluation.signer() != ctx.agent
            && (buy.listing.seller_agent == ctx.agent || ctx.tracks(&buy.listing.seller_avatar))
        {
            plan.notify(Notification::ListingSold {
                seller_avatar: buy.listing.seller_avatar,
                buyer: evaluation.signer(),
                listing_id: buy.listing.id,
                price: buy.listing.price,
            });
        }
        plan
    }
}
