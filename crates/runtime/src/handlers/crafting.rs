//! Equipment crafting: combination and enhancement.

use client_blockchain_core::ActionEvaluation;
use game_core::{ActionInput, ActionKind};

use super::{ReconcileContext, Reconciliation, ReconciliationHandler, output_avatar};
use crate::events::Notification;

/// Replaces the estimated slot with the authoritative one.
///
/// The refreshed avatar carries `estimated: false` and the real unlock block;
/// retiring the speculative `SetSlot` removes the guess.
#[derive(Debug, Clone, Copy)]
pub struct CombineEquipmentHandler;

impl ReconciliationHandler for CombineEquipmentHandler {
    fn name(&self) -> &'static str {
        "combine_equipment"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::CombineEquipment
    }

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation {
        let mut plan = Reconciliation::standard(evaluation, ctx);
        if !evaluation.is_success() || !ctx.is_own(evaluation) {
            return plan;
        }

        let ActionInput::CombineEquipment(combine) = evaluation.action.input() else {
            return plan;
        };
        if let Some(slot) = output_avatar(evaluation, &combine.avatar)
            .and_then(|avatar| avatar.combination_slots.get(&combine.slot))
        {
            plan.notify(Notification::CombinationStarted {
                avatar: combine.avatar,
                slot: combine.slot,
                unlock_block_index: slot.unlock_block_index,
                result: slot.result.clone(),
            });
        }
        plan
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EnhanceEquipmentHandler;

impl ReconciliationHandler for EnhanceEquipmentHandler {
    fn name(&self) -> &'static str {
        "enhance_equipment"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::EnhanceEquipment
    }

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation {
        let mut plan = Reconciliation::standard(evaluation, ctx);
        if !evaluation.is_success() || !ctx.is_own(evaluation) {
            return plan;
        }

        let ActionInput::EnhanceEquipment(enhance) = evaluation.action.input() else {
            return plan;
        };
        if let Some(item) = output_avatar(evaluation, &enhance.avatar)
            .and_then(|avatar| avatar.inventory.equipment.get(&enhance.target.id))
        {
            plan.notify(Notification::EnhancementCompleted {
                avatar: enhance.avatar,
                equipment_id: item.id,
                level: item.level,
            });
        }
        plan
    }
}
