//! Score boards: stage ranking and time-windowed arena buckets.

use client_blockchain_core::ActionEvaluation;
use game_core::{ActionInput, ActionKind, EntityAddress};

use super::{ReconcileContext, Reconciliation, ReconciliationHandler};
use crate::events::Notification;

#[derive(Debug, Clone, Copy)]
pub struct ClearStageHandler;

impl ReconciliationHandler for ClearStageHandler {
    fn name(&self) -> &'static str {
        "clear_stage"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::ClearStage
    }

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation {
        let mut plan = Reconciliation::standard(evaluation, ctx);
        if !evaluation.is_success() || !ctx.is_own(evaluation) {
            return plan;
        }

        let ActionInput::ClearStage(stage) = evaluation.action.input() else {
            return plan;
        };
        let board = evaluation
            .output(&EntityAddress::ranking())
            .and_then(|state| state.as_board());
        if let Some(score) = board.and_then(|b| b.score(&stage.avatar)) {
            plan.notify(Notification::RankingUpdated {
                avatar: stage.avatar,
                score,
                rank: board.and_then(|b| b.rank(&stage.avatar)),
            });
        }
        plan
    }
}

#[derive(Debug, Clone, Copy)]
pub struct JoinArenaHandler;

impl ReconciliationHandler for JoinArenaHandler {
    fn name(&self) -> &'static str {
        "join_arena"
    }

    fn kind(&self) -> ActionKind {
        ActionKind::JoinArena
    }

    fn reconcile(&self, evaluation: &ActionEvaluation, ctx: &ReconcileContext) -> Reconciliation {
        let mut plan = Reconciliation::standard(evaluation, ctx);
        if let ActionInput::JoinArena(arena) = evaluation.action.input()
            && evaluation.is_success()
            && ctx.is_own(evaluation)
        {
            let score = evaluation
                .output(&EntityAddress::arena(arena.championship, arena.round))
                .and_then(|state| state.as_board())
                .and_then(|board| board.score(&arena.avatar));
            plan.notify(Notification::ArenaJoined {
                avatar: arena.avatar,
                championship: arena.championship,
                round: arena.round,
                score,
            });
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use game_core::{Action, BoardState, ClearStageAction, JoinArenaAction};

    #[test]
    fn stage_clear_reports_rank() {
        let avatar = EntityAddress::avatar(&agent(), 0);
        let rival = EntityAddress::avatar(&stranger(), 0);
        let board = BoardState {
            entries: [(avatar, 12), (rival, 20)].into_iter().collect(),
        };
        let action = Action::new(
            agent(),
            ClearStageAction {
                avatar,
                stage_id: 12,
                action_point_cost: 5,
            },
        );

        let plan = ClearStageHandler.reconcile(
            &evaluation(action, [(EntityAddress::ranking(), board.into())]),
            &ctx(true),
        );
        assert!(plan.notifications.contains(&Notification::RankingUpdated {
            avatar,
            score: 12,
            rank: Some(2),
        }));
        // The ranking is not observed, so it is not cached.
        assert!(plan.refresh.is_empty());
    }

    #[test]
    fn foreign_arena_entry_refreshes_observed_bucket_without_retiring() {
        let bucket = EntityAddress::arena(1, 3);
        let avatar = EntityAddress::avatar(&stranger(), 0);
        let action = Action::new(
            stranger(),
            JoinArenaAction {
                avatar,
                championship: 1,
                round: 3,
                fee: 0,
            },
        );
        let board = BoardState {
            entries: [(avatar, 1_000)].into_iter().collect(),
        };
        let mut context = ctx(false);
        context.observed.insert(bucket);

        let plan = JoinArenaHandler.reconcile(&evaluation(action, [(bucket, board.into())]), &context);
        assert_eq!(plan.refresh, vec![bucket]);
        assert!(!plan.retire);
        assert!(plan.notifications.is_empty());
    }
}
