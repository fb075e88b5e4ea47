//! Routing of authoritative evaluations to reconciliation handlers.
//!
//! The router receives every participant's evaluations. It drops irrelevant
//! ones cheaply, asks the handler for the action kind for a
//! [`Reconciliation`] plan, and executes that plan in a fixed order:
//!
//! 1. cache updates
//! 2. modifier retirement
//! 3. watcher publication
//! 4. completion and notifications
//!
//! For every applied evaluation it keeps a record of the cache changes, the
//! retired modifiers and the in-flight entry it settled. The record makes a duplicate delivery a no-op and
//! lets [`EvaluationRouter::dispatch_rollback`] undo exactly that evaluation:
//! the inverse of its diff is folded over the *current* snapshot, so changes
//! layered on top since are preserved.

mod relevance;

pub use relevance::ObservedAddresses;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, trace, warn};

use client_blockchain_core::{ActionEvaluation, LedgerPosition};
use game_core::{ActionId, ActionKind, BlockIndex, EntityAddress, EntityState, StateModifier, diff};

use crate::completion::{Completion, CompletionNotifier};
use crate::events::{EventBus, Notification};
use crate::handlers::{HandlerRegistry, ReconcileContext, Reconciliation};
use crate::overlay::{AuthoritativeCache, OverlayStore, RetiredModifier};
use crate::queue::{ActionQueue, PendingAction};

/// Applied records kept for rollback. Older records are forgotten, so a
/// reorg deeper than this many relevant evaluations cannot be inverted.
const APPLIED_RECORD_CAPACITY: usize = 4096;

/// What [`EvaluationRouter::dispatch`] did with an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    /// Already applied; duplicate delivery.
    Duplicate,
    /// Dropped by the relevance predicate.
    Irrelevant,
    /// No handler for the kind.
    Unhandled,
}

/// What [`EvaluationRouter::dispatch_rollback`] did with an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    Reverted,
    /// Nothing was applied for this evaluation.
    NotApplied,
}

#[derive(Debug)]
enum CacheUndo {
    /// The address was not cached before.
    Remove,
    /// Inverse of the evaluation's diff, in application order.
    Fold(Vec<StateModifier>),
    /// No usable diff; put the prior snapshot and its position back.
    Restore(EntityState, Option<LedgerPosition>),
}

#[derive(Debug)]
struct CacheChange {
    address: EntityAddress,
    undo: CacheUndo,
}

#[derive(Debug)]
struct AppliedRecord {
    kind: ActionKind,
    block_index: BlockIndex,
    own: bool,
    cache: Vec<CacheChange>,
    retired: Vec<RetiredModifier>,
    settled: Option<PendingAction>,
}

#[derive(Default)]
struct AppliedLog {
    records: HashMap<ActionId, AppliedRecord>,
    order: VecDeque<ActionId>,
}

impl AppliedLog {
    fn insert(&mut self, action_id: ActionId, record: AppliedRecord) {
        self.records.insert(action_id, record);
        self.order.push_back(action_id);
        while self.order.len() > APPLIED_RECORD_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.records.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, action_id: ActionId) -> Option<AppliedRecord> {
        let record = self.records.remove(&action_id)?;
        self.order.retain(|id| *id != action_id);
        Some(record)
    }
}

/// Dispatches confirmed and rolled-back evaluations.
pub struct EvaluationRouter {
    cache: Arc<AuthoritativeCache>,
    overlay: Arc<OverlayStore>,
    completions: Arc<CompletionNotifier>,
    events: EventBus,
    observed: Arc<ObservedAddresses>,
    queue: Arc<ActionQueue>,
    handlers: HandlerRegistry,
    applied: Mutex<AppliedLog>,
    tip: Arc<AtomicU64>,
}

impl EvaluationRouter {
    pub fn new(
        overlay: Arc<OverlayStore>,
        completions: Arc<CompletionNotifier>,
        events: EventBus,
        observed: Arc<ObservedAddresses>,
        queue: Arc<ActionQueue>,
        handlers: HandlerRegistry,
        tip: Arc<AtomicU64>,
    ) -> Self {
        Self {
            cache: Arc::clone(overlay.cache()),
            overlay,
            completions,
            events,
            observed,
            queue,
            handlers,
            applied: Mutex::new(AppliedLog::default()),
            tip,
        }
    }

    /// Last block index seen on the evaluation stream.
    pub fn tip(&self) -> BlockIndex {
        self.tip.load(Ordering::Acquire)
    }

    /// Raises the tip to `block_index` if it is behind.
    pub fn observe_tip(&self, block_index: BlockIndex) {
        self.tip.fetch_max(block_index, Ordering::AcqRel);
    }

    /// Observed addresses plus every address carrying a speculative modifier.
    pub fn tracked_addresses(&self) -> Vec<EntityAddress> {
        let mut addresses = self.observed.snapshot();
        addresses.extend(self.overlay.speculated_addresses());
        addresses.into_iter().collect()
    }

    /// Local actions whose outcome has not been applied: speculated ones and
    /// those still in flight.
    pub fn unsettled_actions(&self) -> Vec<ActionId> {
        let mut seen = HashSet::new();
        self.overlay
            .speculated_actions()
            .into_iter()
            .chain(self.queue.in_flight().iter().map(PendingAction::id))
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Stores ledger snapshots read at `tip` and publishes the addresses that
    /// changed. Snapshots older than a cached evaluation are dropped.
    pub fn apply_queried(
        &self,
        snapshots: Vec<(EntityAddress, Option<EntityState>)>,
        tip: BlockIndex,
    ) -> usize {
        self.observe_tip(tip);
        let position = LedgerPosition::end_of(tip);
        let touched: Vec<_> = {
            let _applied = self.applied();
            snapshots
                .into_iter()
                .filter_map(|(address, state)| {
                    self.cache
                        .store_queried_at(address, state, position)
                        .then_some(address)
                })
                .collect()
        };
        let stored = touched.len();
        self.overlay.publish(touched);
        stored
    }

    /// Whether `dispatch` applied an evaluation of `action_id` that has not
    /// been rolled back.
    pub fn is_applied(&self, action_id: ActionId) -> bool {
        self.applied().records.contains_key(&action_id)
    }

    /// Applies a confirmed evaluation.
    pub fn dispatch(&self, evaluation: &Arc<ActionEvaluation>) -> DispatchOutcome {
        let action_id = evaluation.action_id();
        self.observe_tip(evaluation.block_index);

        let local = self.overlay.has_action(action_id)
            || self.queue.contains(action_id)
            || self.completions.is_awaited(action_id);
        if !self.observed.is_relevant(evaluation, local) {
            trace!(action = ?action_id, kind = %evaluation.kind(), "irrelevant evaluation");
            return DispatchOutcome::Irrelevant;
        }

        let Some(handler) = self.handlers.get(evaluation.kind()).cloned() else {
            debug!(kind = %evaluation.kind(), "no handler registered; ignoring");
            return DispatchOutcome::Unhandled;
        };

        let ctx = ReconcileContext {
            agent: self.observed.agent(),
            observed: self.observed.snapshot(),
            speculated: self.overlay.addresses_of(action_id),
            local,
        };
        let own = ctx.is_own(evaluation);

        let (plan, touched) = {
            let mut applied = self.applied();
            if applied.records.contains_key(&action_id) {
                debug!(action = ?action_id, "duplicate evaluation delivery");
                return DispatchOutcome::Duplicate;
            }

            let plan = handler.reconcile(evaluation, &ctx);
            let mut record = AppliedRecord {
                kind: evaluation.kind(),
                block_index: evaluation.block_index,
                own,
                cache: Vec::new(),
                retired: Vec::new(),
                settled: self.queue.settle(action_id),
            };
            let mut touched = Vec::new();

            // Authoritative update precedes retirement.
            for address in &plan.refresh {
                if let Some(change) = self.refresh_cache(evaluation, address) {
                    touched.push(change.address);
                    record.cache.push(change);
                }
            }
            if plan.retire {
                record.retired = self.overlay.retire_action(action_id);
                touched.extend(record.retired.iter().map(|r| r.address));
            }

            applied.insert(action_id, record);
            (plan, touched)
        };

        self.overlay.publish(touched);
        self.finish(evaluation, own, plan, handler.name());
        DispatchOutcome::Applied
    }

    /// Undoes exactly what [`dispatch`](Self::dispatch) applied for `evaluation`.
    ///
    /// Retired modifiers are reinstated first, then the cache changes are
    /// inverted, newest first. A rollback without a prior dispatch is a no-op.
    pub fn dispatch_rollback(&self, evaluation: &ActionEvaluation) -> RollbackOutcome {
        let action_id = evaluation.action_id();

        let (record, touched) = {
            let mut applied = self.applied();
            let Some(record) = applied.remove(action_id) else {
                trace!(action = ?action_id, "rollback for unapplied evaluation");
                return RollbackOutcome::NotApplied;
            };

            self.overlay.reinstate(action_id, &record.retired);
            if let Some(pending) = record.settled.clone() {
                self.queue.resume(pending);
            }
            let mut touched: Vec<_> = record.retired.iter().map(|r| r.address).collect();
            for change in record.cache.iter().rev() {
                match &change.undo {
                    CacheUndo::Remove => {
                        self.cache.remove(&change.address);
                    }
                    CacheUndo::Fold(inverse) => {
                        self.cache.fold_in_place(&change.address, inverse);
                    }
                    CacheUndo::Restore(previous, position) => {
                        self.cache
                            .restore(change.address, previous.clone(), *position);
                    }
                }
                touched.push(change.address);
            }
            (record, touched)
        };

        self.overlay.publish(touched);

        if record.own {
            self.completions.evict(action_id);
            self.events.publish(Notification::ActionRolledBack {
                action_id,
                kind: record.kind,
                block_index: record.block_index,
            });
        }
        info!(action = ?action_id, kind = %record.kind, block = record.block_index, "evaluation rolled back");
        RollbackOutcome::Reverted
    }

    /// Writes the evaluation output for `address` and returns how to undo it.
    fn refresh_cache(
        &self,
        evaluation: &ActionEvaluation,
        address: &EntityAddress,
    ) -> Option<CacheChange> {
        let output = evaluation.output(address)?;
        let before = self.cache.entry(address);
        let position = evaluation.position();
        let inverse: Option<Vec<StateModifier>> = evaluation
            .previous(address)
            .and_then(|previous| match diff(previous, output) {
                Ok(changes) => Some(changes.iter().rev().map(StateModifier::inverse).collect()),
                Err(error) => {
                    warn!(%address, %error, "cannot diff evaluation output");
                    None
                }
            });

        if !self.cache.store_evaluated(*address, output.clone(), position) {
            // The newer snapshot already carries this evaluation's effect,
            // so rolling it back still folds the inverse.
            debug!(%address, block = position.block_index, ordinal = position.ordinal, "cache holds a newer snapshot");
            return inverse.map(|inverse| CacheChange {
                address: *address,
                undo: CacheUndo::Fold(inverse),
            });
        }

        let undo = match (before, inverse) {
            (None, _) => CacheUndo::Remove,
            (Some(_), Some(inverse)) => CacheUndo::Fold(inverse),
            (Some((before, at)), None) => CacheUndo::Restore(before, at),
        };
        Some(CacheChange {
            address: *address,
            undo,
        })
    }

    fn finish(
        &self,
        evaluation: &Arc<ActionEvaluation>,
        own: bool,
        plan: Reconciliation,
        handler: &'static str,
    ) {
        let action_id = evaluation.action_id();
        if own {
            let completion = match &evaluation.exception {
                Some(exception) => Completion::Failed(exception.clone()),
                None => Completion::Confirmed(Arc::clone(evaluation)),
            };
            self.completions.resolve(action_id, completion);
        }

        debug!(
            handler,
            action = ?action_id,
            block = evaluation.block_index,
            refreshed = plan.refresh.len(),
            retired = plan.retire,
            "evaluation reconciled"
        );
        for notification in plan.notifications {
            self.events.publish(notification);
        }
    }

    fn applied(&self) -> MutexGuard<'_, AppliedLog> {
        self.applied.lock().unwrap_or_else(|poisoned| {
            error!("applied log lock was poisoned; continuing with inner state");
            PoisonError::into_inner(poisoned)
        })
    }
}
