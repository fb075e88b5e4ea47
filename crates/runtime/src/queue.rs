//! Actions between submission and their authoritative outcome.
//!
//! [`ActionQueue`] holds two sets under one lock: the FIFO of actions not yet
//! handed to the ledger, and the in-flight set of actions drained by the
//! batcher whose evaluation has not arrived. Moving between the two is
//! atomic, so a [`checkpoint`](ActionQueue::checkpoint) never misses an
//! action that is mid-broadcast.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::error;

use game_core::{Action, ActionId, Speculation};

/// An action awaiting its outcome, with its submission metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub action: Action,
    pub enqueued_at: DateTime<Utc>,
    /// Broadcast attempts made so far.
    pub attempts: u32,
    /// Set once the ledger accepted the transaction carrying the action.
    /// Broadcast actions are never sent again.
    pub broadcast: bool,
    /// Modifiers installed for this action, reinstalled after a restart.
    pub speculation: Vec<Speculation>,
}

impl PendingAction {
    pub fn new(action: Action, speculation: Vec<Speculation>) -> Self {
        Self {
            action,
            enqueued_at: Utc::now(),
            attempts: 0,
            broadcast: false,
            speculation,
        }
    }

    pub fn id(&self) -> ActionId {
        self.action.id()
    }
}

#[derive(Default)]
struct QueueInner {
    queued: VecDeque<PendingAction>,
    in_flight: Vec<PendingAction>,
}

impl QueueInner {
    fn take_in_flight(&mut self, action_id: ActionId) -> Option<PendingAction> {
        let index = self.in_flight.iter().position(|p| p.id() == action_id)?;
        Some(self.in_flight.remove(index))
    }
}

/// Thread-safe queue shared by producers, the batcher and the router.
///
/// Every operation holds the lock only for the push or swap itself, so
/// `enqueue` never waits on I/O.
#[derive(Default)]
pub struct ActionQueue {
    inner: Mutex<QueueInner>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, pending: PendingAction) {
        self.lock().queued.push_back(pending);
    }

    /// Takes everything currently queued, in order, and tracks it as in
    /// flight until it is requeued, settled or marked broadcast.
    pub fn drain(&self) -> Vec<PendingAction> {
        let mut inner = self.lock();
        let drained: Vec<PendingAction> = std::mem::take(&mut inner.queued).into();
        inner.in_flight.extend(drained.iter().cloned());
        drained
    }

    /// Puts a drained batch back at the head, ahead of anything enqueued since.
    pub fn requeue_front(&self, batch: Vec<PendingAction>) {
        let mut inner = self.lock();
        for pending in batch.into_iter().rev() {
            inner.take_in_flight(pending.id());
            inner.queued.push_front(pending);
        }
    }

    /// Records that the ledger accepted the transaction carrying `action_ids`.
    /// Ids no longer in flight (already settled) are skipped.
    pub fn mark_broadcast(&self, action_ids: &[ActionId]) {
        let mut inner = self.lock();
        for pending in inner
            .in_flight
            .iter_mut()
            .filter(|p| action_ids.contains(&p.id()))
        {
            pending.broadcast = true;
        }
    }

    /// Stops tracking `action_id` once its outcome is known.
    pub fn settle(&self, action_id: ActionId) -> Option<PendingAction> {
        self.lock().take_in_flight(action_id)
    }

    /// Tracks an already broadcast action again, e.g. after its block was
    /// rolled back or after a restart. It is not sent again.
    pub fn resume(&self, mut pending: PendingAction) {
        pending.broadcast = true;
        let mut inner = self.lock();
        if inner.in_flight.iter().all(|p| p.id() != pending.id()) {
            inner.in_flight.push(pending);
        }
    }

    /// Copy of the not-yet-broadcast actions, in order.
    pub fn snapshot(&self) -> Vec<PendingAction> {
        self.lock().queued.iter().cloned().collect()
    }

    /// Copy of the in-flight actions, oldest first.
    pub fn in_flight(&self) -> Vec<PendingAction> {
        self.lock().in_flight.clone()
    }

    /// Every action without a known outcome: in-flight ones first, then the
    /// queue. Read under one lock.
    pub fn checkpoint(&self) -> Vec<PendingAction> {
        let inner = self.lock();
        inner
            .in_flight
            .iter()
            .chain(inner.queued.iter())
            .cloned()
            .collect()
    }

    /// Whether `action_id` is queued or in flight.
    pub fn contains(&self, action_id: ActionId) -> bool {
        let inner = self.lock();
        inner.queued.iter().any(|p| p.id() == action_id)
            || inner.in_flight.iter().any(|p| p.id() == action_id)
    }

    /// Number of actions not yet broadcast.
    pub fn len(&self) -> usize {
        self.lock().queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().queued.is_empty()
    }

    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            error!("action queue lock was poisoned; continuing with inner state");
            PoisonError::into_inner(poisoned)
        })
    }
}
