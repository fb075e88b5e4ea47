//! Matching evaluations back to the callers that submitted them.
//!
//! A caller awaits an [`ActionId`] with a timeout. Resolutions that arrive
//! before anyone awaits are kept in a bounded recent cache so a late `wait`
//! still sees them. A timeout or a dropped future only removes that caller's
//! waiter; it never touches the overlay.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{error, trace};

use client_blockchain_core::{ActionEvaluation, ActionException};
use game_core::ActionId;

/// Outcome observed by a waiter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Completion {
    /// The ledger executed the action successfully.
    Confirmed(Arc<ActionEvaluation>),
    /// The ledger rejected it, or it could not be broadcast.
    Failed(ActionException),
    /// No outcome within the timeout. The action may still confirm later.
    TimedOut,
}

impl Completion {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Completion::Confirmed(_))
    }
}

struct Waiter {
    id: u64,
    tx: oneshot::Sender<Completion>,
}

struct NotifierInner {
    waiters: HashMap<ActionId, Vec<Waiter>>,
    recent: HashMap<ActionId, Completion>,
    recent_order: VecDeque<ActionId>,
    capacity: usize,
    next_waiter: u64,
}

pub struct CompletionNotifier {
    inner: Mutex<NotifierInner>,
}

impl CompletionNotifier {
    /// `capacity` bounds the number of resolutions kept for late waiters.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(NotifierInner {
                waiters: HashMap::new(),
                recent: HashMap::new(),
                recent_order: VecDeque::new(),
                capacity: capacity.max(1),
                next_waiter: 0,
            }),
        }
    }

    /// Waits for the outcome of `action_id`, or [`Completion::TimedOut`].
    ///
    /// Dropping the returned future removes the waiter.
    pub async fn wait(&self, action_id: ActionId, timeout: Duration) -> Completion {
        let (waiter_id, rx) = {
            let mut inner = self.lock();
            if let Some(done) = inner.recent.get(&action_id) {
                return done.clone();
            }
            let (tx, rx) = oneshot::channel();
            let id = inner.next_waiter;
            inner.next_waiter += 1;
            inner
                .waiters
                .entry(action_id)
                .or_default()
                .push(Waiter { id, tx });
            (id, rx)
        };

        let _guard = WaiterGuard {
            notifier: self,
            action_id,
            waiter_id,
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(completion)) => completion,
            Ok(Err(_)) | Err(_) => {
                trace!(action = ?action_id, "wait timed out");
                Completion::TimedOut
            }
        }
    }

    /// Delivers `completion` to every waiter of `action_id` and remembers it.
    pub fn resolve(&self, action_id: ActionId, completion: Completion) {
        let waiters = {
            let mut inner = self.lock();
            if !inner.recent.contains_key(&action_id) {
                inner.recent_order.push_back(action_id);
            }
            inner.recent.insert(action_id, completion.clone());
            while inner.recent_order.len() > inner.capacity {
                if let Some(oldest) = inner.recent_order.pop_front() {
                    inner.recent.remove(&oldest);
                }
            }
            inner.waiters.remove(&action_id).unwrap_or_default()
        };

        for waiter in waiters {
            // The caller may have given up already
            let _ = waiter.tx.send(completion.clone());
        }
    }

    /// Forgets a remembered resolution (its evaluation was rolled back).
    pub fn evict(&self, action_id: ActionId) -> Option<Completion> {
        let mut inner = self.lock();
        let removed = inner.recent.remove(&action_id);
        if removed.is_some() {
            inner.recent_order.retain(|id| *id != action_id);
        }
        removed
    }

    /// Remembered resolution for `action_id`, if any.
    pub fn resolved(&self, action_id: ActionId) -> Option<Completion> {
        self.lock().recent.get(&action_id).cloned()
    }

    pub fn is_awaited(&self, action_id: ActionId) -> bool {
        self.lock().waiters.contains_key(&action_id)
    }

    pub fn waiter_count(&self, action_id: ActionId) -> usize {
        self.lock().waiters.get(&action_id).map_or(0, Vec::len)
    }

    fn remove_waiter(&self, action_id: ActionId, waiter_id: u64) {
        let mut inner = self.lock();
        if let Some(list) = inner.waiters.get_mut(&action_id) {
            list.retain(|w| w.id != waiter_id);
            if list.is_empty() {
                inner.waiters.remove(&action_id);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, NotifierInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            error!("completion notifier lock was poisoned; continuing with inner state");
            PoisonError::into_inner(poisoned)
        })
    }
}

/// Removes a waiter when its `wait` future finishes or is dropped.
struct WaiterGuard<'a> {
    notifier: &'a CompletionNotifier,
    action_id: ActionId,
    waiter_id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.notifier.remove_waiter(self.action_id, self.waiter_id);
    }
}
