//! Cloneable façade feature code uses to talk to a session.
//!
//! [`SessionHandle`] hides the queue, overlay and completion plumbing and
//! offers the calls a UI needs: submit with speculation, watch effective
//! views, await outcomes and stream notifications.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::debug;

use client_blockchain_core::{LedgerPosition, LedgerTransport};
use game_core::{
    Action, ActionId, BlockIndex, EffectContext, EntityAddress, EntityState, Speculation,
    UnlockEstimate, anticipate,
};

use super::errors::{Result, RuntimeError};
use crate::completion::{Completion, CompletionNotifier};
use crate::events::{EventBus, Notification, Topic};
use crate::overlay::OverlayStore;
use crate::queue::{ActionQueue, PendingAction};
use crate::router::ObservedAddresses;
use crate::shutdown::ShutdownToken;

/// State shared between a session, its workers and every handle.
pub(crate) struct SessionShared {
    pub(crate) queue: Arc<ActionQueue>,
    pub(crate) overlay: Arc<OverlayStore>,
    pub(crate) completions: Arc<CompletionNotifier>,
    pub(crate) events: EventBus,
    pub(crate) observed: Arc<ObservedAddresses>,
    pub(crate) ledger: Arc<dyn LedgerTransport>,
    pub(crate) signers: HashSet<EntityAddress>,
    pub(crate) tip: Arc<AtomicU64>,
    pub(crate) unlock: UnlockEstimate,
    pub(crate) shutdown: ShutdownToken,
}

/// Client-facing handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
}

impl SessionHandle {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    /// Agent this session acts for.
    pub fn agent(&self) -> EntityAddress {
        self.shared.observed.agent()
    }

    /// Installs `speculation` and queues `action` for broadcast.
    ///
    /// Never waits on the network. The speculation is visible in
    /// [`effective_view`](Self::effective_view) and to watchers before this
    /// returns.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::ShutDown`] after the session stopped
    /// - [`RuntimeError::UnknownSigner`] if no signer holds the action's key
    /// - [`RuntimeError::DuplicateAction`] if the id is already queued,
    ///   in flight or speculated
    /// - [`RuntimeError::Overlay`] if the speculation repeats a modifier
    pub fn submit(&self, action: Action, speculation: Vec<Speculation>) -> Result<PendingHandle> {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Err(RuntimeError::ShutDown);
        }
        if !shared.signers.contains(&action.signer()) {
            return Err(RuntimeError::UnknownSigner(action.signer()));
        }

        let action_id = action.id();
        if shared.queue.contains(action_id) || shared.overlay.has_action(action_id) {
            return Err(RuntimeError::DuplicateAction(action_id));
        }

        shared.overlay.apply_all(action_id, &speculation)?;
        debug!(action = ?action_id, kind = %action.kind(), modifiers = speculation.len(), "action submitted");
        shared
            .queue
            .enqueue(PendingAction::new(action.clone(), speculation));

        Ok(PendingHandle {
            action,
            completions: Arc::clone(&shared.completions),
        })
    }

    /// Like [`submit`](Self::submit) with the speculation derived from the
    /// action's anticipated effects on the current effective views.
    pub fn submit_anticipated(&self, action: Action) -> Result<PendingHandle> {
        let overlay = &self.shared.overlay;
        let view = |address: &EntityAddress| overlay.effective_view(address);
        let ctx = EffectContext {
            tip: self.tip(),
            unlock: self.shared.unlock,
            view: &view,
        };
        let speculation = anticipate(&action, &ctx);
        self.submit(action, speculation)
    }

    /// Receiver of the effective view of `address`.
    pub fn watch(&self, address: EntityAddress) -> watch::Receiver<Option<EntityState>> {
        self.shared.overlay.watch(address)
    }

    /// Waits for the outcome of `action_id`. Dropping the future only
    /// cancels this wait.
    pub async fn wait(&self, action_id: ActionId, timeout: Duration) -> Completion {
        self.shared.completions.wait(action_id, timeout).await
    }

    /// Authoritative snapshot folded through the active speculation.
    pub fn effective_view(&self, address: &EntityAddress) -> Option<EntityState> {
        self.shared.overlay.effective_view(address)
    }

    /// Last authoritative snapshot, without speculation.
    pub fn cached(&self, address: &EntityAddress) -> Option<EntityState> {
        self.shared.overlay.cache().get(address)
    }

    /// Starts following `address`. Call [`refresh`](Self::refresh) to load
    /// its current snapshot.
    pub fn observe(&self, address: EntityAddress) -> bool {
        self.shared.observed.observe(address)
    }

    /// Stops following `address`. The cached snapshot is kept.
    pub fn unobserve(&self, address: &EntityAddress) -> bool {
        self.shared.observed.unobserve(address)
    }

    /// Queries the ledger for `address`, stores the result as authoritative
    /// and returns the new effective view.
    ///
    /// The snapshot is positioned at the ledger tip read before the query,
    /// so an evaluation from an earlier block delivered afterwards does not
    /// overwrite it.
    pub async fn refresh(&self, address: EntityAddress) -> Result<Option<EntityState>> {
        let ledger = &self.shared.ledger;
        let tip = ledger.tip().await?;
        let state = ledger.query_state(&address).await?;
        self.shared.tip.fetch_max(tip, Ordering::AcqRel);

        let overlay = &self.shared.overlay;
        if overlay
            .cache()
            .store_queried_at(address, state, LedgerPosition::end_of(tip))
        {
            overlay.publish([address]);
        } else {
            debug!(%address, tip, "cache already holds a newer snapshot");
        }
        Ok(overlay.effective_view(&address))
    }

    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Notification> {
        self.shared.events.subscribe(topic)
    }

    /// Last block index observed by this session.
    pub fn tip(&self) -> BlockIndex {
        self.shared.tip.load(Ordering::Acquire)
    }

    /// Drops the speculation of an action that will never land, e.g. one the
    /// ledger dropped after its block was rolled back.
    ///
    /// Returns the number of modifiers removed.
    pub fn discard_speculation(&self, action_id: ActionId) -> usize {
        self.shared.queue.settle(action_id);
        let overlay = &self.shared.overlay;
        let retired = overlay.retire_action(action_id);
        overlay.publish(retired.iter().map(|r| r.address));
        retired.len()
    }

    /// Actions accepted but not yet broadcast.
    pub fn pending_count(&self) -> usize {
        self.shared.queue.len()
    }

    /// Actions handed to the ledger whose evaluation has not arrived.
    pub fn in_flight_count(&self) -> usize {
        self.shared.queue.in_flight_len()
    }
}

/// Returned by [`SessionHandle::submit`].
pub struct PendingHandle {
    action: Action,
    completions: Arc<CompletionNotifier>,
}

impl PendingHandle {
    pub fn id(&self) -> ActionId {
        self.action.id()
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub async fn wait(&self, timeout: Duration) -> Completion {
        self.completions.wait(self.action.id(), timeout).await
    }
}
