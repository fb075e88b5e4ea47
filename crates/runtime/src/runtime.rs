//! Session orchestrator.
//!
//! A [`Session`] owns the reconciliation state for one agent and the
//! background workers that keep it in sync with the ledger. [`SessionHandle`]
//! is the cloneable façade feature code uses.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use client_blockchain_core::{LedgerPosition, LedgerTransport, TransactionSigner};
use game_core::{ActionId, EntityAddress, UnlockEstimate};

use crate::api::handle::SessionShared;
use crate::api::{Result, RuntimeError, SessionHandle};
use crate::completion::CompletionNotifier;
use crate::events::EventBus;
use crate::handlers::HandlerRegistry;
use crate::overlay::{AuthoritativeCache, OverlayStore};
use crate::queue::ActionQueue;
use crate::repository::{FilePendingStore, PendingActionRepository};
use crate::router::{EvaluationRouter, ObservedAddresses};
use crate::shutdown::ShutdownToken;
use crate::workers::{
    BatchSettings, EvaluationWorker, PersistenceWorker, TransactionBatcher, recover_outcomes,
};

/// Where queued and in-flight actions are checkpointed.
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub session_id: String,
    pub base_dir: PathBuf,
}

impl PersistenceConfig {
    pub fn new(session_id: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            base_dir: base_dir.into(),
        }
    }
}

/// Session configuration shared across the orchestrator and workers.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub batch_interval: Duration,
    /// Broadcast attempts per action before it is rejected.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Resolutions kept for waiters that arrive late.
    pub completion_cache_capacity: usize,
    pub event_buffer_size: usize,
    pub persist_interval: Duration,
    pub unlock_estimate: UnlockEstimate,
    /// Disabled when `None`.
    pub persistence: Option<PersistenceConfig>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_interval: Duration::from_secs(1),
            max_attempts: 5,
            backoff_base: Duration::from_millis(200),
            backoff_max: Duration::from_secs(10),
            completion_cache_capacity: 256,
            event_buffer_size: 256,
            persist_interval: Duration::from_secs(30),
            unlock_estimate: UnlockEstimate::default(),
            persistence: None,
        }
    }
}

impl RuntimeConfig {
    fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            interval: self.batch_interval,
            max_attempts: self.max_attempts.max(1),
            backoff_base: self.backoff_base,
            backoff_max: self.backoff_max,
        }
    }
}

/// Reconciliation session for one agent.
///
/// Dropping a session cancels its workers; call [`shutdown`](Self::shutdown)
/// to also wait for them and checkpoint every action without a known outcome.
pub struct Session {
    handle: SessionHandle,
    queue: Arc<ActionQueue>,
    store: Option<Arc<dyn PendingActionRepository>>,
    shutdown: ShutdownToken,
    workers: Vec<JoinHandle<()>>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Get a cloneable handle to this session.
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stops every worker, then saves the in-flight and queued actions.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown.cancel();

        for worker in std::mem::take(&mut self.workers) {
            worker.await.map_err(RuntimeError::WorkerJoin)?;
        }

        if let Some(store) = self.store.take() {
            let pending = self.queue.checkpoint();
            store.save(&pending)?;
            info!(count = pending.len(), "Saved pending actions on shutdown");
        }

        info!("Session shut down");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
    config: RuntimeConfig,
    ledger: Option<Arc<dyn LedgerTransport>>,
    signers: Vec<Arc<dyn TransactionSigner>>,
    agent: Option<EntityAddress>,
    observed: Vec<EntityAddress>,
    handlers: Option<HandlerRegistry>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn ledger(mut self, ledger: Arc<dyn LedgerTransport>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Adds a signer. The first signer's address is the session agent unless
    /// [`agent`](Self::agent) is set.
    pub fn signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signers.push(signer);
        self
    }

    pub fn agent(mut self, agent: EntityAddress) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Observes `address` from the start; its snapshot is loaded in `build`.
    pub fn observe(mut self, address: EntityAddress) -> Self {
        self.observed.push(address);
        self
    }

    /// Replaces the default handler set.
    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Loads the initial snapshots, restores persisted actions and spawns
    /// the workers.
    pub async fn build(self) -> Result<Session> {
        let ledger = self.ledger.ok_or(RuntimeError::MissingLedger)?;
        let first_signer = self.signers.first().ok_or(RuntimeError::MissingSigner)?;
        let agent = self.agent.unwrap_or_else(|| first_signer.address());
        let config = self.config;

        let overlay = Arc::new(OverlayStore::new(Arc::new(AuthoritativeCache::new())));
        let completions = Arc::new(CompletionNotifier::new(config.completion_cache_capacity));
        let events = EventBus::with_capacity(config.event_buffer_size);
        let observed = Arc::new(ObservedAddresses::new(agent));
        for address in self.observed {
            observed.observe(address);
        }
        let queue = Arc::new(ActionQueue::new());
        let shutdown = ShutdownToken::new();
        let initial_tip = ledger.tip().await?;
        let tip = Arc::new(AtomicU64::new(initial_tip));

        // Subscribe before the initial queries so nothing confirmed in
        // between is missed.
        let evaluations = ledger.subscribe_evaluations();
        let position = LedgerPosition::end_of(initial_tip);
        for address in observed.snapshot() {
            let state = ledger.query_state(&address).await?;
            overlay.cache().store_queried_at(address, state, position);
        }

        let router = Arc::new(EvaluationRouter::new(
            Arc::clone(&overlay),
            Arc::clone(&completions),
            events.clone(),
            Arc::clone(&observed),
            Arc::clone(&queue),
            self.handlers.unwrap_or_else(HandlerRegistry::with_defaults),
            Arc::clone(&tip),
        ));

        let store: Option<Arc<dyn PendingActionRepository>> = match &config.persistence {
            Some(persistence) => Some(Arc::new(FilePendingStore::new(
                &persistence.base_dir,
                &persistence.session_id,
            )?)),
            None => None,
        };
        if let Some(store) = &store {
            let resumed = restore_pending(store.as_ref(), &queue, &overlay);
            let recovered = recover_outcomes(ledger.as_ref(), &router, resumed).await;
            if recovered > 0 {
                info!(recovered, "Applied outcomes of actions confirmed while offline");
            }
        }

        let signers: HashMap<EntityAddress, Arc<dyn TransactionSigner>> = self
            .signers
            .into_iter()
            .map(|signer| (signer.address(), signer))
            .collect();
        let signer_addresses: HashSet<EntityAddress> = signers.keys().copied().collect();

        let mut workers = Vec::new();

        let evaluation_worker =
            EvaluationWorker::new(router, Arc::clone(&ledger), evaluations, shutdown.clone());
        workers.push(tokio::spawn(evaluation_worker.run()));

        let batcher = TransactionBatcher::new(
            Arc::clone(&queue),
            Arc::clone(&ledger),
            signers,
            Arc::clone(&overlay),
            Arc::clone(&completions),
            events.clone(),
            config.batch_settings(),
            shutdown.clone(),
        );
        workers.push(tokio::spawn(batcher.run()));

        if let Some(store) = &store {
            let persistence = PersistenceWorker::new(
                Arc::clone(&queue),
                Arc::clone(store),
                config.persist_interval,
                shutdown.clone(),
            );
            workers.push(tokio::spawn(persistence.run()));
        }

        info!(
            %agent,
            observed = observed.snapshot().len(),
            workers = workers.len(),
            "Session started"
        );

        let handle = SessionHandle::new(Arc::new(SessionShared {
            queue: Arc::clone(&queue),
            overlay,
            completions,
            events,
            observed,
            ledger,
            signers: signer_addresses,
            tip,
            unlock: config.unlock_estimate,
            shutdown: shutdown.clone(),
        }));

        Ok(Session {
            handle,
            queue,
            store,
            shutdown,
            workers,
        })
    }
}

/// Restores persisted actions with their original ids and reinstalls their
/// speculation. Broadcast ones go back in flight and are not sent again; the
/// rest are queued. Never fails the session start.
///
/// Returns the ids of the broadcast actions, whose outcome may already be
/// on the ledger.
fn restore_pending(
    store: &dyn PendingActionRepository,
    queue: &ActionQueue,
    overlay: &OverlayStore,
) -> Vec<ActionId> {
    let restored = match store.load() {
        Ok(restored) => restored,
        Err(e) => {
            warn!("Failed to load pending actions: {}", e);
            return Vec::new();
        }
    };

    let count = restored.len();
    let mut resumed = Vec::new();
    for pending in restored {
        if let Err(e) = overlay.apply_all(pending.id(), &pending.speculation) {
            warn!(action = ?pending.id(), "Speculation not reinstalled: {}", e);
        }
        if pending.broadcast {
            resumed.push(pending.id());
            queue.resume(pending);
        } else {
            queue.enqueue(pending);
        }
    }
    if count > 0 {
        info!(count, in_flight = resumed.len(), "Restored pending actions");
    }
    resumed
}
