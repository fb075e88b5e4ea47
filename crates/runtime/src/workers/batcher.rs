//! Broadcasting of queued actions.
//!
//! Each tick drains the [`ActionQueue`], groups the drained actions by signer
//! (keeping their order), and broadcasts one transaction per signer. Drained
//! actions stay tracked as in flight: an accepted batch is marked broadcast
//! and waits there for its evaluation. The batcher never touches the overlay
//! except to retire speculation of a batch that can no longer be broadcast.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::time::{Duration, MissedTickBehavior, interval, sleep};
use tracing::{debug, error, info, warn};

use client_blockchain_core::{
    ActionException, LedgerTransport, SignedTransaction, Transaction, TransactionSigner,
    TransportError, TxId,
};
use game_core::{Action, EntityAddress};

use crate::completion::{Completion, CompletionNotifier};
use crate::events::{EventBus, Notification};
use crate::overlay::OverlayStore;
use crate::queue::{ActionQueue, PendingAction};
use crate::shutdown::ShutdownToken;

/// Exception name used when an action never reaches the ledger.
const SUBMISSION_REJECTED: &str = "SubmissionRejected";

/// Timing and retry limits of the batcher.
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub interval: Duration,
    /// Broadcast attempts per action before it is rejected.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl BatchSettings {
    /// Delay before retrying after the `attempts`-th failure.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
        self.backoff_base
            .saturating_mul(factor)
            .min(self.backoff_max)
    }
}

enum BatchFailure {
    Transient(String),
    Fatal(String),
}

impl From<TransportError> for BatchFailure {
    fn from(error: TransportError) -> Self {
        if error.is_transient() {
            Self::Transient(error.to_string())
        } else {
            Self::Fatal(error.to_string())
        }
    }
}

pub struct TransactionBatcher {
    queue: Arc<ActionQueue>,
    ledger: Arc<dyn LedgerTransport>,
    signers: HashMap<EntityAddress, Arc<dyn TransactionSigner>>,
    overlay: Arc<OverlayStore>,
    completions: Arc<CompletionNotifier>,
    events: EventBus,
    settings: BatchSettings,
    /// Last nonce this batcher used per signer.
    last_nonce: HashMap<EntityAddress, u64>,
    shutdown: ShutdownToken,
}

impl TransactionBatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<ActionQueue>,
        ledger: Arc<dyn LedgerTransport>,
        signers: HashMap<EntityAddress, Arc<dyn TransactionSigner>>,
        overlay: Arc<OverlayStore>,
        completions: Arc<CompletionNotifier>,
        events: EventBus,
        settings: BatchSettings,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            queue,
            ledger,
            signers,
            overlay,
            completions,
            events,
            settings,
            last_nonce: HashMap::new(),
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!(
            "TransactionBatcher started: interval={:?}, signers={}",
            self.settings.interval,
            self.signers.len()
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            // A tick is never cancelled midway; a drained batch is always
            // either broadcast, requeued or rejected.
            if let Some(delay) = self.tick().await {
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => break,
                    _ = sleep(delay) => {}
                }
            }
        }

        info!("TransactionBatcher stopped");
    }

    /// Broadcasts everything currently queued.
    ///
    /// Returns the backoff to wait before the next tick if anything was
    /// requeued.
    pub async fn tick(&mut self) -> Option<Duration> {
        let drained = self.queue.drain();
        if drained.is_empty() {
            return None;
        }
        debug!(count = drained.len(), "Broadcasting queued actions");

        let mut groups: Vec<(EntityAddress, Vec<(usize, PendingAction)>)> = Vec::new();
        for (index, pending) in drained.into_iter().enumerate() {
            let signer = pending.action.signer();
            match groups.iter_mut().find(|(s, _)| *s == signer) {
                Some((_, batch)) => batch.push((index, pending)),
                None => groups.push((signer, vec![(index, pending)])),
            }
        }

        let mut retry: Vec<(usize, PendingAction)> = Vec::new();
        let mut backoff_attempts = 0;

        for (signer, batch) in groups {
            let actions: Vec<Action> = batch.iter().map(|(_, p)| p.action.clone()).collect();

            match self.broadcast(signer, actions).await {
                Ok(tx_id) => {
                    let ids: Vec<_> = batch.iter().map(|(_, p)| p.id()).collect();
                    self.queue.mark_broadcast(&ids);
                    debug!(%signer, %tx_id, count = batch.len(), "Transaction submitted");
                }
                Err(BatchFailure::Transient(reason)) => {
                    warn!(%signer, count = batch.len(), "Transient broadcast failure: {}", reason);

                    let mut exhausted = Vec::new();
                    for (index, mut pending) in batch {
                        pending.attempts += 1;
                        if pending.attempts >= self.settings.max_attempts {
                            exhausted.push(pending);
                        } else {
                            backoff_attempts = backoff_attempts.max(pending.attempts);
                            retry.push((index, pending));
                        }
                    }
                    if !exhausted.is_empty() {
                        let reason = format!(
                            "gave up after {} attempts: {}",
                            self.settings.max_attempts, reason
                        );
                        self.reject(signer, exhausted, reason);
                    }
                }
                Err(BatchFailure::Fatal(reason)) => {
                    self.reject(signer, batch.into_iter().map(|(_, p)| p).collect(), reason);
                }
            }
        }

        if retry.is_empty() {
            return None;
        }
        retry.sort_by_key(|(index, _)| *index);
        self.queue
            .requeue_front(retry.into_iter().map(|(_, p)| p).collect());

        let delay = self.settings.backoff(backoff_attempts);
        debug!(?delay, "Backing off before next broadcast");
        Some(delay)
    }

    async fn broadcast(
        &mut self,
        signer: EntityAddress,
        actions: Vec<Action>,
    ) -> Result<TxId, BatchFailure> {
        let Some(key) = self.signers.get(&signer).cloned() else {
            return Err(BatchFailure::Fatal(format!("no signer registered for {signer}")));
        };

        let mut conflicted = false;
        loop {
            let nonce = self.next_nonce(signer).await?;
            let transaction = Transaction::new(signer, nonce, actions.clone())
                .map_err(|e| BatchFailure::Fatal(e.to_string()))?;
            let signature = key
                .sign(&transaction)
                .map_err(|e| BatchFailure::Fatal(e.to_string()))?;

            let submitted = self
                .ledger
                .submit_transaction(SignedTransaction {
                    transaction,
                    signature,
                })
                .await;

            match submitted {
                Ok(tx_id) => {
                    self.last_nonce.insert(signer, nonce);
                    return Ok(tx_id);
                }
                Err(TransportError::NonceConflict { expected, .. }) if !conflicted => {
                    warn!(%signer, nonce, expected, "Nonce conflict; refetching nonce");
                    self.last_nonce.remove(&signer);
                    conflicted = true;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// `max(ledger nonce, last used + 1)`, so back-to-back ticks never reuse
    /// a nonce before the ledger has seen the previous transaction.
    async fn next_nonce(&self, signer: EntityAddress) -> Result<u64, TransportError> {
        let remote = self.ledger.next_nonce(&signer).await?;
        Ok(match self.last_nonce.get(&signer) {
            Some(last) => remote.max(last.saturating_add(1)),
            None => remote,
        })
    }

    /// Completes a batch that will never reach the ledger.
    fn reject(&self, signer: EntityAddress, batch: Vec<PendingAction>, reason: String) {
        error!(%signer, count = batch.len(), "Broadcast failed permanently: {}", reason);

        let exception = ActionException::new(SUBMISSION_REJECTED, reason.clone());
        let mut action_ids = Vec::with_capacity(batch.len());

        for pending in batch {
            let action_id = pending.id();
            self.queue.settle(action_id);
            let retired = self.overlay.retire_action(action_id);
            self.overlay.publish(retired.iter().map(|r| r.address));
            self.completions
                .resolve(action_id, Completion::Failed(exception.clone()));
            action_ids.push(action_id);
        }

        self.events.publish(Notification::SubmissionRejected {
            signer,
            action_ids,
            reason,
        });
    }
}
