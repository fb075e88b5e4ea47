//! Evaluation stream consumer.
//!
//! When the stream lags, the skipped events are gone for good. The worker
//! then resyncs from the ledger: it re-reads every tracked address at the
//! current tip and looks up the outcome of each unsettled local action.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use client_blockchain_core::{
    EvaluationDirection, EvaluationEvent, LedgerTransport, TransportError,
};
use game_core::ActionId;

use crate::router::{DispatchOutcome, EvaluationRouter};
use crate::shutdown::ShutdownToken;

/// Feeds confirmed and rolled-back evaluations into the router, one at a
/// time and in stream order.
pub struct EvaluationWorker {
    router: Arc<EvaluationRouter>,
    ledger: Arc<dyn LedgerTransport>,
    rx: broadcast::Receiver<EvaluationEvent>,
    shutdown: ShutdownToken,
}

impl EvaluationWorker {
    pub fn new(
        router: Arc<EvaluationRouter>,
        ledger: Arc<dyn LedgerTransport>,
        rx: broadcast::Receiver<EvaluationEvent>,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            router,
            ledger,
            rx,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        info!("EvaluationWorker started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                event = self.rx.recv() => match event {
                    Ok(event) => self.handle(event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Evaluation stream lagged; resyncing from ledger");
                        match resync(self.ledger.as_ref(), &self.router).await {
                            Ok(recovered) => info!(skipped, recovered, "Resynced after lag"),
                            Err(e) => warn!("Resync after lag failed: {}", e),
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Evaluation stream closed");
                        break;
                    }
                },
            }
        }

        info!("EvaluationWorker stopped");
    }

    fn handle(&self, event: EvaluationEvent) {
        match event.direction {
            EvaluationDirection::Confirm => {
                let outcome = self.router.dispatch(&event.evaluation);
                debug!(action = ?event.evaluation.action_id(), ?outcome, "confirm dispatched");
            }
            EvaluationDirection::Rollback => {
                let outcome = self.router.dispatch_rollback(&event.evaluation);
                debug!(action = ?event.evaluation.action_id(), ?outcome, "rollback dispatched");
            }
        }
    }
}

/// Re-reads every tracked address at the ledger tip, then dispatches the
/// known outcomes of unsettled local actions.
///
/// Returns the number of outcomes recovered.
pub async fn resync(
    ledger: &dyn LedgerTransport,
    router: &EvaluationRouter,
) -> Result<usize, TransportError> {
    let tip = ledger.tip().await?;
    let mut snapshots = Vec::new();
    for address in router.tracked_addresses() {
        snapshots.push((address, ledger.query_state(&address).await?));
    }
    let stored = router.apply_queried(snapshots, tip);
    debug!(tip, stored, "Tracked snapshots reloaded");

    Ok(recover_outcomes(ledger, router, router.unsettled_actions()).await)
}

/// Dispatches the ledger's evaluation of each action it has one for.
/// Lookup failures are logged and skipped.
pub async fn recover_outcomes(
    ledger: &dyn LedgerTransport,
    router: &EvaluationRouter,
    action_ids: impl IntoIterator<Item = ActionId>,
) -> usize {
    let mut recovered = 0;
    for action_id in action_ids {
        match ledger.evaluation_of(action_id).await {
            Ok(Some(evaluation)) => {
                if router.dispatch(&Arc::new(evaluation)) == DispatchOutcome::Applied {
                    recovered += 1;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(action = ?action_id, "Outcome lookup failed: {}", e),
        }
    }
    recovered
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use super::*;
    use crate::completion::CompletionNotifier;
    use crate::events::EventBus;
    use crate::handlers::HandlerRegistry;
    use crate::overlay::{AuthoritativeCache, OverlayStore};
    use crate::queue::{ActionQueue, PendingAction};
    use crate::router::ObservedAddresses;
    use client_blockchain_core::{
        MockLedger, MockSigner, SignedTransaction, Transaction, TransactionSigner,
    };
    use game_core::{
        Action, AgentState, EntityAddress, Speculation, StateModifier, TransferAssetAction,
    };

    struct Fixture {
        ledger: MockLedger,
        router: EvaluationRouter,
        overlay: Arc<OverlayStore>,
        queue: Arc<ActionQueue>,
        completions: Arc<CompletionNotifier>,
    }

    fn agent() -> EntityAddress {
        EntityAddress::shared("resync-agent")
    }

    fn fixture() -> Fixture {
        let ledger = MockLedger::new().with_state(agent(), AgentState::with_gold(100));
        let cache = Arc::new(AuthoritativeCache::new());
        cache.store_queried(agent(), Some(AgentState::with_gold(100).into()));
        let overlay = Arc::new(OverlayStore::new(cache));
        let completions = Arc::new(CompletionNotifier::new(16));
        let queue = Arc::new(ActionQueue::new());
        let router = EvaluationRouter::new(
            Arc::clone(&overlay),
            Arc::clone(&completions),
            EventBus::with_capacity(16),
            Arc::new(ObservedAddresses::new(agent())),
            Arc::clone(&queue),
            HandlerRegistry::with_defaults(),
            Arc::new(AtomicU64::new(0)),
        );
        Fixture {
            ledger,
            router,
            overlay,
            queue,
            completions,
        }
    }

    /// Speculates a spend, tracks it as broadcast and hands it to the ledger.
    async fn broadcast_spend(f: &Fixture, amount: u64) -> Action {
        let action = Action::new(
            agent(),
            TransferAssetAction {
                recipient: EntityAddress::shared("resync-shop"),
                amount,
                memo: None,
            },
        );
        let speculation = vec![Speculation::new(
            agent(),
            StateModifier::AdjustBalance {
                amount: -(amount as i64),
            },
        )];
        f.overlay.apply_all(action.id(), &speculation).unwrap();
        f.queue.resume(PendingAction::new(action.clone(), speculation));

        let nonce = f.ledger.next_nonce(&agent()).await.unwrap();
        let tx = Transaction::new(agent(), nonce, vec![action.clone()]).unwrap();
        let signature = MockSigner::new(agent()).sign(&tx).unwrap();
        f.ledger
            .submit_transaction(SignedTransaction {
                transaction: tx,
                signature,
            })
            .await
            .unwrap();
        action
    }

    fn gold(f: &Fixture) -> u64 {
        f.overlay
            .effective_view(&agent())
            .and_then(|s| s.as_agent().map(|a| a.gold))
            .unwrap()
    }

    #[tokio::test]
    async fn resync_recovers_missed_confirmation() {
        let f = fixture();
        let action = broadcast_spend(&f, 30).await;
        f.ledger.produce_block();

        assert_eq!(resync(&f.ledger, &f.router).await.unwrap(), 1);
        assert_eq!(gold(&f), 70);
        assert!(!f.overlay.has_action(action.id()));
        assert_eq!(f.queue.in_flight_len(), 0);
        assert!(f.completions.resolved(action.id()).unwrap().is_confirmed());
        assert_eq!(f.router.tip(), f.ledger.current_tip());
    }

    #[tokio::test]
    async fn resync_keeps_speculation_of_unmined_actions() {
        let f = fixture();
        let action = broadcast_spend(&f, 30).await;

        assert_eq!(resync(&f.ledger, &f.router).await.unwrap(), 0);
        assert_eq!(gold(&f), 70);
        assert!(f.overlay.has_action(action.id()));
        assert_eq!(f.queue.in_flight_len(), 1);
    }
}
