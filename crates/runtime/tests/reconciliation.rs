//! End-to-end reconciliation against the mock ledger.

mod common;

use std::sync::Arc;
use std::time::Duration;

use client_blockchain_core::{
    LedgerTransport, MockLedger, MockSigner, SignedTransaction, Transaction, TransactionSigner,
};
use common::{agent, config, eventually, gold, ledger, session, shop, transfer};
use game_core::{AgentState, EntityAddress};
use runtime::{Completion, Notification, Topic};

#[tokio::test(start_paused = true)]
async fn spend_is_visible_immediately_and_confirmed_once() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();
    let mut actions = handle.subscribe(Topic::Action);

    let pending = handle
        .submit_anticipated(transfer(agent(), shop(), 30))
        .unwrap();
    assert_eq!(gold(handle.effective_view(&agent())), Some(70));
    assert_eq!(gold(handle.cached(&agent())), Some(100));

    eventually(|| ledger.mempool_len() == 1).await;
    assert_eq!(gold(handle.effective_view(&agent())), Some(70));

    ledger.produce_block();
    let outcome = pending.wait(Duration::from_secs(5)).await;
    assert!(outcome.is_confirmed());

    assert_eq!(gold(handle.effective_view(&agent())), Some(70));
    assert_eq!(gold(handle.cached(&agent())), Some(70));
    assert_eq!(handle.tip(), 1);
    assert!(matches!(
        actions.recv().await,
        Ok(Notification::ActionConfirmed { block_index: 1, .. })
    ));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn domain_failure_reverts_to_authoritative_view() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();
    let mut actions = handle.subscribe(Topic::Action);

    // Spent elsewhere; the session still believes 100.
    ledger.set_state(agent(), AgentState::with_gold(10));

    let pending = handle
        .submit_anticipated(transfer(agent(), shop(), 30))
        .unwrap();
    assert_eq!(gold(handle.effective_view(&agent())), Some(70));

    eventually(|| ledger.mempool_len() == 1).await;
    ledger.produce_block();

    match pending.wait(Duration::from_secs(5)).await {
        Completion::Failed(exception) => assert_eq!(exception.name, "InsufficientBalance"),
        other => panic!("unexpected completion {other:?}"),
    }
    assert_eq!(gold(handle.effective_view(&agent())), Some(100));
    assert!(matches!(
        actions.recv().await,
        Ok(Notification::ActionFailed { .. })
    ));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rollback_reinstates_speculation_over_restored_cache() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();
    let mut actions = handle.subscribe(Topic::Action);

    let pending = handle
        .submit_anticipated(transfer(agent(), shop(), 30))
        .unwrap();
    eventually(|| ledger.mempool_len() == 1).await;
    ledger.produce_block();
    assert!(pending.wait(Duration::from_secs(5)).await.is_confirmed());
    let _ = actions.recv().await;

    ledger.rollback_last_block();
    eventually(|| gold(handle.cached(&agent())) == Some(100)).await;

    // Pre-confirmation view: authoritative 100 with the spend still pending.
    assert_eq!(gold(handle.effective_view(&agent())), Some(70));
    assert!(matches!(
        actions.recv().await,
        Ok(Notification::ActionRolledBack { block_index: 1, .. })
    ));

    // The ledger dropped the transaction; nothing will confirm it again.
    assert_eq!(handle.discard_speculation(pending.id()), 1);
    assert_eq!(gold(handle.effective_view(&agent())), Some(100));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn waiter_timeout_leaves_speculation_in_place() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();

    let pending = handle
        .submit_anticipated(transfer(agent(), shop(), 30))
        .unwrap();
    assert_eq!(
        handle.wait(pending.id(), Duration::from_millis(10)).await,
        Completion::TimedOut
    );
    assert_eq!(gold(handle.effective_view(&agent())), Some(70));

    eventually(|| ledger.mempool_len() == 1).await;
    ledger.produce_block();
    assert!(pending.wait(Duration::from_secs(5)).await.is_confirmed());
    assert_eq!(gold(handle.effective_view(&agent())), Some(70));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn watchers_follow_speculation_and_confirmation() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();

    let mut view = handle.watch(agent());
    assert_eq!(gold(view.borrow_and_update().clone()), Some(100));

    let pending = handle
        .submit_anticipated(transfer(agent(), shop(), 40))
        .unwrap();
    view.changed().await.unwrap();
    assert_eq!(gold(view.borrow_and_update().clone()), Some(60));

    eventually(|| ledger.mempool_len() == 1).await;
    ledger.produce_block();
    assert!(pending.wait(Duration::from_secs(5)).await.is_confirmed());
    assert_eq!(gold(view.borrow().clone()), Some(60));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn other_participants_only_matter_when_they_touch_observed_state() {
    let stranger = EntityAddress::shared("integration-stranger");
    let ledger = ledger(100).with_state(stranger, AgentState::with_gold(500));
    let session = session(&ledger, config()).await;
    let handle = session.handle();
    let mut gameplay = handle.subscribe(Topic::Gameplay);

    let stranger_key = MockSigner::new(stranger);
    let broadcast = |nonce: u64, recipient: EntityAddress, amount: u64| {
        let ledger = ledger.clone();
        let transaction =
            Transaction::new(stranger, nonce, vec![transfer(stranger, recipient, amount)]).unwrap();
        let signature = stranger_key.sign(&transaction).unwrap();
        async move {
            ledger
                .submit_transaction(SignedTransaction {
                    transaction,
                    signature,
                })
                .await
                .unwrap();
        }
    };

    // Stranger pays a shop: irrelevant.
    broadcast(0, shop(), 5).await;
    // Stranger pays us: relevant.
    broadcast(1, agent(), 25).await;
    ledger.produce_block();

    match gameplay.recv().await {
        Ok(Notification::AssetReceived { sender, amount, .. }) => {
            assert_eq!(sender, stranger);
            assert_eq!(amount, 25);
        }
        other => panic!("unexpected notification {other:?}"),
    }
    assert_eq!(gold(handle.cached(&agent())), Some(125));
    assert_eq!(handle.cached(&shop()), None);
    assert_eq!(handle.cached(&stranger), None);
    assert!(gameplay.try_recv().is_err());

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn lagged_stream_recovers_missed_confirmation() {
    let stranger = EntityAddress::shared("integration-busy-stranger");
    let ledger = MockLedger::with_event_capacity(2)
        .with_state(agent(), AgentState::with_gold(100))
        .with_state(stranger, AgentState::with_gold(500));
    let session = session(&ledger, config()).await;
    let handle = session.handle();

    let pending = handle
        .submit_anticipated(transfer(agent(), shop(), 30))
        .unwrap();
    eventually(|| ledger.mempool_len() == 1).await;
    assert_eq!(handle.in_flight_count(), 1);

    // Busy block: our confirmation is pushed out of the buffer by stranger
    // traffic before the worker gets to run.
    let stranger_key = MockSigner::new(stranger);
    for nonce in 0..3 {
        let transaction =
            Transaction::new(stranger, nonce, vec![transfer(stranger, shop(), 1)]).unwrap();
        let signature = stranger_key.sign(&transaction).unwrap();
        ledger
            .submit_transaction(SignedTransaction {
                transaction,
                signature,
            })
            .await
            .unwrap();
    }
    assert_eq!(ledger.produce_block().len(), 4);

    assert!(pending.wait(Duration::from_secs(5)).await.is_confirmed());
    eventually(|| handle.in_flight_count() == 0).await;
    assert_eq!(gold(handle.cached(&agent())), Some(70));
    assert_eq!(gold(handle.effective_view(&agent())), Some(70));
    assert_eq!(handle.tip(), 1);

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn refresh_is_not_overwritten_by_late_older_evaluation() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();

    let pending = handle
        .submit_anticipated(transfer(agent(), shop(), 30))
        .unwrap();
    eventually(|| ledger.mempool_len() == 1).await;

    // Block 1 lands and a reward follows before the session catches up.
    let evaluations = ledger.produce_block();
    ledger.set_state(agent(), AgentState::with_gold(90));
    ledger.set_tip(2);
    assert_eq!(gold(handle.refresh(agent()).await.unwrap()), Some(60));

    // Block 1's evaluation is older than the refreshed snapshot.
    assert!(pending.wait(Duration::from_secs(5)).await.is_confirmed());
    assert_eq!(evaluations[0].block_index, 1);
    assert_eq!(gold(handle.cached(&agent())), Some(90));
    assert_eq!(gold(handle.effective_view(&agent())), Some(90));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn refresh_replaces_stale_snapshot() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();

    let friend = EntityAddress::shared("integration-friend");
    ledger.set_state(friend, AgentState::with_gold(7));
    assert!(handle.observe(friend));
    assert_eq!(handle.effective_view(&friend), None);

    assert_eq!(gold(handle.refresh(friend).await.unwrap()), Some(7));
    assert!(handle.unobserve(&friend));
    assert!(!handle.unobserve(&agent()));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn submit_after_shutdown_is_refused() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();
    session.shutdown().await.unwrap();

    let result = handle.submit(transfer(agent(), shop(), 1), Vec::new());
    assert!(matches!(result, Err(runtime::RuntimeError::ShutDown)));
}

#[tokio::test(start_paused = true)]
async fn signers_are_validated_on_submit() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();

    let stranger = EntityAddress::shared("integration-keyless");
    let result = handle.submit(transfer(stranger, shop(), 1), Vec::new());
    assert!(matches!(
        result,
        Err(runtime::RuntimeError::UnknownSigner(address)) if address == stranger
    ));

    let action = transfer(agent(), shop(), 1);
    handle.submit(action.clone(), Vec::new()).unwrap();
    assert!(matches!(
        handle.submit(action, Vec::new()),
        Err(runtime::RuntimeError::DuplicateAction(_))
    ));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn builder_requires_ledger_and_signer() {
    let missing_ledger = runtime::Session::builder()
        .signer(Arc::new(MockSigner::new(agent())))
        .build()
        .await;
    assert!(matches!(missing_ledger, Err(runtime::RuntimeError::MissingLedger)));

    let missing_signer = runtime::Session::builder()
        .ledger(Arc::new(ledger(0)))
        .build()
        .await;
    assert!(matches!(missing_signer, Err(runtime::RuntimeError::MissingSigner)));
}
