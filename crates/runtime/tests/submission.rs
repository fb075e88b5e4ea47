//! Broadcasting behaviour of a running session.

mod common;

use std::sync::Arc;
use std::time::Duration;

use client_blockchain_core::{MockSigner, TransportError};
use common::{agent, config, eventually, gold, ledger, session, shop, transfer};
use game_core::{AgentState, EntityAddress};
use runtime::{Completion, Notification, RuntimeConfig, Session, Topic};

#[tokio::test(start_paused = true)]
async fn nonces_increase_per_signer() {
    let second = EntityAddress::shared("integration-second-agent");
    let ledger = ledger(100).with_state(second, AgentState::with_gold(100));
    let session = Session::builder()
        .ledger(Arc::new(ledger.clone()))
        .signer(Arc::new(MockSigner::new(agent())))
        .signer(Arc::new(MockSigner::new(second)))
        .config(config())
        .build()
        .await
        .unwrap();
    let handle = session.handle();

    for round in 0..3u64 {
        handle
            .submit_anticipated(transfer(agent(), shop(), round + 1))
            .unwrap();
        handle
            .submit_anticipated(transfer(second, shop(), round + 1))
            .unwrap();
        let expected = ((round + 1) * 2) as usize;
        eventually(|| ledger.submitted().len() == expected).await;
    }

    for signer in [agent(), second] {
        let nonces: Vec<u64> = ledger
            .submitted()
            .iter()
            .filter(|tx| tx.transaction.signer() == signer)
            .map(|tx| tx.transaction.nonce())
            .collect();
        assert_eq!(nonces, vec![0, 1, 2]);
    }

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn one_transaction_per_signer_per_tick() {
    let ledger = ledger(100);
    let session = session(
        &ledger,
        RuntimeConfig {
            batch_interval: Duration::from_secs(1),
            ..config()
        },
    )
    .await;
    let handle = session.handle();

    let ids: Vec<_> = (1..=3)
        .map(|amount| {
            handle
                .submit_anticipated(transfer(agent(), shop(), amount))
                .unwrap()
                .id()
        })
        .collect();
    assert_eq!(handle.pending_count(), 3);

    eventually(|| ledger.mempool_len() == 1).await;
    let submitted = ledger.submitted();
    assert_eq!(submitted.len(), 1);
    let batched: Vec<_> = submitted[0].action_ids().collect();
    assert_eq!(batched, ids);
    assert_eq!(handle.pending_count(), 0);

    ledger.produce_block();
    for id in ids {
        assert!(handle.wait(id, Duration::from_secs(5)).await.is_confirmed());
    }
    assert_eq!(gold(handle.effective_view(&agent())), Some(94));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_silently() {
    let ledger = ledger(100);
    ledger.inject_failure(TransportError::NetworkError("connection reset".into()));
    ledger.inject_failure(TransportError::Timeout);
    let session = session(&ledger, config()).await;
    let handle = session.handle();
    let mut actions = handle.subscribe(Topic::Action);

    let pending = handle
        .submit_anticipated(transfer(agent(), shop(), 30))
        .unwrap();
    eventually(|| ledger.mempool_len() == 1).await;
    assert_eq!(gold(handle.effective_view(&agent())), Some(70));

    ledger.produce_block();
    assert!(pending.wait(Duration::from_secs(5)).await.is_confirmed());
    assert!(matches!(
        actions.recv().await,
        Ok(Notification::ActionConfirmed { .. })
    ));

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn nonce_drift_is_recovered() {
    let ledger = ledger(100);
    let session = session(&ledger, config()).await;
    let handle = session.handle();

    let first = handle
        .submit_anticipated(transfer(agent(), shop(), 1))
        .unwrap();
    eventually(|| ledger.mempool_len() == 1).await;

    // Another device used the next nonce behind our back.
    ledger.bump_nonce(&agent());

    let second = handle
        .submit_anticipated(transfer(agent(), shop(), 2))
        .unwrap();
    eventually(|| ledger.mempool_len() == 2).await;

    let nonces: Vec<u64> = ledger
        .submitted()
        .iter()
        .map(|tx| tx.transaction.nonce())
        .collect();
    assert_eq!(nonces, vec![0, 2]);

    ledger.produce_block();
    assert!(first.wait(Duration::from_secs(5)).await.is_confirmed());
    assert!(second.wait(Duration::from_secs(5)).await.is_confirmed());

    session.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn rejected_batch_fails_and_retires_speculation() {
    let ledger = ledger(100);
    ledger.inject_failure(TransportError::Rejected("fee too low".into()));
    let session = session(&ledger, config()).await;
    let handle = session.handle();
    let mut actions = handle.subscribe(Topic::Action);

    let pending = handle
        .submit_anticipated(transfer(agent(), shop(), 30))
        .unwrap();
    assert_eq!(gold(handle.effective_view(&agent())), Some(70));

    match pending.wait(Duration::from_secs(5)).await {
        Completion::Failed(exception) => {
            assert_eq!(exception.name, "SubmissionRejected");
            assert!(exception.message.contains("fee too low"));
        }
        other => panic!("unexpected completion {other:?}"),
    }
    assert_eq!(gold(handle.effective_view(&agent())), Some(100));
    match actions.recv().await {
        Ok(Notification::SubmissionRejected {
            signer, action_ids, ..
        }) => {
            assert_eq!(signer, agent());
            assert_eq!(action_ids, vec![pending.id()]);
        }
        other => panic!("unexpected notification {other:?}"),
    }
    assert!(ledger.submitted().is_empty());

    session.shutdown().await.unwrap();
}
