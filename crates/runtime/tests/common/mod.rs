#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use client_blockchain_core::{MockLedger, MockSigner};
use game_core::{Action, AgentState, EntityAddress, EntityState, TransferAssetAction};
use runtime::{RuntimeConfig, Session};

pub fn agent() -> EntityAddress {
    EntityAddress::shared("integration-agent")
}

pub fn shop() -> EntityAddress {
    EntityAddress::shared("integration-shop")
}

pub fn config() -> RuntimeConfig {
    RuntimeConfig {
        batch_interval: Duration::from_millis(50),
        backoff_base: Duration::from_millis(20),
        backoff_max: Duration::from_millis(100),
        ..RuntimeConfig::default()
    }
}

/// Ledger where `agent()` holds `gold`.
pub fn ledger(gold: u64) -> MockLedger {
    MockLedger::new().with_state(agent(), AgentState::with_gold(gold))
}

pub async fn session(ledger: &MockLedger, config: RuntimeConfig) -> Session {
    Session::builder()
        .ledger(Arc::new(ledger.clone()))
        .signer(Arc::new(MockSigner::new(agent())))
        .config(config)
        .build()
        .await
        .expect("session builds")
}

pub fn transfer(signer: EntityAddress, recipient: EntityAddress, amount: u64) -> Action {
    Action::new(
        signer,
        TransferAssetAction {
            recipient,
            amount,
            memo: None,
        },
    )
}

pub fn gold(state: Option<EntityState>) -> Option<u64> {
    state.and_then(|s| s.as_agent().map(|a| a.gold))
}

/// Polls `condition` while letting the session's workers run.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
