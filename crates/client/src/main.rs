//! Game client binary.
//!
//! Composition root that boots a reconciliation session against the
//! in-memory ledger and plays a short script: craft, transfer, clear a
//! stage. Each action's speculative effect is shown before the ledger
//! confirms it.
//!
//! ```bash
//! RUST_LOG=debug cargo run -p game-client
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use client_blockchain_core::{MockLedger, MockSigner};
use client_bootstrap::{ClientConfig, SessionBootstrap, setup_logging};
use game_core::{
    Action, AgentState, AvatarState, ClearStageAction, CombineEquipmentAction, EntityAddress,
    TransferAssetAction,
};
use runtime::{Completion, PendingHandle, SessionHandle, Topic};

const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // 1. Load configuration and set up logging
    let mut config = ClientConfig::from_env();
    let session_id = config.resolve_session_id();
    let _guard = setup_logging(&session_id, &config.log_dir())?;

    tracing::info!("Starting game client");
    tracing::info!("Persistence: {}", config.enable_persistence);

    // 2. Seed the demo ledger
    let agent = EntityAddress::shared("demo-agent");
    let avatar = EntityAddress::avatar(&agent, 0);
    let ledger = MockLedger::new()
        .with_state(agent, demo_agent(avatar))
        .with_state(avatar, demo_avatar(agent));

    // 3. Build the session
    let setup = SessionBootstrap::new(config)
        .ledger(Arc::new(ledger.clone()))
        .signer(Arc::new(MockSigner::new(agent)))
        .observe(avatar)
        .build()
        .await?;
    let handle = setup.session.handle();

    // 4. Produce blocks in the background
    let block_time = setup.config.runtime.batch_interval * 2;
    let producer = tokio::spawn({
        let ledger = ledger.clone();
        async move {
            let mut ticker = tokio::time::interval(block_time);
            loop {
                ticker.tick().await;
                if ledger.mempool_len() > 0 {
                    ledger.produce_block();
                }
            }
        }
    });
    let notifications = tokio::spawn(log_notifications(handle.clone()));

    // 5. Play
    let combine = handle.submit_anticipated(Action::new(
        agent,
        CombineEquipmentAction {
            avatar,
            slot: 0,
            recipe_id: 1,
            result_item_id: 10_100_000,
            materials: vec![(303_000, 2)],
            cost: 50,
            required_blocks: 20,
        },
    ))?;
    show(&handle, "after submitting combine", &[agent, avatar]);
    settle(&combine).await?;
    show(&handle, "after combine confirmed", &[agent, avatar]);

    let transfer = handle.submit_anticipated(Action::new(
        agent,
        TransferAssetAction {
            recipient: EntityAddress::shared("demo-friend"),
            amount: 100,
            memo: Some("thanks".into()),
        },
    ))?;
    show(&handle, "after submitting transfer", &[agent]);
    settle(&transfer).await?;

    let stage = handle.submit_anticipated(Action::new(
        agent,
        ClearStageAction {
            avatar,
            stage_id: 3,
            action_point_cost: 5,
        },
    ))?;
    settle(&stage).await?;
    show(&handle, "final", &[agent, avatar]);

    // 6. Shut down
    producer.abort();
    setup.session.shutdown().await?;
    notifications.abort();

    tracing::info!("Client shutdown complete");
    Ok(())
}

fn demo_agent(avatar: EntityAddress) -> AgentState {
    let mut agent = AgentState::with_gold(1_000);
    agent.avatars.insert(0, avatar);
    agent
}

fn demo_avatar(agent: EntityAddress) -> AvatarState {
    let mut avatar = AvatarState::new(agent, "Wanderer");
    avatar.action_point = 120;
    avatar.inventory.add_fungible(303_000, 4);
    avatar
}

async fn settle(pending: &PendingHandle) -> Result<()> {
    match pending.wait(WAIT_TIMEOUT).await {
        Completion::Confirmed(evaluation) => {
            tracing::info!(
                "{} confirmed in block {}",
                pending.action().kind(),
                evaluation.block_index
            );
            Ok(())
        }
        Completion::Failed(exception) => bail!("{} failed: {}", pending.action().kind(), exception),
        Completion::TimedOut => bail!("{} not confirmed in time", pending.action().kind()),
    }
}

fn show(handle: &SessionHandle, label: &str, addresses: &[EntityAddress]) {
    for address in addresses {
        let view = handle.effective_view(address);
        match serde_json::to_string(&view) {
            Ok(json) => println!("[{label}] {address}: {json}"),
            Err(e) => tracing::warn!("Cannot render view of {}: {}", address, e),
        }
    }
}

async fn log_notifications(handle: SessionHandle) {
    let mut action = handle.subscribe(Topic::Action);
    let mut gameplay = handle.subscribe(Topic::Gameplay);
    loop {
        let notification = tokio::select! {
            received = action.recv() => received,
            received = gameplay.recv() => received,
        };
        match notification {
            Ok(notification) => println!("notification: {notification:?}"),
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {} notifications", skipped);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}
