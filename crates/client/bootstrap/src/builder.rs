//! Assembles a session from client configuration.
use std::sync::Arc;

use anyhow::{Context, Result};
use client_blockchain_core::{LedgerTransport, TransactionSigner};
use game_core::EntityAddress;
use runtime::Session;

use crate::config::ClientConfig;

/// Builder that wires a ledger and signers into a configured session.
pub struct SessionBootstrap {
    config: ClientConfig,
    ledger: Option<Arc<dyn LedgerTransport>>,
    signers: Vec<Arc<dyn TransactionSigner>>,
    observed: Vec<EntityAddress>,
}

impl SessionBootstrap {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            ledger: None,
            signers: Vec::new(),
            observed: Vec::new(),
        }
    }

    pub fn ledger(mut self, ledger: Arc<dyn LedgerTransport>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.signers.push(signer);
        self
    }

    pub fn observe(mut self, address: EntityAddress) -> Self {
        self.observed.push(address);
        self
    }

    pub async fn build(mut self) -> Result<SessionSetup> {
        let ledger = self
            .ledger
            .context("a ledger transport must be provided")?;
        ledger
            .health_check()
            .await
            .context("ledger is not reachable")?;

        let session_id = self.config.resolve_session_id();
        let runtime_config = self.config.runtime_config(&session_id);
        if let Some(persistence) = &runtime_config.persistence {
            tracing::info!("Persisting pending actions under {}", persistence.base_dir.display());
        }

        let mut builder = Session::builder().ledger(ledger).config(runtime_config);
        for signer in self.signers {
            builder = builder.signer(signer);
        }
        for address in self.observed {
            builder = builder.observe(address);
        }

        let session = builder.build().await.context("failed to start session")?;
        tracing::info!("Session {} ready", session_id);

        Ok(SessionSetup {
            config: self.config,
            session_id,
            session,
        })
    }
}

pub struct SessionSetup {
    pub config: ClientConfig,
    pub session_id: String,
    pub session: Session,
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_blockchain_core::{MockLedger, MockSigner};
    use game_core::AgentState;
    use tempfile::TempDir;

    #[tokio::test(start_paused = true)]
    async fn builds_persistent_session_from_config() {
        let dir = TempDir::new().unwrap();
        let agent = EntityAddress::shared("bootstrap-agent");
        let ledger = MockLedger::new().with_state(agent, AgentState::with_gold(9));

        let config = ClientConfig {
            enable_persistence: true,
            session_id: Some("bootstrap".into()),
            save_data_dir: Some(dir.path().to_path_buf()),
            ..ClientConfig::default()
        };
        let setup = SessionBootstrap::new(config)
            .ledger(Arc::new(ledger))
            .signer(Arc::new(MockSigner::new(agent)))
            .build()
            .await
            .unwrap();

        assert_eq!(setup.session_id, "bootstrap");
        let handle = setup.session.handle();
        assert_eq!(handle.agent(), agent);
        assert!(handle.effective_view(&agent).is_some());

        setup.session.shutdown().await.unwrap();
        assert!(
            dir.path()
                .join("bootstrap/pending/pending_actions.log")
                .exists()
        );
    }

    #[tokio::test]
    async fn missing_ledger_is_an_error() {
        let result = SessionBootstrap::new(ClientConfig::default()).build().await;
        assert!(result.is_err());
    }
}
