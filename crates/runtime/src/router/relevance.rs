//! The single relevance predicate for the evaluation stream.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use client_blockchain_core::ActionEvaluation;
use game_core::EntityAddress;

/// Addresses this session cares about, plus the agent it acts for.
///
/// The agent address is always observed.
pub struct ObservedAddresses {
    agent: EntityAddress,
    addresses: RwLock<HashSet<EntityAddress>>,
}

impl ObservedAddresses {
    pub fn new(agent: EntityAddress) -> Self {
        Self {
            agent,
            addresses: RwLock::new(HashSet::from([agent])),
        }
    }

    pub fn agent(&self) -> EntityAddress {
        self.agent
    }

    /// Returns `true` if the address was not observed before.
    pub fn observe(&self, address: EntityAddress) -> bool {
        self.write().insert(address)
    }

    /// Returns `true` if the address was observed. The agent cannot be removed.
    pub fn unobserve(&self, address: &EntityAddress) -> bool {
        if *address == self.agent {
            return false;
        }
        self.write().remove(address)
    }

    pub fn contains(&self, address: &EntityAddress) -> bool {
        self.read().contains(address)
    }

    pub fn snapshot(&self) -> HashSet<EntityAddress> {
        self.read().clone()
    }

    /// Whether an evaluation may affect this session.
    ///
    /// Relevant when the action is known locally (`local`), was signed by the
    /// session agent, or wrote any observed address.
    pub fn is_relevant(&self, evaluation: &ActionEvaluation, local: bool) -> bool {
        if local || evaluation.signer() == self.agent {
            return true;
        }
        let observed = self.read();
        evaluation
            .updated_addresses()
            .any(|address| observed.contains(address))
    }

    fn read(&self) -> RwLockReadGuard<'_, HashSet<EntityAddress>> {
        self.addresses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashSet<EntityAddress>> {
        self.addresses
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
