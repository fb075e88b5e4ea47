//! Last-known authoritative snapshots.
//!
//! Written by the evaluation router and explicit refreshes only; read by the
//! overlay on every effective-view computation. Every write bumps a global
//! version so readers can detect that a snapshot changed under them.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::error;

use client_blockchain_core::LedgerPosition;
use game_core::{EntityAddress, EntityState, StateModifier};

#[derive(Clone, Debug)]
struct CachedEntry {
    state: EntityState,
    /// Ledger position the snapshot reflects, if known.
    position: Option<LedgerPosition>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<EntityAddress, CachedEntry>,
    version: u64,
}

impl CacheInner {
    fn put(
        &mut self,
        address: EntityAddress,
        state: Option<EntityState>,
        position: Option<LedgerPosition>,
    ) {
        match state {
            Some(state) => {
                self.entries.insert(address, CachedEntry { state, position });
            }
            None => {
                self.entries.remove(&address);
            }
        }
        self.version += 1;
    }

    /// Whether the entry at `address` already reflects `position` or later.
    fn is_at_or_after(&self, address: &EntityAddress, position: LedgerPosition) -> bool {
        self.entries
            .get(address)
            .and_then(|entry| entry.position)
            .is_some_and(|cached| cached >= position)
    }
}

/// Confirmed snapshot per address.
#[derive(Default)]
pub struct AuthoritativeCache {
    inner: RwLock<CacheInner>,
}

impl AuthoritativeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &EntityAddress) -> Option<EntityState> {
        self.read()
            .entries
            .get(address)
            .map(|entry| entry.state.clone())
    }

    pub fn contains(&self, address: &EntityAddress) -> bool {
        self.read().entries.contains_key(address)
    }

    /// Ledger position the cached snapshot reflects.
    pub fn position(&self, address: &EntityAddress) -> Option<LedgerPosition> {
        self.read()
            .entries
            .get(address)
            .and_then(|entry| entry.position)
    }

    pub fn version(&self) -> u64 {
        self.read().version
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot and cache version, read under one lock.
    pub(crate) fn read_versioned(&self, address: &EntityAddress) -> (Option<EntityState>, u64) {
        let inner = self.read();
        (
            inner.entries.get(address).map(|entry| entry.state.clone()),
            inner.version,
        )
    }

    /// Snapshot together with its position, for undo records.
    pub(crate) fn entry(
        &self,
        address: &EntityAddress,
    ) -> Option<(EntityState, Option<LedgerPosition>)> {
        self.read()
            .entries
            .get(address)
            .map(|entry| (entry.state.clone(), entry.position))
    }

    /// Stores a snapshot whose ledger position is unknown. `None` clears the
    /// entry. Any later evaluation overwrites it.
    pub fn store_queried(&self, address: EntityAddress, state: Option<EntityState>) {
        self.write().put(address, state, None);
    }

    /// Stores the result of a ledger query that reflects at least `position`.
    ///
    /// Returns `false` (and leaves the entry untouched) when the cache
    /// already holds an evaluation past `position`. Older evaluations
    /// delivered afterwards no longer overwrite the stored snapshot.
    pub fn store_queried_at(
        &self,
        address: EntityAddress,
        state: Option<EntityState>,
        position: LedgerPosition,
    ) -> bool {
        let mut inner = self.write();
        if inner.is_at_or_after(&address, position) {
            return false;
        }
        inner.put(address, state, Some(position));
        true
    }

    /// Stores an evaluation output.
    ///
    /// Returns `false` (and leaves the entry untouched) when the cached
    /// snapshot already reflects `position` or a later one, which happens
    /// when evaluations of one block arrive out of execution order.
    pub fn store_evaluated(
        &self,
        address: EntityAddress,
        state: EntityState,
        position: LedgerPosition,
    ) -> bool {
        let mut inner = self.write();
        if inner.is_at_or_after(&address, position) {
            return false;
        }
        inner.put(address, Some(state), Some(position));
        true
    }

    /// Puts back a snapshot previously read with [`entry`](Self::entry).
    pub(crate) fn restore(
        &self,
        address: EntityAddress,
        state: EntityState,
        position: Option<LedgerPosition>,
    ) {
        self.write().put(address, Some(state), position);
    }

    /// Folds `modifiers` over the cached snapshot in place.
    ///
    /// Returns `false` if nothing is cached at `address`. The entry's
    /// position is cleared since it no longer matches a single evaluation.
    pub(crate) fn fold_in_place(&self, address: &EntityAddress, modifiers: &[StateModifier]) -> bool {
        let mut inner = self.write();
        let Some(entry) = inner.entries.get_mut(address) else {
            return false;
        };
        entry.state = StateModifier::fold(&entry.state, modifiers);
        entry.position = None;
        inner.version += 1;
        true
    }

    pub fn remove(&self, address: &EntityAddress) -> Option<EntityState> {
        let mut inner = self.write();
        let removed = inner.entries.remove(address).map(|entry| entry.state);
        if removed.is_some() {
            inner.version += 1;
        }
        removed
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(|poisoned| {
            error!("authoritative cache lock was poisoned; continuing with inner state");
            PoisonError::into_inner(poisoned)
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(|poisoned| {
            error!("authoritative cache lock was poisoned; continuing with inner state");
            PoisonError::into_inner(poisoned)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use game_core::AgentState;

    fn agent() -> EntityAddress {
        EntityAddress::shared("cache-agent")
    }

    #[test]
    fn writes_bump_version() {
        let cache = AuthoritativeCache::new();
        let v0 = cache.version();

        cache.store_queried(agent(), Some(AgentState::with_gold(10).into()));
        assert!(cache.version() > v0);
        assert_eq!(cache.get(&agent()), Some(AgentState::with_gold(10).into()));

        let v1 = cache.version();
        assert!(cache.remove(&agent()).is_some());
        assert!(cache.version() > v1);

        // Removing nothing is not a write.
        let v2 = cache.version();
        assert!(cache.remove(&agent()).is_none());
        assert_eq!(cache.version(), v2);
    }

    fn at(block_index: u64, ordinal: u32) -> LedgerPosition {
        LedgerPosition::new(block_index, ordinal)
    }

    #[test]
    fn older_evaluations_do_not_overwrite_newer_snapshots() {
        let cache = AuthoritativeCache::new();
        assert!(cache.store_evaluated(agent(), AgentState::with_gold(50).into(), at(12, 0)));
        assert!(!cache.store_evaluated(agent(), AgentState::with_gold(80).into(), at(11, 4)));
        assert_eq!(cache.get(&agent()), Some(AgentState::with_gold(50).into()));

        assert!(cache.store_evaluated(agent(), AgentState::with_gold(40).into(), at(13, 0)));
        assert_eq!(cache.position(&agent()), Some(at(13, 0)));
    }

    #[test]
    fn same_block_evaluations_keep_execution_order() {
        let cache = AuthoritativeCache::new();
        // The later action of block 5 is delivered first.
        assert!(cache.store_evaluated(agent(), AgentState::with_gold(60).into(), at(5, 1)));
        assert!(!cache.store_evaluated(agent(), AgentState::with_gold(70).into(), at(5, 0)));
        assert_eq!(cache.get(&agent()), Some(AgentState::with_gold(60).into()));
    }

    #[test]
    fn positioned_queries_shadow_older_evaluations() {
        let cache = AuthoritativeCache::new();
        assert!(cache.store_queried_at(
            agent(),
            Some(AgentState::with_gold(60).into()),
            LedgerPosition::end_of(5)
        ));

        assert!(!cache.store_evaluated(agent(), AgentState::with_gold(70).into(), at(5, 3)));
        assert!(!cache.store_evaluated(agent(), AgentState::with_gold(90).into(), at(4, 0)));
        assert_eq!(cache.get(&agent()), Some(AgentState::with_gold(60).into()));

        assert!(cache.store_evaluated(agent(), AgentState::with_gold(55).into(), at(6, 0)));
        // A query at an older tip does not regress it.
        assert!(!cache.store_queried_at(
            agent(),
            Some(AgentState::with_gold(60).into()),
            LedgerPosition::end_of(5)
        ));
        assert_eq!(cache.get(&agent()), Some(AgentState::with_gold(55).into()));
    }

    #[test]
    fn unpositioned_snapshots_accept_any_evaluation() {
        let cache = AuthoritativeCache::new();
        cache.store_queried(agent(), Some(AgentState::with_gold(10).into()));
        assert_eq!(cache.position(&agent()), None);
        assert!(cache.store_evaluated(agent(), AgentState::with_gold(5).into(), at(1, 0)));

        let (state, position) = cache.entry(&agent()).unwrap();
        cache.store_evaluated(agent(), AgentState::with_gold(1).into(), at(2, 0));
        cache.restore(agent(), state, position);
        assert_eq!(cache.get(&agent()), Some(AgentState::with_gold(5).into()));
        assert_eq!(cache.position(&agent()), Some(at(1, 0)));
    }

    #[test]
    fn fold_in_place_requires_an_entry() {
        let cache = AuthoritativeCache::new();
        let modifiers = [StateModifier::AdjustBalance { amount: 5 }];
        assert!(!cache.fold_in_place(&agent(), &modifiers));

        cache.store_evaluated(agent(), AgentState::with_gold(1).into(), at(3, 0));
        assert!(cache.fold_in_place(&agent(), &modifiers));
        assert_eq!(cache.get(&agent()), Some(AgentState::with_gold(6).into()));
        assert_eq!(cache.position(&agent()), None);
    }
}
