//! Ordered speculative modifiers and effective-view computation.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, trace};

use game_core::{ActionId, EntityAddress, EntityState, Speculation, StateModifier};

use super::{AuthoritativeCache, OverlayError, Result};

/// Attempts before a reader gives up waiting for a quiescent pair of reads.
const MAX_COLLECT_ATTEMPTS: usize = 16;

#[derive(Clone, Debug)]
struct Installed {
    seq: u64,
    action_id: ActionId,
    modifier: StateModifier,
}

/// A modifier removed by [`OverlayStore::retire_action`].
///
/// Carries its original position so [`OverlayStore::reinstate`] can put it
/// back exactly where it was.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetiredModifier {
    pub address: EntityAddress,
    pub modifier: StateModifier,
    seq: u64,
}

#[derive(Default)]
struct OverlayInner {
    entries: HashMap<EntityAddress, Vec<Installed>>,
    /// Bumped on every modifier-list change.
    generation: u64,
    next_seq: u64,
}

type ViewSender = Arc<watch::Sender<Option<EntityState>>>;

/// Verdict on one modifier/snapshot read pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewRead {
    Stable,
    Retry,
    /// Still changing after [`MAX_COLLECT_ATTEMPTS`]; the last read is used.
    Exhausted,
}

fn settle(stable: bool, attempts: usize) -> ViewRead {
    if stable {
        ViewRead::Stable
    } else if attempts >= MAX_COLLECT_ATTEMPTS {
        ViewRead::Exhausted
    } else {
        ViewRead::Retry
    }
}

/// Per-address speculative modifiers folded over [`AuthoritativeCache`].
pub struct OverlayStore {
    cache: Arc<AuthoritativeCache>,
    inner: Mutex<OverlayInner>,
    watchers: Mutex<HashMap<EntityAddress, ViewSender>>,
}

impl OverlayStore {
    pub fn new(cache: Arc<AuthoritativeCache>) -> Self {
        Self {
            cache,
            inner: Mutex::new(OverlayInner::default()),
            watchers: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<AuthoritativeCache> {
        &self.cache
    }

    /// Appends a modifier for `action_id` at `address` and notifies watchers.
    ///
    /// # Errors
    ///
    /// [`OverlayError::DuplicateSpeculation`] if the action already installed
    /// an identical modifier at this address.
    pub fn apply_speculative(
        &self,
        address: EntityAddress,
        action_id: ActionId,
        modifier: StateModifier,
    ) -> Result<()> {
        self.apply_all(action_id, &[Speculation::new(address, modifier)])
    }

    /// Installs every speculation of one action atomically.
    ///
    /// Either all modifiers are appended or, on a duplicate, none are.
    pub fn apply_all(&self, action_id: ActionId, speculation: &[Speculation]) -> Result<()> {
        let touched: HashSet<EntityAddress> = {
            let mut inner = self.lock();

            for spec in speculation {
                let installed = inner
                    .entries
                    .get(&spec.address)
                    .is_some_and(|list| {
                        list.iter()
                            .any(|m| m.action_id == action_id && m.modifier == spec.modifier)
                    });
                if installed {
                    return Err(OverlayError::DuplicateSpeculation {
                        action: action_id,
                        address: spec.address,
                    });
                }
            }

            for spec in speculation {
                let seq = inner.next_seq;
                inner.next_seq += 1;
                inner
                    .entries
                    .entry(spec.address)
                    .or_default()
                    .push(Installed {
                        seq,
                        action_id,
                        modifier: spec.modifier.clone(),
                    });
            }
            if !speculation.is_empty() {
                inner.generation += 1;
            }
            speculation.iter().map(|spec| spec.address).collect()
        };

        debug!(action = ?action_id, modifiers = speculation.len(), "installed speculation");
        self.publish(touched);
        Ok(())
    }

    /// Removes every modifier `action_id` installed at `address`.
    ///
    /// Returns how many were removed; retiring twice removes nothing the
    /// second time. Watchers are notified.
    pub fn retire_speculative(&self, address: &EntityAddress, action_id: ActionId) -> usize {
        let removed = {
            let mut inner = self.lock();
            let removed = match inner.entries.get_mut(address) {
                Some(list) => {
                    let before = list.len();
                    list.retain(|m| m.action_id != action_id);
                    before - list.len()
                }
                None => 0,
            };
            if removed > 0 {
                if inner.entries.get(address).is_some_and(Vec::is_empty) {
                    inner.entries.remove(address);
                }
                inner.generation += 1;
            }
            removed
        };

        if removed > 0 {
            self.publish([*address]);
        }
        removed
    }

    /// Removes every modifier of `action_id` at every address.
    ///
    /// Does not notify watchers; callers publish once their whole update is
    /// done. The returned records can be passed to [`reinstate`](Self::reinstate).
    pub fn retire_action(&self, action_id: ActionId) -> Vec<RetiredModifier> {
        let mut inner = self.lock();
        let mut retired = Vec::new();

        for (address, list) in inner.entries.iter_mut() {
            list.retain(|m| {
                if m.action_id == action_id {
                    retired.push(RetiredModifier {
                        address: *address,
                        modifier: m.modifier.clone(),
                        seq: m.seq,
                    });
                    false
                } else {
                    true
                }
            });
        }

        if !retired.is_empty() {
            inner.entries.retain(|_, list| !list.is_empty());
            inner.generation += 1;
            retired.sort_by_key(|r| r.seq);
            trace!(action = ?action_id, count = retired.len(), "retired speculation");
        }
        retired
    }

    /// Puts previously retired modifiers back at their original positions.
    ///
    /// Does not notify watchers.
    pub fn reinstate(&self, action_id: ActionId, retired: &[RetiredModifier]) {
        if retired.is_empty() {
            return;
        }

        let mut inner = self.lock();
        for record in retired {
            let list = inner.entries.entry(record.address).or_default();
            if list.iter().any(|m| m.seq == record.seq) {
                continue;
            }
            let position = list.partition_point(|m| m.seq < record.seq);
            list.insert(
                position,
                Installed {
                    seq: record.seq,
                    action_id,
                    modifier: record.modifier.clone(),
                },
            );
        }
        inner.generation += 1;
    }

    /// Whether `action_id` has any modifier installed.
    pub fn has_action(&self, action_id: ActionId) -> bool {
        self.lock()
            .entries
            .values()
            .any(|list| list.iter().any(|m| m.action_id == action_id))
    }

    /// Addresses at which `action_id` has modifiers installed.
    pub fn addresses_of(&self, action_id: ActionId) -> Vec<EntityAddress> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, list)| list.iter().any(|m| m.action_id == action_id))
            .map(|(address, _)| *address)
            .collect()
    }

    /// Addresses that currently carry at least one modifier.
    pub fn speculated_addresses(&self) -> Vec<EntityAddress> {
        self.lock()
            .entries
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(address, _)| *address)
            .collect()
    }

    /// Actions with modifiers installed, each listed once.
    pub fn speculated_actions(&self) -> Vec<ActionId> {
        let inner = self.lock();
        let mut seen = HashSet::new();
        inner
            .entries
            .values()
            .flatten()
            .filter(|m| seen.insert(m.action_id))
            .map(|m| m.action_id)
            .collect()
    }

    /// Active modifiers at `address`, in installation order.
    pub fn modifiers(&self, address: &EntityAddress) -> Vec<(ActionId, StateModifier)> {
        self.lock()
            .entries
            .get(address)
            .map(|list| {
                list.iter()
                    .map(|m| (m.action_id, m.modifier.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Authoritative snapshot folded through the active modifiers.
    ///
    /// Recomputed on every call. The modifier list and the snapshot are read
    /// under separate locks, so both are re-checked afterwards and the read is
    /// retried if either changed in between. `None` when nothing is cached
    /// for the address.
    pub fn effective_view(&self, address: &EntityAddress) -> Option<EntityState> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let (generation, modifiers) = self.collect_modifiers(address);
            let (snapshot, version) = self.cache.read_versioned(address);

            let stable = self.generation() == generation && self.cache.version() == version;
            match settle(stable, attempts) {
                ViewRead::Stable => {}
                ViewRead::Exhausted => {
                    debug!(%address, attempts, "effective view kept changing; returning last read");
                }
                ViewRead::Retry => {
                    std::hint::spin_loop();
                    continue;
                }
            }
            return snapshot.map(|s| StateModifier::fold(&s, &modifiers));
        }
    }

    /// Receiver of effective views for `address`, starting with the current one.
    pub fn watch(&self, address: EntityAddress) -> watch::Receiver<Option<EntityState>> {
        let sender = {
            let mut watchers = self.watchers();
            if let Some(existing) = watchers.get(&address) {
                return existing.subscribe();
            }
            let (tx, _) = watch::channel(None);
            let tx = Arc::new(tx);
            watchers.insert(address, Arc::clone(&tx));
            tx
        };

        let rx = sender.subscribe();
        sender.send_replace(self.effective_view(&address));
        rx
    }

    /// Recomputes and publishes the effective view of each watched address.
    ///
    /// Must be called without holding the overlay or cache lock. Senders
    /// whose receivers are all gone are dropped.
    pub fn publish(&self, addresses: impl IntoIterator<Item = EntityAddress>) {
        let targets: Vec<(EntityAddress, ViewSender)> = {
            let mut watchers = self.watchers();
            let mut targets = Vec::new();
            for address in addresses {
                let Some(sender) = watchers.get(&address) else {
                    continue;
                };
                if sender.receiver_count() == 0 {
                    watchers.remove(&address);
                    continue;
                }
                if !targets.iter().any(|(a, _)| *a == address) {
                    targets.push((address, Arc::clone(sender)));
                }
            }
            targets
        };

        for (address, sender) in targets {
            sender.send_replace(self.effective_view(&address));
        }
    }

    fn collect_modifiers(&self, address: &EntityAddress) -> (u64, Vec<StateModifier>) {
        let inner = self.lock();
        let modifiers = inner
            .entries
            .get(address)
            .map(|list| list.iter().map(|m| m.modifier.clone()).collect())
            .unwrap_or_default();
        (inner.generation, modifiers)
    }

    fn lock(&self) -> MutexGuard<'_, OverlayInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            error!("overlay lock was poisoned; continuing with inner state");
            PoisonError::into_inner(poisoned)
        })
    }

    fn watchers(&self) -> MutexGuard<'_, HashMap<EntityAddress, ViewSender>> {
        self.watchers.lock().unwrap_or_else(|poisoned| {
            error!("overlay watcher lock was poisoned; continuing with inner state");
            PoisonError::into_inner(poisoned)
        })
    }
}
