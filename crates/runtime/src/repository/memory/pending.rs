use std::sync::Mutex;

use crate::queue::PendingAction;
use crate::repository::{PendingActionRepository, RepositoryError, Result};

/// Keeps the last saved snapshot in memory.
#[derive(Default)]
pub struct InMemoryPendingStore {
    actions: Mutex<Vec<PendingAction>>,
}

impl InMemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingActionRepository for InMemoryPendingStore {
    fn save(&self, actions: &[PendingAction]) -> Result<()> {
        let mut stored = self
            .actions
            .lock()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        *stored = actions.to_vec();
        Ok(())
    }

    fn load(&self) -> Result<Vec<PendingAction>> {
        let stored = self
            .actions
            .lock()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(stored.clone())
    }

    fn clear(&self) -> Result<()> {
        self.actions
            .lock()
            .map_err(|_| RepositoryError::LockPoisoned)?
            .clear();
        Ok(())
    }
}
