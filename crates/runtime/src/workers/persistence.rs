//! Periodic checkpoint of actions without a known outcome.
//!
//! The final save happens in `Session::shutdown` after every worker has
//! stopped, so this worker only handles the periodic ones.

use std::sync::Arc;

use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tracing::{error, info, trace};

use crate::queue::ActionQueue;
use crate::repository::{PendingActionRepository, Result};
use crate::shutdown::ShutdownToken;

pub struct PersistenceWorker {
    queue: Arc<ActionQueue>,
    store: Arc<dyn PendingActionRepository>,
    period: Duration,
    shutdown: ShutdownToken,
}

impl PersistenceWorker {
    pub fn new(
        queue: Arc<ActionQueue>,
        store: Arc<dyn PendingActionRepository>,
        period: Duration,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            queue,
            store,
            period,
            shutdown,
        }
    }

    /// Writes the in-flight and queued actions and returns how many were
    /// saved.
    pub fn save(&self) -> Result<usize> {
        let snapshot = self.queue.checkpoint();
        self.store.save(&snapshot)?;
        Ok(snapshot.len())
    }

    pub async fn run(self) {
        info!(period = ?self.period, "PersistenceWorker started");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                _ = ticker.tick() => match self.save() {
                    Ok(count) => trace!(count, "Checkpointed pending actions"),
                    Err(e) => error!("Failed to checkpoint pending actions: {}", e),
                },
            }
        }

        info!("PersistenceWorker stopped");
    }
}
