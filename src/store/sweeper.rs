//! Background removal of expired entries and lapsed locks.
//!
//! Each cycle runs in two phases:
//!
//! 1. [`StorageEngine::collect_expired`] scans under the shared lock, so
//!    request traffic keeps flowing during the scan.
//! 2. [`StorageEngine::remove_expired`] takes the exclusive lock and removes
//!    only the collected tokens that are still present and still expired.
//!
//! An entry that expires after phase 1 is picked up on the next cycle. The
//! sweeper ignores request deadlines and stops only when the runtime's
//! shutdown signal fires.

use crate::store::engine::{StorageEngine, SweepOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Periodic sweeper bound to one engine.
pub struct Sweeper {
    engine: Arc<StorageEngine>,
    period: Duration,
}

impl Sweeper {
    /// Create a sweeper running every `period`.
    pub fn new(engine: Arc<StorageEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Create a sweeper using the engine's configured GC period.
    pub fn from_engine(engine: Arc<StorageEngine>) -> Self {
        let period = engine.config().gc_period();
        Self::new(engine, period)
    }

    /// Sweep period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Run one full collect/remove cycle.
    pub fn sweep_once(&self) -> SweepOutcome {
        let expired = self.engine.collect_expired();
        let outcome = self.engine.remove_expired(&expired);

        if outcome.entries_removed > 0 || outcome.locks_removed > 0 {
            tracing::debug!(
                entries = outcome.entries_removed,
                locks = outcome.locks_removed,
                "sweeper removed expired records"
            );
        } else {
            tracing::trace!("sweeper found nothing to remove");
        }
        outcome
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(period_ms = self.period.as_millis() as u64, "sweeper started");

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("sweeper stopped");
    }

    /// Spawn [`Sweeper::run`] on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
