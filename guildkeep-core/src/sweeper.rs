//! Periodic maintenance: expired boosts, stale ledger rows, idle locks.
//!
//! The sweeps are cooperative: a lagging sweep is harmless because the XP
//! engine checks boost expiry on every read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::cooldown::CooldownLedger;
use crate::error::Result;
use crate::locks::KeyLocks;
use crate::store::Store;

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Boost rows deleted.
    pub boosts: usize,
    /// Ledger rows deleted.
    pub cooldowns: usize,
    /// Idle lock slots dropped.
    pub locks: usize,
}

/// Maintenance worker.
pub struct Sweeper {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    ledger: Arc<CooldownLedger>,
    locks: KeyLocks,
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper").finish_non_exhaustive()
    }
}

impl Sweeper {
    /// Sweeper over the shared store, ledger and lock registry.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        ledger: Arc<CooldownLedger>,
        locks: KeyLocks,
    ) -> Self {
        Self {
            store,
            clock,
            ledger,
            locks,
        }
    }

    /// Delete boosts whose `expires_at` is in the past.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::StoreUnavailable`] on store failure.
    pub fn sweep_boosts(&self) -> Result<usize> {
        Ok(self.store.purge_expired_boosts(self.clock.now())?)
    }

    /// Full pass: boosts, ledger, locks.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::StoreUnavailable`] on store failure.
    pub fn sweep_all(&self) -> Result<SweepReport> {
        Ok(SweepReport {
            boosts: self.sweep_boosts()?,
            cooldowns: self.ledger.purge_stale()?,
            locks: self.locks.prune(),
        })
    }

    /// Sweep every `every` until `shutdown` fires.
    ///
    /// Store failures are logged and retried on the next tick.
    pub async fn run(self, every: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_s = every.as_secs(), "Sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => match self.sweep_all() {
                    Ok(report) if report != SweepReport::default() => {
                        debug!(
                            boosts = report.boosts,
                            cooldowns = report.cooldowns,
                            locks = report.locks,
                            "Sweep completed"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Sweep failed"),
                },
                _ = shutdown.recv() => break,
            }
        }
        info!("Sweeper stopped");
    }
}
