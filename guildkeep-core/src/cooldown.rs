//! Per-user, per-command cooldown ledger.
//!
//! `check_and_consume` is a single read-modify-write inside one store
//! transaction: a free slot is reserved for the whole window, a busy slot
//! reports how long to wait and is left untouched.

use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::store::Store;
use crate::types::UserId;

/// How long a ledger row is kept after it became available again.
pub const LEDGER_RETENTION_HOURS: i64 = 24;

/// The cooldown ledger.
pub struct CooldownLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CooldownLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CooldownLedger").finish_non_exhaustive()
    }
}

impl CooldownLedger {
    /// Ledger over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Reserve `command` for `user` for `window`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Cooldown`] with the remaining wait if the slot is busy,
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn check_and_consume(&self, user: UserId, command: &str, window: Duration) -> Result<()> {
        let now = self.clock.now();
        match self.store.consume_cooldown(user, command, now, window)? {
            None => Ok(()),
            Some(retry_after) => {
                debug!(user = %user, command, wait_s = retry_after.num_seconds(), "Command on cooldown");
                Err(EngineError::Cooldown { retry_after })
            }
        }
    }

    /// Delete rows that became available more than
    /// [`LEDGER_RETENTION_HOURS`] ago.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn purge_stale(&self) -> Result<usize> {
        let cutoff = self.clock.now() - Duration::hours(LEDGER_RETENTION_HOURS);
        Ok(self.store.purge_cooldowns(cutoff)?)
    }
}
