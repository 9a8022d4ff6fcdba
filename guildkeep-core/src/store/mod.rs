//! Repository layer between the engines and the database driver.
//!
//! Engines depend on the [`Store`] trait only. Each method is atomic on its
//! own; [`Store::apply`] commits a batch of writes in one transaction so
//! multi-row updates (rep, purchases, refunds) are all-or-nothing.

pub mod sqlite;

use chrono::{DateTime, Duration, Utc};

use crate::error::StoreResult;
use crate::types::{Boost, GuildId, InventoryItem, LevelRole, RoleId, ShopEntry, UserId, UserKey, UserState};

pub use sqlite::SqliteStore;

/// One write inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Upsert a user row.
    SaveUser(UserState),
    /// Add `amount` of `item` to an inventory.
    AddItem {
        /// Inventory owner.
        key: UserKey,
        /// Item name.
        item: String,
        /// Count to add.
        amount: u64,
    },
    /// Remove up to `amount` of `item`; the row disappears at zero.
    RemoveItem {
        /// Inventory owner.
        key: UserKey,
        /// Item name.
        item: String,
        /// Count to remove.
        amount: u64,
    },
    /// Drop a boost row.
    DeleteBoost(UserKey),
}

/// Durable state behind the engines.
pub trait Store: Send + Sync {
    // ---------------------------------------------------------------- users

    /// Load a user row.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on I/O or decoding failure.
    fn load_user(&self, key: UserKey) -> StoreResult<Option<UserState>>;

    /// Commit every op in `ops` in a single transaction.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`]; nothing is applied in that case.
    fn apply(&self, ops: &[WriteOp]) -> StoreResult<()>;

    /// Upsert one user row.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn save_user(&self, state: &UserState) -> StoreResult<()> {
        self.apply(&[WriteOp::SaveUser(state.clone())])
    }

    /// Delete a user with their boost and inventory. Returns whether a user
    /// row existed.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn delete_user(&self, key: UserKey) -> StoreResult<bool>;

    /// Top `limit` users of a guild ordered by level, then XP, then id.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn leaderboard(&self, guild: GuildId, limit: usize) -> StoreResult<Vec<UserState>>;

    /// 1-based leaderboard position, `None` if the user has no row.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn rank_position(&self, key: UserKey) -> StoreResult<Option<u64>>;

    // --------------------------------------------------------------- boosts

    /// Load a boost row, expired or not.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn load_boost(&self, key: UserKey) -> StoreResult<Option<Boost>>;

    /// Upsert a boost.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn save_boost(&self, boost: &Boost) -> StoreResult<()>;

    /// Delete boosts with `expires_at < now`, returning how many went.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn purge_expired_boosts(&self, now: DateTime<Utc>) -> StoreResult<usize>;

    // ----------------------------------------------------------------- shop

    /// Price of a listed role.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn shop_price(&self, guild: GuildId, role: RoleId) -> StoreResult<Option<u64>>;

    /// All listings of a guild, cheapest first.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn list_shop(&self, guild: GuildId) -> StoreResult<Vec<ShopEntry>>;

    /// Insert a listing. With `overwrite == false` an existing listing is
    /// kept. Returns whether the row was written.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn put_shop_entry(&self, entry: &ShopEntry, overwrite: bool) -> StoreResult<bool>;

    /// Remove a listing.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn remove_shop_entry(&self, guild: GuildId, role: RoleId) -> StoreResult<bool>;

    // ------------------------------------------------------------ inventory

    /// Inventory lines, sorted by item name.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn inventory(&self, key: UserKey) -> StoreResult<Vec<InventoryItem>>;

    // ---------------------------------------------------------- level roles

    /// Level-role map of a guild, ascending by level.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn level_roles(&self, guild: GuildId) -> StoreResult<Vec<LevelRole>>;

    /// Map `mapping.level` to `mapping.role`. With `overwrite == false` an
    /// existing mapping is kept. Returns whether the row was written.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn put_level_role(&self, guild: GuildId, mapping: LevelRole, overwrite: bool) -> StoreResult<bool>;

    // ------------------------------------------------------------ cooldowns

    /// Atomically check and consume a cooldown slot.
    ///
    /// If the slot is free at `now` it is reserved until `now + window` and
    /// `None` is returned; otherwise the remaining wait is returned and the
    /// ledger is left untouched.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn consume_cooldown(
        &self,
        user: UserId,
        command: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<Option<Duration>>;

    /// Delete ledger rows with `available_at < before`.
    ///
    /// # Errors
    /// Returns a [`crate::StoreError`] on failure.
    fn purge_cooldowns(&self, before: DateTime<Utc>) -> StoreResult<usize>;
}
