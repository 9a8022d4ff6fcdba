//! SQLite implementation of [`Store`].
//!
//! One connection guarded by a mutex; every public method runs in its own
//! transaction. The schema:
//!
//! ```sql
//! users(user_id, guild_id, xp, level, currency, rep,
//!       last_message_ts, last_daily_ts, last_weekly_ts, last_rep_ts)  PK(user_id, guild_id)
//! boosts(user_id, guild_id, multiplier, expires_at)                   PK(user_id, guild_id)
//! shop(guild_id, role_id, price)                                      PK(guild_id, role_id)
//! inventory(user_id, guild_id, item, amount)                          PK(user_id, guild_id, item)
//! level_roles(guild_id, level, role_id)                               PK(guild_id, level)
//! cooldowns(user_id, command, available_at)                           PK(user_id, command)
//! ```
//!
//! Timestamps are RFC 3339 in UTC with fixed microsecond precision, so
//! lexical comparison in SQL matches chronological order.

use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, Transaction};
use tracing::{debug, info};

use super::{Store, WriteOp};
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::types::{
    Boost, GuildId, InventoryItem, LevelRole, RoleId, ShopEntry, UserId, UserKey, UserState,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    user_id         INTEGER NOT NULL,
    guild_id        INTEGER NOT NULL,
    xp              INTEGER NOT NULL DEFAULT 0 CHECK (xp >= 0),
    level           INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
    currency        INTEGER NOT NULL DEFAULT 100 CHECK (currency >= 0),
    rep             INTEGER NOT NULL DEFAULT 0 CHECK (rep >= 0),
    last_message_ts TEXT,
    last_daily_ts   TEXT,
    last_weekly_ts  TEXT,
    last_rep_ts     TEXT,
    PRIMARY KEY (user_id, guild_id)
);
CREATE INDEX IF NOT EXISTS users_by_rank ON users (guild_id, level DESC, xp DESC);
CREATE TABLE IF NOT EXISTS boosts (
    user_id    INTEGER NOT NULL,
    guild_id   INTEGER NOT NULL,
    multiplier REAL NOT NULL CHECK (multiplier >= 1.0),
    expires_at TEXT NOT NULL,
    PRIMARY KEY (user_id, guild_id)
);
CREATE TABLE IF NOT EXISTS shop (
    guild_id INTEGER NOT NULL,
    role_id  INTEGER NOT NULL,
    price    INTEGER NOT NULL CHECK (price > 0),
    PRIMARY KEY (guild_id, role_id)
);
CREATE TABLE IF NOT EXISTS inventory (
    user_id  INTEGER NOT NULL,
    guild_id INTEGER NOT NULL,
    item     TEXT NOT NULL,
    amount   INTEGER NOT NULL CHECK (amount > 0),
    PRIMARY KEY (user_id, guild_id, item)
);
CREATE TABLE IF NOT EXISTS level_roles (
    guild_id INTEGER NOT NULL,
    level    INTEGER NOT NULL CHECK (level >= 1),
    role_id  INTEGER NOT NULL,
    PRIMARY KEY (guild_id, level)
);
CREATE TABLE IF NOT EXISTS cooldowns (
    user_id      INTEGER NOT NULL,
    command      TEXT NOT NULL,
    available_at TEXT NOT NULL,
    PRIMARY KEY (user_id, command)
);
";

// ---------------------------------------------------------------------------
// Column codecs
// ---------------------------------------------------------------------------

/// Snowflakes and counters are stored bit-for-bit in INTEGER columns.
#[allow(clippy::cast_possible_wrap)]
fn int(v: u64) -> i64 {
    v as i64
}

#[allow(clippy::cast_sign_loss)]
fn uint(v: i64) -> u64 {
    v as u64
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

fn parse_opt_ts(raw: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

/// Undecoded `users` row.
struct UserRow {
    user_id: i64,
    guild_id: i64,
    xp: i64,
    level: i64,
    currency: i64,
    rep: i64,
    last_message_ts: Option<String>,
    last_daily_ts: Option<String>,
    last_weekly_ts: Option<String>,
    last_rep_ts: Option<String>,
}

const USER_COLUMNS: &str = "user_id, guild_id, xp, level, currency, rep, \
     last_message_ts, last_daily_ts, last_weekly_ts, last_rep_ts";

impl UserRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            guild_id: row.get(1)?,
            xp: row.get(2)?,
            level: row.get(3)?,
            currency: row.get(4)?,
            rep: row.get(5)?,
            last_message_ts: row.get(6)?,
            last_daily_ts: row.get(7)?,
            last_weekly_ts: row.get(8)?,
            last_rep_ts: row.get(9)?,
        })
    }

    fn decode(self) -> StoreResult<UserState> {
        Ok(UserState {
            key: UserKey::new(UserId(uint(self.user_id)), GuildId(uint(self.guild_id))),
            xp: uint(self.xp),
            level: u32::try_from(self.level)
                .map_err(|_| StoreError::Corrupt(format!("level {}", self.level)))?,
            currency: uint(self.currency),
            rep: uint(self.rep),
            last_message_ts: parse_opt_ts(self.last_message_ts)?,
            last_daily_ts: parse_opt_ts(self.last_daily_ts)?,
            last_weekly_ts: parse_opt_ts(self.last_weekly_ts)?,
            last_rep_ts: parse_opt_ts(self.last_rep_ts)?,
        })
    }
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// Handle to the bot's SQLite database.
///
/// # Usage
///
/// ```no_run
/// # use guildkeep_core::store::{SqliteStore, Store};
/// # use guildkeep_core::config::StoreConfig;
/// # use guildkeep_core::types::{GuildId, UserId, UserKey, UserState};
/// let store = SqliteStore::open("guildkeep.db", &StoreConfig::default())?;
/// let key = UserKey::new(UserId(1), GuildId(2));
/// store.save_user(&UserState::new(key))?;
/// assert!(store.load_user(key)?.is_some());
/// # Ok::<(), guildkeep_core::error::StoreError>(())
/// ```
pub struct SqliteStore {
    pub(crate) conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.busy_timeout(StdDuration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "guildkeep store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    /// Open an in-memory database (useful for tests).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on SQLite failures.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path to the database file (or `:memory:`).
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run SQLite's integrity check. `Ok(false)` means corruption.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> StoreResult<bool> {
        let result: String =
            self.conn
                .lock()
                .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    fn apply_op(tx: &Transaction<'_>, op: &WriteOp) -> StoreResult<()> {
        match op {
            WriteOp::SaveUser(s) => {
                tx.execute(
                    "INSERT INTO users (user_id, guild_id, xp, level, currency, rep,
                                        last_message_ts, last_daily_ts, last_weekly_ts, last_rep_ts)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(user_id, guild_id) DO UPDATE SET
                        xp = excluded.xp,
                        level = excluded.level,
                        currency = excluded.currency,
                        rep = excluded.rep,
                        last_message_ts = excluded.last_message_ts,
                        last_daily_ts = excluded.last_daily_ts,
                        last_weekly_ts = excluded.last_weekly_ts,
                        last_rep_ts = excluded.last_rep_ts",
                    params![
                        int(s.key.user.0),
                        int(s.key.guild.0),
                        int(s.xp),
                        i64::from(s.level),
                        int(s.currency),
                        int(s.rep),
                        s.last_message_ts.map(ts),
                        s.last_daily_ts.map(ts),
                        s.last_weekly_ts.map(ts),
                        s.last_rep_ts.map(ts),
                    ],
                )?;
            }
            WriteOp::AddItem { key, item, amount } => {
                if *amount > 0 {
                    tx.execute(
                        "INSERT INTO inventory (user_id, guild_id, item, amount)
                         VALUES (?1, ?2, ?3, ?4)
                         ON CONFLICT(user_id, guild_id, item) DO UPDATE SET
                            amount = amount + excluded.amount",
                        params![int(key.user.0), int(key.guild.0), item, int(*amount)],
                    )?;
                }
            }
            WriteOp::RemoveItem { key, item, amount } => {
                let updated = tx.execute(
                    "UPDATE inventory SET amount = amount - ?4
                     WHERE user_id = ?1 AND guild_id = ?2 AND item = ?3 AND amount > ?4",
                    params![int(key.user.0), int(key.guild.0), item, int(*amount)],
                )?;
                if updated == 0 {
                    tx.execute(
                        "DELETE FROM inventory WHERE user_id = ?1 AND guild_id = ?2 AND item = ?3",
                        params![int(key.user.0), int(key.guild.0), item],
                    )?;
                }
            }
            WriteOp::DeleteBoost(key) => {
                tx.execute(
                    "DELETE FROM boosts WHERE user_id = ?1 AND guild_id = ?2",
                    params![int(key.user.0), int(key.guild.0)],
                )?;
            }
        }
        Ok(())
    }
}

impl Store for SqliteStore {
    fn load_user(&self, key: UserKey) -> StoreResult<Option<UserState>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1 AND guild_id = ?2"
        ))?;
        let row = stmt
            .query_row(params![int(key.user.0), int(key.guild.0)], UserRow::from_row)
            .optional()?;
        row.map(UserRow::decode).transpose()
    }

    fn apply(&self, ops: &[WriteOp]) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for op in ops {
            Self::apply_op(&tx, op)?;
        }
        tx.commit()?;
        debug!(ops = ops.len(), "Committed write batch");
        Ok(())
    }

    fn delete_user(&self, key: UserKey) -> StoreResult<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let (user, guild) = (int(key.user.0), int(key.guild.0));
        let deleted = tx.execute(
            "DELETE FROM users WHERE user_id = ?1 AND guild_id = ?2",
            params![user, guild],
        )?;
        tx.execute("DELETE FROM boosts WHERE user_id = ?1 AND guild_id = ?2", params![user, guild])?;
        tx.execute("DELETE FROM inventory WHERE user_id = ?1 AND guild_id = ?2", params![user, guild])?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    fn leaderboard(&self, guild: GuildId, limit: usize) -> StoreResult<Vec<UserState>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE guild_id = ?1
             ORDER BY level DESC, xp DESC, user_id ASC LIMIT ?2"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![int(guild.0), limit], UserRow::from_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?.decode()?);
        }
        Ok(out)
    }

    fn rank_position(&self, key: UserKey) -> StoreResult<Option<u64>> {
        let Some(state) = self.load_user(key)? else {
            return Ok(None);
        };
        let conn = self.conn.lock();
        let ahead: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE guild_id = ?1 AND (
                level > ?2
                OR (level = ?2 AND xp > ?3)
                OR (level = ?2 AND xp = ?3 AND user_id < ?4))",
            params![int(key.guild.0), i64::from(state.level), int(state.xp), int(key.user.0)],
            |row| row.get(0),
        )?;
        Ok(Some(uint(ahead) + 1))
    }

    fn load_boost(&self, key: UserKey) -> StoreResult<Option<Boost>> {
        let conn = self.conn.lock();
        let row: Option<(f64, String)> = conn
            .query_row(
                "SELECT multiplier, expires_at FROM boosts WHERE user_id = ?1 AND guild_id = ?2",
                params![int(key.user.0), int(key.guild.0)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((multiplier, expires_at)) = row else {
            return Ok(None);
        };
        Ok(Some(Boost {
            key,
            multiplier,
            expires_at: parse_ts(&expires_at)?,
        }))
    }

    fn save_boost(&self, boost: &Boost) -> StoreResult<()> {
        self.conn.lock().execute(
            "INSERT INTO boosts (user_id, guild_id, multiplier, expires_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, guild_id) DO UPDATE SET
                multiplier = excluded.multiplier,
                expires_at = excluded.expires_at",
            params![
                int(boost.key.user.0),
                int(boost.key.guild.0),
                boost.multiplier,
                ts(boost.expires_at)
            ],
        )?;
        Ok(())
    }

    fn purge_expired_boosts(&self, now: DateTime<Utc>) -> StoreResult<usize> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM boosts WHERE expires_at < ?1", params![ts(now)])?;
        Ok(n)
    }

    fn shop_price(&self, guild: GuildId, role: RoleId) -> StoreResult<Option<u64>> {
        let price: Option<i64> = self
            .conn
            .lock()
            .query_row(
                "SELECT price FROM shop WHERE guild_id = ?1 AND role_id = ?2",
                params![int(guild.0), int(role.0)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(price.map(uint))
    }

    fn list_shop(&self, guild: GuildId) -> StoreResult<Vec<ShopEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT role_id, price FROM shop WHERE guild_id = ?1 ORDER BY price ASC, role_id ASC",
        )?;
        let rows = stmt.query_map(params![int(guild.0)], |row| {
            Ok(ShopEntry {
                guild,
                role: RoleId(uint(row.get(0)?)),
                price: uint(row.get(1)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn put_shop_entry(&self, entry: &ShopEntry, overwrite: bool) -> StoreResult<bool> {
        let sql = if overwrite {
            "INSERT INTO shop (guild_id, role_id, price) VALUES (?1, ?2, ?3)
             ON CONFLICT(guild_id, role_id) DO UPDATE SET price = excluded.price"
        } else {
            "INSERT OR IGNORE INTO shop (guild_id, role_id, price) VALUES (?1, ?2, ?3)"
        };
        let n = self.conn.lock().execute(
            sql,
            params![int(entry.guild.0), int(entry.role.0), int(entry.price)],
        )?;
        Ok(n > 0)
    }

    fn remove_shop_entry(&self, guild: GuildId, role: RoleId) -> StoreResult<bool> {
        let n = self.conn.lock().execute(
            "DELETE FROM shop WHERE guild_id = ?1 AND role_id = ?2",
            params![int(guild.0), int(role.0)],
        )?;
        Ok(n > 0)
    }

    fn inventory(&self, key: UserKey) -> StoreResult<Vec<InventoryItem>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT item, amount FROM inventory WHERE user_id = ?1 AND guild_id = ?2 ORDER BY item",
        )?;
        let rows = stmt.query_map(params![int(key.user.0), int(key.guild.0)], |row| {
            Ok(InventoryItem {
                item: row.get(0)?,
                amount: uint(row.get(1)?),
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn level_roles(&self, guild: GuildId) -> StoreResult<Vec<LevelRole>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT level, role_id FROM level_roles WHERE guild_id = ?1 ORDER BY level ASC",
        )?;
        let rows = stmt.query_map(params![int(guild.0)], |row| {
            let level: i64 = row.get(0)?;
            Ok((level, uint(row.get(1)?)))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (level, role) = row?;
            let level = u32::try_from(level)
                .map_err(|_| StoreError::Corrupt(format!("level role level {level}")))?;
            out.push(LevelRole {
                level,
                role: RoleId(role),
            });
        }
        Ok(out)
    }

    fn put_level_role(&self, guild: GuildId, mapping: LevelRole, overwrite: bool) -> StoreResult<bool> {
        let sql = if overwrite {
            "INSERT INTO level_roles (guild_id, level, role_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(guild_id, level) DO UPDATE SET role_id = excluded.role_id"
        } else {
            "INSERT OR IGNORE INTO level_roles (guild_id, level, role_id) VALUES (?1, ?2, ?3)"
        };
        let n = self.conn.lock().execute(
            sql,
            params![int(guild.0), i64::from(mapping.level), int(mapping.role.0)],
        )?;
        Ok(n > 0)
    }

    fn consume_cooldown(
        &self,
        user: UserId,
        command: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let current: Option<String> = tx
            .query_row(
                "SELECT available_at FROM cooldowns WHERE user_id = ?1 AND command = ?2",
                params![int(user.0), command],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(raw) = current {
            let available_at = parse_ts(&raw)?;
            if available_at > now {
                return Ok(Some(available_at - now));
            }
        }
        tx.execute(
            "INSERT INTO cooldowns (user_id, command, available_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, command) DO UPDATE SET available_at = excluded.available_at",
            params![int(user.0), command, ts(now + window)],
        )?;
        tx.commit()?;
        Ok(None)
    }

    fn purge_cooldowns(&self, before: DateTime<Utc>) -> StoreResult<usize> {
        let n = self
            .conn
            .lock()
            .execute("DELETE FROM cooldowns WHERE available_at < ?1", params![ts(before)])?;
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key(user: u64) -> UserKey {
        UserKey::new(UserId(user), GuildId(500))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).single().expect("valid date")
    }

    fn sample_state(user: u64) -> UserState {
        UserState {
            xp: 42,
            level: 3,
            currency: 950,
            rep: 4,
            last_message_ts: Some(t0()),
            last_daily_ts: Some(t0() - Duration::hours(3)),
            last_weekly_ts: None,
            last_rep_ts: Some(t0() + Duration::microseconds(17)),
            ..UserState::new(key(user))
        }
    }

    #[test]
    fn round_trip_save_load() {
        let store = SqliteStore::open_in_memory().expect("open");
        let state = sample_state(1);
        store.save_user(&state).expect("save");
        let loaded = store.load_user(state.key).expect("load").expect("Some");
        assert_eq!(loaded, state);
    }

    #[test]
    fn load_nonexistent_returns_none() {
        let store = SqliteStore::open_in_memory().expect("open");
        assert!(store.load_user(key(9)).expect("load").is_none());
    }

    #[test]
    fn failed_batch_applies_nothing() {
        let store = SqliteStore::open_in_memory().expect("open");
        let good = sample_state(1);
        // A level of zero violates the CHECK constraint.
        let bad = UserState {
            level: 0,
            ..sample_state(2)
        };
        let result = store.apply(&[WriteOp::SaveUser(good.clone()), WriteOp::SaveUser(bad)]);
        assert!(result.is_err());
        assert!(store.load_user(good.key).expect("load").is_none());
    }

    #[test]
    fn inventory_add_and_remove() {
        let store = SqliteStore::open_in_memory().expect("open");
        let k = key(1);
        let add = |n| WriteOp::AddItem {
            key: k,
            item: "badge:helper".into(),
            amount: n,
        };
        store.apply(&[add(1), add(2)]).expect("add");
        assert_eq!(store.inventory(k).expect("inv")[0].amount, 3);

        store
            .apply(&[WriteOp::RemoveItem {
                key: k,
                item: "badge:helper".into(),
                amount: 1,
            }])
            .expect("remove one");
        assert_eq!(store.inventory(k).expect("inv")[0].amount, 2);

        store
            .apply(&[WriteOp::RemoveItem {
                key: k,
                item: "badge:helper".into(),
                amount: 5,
            }])
            .expect("remove rest");
        assert!(store.inventory(k).expect("inv").is_empty());
    }

    #[test]
    fn leaderboard_and_rank_position() {
        let store = SqliteStore::open_in_memory().expect("open");
        let rows = [(1, 10, 2), (2, 50, 2), (3, 0, 5), (4, 50, 2)];
        for (user, xp, level) in rows {
            store
                .save_user(&UserState {
                    xp,
                    level,
                    ..UserState::new(key(user))
                })
                .expect("save");
        }
        let board = store.leaderboard(GuildId(500), 3).expect("board");
        let ids: Vec<u64> = board.iter().map(|s| s.key.user.0).collect();
        assert_eq!(ids, vec![3, 2, 4]);
        assert_eq!(store.rank_position(key(3)).expect("rank"), Some(1));
        assert_eq!(store.rank_position(key(4)).expect("rank"), Some(3));
        assert_eq!(store.rank_position(key(1)).expect("rank"), Some(4));
        assert_eq!(store.rank_position(key(99)).expect("rank"), None);
    }

    #[test]
    fn boosts_purge_only_expired() {
        let store = SqliteStore::open_in_memory().expect("open");
        let live = Boost {
            key: key(1),
            multiplier: 2.0,
            expires_at: t0() + Duration::minutes(10),
        };
        let dead = Boost {
            key: key(2),
            multiplier: 1.5,
            expires_at: t0() - Duration::seconds(1),
        };
        store.save_boost(&live).expect("save");
        store.save_boost(&dead).expect("save");
        assert_eq!(store.purge_expired_boosts(t0()).expect("purge"), 1);
        assert_eq!(store.load_boost(key(1)).expect("load"), Some(live));
        assert!(store.load_boost(key(2)).expect("load").is_none());
    }

    #[test]
    fn shop_put_respects_overwrite_flag() {
        let store = SqliteStore::open_in_memory().expect("open");
        let entry = ShopEntry {
            guild: GuildId(500),
            role: RoleId(7),
            price: 5000,
        };
        assert!(store.put_shop_entry(&entry, false).expect("put"));
        let cheaper = ShopEntry { price: 10, ..entry };
        assert!(!store.put_shop_entry(&cheaper, false).expect("put"));
        assert_eq!(store.shop_price(GuildId(500), RoleId(7)).expect("price"), Some(5000));
        assert!(store.put_shop_entry(&cheaper, true).expect("put"));
        assert_eq!(store.list_shop(GuildId(500)).expect("list"), vec![cheaper]);
        assert!(store.remove_shop_entry(GuildId(500), RoleId(7)).expect("remove"));
        assert!(store.shop_price(GuildId(500), RoleId(7)).expect("price").is_none());
    }

    #[test]
    fn level_roles_sorted() {
        let store = SqliteStore::open_in_memory().expect("open");
        let g = GuildId(500);
        for (level, role) in [(10, 3), (5, 2), (1, 1)] {
            store
                .put_level_role(g, LevelRole { level, role: RoleId(role) }, false)
                .expect("put");
        }
        let levels: Vec<u32> = store.level_roles(g).expect("roles").iter().map(|r| r.level).collect();
        assert_eq!(levels, vec![1, 5, 10]);
    }

    #[test]
    fn cooldown_consume_and_purge() {
        let store = SqliteStore::open_in_memory().expect("open");
        let u = UserId(1);
        let window = Duration::seconds(30);
        assert!(store.consume_cooldown(u, "dice", t0(), window).expect("first").is_none());
        let wait = store
            .consume_cooldown(u, "dice", t0() + Duration::seconds(10), window)
            .expect("second")
            .expect("blocked");
        assert_eq!(wait, Duration::seconds(20));
        assert!(store
            .consume_cooldown(u, "dice", t0() + window, window)
            .expect("third")
            .is_none());
        assert_eq!(store.purge_cooldowns(t0() + Duration::days(2)).expect("purge"), 1);
    }

    #[test]
    fn delete_user_removes_everything() {
        let store = SqliteStore::open_in_memory().expect("open");
        let k = key(1);
        store.save_user(&sample_state(1)).expect("save");
        store
            .save_boost(&Boost {
                key: k,
                multiplier: 2.0,
                expires_at: t0(),
            })
            .expect("boost");
        store
            .apply(&[WriteOp::AddItem {
                key: k,
                item: "badge:x".into(),
                amount: 1,
            }])
            .expect("item");
        assert!(store.delete_user(k).expect("delete"));
        assert!(!store.delete_user(k).expect("delete again"));
        assert!(store.load_boost(k).expect("boost").is_none());
        assert!(store.inventory(k).expect("inv").is_empty());
    }

    #[test]
    fn file_based_open_and_integrity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("guildkeep_test.db");
        let state = sample_state(1);
        {
            let store = SqliteStore::open(&path, &StoreConfig::default()).expect("open");
            store.save_user(&state).expect("save");
            assert!(store.integrity_check().expect("check"));
        }
        let reopened = SqliteStore::open(&path, &StoreConfig::default()).expect("reopen");
        assert_eq!(reopened.load_user(state.key).expect("load"), Some(state));
    }
}
