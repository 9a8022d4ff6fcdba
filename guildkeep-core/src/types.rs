//! Core type definitions for the progression and economy engine.
//!
//! Identifiers are the platform's 64-bit snowflakes. Timestamps are UTC and
//! persisted as RFC 3339 text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// A chat-platform user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

/// A chat-platform server ("guild"), the isolation boundary for all state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GuildId(pub u64);

/// A role within a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleId(pub u64);

/// A text channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub u64);

macro_rules! display_id {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        })*
    };
}

display_id!(UserId, GuildId, RoleId, ChannelId);

/// Identity of one progression record: a user within a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserKey {
    /// The member.
    pub user: UserId,
    /// The guild the member belongs to.
    pub guild: GuildId,
}

impl UserKey {
    /// Build a key for `user` in `guild`.
    #[must_use]
    pub fn new(user: UserId, guild: GuildId) -> Self {
        Self { user, guild }
    }
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.guild)
    }
}

// ---------------------------------------------------------------------------
// User State
// ---------------------------------------------------------------------------

/// Level every record starts at.
pub const STARTING_LEVEL: u32 = 1;

/// Wallet balance every record starts with.
pub const STARTING_BALANCE: u64 = 100;

/// Persistent progression and wallet state for one `(user, guild)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserState {
    /// Which record this is.
    pub key: UserKey,
    /// XP accumulated towards the next level. Always below the threshold
    /// of `level` once settled.
    pub xp: u64,
    /// Current level, starting at 1.
    pub level: u32,
    /// Wallet balance.
    pub currency: u64,
    /// Reputation points received from other members.
    pub rep: u64,
    /// Last message that earned XP.
    pub last_message_ts: Option<DateTime<Utc>>,
    /// Last successful `daily` claim.
    pub last_daily_ts: Option<DateTime<Utc>>,
    /// Last successful `weekly` claim.
    pub last_weekly_ts: Option<DateTime<Utc>>,
    /// Last time this member *gave* rep.
    pub last_rep_ts: Option<DateTime<Utc>>,
}

impl UserState {
    /// A fresh record with default values.
    #[must_use]
    pub fn new(key: UserKey) -> Self {
        Self {
            key,
            xp: 0,
            level: STARTING_LEVEL,
            currency: STARTING_BALANCE,
            rep: 0,
            last_message_ts: None,
            last_daily_ts: None,
            last_weekly_ts: None,
            last_rep_ts: None,
        }
    }

    /// Fresh record with a custom opening balance.
    #[must_use]
    pub fn with_balance(key: UserKey, currency: u64) -> Self {
        Self {
            currency,
            ..Self::new(key)
        }
    }
}

// ---------------------------------------------------------------------------
// Boosts, shop, inventory, level roles
// ---------------------------------------------------------------------------

/// A time-bounded XP multiplier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boost {
    /// Who the boost applies to.
    pub key: UserKey,
    /// Multiplier applied to base XP, at least 1.0.
    pub multiplier: f64,
    /// Instant after which the boost no longer applies.
    pub expires_at: DateTime<Utc>,
}

impl Boost {
    /// Whether the boost still applies at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Apply the multiplier to `base`, flooring the result.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    pub fn apply(&self, base: u64) -> u64 {
        (base as f64 * self.multiplier).floor() as u64
    }
}

/// A role offered for sale in a guild's shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopEntry {
    /// Guild that lists the role.
    pub guild: GuildId,
    /// The role sold.
    pub role: RoleId,
    /// Price, strictly positive.
    pub price: u64,
}

/// One inventory line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Item name, e.g. `badge:helper` or `role:1234`.
    pub item: String,
    /// Count held, strictly positive.
    pub amount: u64,
}

/// Inventory prefix for badges.
pub const BADGE_PREFIX: &str = "badge:";

/// Inventory prefix for purchased roles.
pub const ROLE_PREFIX: &str = "role:";

/// Inventory item name for a badge.
#[must_use]
pub fn badge_item(name: &str) -> String {
    format!("{BADGE_PREFIX}{name}")
}

/// Inventory item name for a purchased role.
#[must_use]
pub fn role_item(role: RoleId) -> String {
    format!("{ROLE_PREFIX}{role}")
}

/// A role awarded on reaching a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelRole {
    /// Level at which the role is granted.
    pub level: u32,
    /// The role.
    pub role: RoleId,
}

/// A single level transition produced by an XP grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelUp {
    /// Whose level changed.
    pub key: UserKey,
    /// The level reached.
    pub new_level: u32,
}
