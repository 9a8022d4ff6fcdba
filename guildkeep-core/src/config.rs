//! Configuration for the progression and economy engine.
//!
//! Maps to the `[progression]` and `[store]` tables of `guildkeep.toml`.
//! A deployment picks at most one named [`Profile`]; explicit fields override
//! the preset, and with no profile the documented defaults apply.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::curve::LevelCurve;
use crate::types::STARTING_BALANCE;

/// Named tuning presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Fixed 15 XP per message, 60s cooldown, quadratic curve, daily 300–700.
    Classic,
    /// 8–15 XP per message, 10s cooldown, `100·L` curve, daily 200–500.
    Rapid,
}

/// Inclusive integer range drawn from by the random source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// Lower bound.
    pub min: u64,
    /// Upper bound.
    pub max: u64,
}

impl Range {
    /// Build a range, swapping the bounds if given out of order.
    #[must_use]
    pub fn new(a: u64, b: u64) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// A single-valued range.
    #[must_use]
    pub fn fixed(value: u64) -> Self {
        Self::new(value, value)
    }
}

/// `[progression]` as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressionConfig {
    /// Optional preset.
    #[serde(default)]
    pub profile: Option<Profile>,
    /// Minimum seconds between XP-earning messages.
    #[serde(default)]
    pub xp_cooldown_seconds: Option<u64>,
    /// Base XP drawn per message.
    #[serde(default)]
    pub xp_gain_range: Option<Range>,
    /// Level threshold curve.
    #[serde(default)]
    pub level_curve: Option<LevelCurve>,
    /// Amount credited by `daily`.
    #[serde(default)]
    pub daily_range: Option<Range>,
    /// Seconds between `daily` claims.
    #[serde(default)]
    pub daily_cooldown_seconds: Option<u64>,
    /// Amount credited by `weekly`.
    #[serde(default)]
    pub weekly_range: Option<Range>,
    /// Seconds between `weekly` claims.
    #[serde(default)]
    pub weekly_cooldown_seconds: Option<u64>,
    /// Seconds between rep given by the same member.
    #[serde(default)]
    pub rep_cooldown_seconds: Option<u64>,
    /// Wallet balance of a fresh record.
    #[serde(default)]
    pub starting_balance: Option<u64>,
    /// Dice rolls strictly above this value win the wager.
    #[serde(default)]
    pub dice_win_above: Option<u64>,
}

impl ProgressionConfig {
    /// Resolve the preset and overrides into concrete settings.
    #[must_use]
    pub fn resolve(&self) -> ProgressionProfile {
        let base = self
            .profile
            .map_or_else(ProgressionProfile::default, ProgressionProfile::preset);
        ProgressionProfile {
            name: self.profile,
            xp_cooldown: self
                .xp_cooldown_seconds
                .map_or(base.xp_cooldown, seconds),
            xp_gain: self.xp_gain_range.map_or(base.xp_gain, |r| Range::new(r.min, r.max)),
            curve: self.level_curve.unwrap_or(base.curve),
            daily_amount: self.daily_range.map_or(base.daily_amount, |r| Range::new(r.min, r.max)),
            daily_cooldown: self
                .daily_cooldown_seconds
                .map_or(base.daily_cooldown, seconds),
            weekly_amount: self
                .weekly_range
                .map_or(base.weekly_amount, |r| Range::new(r.min, r.max)),
            weekly_cooldown: self
                .weekly_cooldown_seconds
                .map_or(base.weekly_cooldown, seconds),
            rep_cooldown: self.rep_cooldown_seconds.map_or(base.rep_cooldown, seconds),
            starting_balance: self.starting_balance.unwrap_or(base.starting_balance),
            dice_win_above: self.dice_win_above.unwrap_or(base.dice_win_above).min(100),
        }
    }
}

/// Longest configurable window; larger values are clamped.
const MAX_WINDOW_SECONDS: u64 = 10 * 365 * 24 * 3600;

fn seconds(s: u64) -> Duration {
    Duration::seconds(i64::try_from(s.min(MAX_WINDOW_SECONDS)).unwrap_or(i64::MAX))
}

/// Fully resolved tuning shared by the XP and economy engines.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressionProfile {
    /// Preset this was derived from, if any.
    pub name: Option<Profile>,
    /// Minimum interval between XP-earning messages.
    pub xp_cooldown: Duration,
    /// Base XP per message.
    pub xp_gain: Range,
    /// Threshold curve.
    pub curve: LevelCurve,
    /// `daily` credit.
    pub daily_amount: Range,
    /// Interval between `daily` claims.
    pub daily_cooldown: Duration,
    /// `weekly` credit.
    pub weekly_amount: Range,
    /// Interval between `weekly` claims.
    pub weekly_cooldown: Duration,
    /// Interval between rep given by one member.
    pub rep_cooldown: Duration,
    /// Opening wallet balance.
    pub starting_balance: u64,
    /// Dice win threshold.
    pub dice_win_above: u64,
}

impl Default for ProgressionProfile {
    fn default() -> Self {
        Self {
            name: None,
            xp_cooldown: Duration::seconds(60),
            xp_gain: Range::new(8, 15),
            curve: LevelCurve::Quadratic,
            daily_amount: Range::new(300, 700),
            daily_cooldown: Duration::hours(24),
            weekly_amount: Range::new(1000, 2000),
            weekly_cooldown: Duration::days(7),
            rep_cooldown: Duration::hours(24),
            starting_balance: STARTING_BALANCE,
            dice_win_above: 60,
        }
    }
}

impl ProgressionProfile {
    /// Settings for a named preset.
    #[must_use]
    pub fn preset(profile: Profile) -> Self {
        let defaults = Self::default();
        match profile {
            Profile::Classic => Self {
                name: Some(Profile::Classic),
                xp_gain: Range::fixed(15),
                ..defaults
            },
            Profile::Rapid => Self {
                name: Some(Profile::Rapid),
                xp_cooldown: Duration::seconds(10),
                xp_gain: Range::new(8, 15),
                curve: LevelCurve::Linear { per_level: 100 },
                daily_amount: Range::new(200, 500),
                ..defaults
            },
        }
    }
}

/// `[store]`: persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file path.
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Use WAL mode for concurrent reads.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            wal_mode: true,
            busy_timeout_ms: 5000,
        }
    }
}

fn default_true() -> bool { true }
fn default_store_path() -> String { "guildkeep.db".to_string() }
fn default_busy_timeout() -> u64 { 5000 }
