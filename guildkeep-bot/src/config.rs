//! Bot configuration, loaded from `guildkeep.toml`.
//!
//! Every field has a default so an empty file is valid except for the token,
//! which may also come from the `GUILDKEEP_TOKEN` environment variable.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use guildkeep_core::config::{ProgressionConfig, StoreConfig};
use guildkeep_core::{ChannelId, LevelRole, RoleId};
use guildkeep_platform::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides `bot.token`.
pub const TOKEN_ENV: &str = "GUILDKEEP_TOKEN";

/// Startup configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("Cannot read config file {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML or has wrong types.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// No token in the file or the environment.
    #[error("No bot token configured (set bot.token or {TOKEN_ENV})")]
    MissingToken,

    /// A value is out of range.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildkeepConfig {
    /// Connection and runtime settings.
    #[serde(default)]
    pub bot: BotConfig,
    /// XP and economy tuning.
    #[serde(default)]
    pub progression: ProgressionConfig,
    /// Level-up role rewards.
    #[serde(default)]
    pub rewards: RewardsConfig,
    /// Roles for sale.
    #[serde(default)]
    pub shop: ShopConfig,
    /// Persistence.
    #[serde(default)]
    pub store: StoreConfig,
    /// Background maintenance.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

impl GuildkeepConfig {
    /// Parse a TOML document.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] if the TOML is invalid.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Read and parse a TOML file.
    ///
    /// # Errors
    /// [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Apply environment overrides using `lookup` (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.bot.token = Some(token);
        }
    }

    /// The bot token.
    ///
    /// # Errors
    /// [`ConfigError::MissingToken`] if unset or blank.
    pub fn token(&self) -> Result<&str, ConfigError> {
        self.bot
            .token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::MissingToken)
    }

    /// Check everything that serde cannot.
    ///
    /// # Errors
    /// [`ConfigError::MissingToken`] or [`ConfigError::Invalid`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.token()?;
        if self.bot.prefix.is_empty() || self.bot.prefix.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid(
                "bot.prefix must be non-empty and contain no whitespace".into(),
            ));
        }
        if self.bot.workers == 0 {
            return Err(ConfigError::Invalid("bot.workers must be at least 1".into()));
        }
        if self.bot.handler_deadline_ms == 0 {
            return Err(ConfigError::Invalid("bot.handler_deadline_ms must be positive".into()));
        }
        if self.maintenance.sweep_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "maintenance.sweep_interval_seconds must be positive".into(),
            ));
        }
        if self.rewards.retry_attempts == 0 {
            return Err(ConfigError::Invalid("rewards.retry_attempts must be at least 1".into()));
        }
        self.level_roles()?;
        self.shop_roles()?;
        Ok(())
    }

    /// `[rewards.level_roles]` as typed mappings, ascending by level.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] for a key that is not a positive level.
    pub fn level_roles(&self) -> Result<Vec<LevelRole>, ConfigError> {
        let mut out = Vec::with_capacity(self.rewards.level_roles.len());
        for (level, role) in &self.rewards.level_roles {
            let level: u32 = level
                .trim()
                .parse()
                .ok()
                .filter(|l| *l >= 1)
                .ok_or_else(|| ConfigError::Invalid(format!("rewards.level_roles: bad level {level:?}")))?;
            out.push(LevelRole {
                level,
                role: RoleId(*role),
            });
        }
        out.sort_by_key(|m| m.level);
        Ok(out)
    }

    /// `[shop.roles]` as `(role, price)` pairs.
    ///
    /// # Errors
    /// [`ConfigError::Invalid`] for a non-numeric role id or a zero price.
    pub fn shop_roles(&self) -> Result<Vec<(RoleId, u64)>, ConfigError> {
        let mut out = Vec::with_capacity(self.shop.roles.len());
        for (role, price) in &self.shop.roles {
            let role: u64 = role
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("shop.roles: bad role id {role:?}")))?;
            if *price == 0 {
                return Err(ConfigError::Invalid(format!("shop.roles: role {role} has price 0")));
            }
            out.push((RoleId(role), *price));
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// `[bot]`.
#[derive(Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Command prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Platform credential.
    #[serde(default)]
    pub token: Option<String>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
    /// Soft deadline per event handler.
    #[serde(default = "default_deadline_ms")]
    pub handler_deadline_ms: u64,
    /// Maximum events handled at once.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Events buffered between the gateway and the workers.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Where level-up announcements go; the triggering channel if unset.
    #[serde(default)]
    pub announce_channel_id: Option<ChannelId>,
    /// Audit log channel.
    #[serde(default)]
    pub log_channel_id: Option<ChannelId>,
    /// Welcome channel.
    #[serde(default)]
    pub welcome_channel_id: Option<ChannelId>,
    /// Role given on join.
    #[serde(default)]
    pub default_role_id: Option<RoleId>,
}

impl BotConfig {
    /// [`BotConfig::handler_deadline_ms`] as a duration.
    #[must_use]
    pub fn handler_deadline(&self) -> Duration {
        Duration::from_millis(self.handler_deadline_ms)
    }
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("prefix", &self.prefix)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("log_format", &self.log_format)
            .field("handler_deadline_ms", &self.handler_deadline_ms)
            .field("workers", &self.workers)
            .field("event_buffer", &self.event_buffer)
            .field("announce_channel_id", &self.announce_channel_id)
            .finish_non_exhaustive()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            token: None,
            log_format: LogFormat::Pretty,
            handler_deadline_ms: default_deadline_ms(),
            workers: default_workers(),
            event_buffer: default_event_buffer(),
            announce_channel_id: None,
            log_channel_id: None,
            welcome_channel_id: None,
            default_role_id: None,
        }
    }
}

/// `[rewards]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    /// Level (as a string key) to role id.
    #[serde(default)]
    pub level_roles: BTreeMap<String, u64>,
    /// Attempts per failed grant, including the first.
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// First backoff delay; doubled per attempt.
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_delay_ms: u64,
    /// Backoff ceiling.
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_delay_ms: u64,
    /// Grants waiting for retry before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl RewardsConfig {
    /// Backoff settings for role grants.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            level_roles: BTreeMap::new(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_ms(),
            retry_max_delay_ms: default_retry_max_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// `[shop]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopConfig {
    /// Role id (as a string key) to price.
    #[serde(default)]
    pub roles: BTreeMap<String, u64>,
}

/// `[maintenance]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between sweeps of boosts, ledger rows and idle locks.
    #[serde(default = "default_sweep_secs")]
    pub sweep_interval_seconds: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: default_sweep_secs(),
        }
    }
}

// Default value functions for serde.
fn default_prefix() -> String { "!".to_string() }
fn default_deadline_ms() -> u64 { 5000 }
fn default_workers() -> usize { 16 }
fn default_event_buffer() -> usize { 1024 }
fn default_retry_attempts() -> u32 { 3 }
fn default_retry_base_ms() -> u64 { 500 }
fn default_retry_max_ms() -> u64 { 30_000 }
fn default_queue_capacity() -> usize { 256 }
fn default_sweep_secs() -> u64 { 60 }
