//! Level-up announcements and role rewards.
//!
//! Rewards are cumulative: reaching a level entitles the member to every
//! mapped role at or below it. Each call grants only what the member lacks,
//! so replaying a level-up changes nothing. Transient platform failures go
//! to the [`GrantQueue`] for retry with backoff; refusals are logged.

use std::sync::Arc;

use async_trait::async_trait;
use guildkeep_core::economy::RoleGate;
use guildkeep_core::error::{EngineError, Result};
use guildkeep_core::xp::{XpAward, XpEngine};
use guildkeep_core::{ChannelId, RoleId, UserKey};
use guildkeep_platform::queue::{GrantJob, GrantQueue};
use guildkeep_platform::Platform;
use tracing::{debug, error, info, warn};

use crate::commands::render;

/// Longest run of level-ups announced one message per level.
pub const MAX_ANNOUNCED_LEVELS: usize = 5;

/// [`RoleGate`] over a platform, for purchases.
pub struct PlatformGate<'a> {
    platform: &'a dyn Platform,
}

impl<'a> PlatformGate<'a> {
    /// Wrap `platform`.
    #[must_use]
    pub fn new(platform: &'a dyn Platform) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl<'a> RoleGate for PlatformGate<'a> {
    async fn has_role(&self, key: UserKey, role: RoleId) -> Result<bool> {
        self.platform
            .has_role(key.guild, key.user, role)
            .await
            .map_err(EngineError::from)
    }

    async fn grant_role(&self, key: UserKey, role: RoleId) -> Result<()> {
        self.platform
            .grant_role(key.guild, key.user, role)
            .await
            .map_err(EngineError::from)
    }
}

/// Maps levels to roles and publishes level-ups.
pub struct RewardsMapper {
    platform: Arc<dyn Platform>,
    xp: Arc<XpEngine>,
    retries: GrantQueue,
}

impl std::fmt::Debug for RewardsMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardsMapper")
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

impl RewardsMapper {
    /// Mapper granting through `platform`, retrying through `retries`.
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, xp: Arc<XpEngine>, retries: GrantQueue) -> Self {
        Self {
            platform,
            xp,
            retries,
        }
    }

    /// Grant every role mapped at or below `level` that the member lacks.
    /// Returns how many were granted inline.
    pub async fn apply(&self, key: UserKey, level: u32) -> usize {
        let entitled = match self.xp.roles_for_level(key.guild, level) {
            Ok(roles) => roles,
            Err(e) => {
                error!(user = %key.user, guild = %key.guild, error = %e, "Cannot read level roles");
                return 0;
            }
        };
        if entitled.is_empty() {
            return 0;
        }

        let held = match self.platform.member(key.guild, key.user).await {
            Ok(member) => member.roles,
            Err(e) if e.is_transient() => {
                warn!(user = %key.user, guild = %key.guild, error = %e, "Member lookup failed, queueing grants");
                for mapping in &entitled {
                    self.queue(key, mapping.role);
                }
                return 0;
            }
            Err(e) => {
                warn!(user = %key.user, guild = %key.guild, error = %e, "Member lookup failed");
                return 0;
            }
        };

        let mut granted = 0;
        for mapping in entitled.iter().filter(|m| !held.contains(&m.role)) {
            match self.platform.grant_role(key.guild, key.user, mapping.role).await {
                Ok(()) => {
                    granted += 1;
                    info!(user = %key.user, guild = %key.guild, level = mapping.level, role = %mapping.role, "Level role granted");
                }
                Err(e) if e.is_transient() => {
                    warn!(user = %key.user, guild = %key.guild, role = %mapping.role, error = %e, "Level role grant failed, queued for retry");
                    self.queue(key, mapping.role);
                }
                Err(e) => {
                    warn!(user = %key.user, guild = %key.guild, role = %mapping.role, error = %e, "Level role grant refused");
                }
            }
        }
        granted
    }

    fn queue(&self, key: UserKey, role: RoleId) {
        self.retries.enqueue(GrantJob {
            guild: key.guild,
            user: key.user,
            role,
        });
    }

    /// Apply rewards for the highest level reached, then announce the climb.
    ///
    /// Up to [`MAX_ANNOUNCED_LEVELS`] level-ups are announced one by one in
    /// increasing order; a longer run becomes a single summary line. Rewards
    /// are cumulative, so one grant pass for the top level covers every
    /// intermediate level. The award's announce ticket is held throughout so
    /// a later award for the same member cannot overtake this one.
    pub async fn publish(&self, award: XpAward, channel: ChannelId) {
        let XpAward {
            level_ups, ticket, ..
        } = award;
        let (Some(first), Some(top)) = (level_ups.first().copied(), level_ups.last().copied()) else {
            return;
        };
        let granted = self.apply(top.key, top.new_level).await;

        let lines: Vec<String> = if level_ups.len() > MAX_ANNOUNCED_LEVELS {
            vec![render::level_run(top.key.user, first.new_level - 1, top.new_level)]
        } else {
            level_ups
                .iter()
                .map(|up| render::level_up(up.key.user, up.new_level))
                .collect()
        };
        for text in &lines {
            if let Err(e) = self.platform.send_message(channel, text).await {
                warn!(user = %top.key.user, level = top.new_level, error = %e, "Level-up announcement failed");
            }
        }
        debug!(user = %top.key.user, guild = %top.key.guild, level = top.new_level, granted, "Level-up published");
        drop(ticket);
    }
}
