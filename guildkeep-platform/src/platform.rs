//! The adapter trait every chat backend implements.

use async_trait::async_trait;
use guildkeep_core::{ChannelId, GuildId, RoleId, UserId};

use crate::error::PlatformError;
use crate::types::{Member, MemberRef};

/// Outbound surface of a chat platform.
///
/// Implementations must be cheap to share; the bot holds one behind an
/// `Arc` and calls it from many workers at once.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Fetch a member of `guild`.
    ///
    /// # Errors
    ///
    /// [`PlatformError::NotFound`] if `user` is not in the guild.
    async fn member(&self, guild: GuildId, user: UserId) -> Result<Member, PlatformError>;

    /// Resolve a typed reference to a member of `guild`.
    ///
    /// # Errors
    ///
    /// [`PlatformError::NotFound`] if nothing matches.
    async fn resolve_member(&self, guild: GuildId, member: &MemberRef) -> Result<Member, PlatformError>;

    /// Give `role` to `user`. Granting a held role succeeds.
    ///
    /// # Errors
    ///
    /// [`PlatformError::Forbidden`] when the bot may not assign the role.
    async fn grant_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError>;

    /// Take `role` from `user`. Revoking an absent role succeeds.
    ///
    /// # Errors
    ///
    /// [`PlatformError::Forbidden`] when the bot may not manage the role.
    async fn revoke_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError>;

    /// Post `text` in `channel`.
    ///
    /// # Errors
    ///
    /// Any transport failure.
    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), PlatformError>;

    /// Whether `user` currently holds `role`.
    ///
    /// # Errors
    ///
    /// Whatever [`Platform::member`] returns.
    async fn has_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<bool, PlatformError> {
        Ok(self.member(guild, user).await?.has_role(role))
    }
}
