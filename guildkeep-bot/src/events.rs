//! Platform events the bot reacts to.
//!
//! A gateway adapter translates whatever its service sends into these and
//! pushes them into the worker pool.

use chrono::{DateTime, Utc};
use guildkeep_core::{ChannelId, GuildId, UserId, UserKey};
use guildkeep_platform::Permissions;

/// Who sent a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    /// User id.
    pub id: UserId,
    /// Whether the account is a bot.
    pub bot: bool,
    /// Effective permissions in the message's guild.
    pub permissions: Permissions,
}

/// A message as delivered by the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Platform message id.
    pub id: u64,
    /// Channel it was posted in.
    pub channel: ChannelId,
    /// Guild, `None` for direct messages.
    pub guild: Option<GuildId>,
    /// Sender.
    pub author: Author,
    /// Raw text.
    pub content: String,
    /// Server-side timestamp.
    pub timestamp: DateTime<Utc>,
}

impl IncomingMessage {
    /// Progression key of the author, if the message was sent in a guild.
    #[must_use]
    pub fn key(&self) -> Option<UserKey> {
        self.guild.map(|g| UserKey::new(self.author.id, g))
    }
}

/// Everything the bot consumes from the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// A message was posted.
    MessageCreated(IncomingMessage),
    /// A member joined a guild.
    MemberJoined {
        /// Guild joined.
        guild: GuildId,
        /// Newcomer.
        user: UserId,
    },
    /// A member left a guild. Their record is kept.
    MemberLeft {
        /// Guild left.
        guild: GuildId,
        /// Departed member.
        user: UserId,
    },
    /// The bot can now see a guild (startup or join).
    GuildAvailable {
        /// The guild.
        guild: GuildId,
    },
}

impl PlatformEvent {
    /// Short name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageCreated(_) => "message_created",
            Self::MemberJoined { .. } => "member_joined",
            Self::MemberLeft { .. } => "member_left",
            Self::GuildAvailable { .. } => "guild_available",
        }
    }
}
