//! Terminal adapter for running the bot locally.
//!
//! Each stdin line `<user id> <text>` becomes a message from that user in a
//! single guild and channel; replies and announcements go to stdout. Users
//! join the roster the first time they speak.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use guildkeep_core::{ChannelId, GuildId, RoleId, UserId};
use guildkeep_platform::error::PlatformError;
use guildkeep_platform::{Member, MemberRef, MockPlatform, Permissions, Platform};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::events::{Author, IncomingMessage, PlatformEvent};

/// Where console input is posted and with which rights.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSession {
    /// Guild every message belongs to.
    pub guild: GuildId,
    /// Channel every message is posted in.
    pub channel: ChannelId,
    /// Permissions given to every speaker.
    pub permissions: Permissions,
}

/// [`Platform`] that prints outbound messages.
#[derive(Debug, Default)]
pub struct ConsolePlatform {
    roster: MockPlatform,
}

impl ConsolePlatform {
    /// Empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Platform for ConsolePlatform {
    async fn member(&self, guild: GuildId, user: UserId) -> Result<Member, PlatformError> {
        self.roster.member(guild, user).await
    }

    async fn resolve_member(&self, guild: GuildId, member: &MemberRef) -> Result<Member, PlatformError> {
        self.roster.resolve_member(guild, member).await
    }

    async fn grant_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        self.roster.grant_role(guild, user, role).await?;
        info!(user = %user, guild = %guild, role = %role, "Role granted");
        Ok(())
    }

    async fn revoke_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        self.roster.revoke_role(guild, user, role).await
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), PlatformError> {
        let line = format!("[#{channel}] {text}\n");
        let mut out = tokio::io::stdout();
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| PlatformError::Unavailable(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| PlatformError::Unavailable(e.to_string()))
    }
}

/// Parse `<user id> <text>`.
fn parse_line(line: &str) -> Option<(UserId, &str)> {
    let (id, text) = line.trim().split_once(char::is_whitespace)?;
    let id = id.parse().ok()?;
    Some((UserId(id), text.trim_start()))
}

/// Feed stdin into `events` until EOF or until the receiver is gone.
///
/// # Errors
/// I/O errors reading stdin.
pub async fn read_events(
    platform: Arc<ConsolePlatform>,
    session: ConsoleSession,
    events: mpsc::Sender<PlatformEvent>,
) -> std::io::Result<()> {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    if events
        .send(PlatformEvent::GuildAvailable { guild: session.guild })
        .await
        .is_err()
    {
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let Some((user, text)) = parse_line(&line) else {
            if !line.trim().is_empty() {
                warn!("Console input must look like `<user id> <message>`");
            }
            continue;
        };
        if !platform.roster.contains_member(session.guild, user) {
            platform
                .roster
                .add_member(session.guild, Member::new(user, format!("user{user}"), 0));
            if events
                .send(PlatformEvent::MemberJoined {
                    guild: session.guild,
                    user,
                })
                .await
                .is_err()
            {
                break;
            }
        }
        let msg = IncomingMessage {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            channel: session.channel,
            guild: Some(session.guild),
            author: Author {
                id: user,
                bot: false,
                permissions: session.permissions,
            },
            content: text.to_string(),
            timestamp: Utc::now(),
        };
        if events.send(PlatformEvent::MessageCreated(msg)).await.is_err() {
            break;
        }
    }
    debug!("Console input closed");
    Ok(())
}
