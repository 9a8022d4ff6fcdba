//! In-memory platform.
//!
//! Holds guild rosters, records every outbound message and role change, and
//! can be told to refuse specific roles or to fail the next few grants.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use guildkeep_core::{ChannelId, GuildId, RoleId, UserId};
use parking_lot::Mutex;

use crate::error::PlatformError;
use crate::platform::Platform;
use crate::types::{Member, MemberRef};

#[derive(Default)]
struct MockState {
    members: HashMap<(GuildId, UserId), Member>,
    refused: HashSet<RoleId>,
    scripted_failures: VecDeque<PlatformError>,
    sent: Vec<(ChannelId, String)>,
    grant_attempts: u32,
    stalled: bool,
}

/// A [`Platform`] backed by plain maps.
#[derive(Default)]
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl std::fmt::Debug for MockPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockPlatform")
            .field("members", &state.members.len())
            .field("sent", &state.sent.len())
            .finish_non_exhaustive()
    }
}

impl MockPlatform {
    /// Empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `member` on the roster of `guild`, replacing any previous entry.
    pub fn add_member(&self, guild: GuildId, member: Member) {
        self.state.lock().members.insert((guild, member.id), member);
    }

    /// Take `user` off the roster.
    pub fn remove_member(&self, guild: GuildId, user: UserId) {
        self.state.lock().members.remove(&(guild, user));
    }

    /// Every grant of `role` fails with `Forbidden` from now on.
    pub fn refuse_role(&self, role: RoleId) {
        self.state.lock().refused.insert(role);
    }

    /// The next `n` grant calls fail with `error` before anything else is
    /// checked.
    pub fn fail_next_grants(&self, n: usize, error: PlatformError) {
        let mut state = self.state.lock();
        state.scripted_failures.extend(std::iter::repeat_n(error, n));
    }

    /// Whether `user` is on the roster of `guild`.
    #[must_use]
    pub fn contains_member(&self, guild: GuildId, user: UserId) -> bool {
        self.state.lock().members.contains_key(&(guild, user))
    }

    /// Roles `user` holds, empty if not a member.
    #[must_use]
    pub fn member_roles(&self, guild: GuildId, user: UserId) -> Vec<RoleId> {
        self.state
            .lock()
            .members
            .get(&(guild, user))
            .map(|m| m.roles.clone())
            .unwrap_or_default()
    }

    /// Messages sent so far, oldest first.
    #[must_use]
    pub fn sent_messages(&self) -> Vec<(ChannelId, String)> {
        self.state.lock().sent.clone()
    }

    /// Number of `grant_role` calls, successful or not.
    #[must_use]
    pub fn grant_attempts(&self) -> u32 {
        self.state.lock().grant_attempts
    }

    /// Make every later `send_message` hang forever.
    pub fn stall_messages(&self) {
        self.state.lock().stalled = true;
    }
}

fn not_member(guild: GuildId, user: UserId) -> PlatformError {
    PlatformError::NotFound(format!("member {user} of guild {guild}"))
}

#[async_trait]
impl Platform for MockPlatform {
    async fn member(&self, guild: GuildId, user: UserId) -> Result<Member, PlatformError> {
        self.state
            .lock()
            .members
            .get(&(guild, user))
            .cloned()
            .ok_or_else(|| not_member(guild, user))
    }

    async fn resolve_member(&self, guild: GuildId, member: &MemberRef) -> Result<Member, PlatformError> {
        let state = self.state.lock();
        let found = match member {
            MemberRef::Id(id) => state.members.get(&(guild, *id)),
            MemberRef::Tag {
                name,
                discriminator,
            } => state
                .members
                .iter()
                .find(|((g, _), m)| *g == guild && m.name == *name && m.discriminator == *discriminator)
                .map(|(_, m)| m),
        };
        found
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("member {member}")))
    }

    async fn grant_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        state.grant_attempts += 1;
        if let Some(err) = state.scripted_failures.pop_front() {
            return Err(err);
        }
        if state.refused.contains(&role) {
            return Err(PlatformError::Forbidden(format!("role {role} is above the bot")));
        }
        let member = state
            .members
            .get_mut(&(guild, user))
            .ok_or_else(|| not_member(guild, user))?;
        if !member.roles.contains(&role) {
            member.roles.push(role);
        }
        Ok(())
    }

    async fn revoke_role(&self, guild: GuildId, user: UserId, role: RoleId) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.refused.contains(&role) {
            return Err(PlatformError::Forbidden(format!("role {role} is above the bot")));
        }
        let member = state
            .members
            .get_mut(&(guild, user))
            .ok_or_else(|| not_member(guild, user))?;
        member.roles.retain(|r| *r != role);
        Ok(())
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<(), PlatformError> {
        let stalled = self.state.lock().stalled;
        if stalled {
            return std::future::pending().await;
        }
        self.state.lock().sent.push((channel, text.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUILD: GuildId = GuildId(5);

    fn roster() -> MockPlatform {
        let mock = MockPlatform::new();
        mock.add_member(GUILD, Member::new(UserId(1), "ada", 42));
        mock.add_member(GUILD, Member::new(UserId(2), "grace", 7));
        mock
    }

    #[tokio::test]
    async fn resolves_by_id_and_tag() {
        let mock = roster();
        let by_id = mock.resolve_member(GUILD, &MemberRef::Id(UserId(2))).await.expect("id");
        assert_eq!(by_id.name, "grace");
        let by_tag = mock
            .resolve_member(
                GUILD,
                &MemberRef::Tag {
                    name: "ada".into(),
                    discriminator: 42,
                },
            )
            .await
            .expect("tag");
        assert_eq!(by_tag.id, UserId(1));
        assert!(matches!(
            mock.resolve_member(GuildId(6), &MemberRef::Id(UserId(1))).await,
            Err(PlatformError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn grants_are_idempotent() {
        let mock = roster();
        mock.grant_role(GUILD, UserId(1), RoleId(9)).await.expect("grant");
        mock.grant_role(GUILD, UserId(1), RoleId(9)).await.expect("regrant");
        assert_eq!(mock.member_roles(GUILD, UserId(1)), vec![RoleId(9)]);
        assert!(mock.has_role(GUILD, UserId(1), RoleId(9)).await.expect("read"));
        mock.revoke_role(GUILD, UserId(1), RoleId(9)).await.expect("revoke");
        assert!(mock.member_roles(GUILD, UserId(1)).is_empty());
    }

    #[tokio::test]
    async fn refused_and_scripted_failures() {
        let mock = roster();
        mock.refuse_role(RoleId(99));
        assert!(matches!(
            mock.grant_role(GUILD, UserId(1), RoleId(99)).await,
            Err(PlatformError::Forbidden(_))
        ));
        mock.fail_next_grants(1, PlatformError::Unavailable("blip".into()));
        assert!(mock.grant_role(GUILD, UserId(1), RoleId(3)).await.is_err());
        mock.grant_role(GUILD, UserId(1), RoleId(3)).await.expect("second try");
        assert_eq!(mock.grant_attempts(), 3);
    }

    #[tokio::test]
    async fn records_sent_messages() {
        let mock = MockPlatform::new();
        mock.send_message(ChannelId(1), "hello").await.expect("send");
        assert_eq!(mock.sent_messages(), vec![(ChannelId(1), "hello".to_owned())]);
    }
}
