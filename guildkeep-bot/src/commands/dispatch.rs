//! Turns a prefixed message into an engine call and a reply.

use std::sync::Arc;

use chrono::Duration;
use guildkeep_core::cooldown::CooldownLedger;
use guildkeep_core::economy::{Claim, EconomyEngine};
use guildkeep_core::error::{EngineError, Result};
use guildkeep_core::xp::XpEngine;
use guildkeep_core::{ChannelId, GuildId, UserKey};
use guildkeep_platform::{Member, MemberRef, Platform};
use tracing::{debug, error};

use super::parse::split_invocation;
use super::{lookup, render, Command, CommandSpec, LEADERBOARD_SIZE};
use crate::events::IncomingMessage;
use crate::rewards::{PlatformGate, RewardsMapper};

/// Routes commands to the engines.
pub struct Dispatcher {
    prefix: String,
    xp: Arc<XpEngine>,
    economy: Arc<EconomyEngine>,
    ledger: Arc<CooldownLedger>,
    platform: Arc<dyn Platform>,
    rewards: Arc<RewardsMapper>,
    announce_channel: Option<ChannelId>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("prefix", &self.prefix)
            .field("announce_channel", &self.announce_channel)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher answering to `prefix`. Level-ups caused by admin grants
    /// are announced in `announce_channel`, or where the command was issued.
    #[must_use]
    pub fn new(
        prefix: impl Into<String>,
        xp: Arc<XpEngine>,
        economy: Arc<EconomyEngine>,
        ledger: Arc<CooldownLedger>,
        platform: Arc<dyn Platform>,
        rewards: Arc<RewardsMapper>,
        announce_channel: Option<ChannelId>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            xp,
            economy,
            ledger,
            platform,
            rewards,
            announce_channel,
        }
    }

    /// Command prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Reply to `msg`, or `None` when it is not a known command from a
    /// guild member.
    pub async fn dispatch(&self, msg: &IncomingMessage) -> Option<String> {
        if msg.author.bot {
            return None;
        }
        let key = msg.key()?;
        let (name, args) = split_invocation(&self.prefix, &msg.content)?;
        let Some(spec) = lookup(&name) else {
            debug!(user = %key.user, command = %name, "Unknown command ignored");
            return None;
        };

        let reply = match self.run(spec, key, msg, &args).await {
            Ok(reply) => {
                debug!(user = %key.user, guild = %key.guild, command = spec.name, "Command handled");
                reply
            }
            Err(e) if e.is_user_facing() => {
                debug!(user = %key.user, guild = %key.guild, command = spec.name, outcome = %e, "Command rejected");
                render::error(&self.prefix, spec, &e)
            }
            Err(e) => {
                error!(user = %key.user, guild = %key.guild, command = spec.name, error = %e, "Command failed");
                render::error(&self.prefix, spec, &e)
            }
        };
        Some(reply)
    }

    async fn run(&self, spec: &CommandSpec, key: UserKey, msg: &IncomingMessage, args: &[&str]) -> Result<String> {
        let held = msg.author.permissions;
        if !held.satisfies(spec.permissions) {
            return Err(EngineError::PermissionDenied {
                required: held.missing(spec.permissions).describe(),
            });
        }
        let command = (spec.parse)(args)?;
        if spec.cooldown_secs > 0 {
            let window = Duration::seconds(i64::try_from(spec.cooldown_secs).unwrap_or(i64::MAX));
            self.ledger.check_and_consume(key.user, spec.name, window)?;
        }
        self.execute(key, msg.channel, command).await
    }

    async fn resolve(&self, guild: GuildId, member: &MemberRef) -> Result<Member> {
        Ok(self.platform.resolve_member(guild, member).await?)
    }

    /// The caller, or the member they named.
    async fn subject(&self, caller: UserKey, member: Option<&MemberRef>) -> Result<UserKey> {
        match member {
            None => Ok(caller),
            Some(m) => Ok(UserKey::new(self.resolve(caller.guild, m).await?.id, caller.guild)),
        }
    }

    async fn execute(&self, key: UserKey, channel: ChannelId, command: Command) -> Result<String> {
        let guild = key.guild;
        match command {
            Command::Xp(member) => {
                let target = self.subject(key, member.as_ref()).await?;
                Ok(render::xp(&self.xp.rank(target)?))
            }
            Command::Rank(member) => {
                let target = self.subject(key, member.as_ref()).await?;
                Ok(render::rank(&self.xp.rank(target)?))
            }
            Command::Leaderboard => Ok(render::leaderboard(&self.xp.leaderboard(guild, LEADERBOARD_SIZE)?)),
            Command::Balance(member) => {
                let target = self.subject(key, member.as_ref()).await?;
                let (currency, rep) = self.economy.balance(target)?;
                Ok(render::balance(target.user, currency, rep))
            }
            Command::Daily => {
                let claimed = self.economy.claim(key, Claim::Daily).await?;
                Ok(render::claimed(Claim::Daily, &claimed))
            }
            Command::Weekly => {
                let claimed = self.economy.claim(key, Claim::Weekly).await?;
                Ok(render::claimed(Claim::Weekly, &claimed))
            }
            Command::Rep(member) => {
                let target = self.resolve(guild, &member).await?;
                let total = self.economy.rep(key, target.id, target.bot).await?;
                Ok(render::rep_given(target.id, total))
            }
            Command::Shop => Ok(render::shop(&self.economy.shop_list(guild)?)),
            Command::Buy(role) => {
                let gate = PlatformGate::new(self.platform.as_ref());
                let purchase = self.economy.buy(key, role, &gate).await?;
                Ok(render::purchase(&purchase))
            }
            Command::Dice(wager) => Ok(render::dice(&self.economy.dice(key, wager).await?)),
            Command::GrantXp { member, amount } => {
                let target = self.subject(key, Some(&member)).await?;
                let award = self.xp.grant_xp(target, amount).await?;
                let reply = render::granted(target.user, amount, award.state.level);
                self.rewards
                    .publish(award, self.announce_channel.unwrap_or(channel))
                    .await;
                Ok(reply)
            }
            Command::BoostXp {
                member,
                minutes,
                multiplier,
            } => {
                let target = self.subject(key, Some(&member)).await?;
                let boost = self.xp.boost(target, minutes, multiplier).await?;
                Ok(render::boosted(&boost, minutes))
            }
            Command::AwardBadge { member, badge } => {
                let target = self.subject(key, Some(&member)).await?;
                self.economy.award_badge(target, &badge).await?;
                Ok(render::badge_awarded(target.user, &badge))
            }
            Command::RemoveBadge { member, badge } => {
                let target = self.subject(key, Some(&member)).await?;
                let removed = self.economy.remove_badge(target, &badge).await?;
                Ok(render::badge_removed(target.user, &badge, removed))
            }
            Command::ListBadges(member) => {
                let target = self.subject(key, member.as_ref()).await?;
                Ok(render::badges(target.user, &self.economy.badges(target)?))
            }
            Command::ResetUser(member) => {
                let target = self.subject(key, Some(&member)).await?;
                let existed = self.xp.reset(target).await?;
                Ok(render::reset(target.user, existed))
            }
            Command::ShopAdd { role, price } => {
                self.economy.list_role(guild, role, price)?;
                Ok(render::listed(role, price))
            }
            Command::ShopRemove(role) => {
                self.economy.delist_role(guild, role)?;
                Ok(render::delisted(role))
            }
            Command::SetLevelRole { level, role } => {
                self.xp.set_level_role(guild, level, role)?;
                Ok(render::level_role_set(level, role))
            }
            Command::Help => Ok(render::help(&self.prefix)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Author;
    use guildkeep_core::clock::ManualClock;
    use guildkeep_core::config::ProgressionProfile;
    use guildkeep_core::locks::KeyLocks;
    use guildkeep_core::random::FixedRandom;
    use guildkeep_core::store::SqliteStore;
    use guildkeep_core::{RoleId, UserId};
    use guildkeep_platform::queue::{GrantQueue, GrantWorker};
    use guildkeep_platform::retry::RetryPolicy;
    use guildkeep_platform::{MockPlatform, Permissions};

    const GUILD: GuildId = GuildId(1);
    const CHANNEL: ChannelId = ChannelId(10);

    struct Rig {
        platform: Arc<MockPlatform>,
        xp: Arc<XpEngine>,
        economy: Arc<EconomyEngine>,
        dispatcher: Dispatcher,
        _worker: GrantWorker,
    }

    fn rig() -> Rig {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
        let rng = Arc::new(FixedRandom(500));
        let locks = KeyLocks::new();
        let profile = ProgressionProfile::default();
        let xp = Arc::new(XpEngine::new(
            store.clone(),
            clock.clone(),
            rng.clone(),
            locks.clone(),
            profile.clone(),
        ));
        let economy = Arc::new(EconomyEngine::new(store.clone(), clock.clone(), rng, locks, profile));
        let ledger = Arc::new(CooldownLedger::new(store, clock));
        let platform = Arc::new(MockPlatform::new());
        for (id, name) in [(1, "ada"), (2, "grace")] {
            platform.add_member(GUILD, Member::new(UserId(id), name, 1));
        }
        let (queue, worker) = GrantQueue::new(platform.clone(), RetryPolicy::default(), 8);
        let rewards = Arc::new(RewardsMapper::new(platform.clone(), xp.clone(), queue));
        let dispatcher = Dispatcher::new("!", xp.clone(), economy.clone(), ledger, platform.clone(), rewards, None);
        Rig {
            platform,
            xp,
            economy,
            dispatcher,
            _worker: worker,
        }
    }

    fn message(user: u64, permissions: Permissions, content: &str) -> IncomingMessage {
        IncomingMessage {
            id: 1,
            channel: CHANNEL,
            guild: Some(GUILD),
            author: Author {
                id: UserId(user),
                bot: false,
                permissions,
            },
            content: content.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    async fn say(rig: &Rig, user: u64, content: &str) -> Option<String> {
        rig.dispatcher.dispatch(&message(user, Permissions::empty(), content)).await
    }

    #[tokio::test]
    async fn ignores_chatter_unknown_commands_and_bots() {
        let rig = rig();
        assert_eq!(say(&rig, 1, "hello there").await, None);
        assert_eq!(say(&rig, 1, "!ban <@2>").await, None);
        let mut from_bot = message(1, Permissions::empty(), "!daily");
        from_bot.author.bot = true;
        assert_eq!(rig.dispatcher.dispatch(&from_bot).await, None);
        let mut direct = message(1, Permissions::empty(), "!daily");
        direct.guild = None;
        assert_eq!(rig.dispatcher.dispatch(&direct).await, None);
    }

    #[tokio::test]
    async fn daily_claims_once() {
        let rig = rig();
        let first = say(&rig, 1, "!daily").await.expect("reply");
        assert_eq!(first, "You claimed your daily 500 coins. Balance: 600.");
        let second = say(&rig, 1, "!daily").await.expect("reply");
        assert_eq!(second, "Slow down! Try again in 1d.");
    }

    #[tokio::test]
    async fn admin_commands_check_permissions_first() {
        let rig = rig();
        let denied = say(&rig, 1, "!grantxp <@2> 50").await.expect("reply");
        assert_eq!(denied, "You need the Administrator permission to use this.");

        let admin = message(1, Permissions::ADMINISTRATOR, "!grantxp <@2> 50");
        let reply = rig.dispatcher.dispatch(&admin).await.expect("reply");
        assert_eq!(reply, "Gave <@2> 50 XP. They are level 1.");

        let manager = message(1, Permissions::MANAGE_GUILD, "!shopadd <@&7> 250");
        assert_eq!(
            rig.dispatcher.dispatch(&manager).await.expect("reply"),
            "<@&7> is now for sale at 250 coins."
        );
        assert_eq!(rig.economy.shop_list(GUILD).expect("shop").len(), 1);
    }

    #[tokio::test]
    async fn bad_arguments_show_usage_without_spending_cooldown() {
        let rig = rig();
        let reply = say(&rig, 1, "!dice lots").await.expect("reply");
        assert_eq!(reply, "Wager must be a positive whole number. Usage: `!dice [amount]`");
        let roll = say(&rig, 1, "!dice").await.expect("reply");
        assert!(roll.starts_with("You rolled"), "{roll}");
        let again = say(&rig, 1, "!dice").await.expect("reply");
        assert!(again.starts_with("Slow down!"), "{again}");
    }

    #[tokio::test]
    async fn rep_resolves_members() {
        let rig = rig();
        assert_eq!(
            say(&rig, 1, "!rep grace#0001").await.expect("reply"),
            "You gave <@2> a rep point. They now have 1."
        );
        assert_eq!(
            say(&rig, 2, "!rep <@2>").await.expect("reply"),
            "You cannot give rep to yourself. Usage: `!rep <member>`"
        );
        let missing = say(&rig, 2, "!rep <@99>").await.expect("reply");
        assert!(missing.contains("not found"), "{missing}");
    }

    #[tokio::test]
    async fn refused_purchase_is_refunded() {
        let rig = rig();
        rig.economy.list_role(GUILD, RoleId(7), 40).expect("list");
        rig.platform.refuse_role(RoleId(7));
        let reply = say(&rig, 1, "!buy <@&7>").await.expect("reply");
        assert_eq!(reply, "I am not allowed to do that here.");
        let key = UserKey::new(UserId(1), GUILD);
        assert_eq!(rig.economy.balance(key).expect("balance").0, 100);
        assert!(rig.economy.inventory(key).expect("inventory").is_empty());
    }

    #[tokio::test]
    async fn grantxp_announces_level_ups() {
        let rig = rig();
        let admin = message(1, Permissions::ADMINISTRATOR, "!grantxp <@2> 400");
        let reply = rig.dispatcher.dispatch(&admin).await.expect("reply");
        assert_eq!(reply, "Gave <@2> 400 XP. They are level 3.");
        let sent = rig.platform.sent_messages();
        assert_eq!(
            sent,
            vec![
                (CHANNEL, "<@2> reached level 2!".to_string()),
                (CHANNEL, "<@2> reached level 3!".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn oversized_grant_is_rejected_without_announcing() {
        let rig = rig();
        let admin = message(1, Permissions::ADMINISTRATOR, "!grantxp <@2> 1000000000000");
        let reply = rig.dispatcher.dispatch(&admin).await.expect("reply");
        assert_eq!(
            reply,
            "Amount must be at most 1000000. Usage: `!grantxp <member> <amount>`"
        );
        assert!(rig.platform.sent_messages().is_empty());
        let state = rig.xp.state(UserKey::new(UserId(2), GUILD)).expect("state");
        assert_eq!((state.level, state.xp), (1, 0));
    }
}
