//! Per-event handling: message XP, command replies, guild seeding.

use std::sync::Arc;

use guildkeep_core::economy::EconomyEngine;
use guildkeep_core::xp::XpEngine;
use guildkeep_core::{ChannelId, GuildId, LevelRole, RoleId};
use guildkeep_platform::Platform;
use tracing::{debug, error, info, warn};

use crate::commands::Dispatcher;
use crate::events::{IncomingMessage, PlatformEvent};
use crate::rewards::RewardsMapper;

/// Config rows copied into every guild the bot sees.
#[derive(Debug, Clone, Default)]
pub struct GuildSeed {
    /// Level rewards.
    pub level_roles: Vec<LevelRole>,
    /// Shop listings as `(role, price)`.
    pub shop: Vec<(RoleId, u64)>,
}

/// Handles one [`PlatformEvent`] at a time; share it across workers.
pub struct Ingress {
    xp: Arc<XpEngine>,
    economy: Arc<EconomyEngine>,
    platform: Arc<dyn Platform>,
    rewards: Arc<RewardsMapper>,
    dispatcher: Dispatcher,
    announce_channel: Option<ChannelId>,
    seed: GuildSeed,
}

impl std::fmt::Debug for Ingress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ingress")
            .field("dispatcher", &self.dispatcher)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

impl Ingress {
    /// Wire the handlers together.
    #[must_use]
    pub fn new(
        xp: Arc<XpEngine>,
        economy: Arc<EconomyEngine>,
        platform: Arc<dyn Platform>,
        rewards: Arc<RewardsMapper>,
        dispatcher: Dispatcher,
        announce_channel: Option<ChannelId>,
        seed: GuildSeed,
    ) -> Self {
        Self {
            xp,
            economy,
            platform,
            rewards,
            dispatcher,
            announce_channel,
            seed,
        }
    }

    /// React to `event`. Faults are logged here and never propagate.
    pub async fn handle(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::MessageCreated(msg) => self.on_message(&msg).await,
            PlatformEvent::GuildAvailable { guild } => self.seed_guild(guild),
            PlatformEvent::MemberJoined { guild, user } => {
                info!(user = %user, guild = %guild, "Member joined");
            }
            PlatformEvent::MemberLeft { guild, user } => {
                info!(user = %user, guild = %guild, "Member left, record kept");
            }
        }
    }

    /// Award message XP, publish any level-ups, then answer a command.
    async fn on_message(&self, msg: &IncomingMessage) {
        if msg.author.bot {
            return;
        }
        let Some(key) = msg.key() else {
            return;
        };

        match self.xp.on_message(key, msg.timestamp).await {
            Ok(Some(award)) => {
                debug!(user = %key.user, guild = %key.guild, gain = award.gain, level = award.state.level, "Message XP");
                if !award.level_ups.is_empty() {
                    let channel = self.announce_channel.unwrap_or(msg.channel);
                    self.rewards.publish(award, channel).await;
                }
            }
            Ok(None) => {}
            Err(e) => error!(user = %key.user, guild = %key.guild, error = %e, "Message XP failed"),
        }

        if let Some(reply) = self.dispatcher.dispatch(msg).await {
            if let Err(e) = self.platform.send_message(msg.channel, &reply).await {
                warn!(channel = %msg.channel, error = %e, "Reply not delivered");
            }
        }
    }

    fn seed_guild(&self, guild: GuildId) {
        let roles = self.xp.seed_level_roles(guild, &self.seed.level_roles);
        let listings = self.economy.seed_shop(guild, &self.seed.shop);
        match (roles, listings) {
            (Ok(roles), Ok(listings)) => {
                info!(guild = %guild, level_roles = roles, listings, "Guild available");
            }
            (Err(e), _) | (_, Err(e)) => error!(guild = %guild, error = %e, "Guild seeding failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Author;
    use chrono::{Duration, Utc};
    use guildkeep_core::clock::ManualClock;
    use guildkeep_core::config::ProgressionProfile;
    use guildkeep_core::cooldown::CooldownLedger;
    use guildkeep_core::locks::KeyLocks;
    use guildkeep_core::random::FixedRandom;
    use guildkeep_core::store::SqliteStore;
    use guildkeep_core::{UserId, UserKey};
    use guildkeep_platform::queue::{GrantQueue, GrantWorker};
    use guildkeep_platform::retry::RetryPolicy;
    use guildkeep_platform::{Member, MockPlatform, Permissions};

    const GUILD: GuildId = GuildId(4);
    const CHANNEL: ChannelId = ChannelId(40);

    struct Rig {
        platform: Arc<MockPlatform>,
        xp: Arc<XpEngine>,
        economy: Arc<EconomyEngine>,
        ingress: Ingress,
        _worker: GrantWorker,
    }

    fn rig(seed: GuildSeed) -> Rig {
        let store = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let rng = Arc::new(FixedRandom(15));
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
        platform.add_member(GUILD, Member::new(UserId(1), "ada", 1));
        let (queue, worker) = GrantQueue::new(platform.clone(), RetryPolicy::default(), 8);
        let rewards = Arc::new(RewardsMapper::new(platform.clone(), xp.clone(), queue));
        let dispatcher = Dispatcher::new(
            "!",
            xp.clone(),
            economy.clone(),
            ledger,
            platform.clone(),
            rewards.clone(),
            None,
        );
        let ingress = Ingress::new(
            xp.clone(),
            economy.clone(),
            platform.clone(),
            rewards,
            dispatcher,
            None,
            seed,
        );
        Rig {
            platform,
            xp,
            economy,
            ingress,
            _worker: worker,
        }
    }

    fn message(content: &str, at: chrono::DateTime<Utc>) -> PlatformEvent {
        PlatformEvent::MessageCreated(IncomingMessage {
            id: 1,
            channel: CHANNEL,
            guild: Some(GUILD),
            author: Author {
                id: UserId(1),
                bot: false,
                permissions: Permissions::empty(),
            },
            content: content.into(),
            timestamp: at,
        })
    }

    fn key() -> UserKey {
        UserKey::new(UserId(1), GUILD)
    }

    #[tokio::test]
    async fn commands_earn_xp_before_replying() {
        let rig = rig(GuildSeed::default());
        rig.ingress.handle(message("!xp", Utc::now())).await;
        assert_eq!(
            rig.platform.sent_messages(),
            vec![(CHANNEL, "<@1> is level 1 with 15/155 XP.".to_string())]
        );
    }

    #[tokio::test]
    async fn chatter_within_cooldown_earns_once() {
        let rig = rig(GuildSeed::default());
        let t0 = Utc::now();
        rig.ingress.handle(message("hi", t0)).await;
        rig.ingress.handle(message("hi again", t0 + Duration::seconds(30))).await;
        assert_eq!(rig.xp.state(key()).expect("state").xp, 15);
        rig.ingress.handle(message("later", t0 + Duration::seconds(61))).await;
        assert_eq!(rig.xp.state(key()).expect("state").xp, 30);
        assert!(rig.platform.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn bot_messages_are_ignored() {
        let rig = rig(GuildSeed::default());
        let mut event = message("!daily", Utc::now());
        if let PlatformEvent::MessageCreated(msg) = &mut event {
            msg.author.bot = true;
        }
        rig.ingress.handle(event).await;
        assert!(rig.platform.sent_messages().is_empty());
        assert_eq!(rig.xp.state(key()).expect("state").xp, 0);
    }

    #[tokio::test]
    async fn guild_available_seeds_without_overwriting() {
        let seed = GuildSeed {
            level_roles: vec![LevelRole {
                level: 5,
                role: RoleId(50),
            }],
            shop: vec![(RoleId(7), 100), (RoleId(8), 300)],
        };
        let rig = rig(seed);
        rig.economy.list_role(GUILD, RoleId(7), 999).expect("list");
        rig.ingress.handle(PlatformEvent::GuildAvailable { guild: GUILD }).await;
        let shop = rig.economy.shop_list(GUILD).expect("shop");
        let price_of = |role| shop.iter().find(|e| e.role == role).map(|e| e.price);
        assert_eq!(price_of(RoleId(7)), Some(999));
        assert_eq!(price_of(RoleId(8)), Some(300));
        assert_eq!(rig.xp.level_roles(GUILD).expect("roles").len(), 1);
    }
}
