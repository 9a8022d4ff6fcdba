//! XP engine: message experience, boosts and level transitions.
//!
//! For every observed message the engine:
//!
//! 1. loads the record (materialising defaults on first sight),
//! 2. drops the message if it falls inside the XP cooldown window,
//! 3. draws a base gain and applies an active boost (purging a stale one),
//! 4. settles surplus XP into levels,
//! 5. persists everything in one batch.
//!
//! A store failure drops the gain entirely; the next message reconciles.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::ProgressionProfile;
use crate::error::{EngineError, Result};
use crate::locks::{AnnounceTicket, KeyLocks, StateGuard};
use crate::random::RandomSource;
use crate::store::{Store, WriteOp};
use crate::types::{Boost, GuildId, LevelRole, LevelUp, RoleId, UserKey, UserState};

/// Largest accepted boost multiplier.
pub const MAX_BOOST_MULTIPLIER: f64 = 10.0;

/// Longest accepted boost.
pub const MAX_BOOST_MINUTES: i64 = 7 * 24 * 60;

/// Largest single admin grant.
pub const MAX_GRANT_XP: u64 = 1_000_000;

/// Result of a successful XP grant.
#[derive(Debug)]
pub struct XpAward {
    /// Base XP before any boost.
    pub base: u64,
    /// XP actually credited.
    pub gain: u64,
    /// Boost multiplier that applied, if any.
    pub multiplier: Option<f64>,
    /// Settled record after the grant.
    pub state: UserState,
    /// Level transitions, in increasing order.
    pub level_ups: Vec<LevelUp>,
    /// Held while publishing `level_ups`; present iff there are any.
    pub ticket: Option<AnnounceTicket>,
}

/// Rank summary for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankInfo {
    /// Current record (defaults if the user never earned XP).
    pub state: UserState,
    /// XP needed to leave the current level.
    pub threshold: u64,
    /// 1-based leaderboard position, `None` without a stored record.
    pub position: Option<u64>,
}

/// The XP engine. Cheap to share behind an `Arc`.
pub struct XpEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    locks: KeyLocks,
    profile: ProgressionProfile,
}

impl std::fmt::Debug for XpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XpEngine")
            .field("profile", &self.profile)
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

impl XpEngine {
    /// Build an engine. `locks` must be shared with every other engine that
    /// writes the same records.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        rng: Arc<dyn RandomSource>,
        locks: KeyLocks,
        profile: ProgressionProfile,
    ) -> Self {
        Self {
            store,
            clock,
            rng,
            locks,
            profile,
        }
    }

    /// The resolved tuning in effect.
    #[must_use]
    pub fn profile(&self) -> &ProgressionProfile {
        &self.profile
    }

    fn load_or_default(&self, key: UserKey) -> Result<UserState> {
        Ok(self
            .store
            .load_user(key)?
            .unwrap_or_else(|| UserState::with_balance(key, self.profile.starting_balance)))
    }

    /// Hand over from the state lock to the announce ticket when there is
    /// anything to announce.
    async fn finish(&self, guard: StateGuard, level_ups: &[LevelUp]) -> Option<AnnounceTicket> {
        let ticket = if level_ups.is_empty() {
            None
        } else {
            Some(self.locks.ticket(&guard).await)
        };
        drop(guard);
        ticket
    }

    /// Credit XP for a message sent at `at`.
    ///
    /// Returns `Ok(None)` when the message falls inside the cooldown window.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] if the store fails; nothing is
    /// applied in that case.
    pub async fn on_message(&self, key: UserKey, at: DateTime<Utc>) -> Result<Option<XpAward>> {
        let guard = self.locks.lock(key).await;
        let mut state = self.load_or_default(key)?;

        if let Some(last) = state.last_message_ts {
            if at - last < self.profile.xp_cooldown {
                debug!(user = %key.user, guild = %key.guild, "XP cooldown active");
                return Ok(None);
            }
        }

        let base = self.rng.draw(self.profile.xp_gain);
        let mut ops = Vec::with_capacity(2);
        let (gain, multiplier) = match self.store.load_boost(key)? {
            Some(boost) if boost.is_active(at) => (boost.apply(base), Some(boost.multiplier)),
            Some(_) => {
                ops.push(WriteOp::DeleteBoost(key));
                (base, None)
            }
            None => (base, None),
        };

        state.xp = state.xp.saturating_add(gain);
        state.last_message_ts = Some(at);
        let level_ups = self.profile.curve.settle(&mut state);
        ops.push(WriteOp::SaveUser(state.clone()));
        self.store.apply(&ops)?;

        debug!(
            user = %key.user,
            guild = %key.guild,
            base,
            gain,
            xp = state.xp,
            level = state.level,
            "XP awarded"
        );

        let ticket = self.finish(guard, &level_ups).await;
        Ok(Some(XpAward {
            base,
            gain,
            multiplier,
            state,
            level_ups,
            ticket,
        }))
    }

    /// Admin grant of `amount` XP, bypassing cooldown and boosts.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] for an amount outside
    /// `1..=MAX_GRANT_XP`, [`EngineError::StoreUnavailable`] on store failure.
    pub async fn grant_xp(&self, key: UserKey, amount: u64) -> Result<XpAward> {
        if amount == 0 {
            return Err(EngineError::invalid("amount must be positive"));
        }
        if amount > MAX_GRANT_XP {
            return Err(EngineError::invalid(format!("amount must be at most {MAX_GRANT_XP}")));
        }
        let guard = self.locks.lock(key).await;
        let mut state = self.load_or_default(key)?;
        state.xp = state.xp.saturating_add(amount);
        let level_ups = self.profile.curve.settle(&mut state);
        self.store.save_user(&state)?;

        info!(user = %key.user, guild = %key.guild, amount, level = state.level, "XP granted");

        let ticket = self.finish(guard, &level_ups).await;
        Ok(XpAward {
            base: amount,
            gain: amount,
            multiplier: None,
            state,
            level_ups,
            ticket,
        })
    }

    /// Give `key` a multiplier for `minutes` from now, replacing any boost.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] when `minutes` is outside
    /// `1..=MAX_BOOST_MINUTES` or `multiplier` outside
    /// `1.0..=MAX_BOOST_MULTIPLIER`.
    pub async fn boost(&self, key: UserKey, minutes: i64, multiplier: f64) -> Result<Boost> {
        if !(1..=MAX_BOOST_MINUTES).contains(&minutes) {
            return Err(EngineError::invalid(format!(
                "minutes must be between 1 and {MAX_BOOST_MINUTES}"
            )));
        }
        if !multiplier.is_finite() || !(1.0..=MAX_BOOST_MULTIPLIER).contains(&multiplier) {
            return Err(EngineError::invalid(format!(
                "multiplier must be between 1.0 and {MAX_BOOST_MULTIPLIER}"
            )));
        }
        let _guard = self.locks.lock(key).await;
        let boost = Boost {
            key,
            multiplier,
            expires_at: self.clock.now() + Duration::minutes(minutes),
        };
        self.store.save_boost(&boost)?;
        info!(user = %key.user, guild = %key.guild, multiplier, minutes, "XP boost applied");
        Ok(boost)
    }

    /// Active boost of `key`, hiding expired rows.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn active_boost(&self, key: UserKey) -> Result<Option<Boost>> {
        let now = self.clock.now();
        Ok(self.store.load_boost(key)?.filter(|b| b.is_active(now)))
    }

    /// Current record, or defaults if the user has none yet.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn state(&self, key: UserKey) -> Result<UserState> {
        self.load_or_default(key)
    }

    /// Level, progress and leaderboard position.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn rank(&self, key: UserKey) -> Result<RankInfo> {
        let state = self.load_or_default(key)?;
        let position = self.store.rank_position(key)?;
        Ok(RankInfo {
            threshold: self.profile.curve.threshold(state.level),
            state,
            position,
        })
    }

    /// Top `limit` members of a guild.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn leaderboard(&self, guild: GuildId, limit: usize) -> Result<Vec<UserState>> {
        Ok(self.store.leaderboard(guild, limit)?)
    }

    /// Level-role map of a guild, ascending by level.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn level_roles(&self, guild: GuildId) -> Result<Vec<LevelRole>> {
        Ok(self.store.level_roles(guild)?)
    }

    /// Roles a member at `level` is entitled to: every mapping at or below it.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn roles_for_level(&self, guild: GuildId, level: u32) -> Result<Vec<LevelRole>> {
        Ok(self
            .store
            .level_roles(guild)?
            .into_iter()
            .filter(|m| m.level <= level)
            .collect())
    }

    /// Map `level` to `role`, replacing an existing mapping.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] for level 0,
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn set_level_role(&self, guild: GuildId, level: u32, role: RoleId) -> Result<()> {
        if level == 0 {
            return Err(EngineError::invalid("level must be at least 1"));
        }
        self.store.put_level_role(guild, LevelRole { level, role }, true)?;
        info!(guild = %guild, level, role = %role, "Level role set");
        Ok(())
    }

    /// Insert configured mappings that the guild does not have yet.
    /// Returns how many were written; level 0 entries are skipped.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn seed_level_roles(&self, guild: GuildId, mappings: &[LevelRole]) -> Result<usize> {
        let mut written = 0;
        for mapping in mappings.iter().filter(|m| m.level >= 1) {
            if self.store.put_level_role(guild, *mapping, false)? {
                written += 1;
            }
        }
        if written > 0 {
            debug!(guild = %guild, written, "Level roles seeded");
        }
        Ok(written)
    }

    /// Admin reset: delete the record with its boost and inventory.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub async fn reset(&self, key: UserKey) -> Result<bool> {
        let _guard = self.locks.lock(key).await;
        let existed = self.store.delete_user(key)?;
        info!(user = %key.user, guild = %key.guild, existed, "User record reset");
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{Profile, Range};
    use crate::random::FixedRandom;
    use crate::store::SqliteStore;
    use crate::types::UserId;
    use chrono::TimeZone;

    fn key() -> UserKey {
        UserKey::new(UserId(10), GuildId(20))
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid date")
    }

    struct Rig {
        sqlite: Arc<SqliteStore>,
        clock: Arc<ManualClock>,
        engine: XpEngine,
    }

    fn rig(gain: u64) -> Rig {
        let sqlite = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let clock = Arc::new(ManualClock::new(t0()));
        let mut profile = ProgressionProfile::preset(Profile::Classic);
        profile.xp_gain = Range::fixed(gain);
        let engine = XpEngine::new(
            sqlite.clone(),
            clock.clone(),
            Arc::new(FixedRandom(gain)),
            KeyLocks::new(),
            profile,
        );
        Rig {
            sqlite,
            clock,
            engine,
        }
    }

    #[tokio::test]
    async fn five_messages_cross_one_level() {
        let rig = rig(15);
        rig.sqlite
            .save_user(&UserState {
                xp: 95,
                ..UserState::new(key())
            })
            .expect("seed");

        let mut announced = Vec::new();
        for i in 0..5 {
            let at = t0() + Duration::seconds(61 * i);
            let award = rig.engine.on_message(key(), at).await.expect("ok").expect("credited");
            assert_eq!(award.gain, 15);
            announced.extend(award.level_ups.iter().map(|u| u.new_level));
        }

        let state = rig.engine.state(key()).expect("state");
        assert_eq!((state.xp, state.level), (15, 2));
        assert_eq!(announced, vec![2]);
    }

    #[tokio::test]
    async fn message_inside_cooldown_is_noop() {
        let rig = rig(15);
        let first = rig.engine.on_message(key(), t0()).await.expect("ok");
        assert!(first.is_some());
        let second = rig
            .engine
            .on_message(key(), t0() + Duration::seconds(30))
            .await
            .expect("ok");
        assert!(second.is_none());

        let state = rig.engine.state(key()).expect("state");
        assert_eq!(state.xp, 15);
        assert_eq!(state.last_message_ts, Some(t0()));
    }

    #[tokio::test]
    async fn out_of_order_message_does_not_rewind() {
        let rig = rig(15);
        rig.engine.on_message(key(), t0()).await.expect("ok");
        let earlier = rig
            .engine
            .on_message(key(), t0() - Duration::minutes(5))
            .await
            .expect("ok");
        assert!(earlier.is_none());
        assert_eq!(rig.engine.state(key()).expect("state").last_message_ts, Some(t0()));
    }

    #[tokio::test]
    async fn boost_doubles_then_expires() {
        let rig = rig(10);
        rig.engine.boost(key(), 10, 2.0).await.expect("boost");

        let boosted = rig.engine.on_message(key(), rig.clock.now()).await.expect("ok").expect("award");
        assert_eq!(boosted.gain, 20);
        assert_eq!(boosted.multiplier, Some(2.0));

        rig.clock.advance(Duration::minutes(10));
        assert!(rig.engine.active_boost(key()).expect("read").is_none());
        let plain = rig.engine.on_message(key(), rig.clock.now()).await.expect("ok").expect("award");
        assert_eq!(plain.gain, 10);
        assert!(rig.sqlite.load_boost(key()).expect("load").is_none(), "stale boost purged");
    }

    #[tokio::test]
    async fn boost_rejects_bad_arguments() {
        let rig = rig(10);
        assert!(matches!(
            rig.engine.boost(key(), 0, 2.0).await,
            Err(EngineError::InvalidArgument { .. })
        ));
        assert!(matches!(
            rig.engine.boost(key(), 10, 0.5).await,
            Err(EngineError::InvalidArgument { .. })
        ));
        assert!(matches!(
            rig.engine.boost(key(), 10, f64::NAN).await,
            Err(EngineError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn grant_crosses_several_levels_in_order() {
        let rig = rig(15);
        let award = rig.engine.grant_xp(key(), 680).await.expect("grant");
        let levels: Vec<u32> = award.level_ups.iter().map(|u| u.new_level).collect();
        assert_eq!(levels, vec![2, 3, 4]);
        assert!(award.ticket.is_some());
        assert_eq!((award.state.xp, award.state.level), (10, 4));
    }

    #[tokio::test]
    async fn grant_above_cap_is_rejected_untouched() {
        let rig = rig(15);
        for amount in [MAX_GRANT_XP + 1, u64::MAX] {
            assert!(matches!(
                rig.engine.grant_xp(key(), amount).await,
                Err(EngineError::InvalidArgument { .. })
            ));
        }
        assert!(rig.sqlite.load_user(key()).expect("load").is_none());

        let award = rig.engine.grant_xp(key(), MAX_GRANT_XP).await.expect("grant");
        assert_eq!(award.gain, MAX_GRANT_XP);
    }

    #[tokio::test]
    async fn store_failure_drops_the_gain() {
        let rig = rig(15);
        rig.sqlite
            .conn
            .lock()
            .execute_batch("DROP TABLE boosts;")
            .expect("drop");
        let result = rig.engine.on_message(key(), t0()).await;
        assert!(matches!(result, Err(EngineError::StoreUnavailable(_))));
        assert!(rig.sqlite.load_user(key()).expect("load").is_none());
    }

    #[tokio::test]
    async fn parallel_grants_lose_no_updates() {
        let rig = rig(15);
        let engine = Arc::new(rig.engine);
        let mut handles = Vec::new();
        for _ in 0..32 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                engine.grant_xp(key(), 7).await.map(|a| a.level_ups.len())
            }));
        }
        for h in handles {
            h.await.expect("join").expect("grant");
        }
        let state = engine.state(key()).expect("state");
        let total = engine.profile().curve.cumulative(state.level) + state.xp;
        assert_eq!(total, 32 * 7);
    }

    #[tokio::test]
    async fn reset_deletes_record() {
        let rig = rig(15);
        rig.engine.grant_xp(key(), 5).await.expect("grant");
        assert!(rig.engine.reset(key()).await.expect("reset"));
        assert!(rig.sqlite.load_user(key()).expect("load").is_none());
        assert!(!rig.engine.reset(key()).await.expect("reset"));
    }

    #[test]
    fn level_roles_seed_without_overwriting() {
        let rig = rig(15);
        let guild = GuildId(20);
        rig.engine.set_level_role(guild, 5, RoleId(50)).expect("set");
        let seeded = rig
            .engine
            .seed_level_roles(
                guild,
                &[
                    LevelRole { level: 5, role: RoleId(99) },
                    LevelRole { level: 10, role: RoleId(100) },
                    LevelRole { level: 0, role: RoleId(1) },
                ],
            )
            .expect("seed");
        assert_eq!(seeded, 1);
        let roles = rig.engine.level_roles(guild).expect("read");
        assert_eq!(
            roles,
            vec![
                LevelRole { level: 5, role: RoleId(50) },
                LevelRole { level: 10, role: RoleId(100) },
            ]
        );
        assert_eq!(rig.engine.roles_for_level(guild, 7).expect("read").len(), 1);
        assert!(matches!(
            rig.engine.set_level_role(guild, 0, RoleId(3)),
            Err(EngineError::InvalidArgument { .. })
        ));
    }

    #[tokio::test]
    async fn rank_reports_threshold_and_position() {
        let rig = rig(15);
        let fresh = rig.engine.rank(key()).expect("rank");
        assert_eq!(fresh.position, None);
        assert_eq!(fresh.threshold, 155);
        rig.engine.grant_xp(key(), 160).await.expect("grant");
        let ranked = rig.engine.rank(key()).expect("rank");
        assert_eq!(ranked.position, Some(1));
        assert_eq!(ranked.state.level, 2);
        assert_eq!(ranked.threshold, 220);
    }
}
