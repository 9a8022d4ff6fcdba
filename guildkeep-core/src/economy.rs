//! Economy engine: wallets, periodic claims, reputation, shop and dice.
//!
//! All mutations run under the per-key lock shared with the XP engine.
//! `buy` is the one operation that calls out to the platform while holding
//! the lock: the debit is committed first and a [`RefundGuard`] restores
//! the previous record if the role grant fails or the call is cancelled.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use crate::clock::Clock;
use crate::config::{ProgressionProfile, Range};
use crate::error::{EngineError, Result};
use crate::locks::KeyLocks;
use crate::random::RandomSource;
use crate::store::{Store, WriteOp};
use crate::types::{
    badge_item, role_item, GuildId, InventoryItem, RoleId, ShopEntry, UserId, UserKey, UserState,
    BADGE_PREFIX,
};

/// Longest accepted badge name.
pub const MAX_BADGE_LEN: usize = 32;

/// Role operations the engine needs from the chat platform.
#[async_trait]
pub trait RoleGate: Send + Sync {
    /// Whether the member currently holds `role`.
    async fn has_role(&self, key: UserKey, role: RoleId) -> Result<bool>;

    /// Grant `role` to the member.
    async fn grant_role(&self, key: UserKey, role: RoleId) -> Result<()>;
}

/// Which periodic claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Once per `daily_cooldown`.
    Daily,
    /// Once per `weekly_cooldown`.
    Weekly,
}

impl Claim {
    fn settings(self, profile: &ProgressionProfile) -> (Range, Duration) {
        match self {
            Self::Daily => (profile.daily_amount, profile.daily_cooldown),
            Self::Weekly => (profile.weekly_amount, profile.weekly_cooldown),
        }
    }

    fn stamp(self, state: &mut UserState) -> &mut Option<DateTime<Utc>> {
        match self {
            Self::Daily => &mut state.last_daily_ts,
            Self::Weekly => &mut state.last_weekly_ts,
        }
    }
}

/// A credited claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claimed {
    /// Amount credited.
    pub amount: u64,
    /// Balance after the credit.
    pub balance: u64,
}

/// A completed purchase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Purchase {
    /// Role bought.
    pub role: RoleId,
    /// Price paid.
    pub price: u64,
    /// Balance after the debit.
    pub balance: u64,
}

/// Result of a dice roll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiceRoll {
    /// Uniform roll in `1..=100`.
    pub roll: u64,
    /// Wager outcome, if one was placed.
    pub wager: Option<Wager>,
}

/// Settled wager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wager {
    /// Amount staked.
    pub amount: u64,
    /// Whether the roll beat the threshold.
    pub won: bool,
    /// Balance after settlement.
    pub balance: u64,
}

/// Restores a record to its pre-purchase snapshot unless disarmed.
struct RefundGuard {
    store: Arc<dyn Store>,
    snapshot: Option<UserState>,
    item: String,
}

impl RefundGuard {
    fn disarm(mut self) {
        self.snapshot = None;
    }
}

impl Drop for RefundGuard {
    fn drop(&mut self) {
        let Some(snapshot) = self.snapshot.take() else {
            return;
        };
        let key = snapshot.key;
        let ops = [
            WriteOp::SaveUser(snapshot),
            WriteOp::RemoveItem {
                key,
                item: std::mem::take(&mut self.item),
                amount: 1,
            },
        ];
        match self.store.apply(&ops) {
            Ok(()) => info!(user = %key.user, guild = %key.guild, "Purchase rolled back"),
            Err(e) => error!(user = %key.user, guild = %key.guild, error = %e, "Purchase rollback failed"),
        }
    }
}

/// The economy engine.
pub struct EconomyEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    rng: Arc<dyn RandomSource>,
    locks: KeyLocks,
    profile: ProgressionProfile,
}

impl std::fmt::Debug for EconomyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EconomyEngine")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl EconomyEngine {
    /// Build an engine sharing `locks` with the XP engine.
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

    fn load_or_default(&self, key: UserKey) -> Result<UserState> {
        Ok(self
            .store
            .load_user(key)?
            .unwrap_or_else(|| UserState::with_balance(key, self.profile.starting_balance)))
    }

    /// `(currency, rep)` of a member.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn balance(&self, key: UserKey) -> Result<(u64, u64)> {
        let state = self.load_or_default(key)?;
        Ok((state.currency, state.rep))
    }

    /// Claim the daily or weekly allowance.
    ///
    /// # Errors
    ///
    /// [`EngineError::Cooldown`] if claimed within the window,
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub async fn claim(&self, key: UserKey, claim: Claim) -> Result<Claimed> {
        let (range, window) = claim.settings(&self.profile);
        let _guard = self.locks.lock(key).await;
        let now = self.clock.now();
        let mut state = self.load_or_default(key)?;

        if let Some(last) = *claim.stamp(&mut state) {
            let elapsed = now - last;
            if elapsed < window {
                return Err(EngineError::Cooldown {
                    retry_after: window - elapsed,
                });
            }
        }

        let amount = self.rng.draw(range);
        state.currency = state.currency.saturating_add(amount);
        *claim.stamp(&mut state) = Some(now);
        self.store.save_user(&state)?;

        info!(user = %key.user, guild = %key.guild, ?claim, amount, "Claim credited");
        Ok(Claimed {
            amount,
            balance: state.currency,
        })
    }

    /// Give one rep point from `giver` to `target` in the giver's guild.
    ///
    /// Returns the target's new rep total.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] for self-rep or a bot target,
    /// [`EngineError::Cooldown`] if the giver gave rep within the window,
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub async fn rep(&self, giver: UserKey, target: UserId, target_is_bot: bool) -> Result<u64> {
        if giver.user == target {
            return Err(EngineError::invalid("you cannot give rep to yourself"));
        }
        if target_is_bot {
            return Err(EngineError::invalid("bots cannot receive rep"));
        }
        let target_key = UserKey::new(target, giver.guild);
        let _guards = self.locks.lock_pair(giver, target_key).await;
        let now = self.clock.now();

        let mut from = self.load_or_default(giver)?;
        if let Some(last) = from.last_rep_ts {
            let elapsed = now - last;
            if elapsed < self.profile.rep_cooldown {
                return Err(EngineError::Cooldown {
                    retry_after: self.profile.rep_cooldown - elapsed,
                });
            }
        }
        let mut to = self.load_or_default(target_key)?;
        to.rep = to.rep.saturating_add(1);
        from.last_rep_ts = Some(now);
        let total = to.rep;
        self.store
            .apply(&[WriteOp::SaveUser(from), WriteOp::SaveUser(to)])?;

        info!(giver = %giver.user, target = %target, guild = %giver.guild, total, "Rep given");
        Ok(total)
    }

    /// Buy a listed role.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotListed`], [`EngineError::AlreadyOwned`],
    /// [`EngineError::Insufficient`], or whatever the [`RoleGate`] reports
    /// (typically [`EngineError::Forbidden`]). On any error after the debit
    /// the previous balance is restored before the lock is released.
    pub async fn buy(&self, key: UserKey, role: RoleId, gate: &dyn RoleGate) -> Result<Purchase> {
        let _guard = self.locks.lock(key).await;

        let price = self
            .store
            .shop_price(key.guild, role)?
            .ok_or(EngineError::NotListed)?;
        if gate.has_role(key, role).await? {
            return Err(EngineError::AlreadyOwned);
        }

        let snapshot = self.load_or_default(key)?;
        if snapshot.currency < price {
            return Err(EngineError::Insufficient {
                missing: price - snapshot.currency,
            });
        }

        let mut state = snapshot.clone();
        state.currency -= price;
        let balance = state.currency;
        let item = role_item(role);
        self.store.apply(&[
            WriteOp::SaveUser(state),
            WriteOp::AddItem {
                key,
                item: item.clone(),
                amount: 1,
            },
        ])?;

        let refund = RefundGuard {
            store: Arc::clone(&self.store),
            snapshot: Some(snapshot),
            item,
        };
        gate.grant_role(key, role).await?;
        refund.disarm();

        info!(user = %key.user, guild = %key.guild, role = %role, price, "Role purchased");
        Ok(Purchase {
            role,
            price,
            balance,
        })
    }

    /// Shop listings of a guild, cheapest first.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn shop_list(&self, guild: GuildId) -> Result<Vec<ShopEntry>> {
        Ok(self.store.list_shop(guild)?)
    }

    /// List (or reprice) a role in the shop.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] for a zero price,
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn list_role(&self, guild: GuildId, role: RoleId, price: u64) -> Result<()> {
        if price == 0 {
            return Err(EngineError::invalid("price must be positive"));
        }
        self.store
            .put_shop_entry(&ShopEntry { guild, role, price }, true)?;
        Ok(())
    }

    /// Remove a role from the shop.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotListed`] if it was not listed.
    pub fn delist_role(&self, guild: GuildId, role: RoleId) -> Result<()> {
        if self.store.remove_shop_entry(guild, role)? {
            Ok(())
        } else {
            Err(EngineError::NotListed)
        }
    }

    /// Insert configured listings for `guild` without touching existing
    /// ones. Returns how many were added.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn seed_shop(&self, guild: GuildId, entries: &[(RoleId, u64)]) -> Result<usize> {
        let mut added = 0;
        for &(role, price) in entries.iter().filter(|(_, p)| *p > 0) {
            if self
                .store
                .put_shop_entry(&ShopEntry { guild, role, price }, false)?
            {
                added += 1;
            }
        }
        Ok(added)
    }

    /// Roll `1..=100`, optionally wagering. Rolls above the configured
    /// threshold win the wager back on top of the stake.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] for a zero wager,
    /// [`EngineError::Insufficient`] if the wager exceeds the balance,
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub async fn dice(&self, key: UserKey, wager: Option<u64>) -> Result<DiceRoll> {
        let Some(amount) = wager else {
            return Ok(DiceRoll {
                roll: self.rng.draw(Range::new(1, 100)),
                wager: None,
            });
        };
        if amount == 0 {
            return Err(EngineError::invalid("wager must be positive"));
        }

        let _guard = self.locks.lock(key).await;
        let mut state = self.load_or_default(key)?;
        if amount > state.currency {
            return Err(EngineError::Insufficient {
                missing: amount - state.currency,
            });
        }
        let roll = self.rng.draw(Range::new(1, 100));
        let won = roll > self.profile.dice_win_above;
        state.currency = if won {
            state.currency.saturating_add(amount)
        } else {
            state.currency - amount
        };
        self.store.save_user(&state)?;

        debug!(user = %key.user, guild = %key.guild, roll, amount, won, "Dice settled");
        Ok(DiceRoll {
            roll,
            wager: Some(Wager {
                amount,
                won,
                balance: state.currency,
            }),
        })
    }

    // ------------------------------------------------------------------
    // Inventory & badges
    // ------------------------------------------------------------------

    /// Inventory of a member.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn inventory(&self, key: UserKey) -> Result<Vec<InventoryItem>> {
        Ok(self.store.inventory(key)?)
    }

    /// Badge names held by a member.
    ///
    /// # Errors
    ///
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub fn badges(&self, key: UserKey) -> Result<Vec<String>> {
        Ok(self
            .store
            .inventory(key)?
            .into_iter()
            .filter_map(|i| i.item.strip_prefix(BADGE_PREFIX).map(str::to_string))
            .collect())
    }

    /// Award a badge.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] for a malformed name,
    /// [`EngineError::AlreadyOwned`] if already held.
    pub async fn award_badge(&self, key: UserKey, badge: &str) -> Result<()> {
        validate_badge(badge)?;
        let _guard = self.locks.lock(key).await;
        if self.badges(key)?.iter().any(|b| b == badge) {
            return Err(EngineError::AlreadyOwned);
        }
        self.store.apply(&[WriteOp::AddItem {
            key,
            item: badge_item(badge),
            amount: 1,
        }])?;
        info!(user = %key.user, guild = %key.guild, badge, "Badge awarded");
        Ok(())
    }

    /// Remove a badge. Returns whether it was held.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidArgument`] for a malformed name,
    /// [`EngineError::StoreUnavailable`] on store failure.
    pub async fn remove_badge(&self, key: UserKey, badge: &str) -> Result<bool> {
        validate_badge(badge)?;
        let _guard = self.locks.lock(key).await;
        if !self.badges(key)?.iter().any(|b| b == badge) {
            return Ok(false);
        }
        self.store.apply(&[WriteOp::RemoveItem {
            key,
            item: badge_item(badge),
            amount: u64::MAX,
        }])?;
        info!(user = %key.user, guild = %key.guild, badge, "Badge removed");
        Ok(true)
    }
}

fn validate_badge(badge: &str) -> Result<()> {
    let ok = !badge.is_empty()
        && badge.len() <= MAX_BADGE_LEN
        && badge
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(EngineError::invalid(format!(
            "badge names are 1-{MAX_BADGE_LEN} characters of letters, digits, '_' or '-'"
        )))
    }
}
