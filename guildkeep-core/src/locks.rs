//! Per-`(user, guild)` serialization.
//!
//! Each key owns two async mutexes: the *state* lock, held for the whole
//! read-modify-write of a record, and the *announce* lock, which orders
//! side effects (level-up announcements) for that key. A writer that has
//! level-ups to publish takes the announce lock while still holding the
//! state lock, then releases the state lock. Tokio mutexes are fair, so
//! announcements leave in the same order as the writes that produced them
//! without the state lock being held across platform calls.
//!
//! Distinct keys never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::UserKey;

#[derive(Default)]
struct KeySlot {
    state: Arc<Mutex<()>>,
    announce: Arc<Mutex<()>>,
}

/// Registry of per-key locks. Cheap to clone; clones share the registry.
#[derive(Clone, Default)]
pub struct KeyLocks {
    slots: Arc<DashMap<UserKey, KeySlot>>,
}

impl std::fmt::Debug for KeyLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLocks")
            .field("keys", &self.slots.len())
            .finish()
    }
}

/// Exclusive access to one record.
#[derive(Debug)]
pub struct StateGuard {
    key: UserKey,
    _guard: OwnedMutexGuard<()>,
}

impl StateGuard {
    /// Key this guard protects.
    #[must_use]
    pub fn key(&self) -> UserKey {
        self.key
    }
}

/// Right to publish side effects for one key, in write order.
#[derive(Debug)]
pub struct AnnounceTicket {
    _guard: OwnedMutexGuard<()>,
}

impl KeyLocks {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handles(&self, key: UserKey) -> (Arc<Mutex<()>>, Arc<Mutex<()>>) {
        let slot = self.slots.entry(key).or_default();
        (Arc::clone(&slot.state), Arc::clone(&slot.announce))
    }

    /// Acquire the state lock for `key`.
    pub async fn lock(&self, key: UserKey) -> StateGuard {
        let (state, _) = self.handles(key);
        StateGuard {
            key,
            _guard: state.lock_owned().await,
        }
    }

    /// Acquire the state locks of two keys in a global order, so two tasks
    /// locking the same pair in opposite roles cannot deadlock.
    ///
    /// When both keys are equal only one guard is taken and the second slot
    /// is `None`.
    pub async fn lock_pair(&self, a: UserKey, b: UserKey) -> (StateGuard, Option<StateGuard>) {
        if a == b {
            return (self.lock(a).await, None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let g1 = self.lock(first).await;
        let g2 = self.lock(second).await;
        if first == a {
            (g1, Some(g2))
        } else {
            (g2, Some(g1))
        }
    }

    /// Take the announce ticket for the key of `held`. Call while the state
    /// lock is still held, then drop the state guard.
    pub async fn ticket(&self, held: &StateGuard) -> AnnounceTicket {
        let (_, announce) = self.handles(held.key);
        AnnounceTicket {
            _guard: announce.lock_owned().await,
        }
    }

    /// Drop slots nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.slots.len();
        self.slots.retain(|_, slot| {
            Arc::strong_count(&slot.state) > 1 || Arc::strong_count(&slot.announce) > 1
        });
        before - self.slots.len()
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no key is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GuildId, UserId};
    use std::time::Duration;

    fn key(user: u64) -> UserKey {
        UserKey::new(UserId(user), GuildId(1))
    }

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = KeyLocks::new();
        let held = locks.lock(key(1)).await;
        let other = locks.clone();
        let waiter = tokio::spawn(async move { other.lock(key(1)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(held);
        let _guard = waiter.await.expect("join");
    }

    #[tokio::test]
    async fn distinct_keys_do_not_contend() {
        let locks = KeyLocks::new();
        let _a = locks.lock(key(1)).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(key(2))).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn pair_returns_guards_in_argument_order() {
        let locks = KeyLocks::new();
        let (g1, g2) = locks.lock_pair(key(9), key(3)).await;
        assert_eq!(g1.key(), key(9));
        assert_eq!(g2.expect("second").key(), key(3));
        let (only, none) = locks.lock_pair(key(5), key(5)).await;
        assert_eq!(only.key(), key(5));
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn prune_keeps_held_slots() {
        let locks = KeyLocks::new();
        let held = locks.lock(key(1)).await;
        drop(locks.lock(key(2)).await);
        assert_eq!(locks.len(), 2);
        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
