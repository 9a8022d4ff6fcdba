//! # guildkeep-core: Member Progression & Economy Engine
//!
//! Platform-agnostic core of the guildkeep community bot. Every
//! `(user, guild)` pair owns a [`UserState`] holding experience, level,
//! wallet and reputation, mutated only through the engines in this crate:
//!
//! - [`xp::XpEngine`]: message XP with cooldowns, boosts and level transitions
//! - [`economy::EconomyEngine`]: daily/weekly claims, rep, shop purchases, dice
//! - [`cooldown::CooldownLedger`]: per-user, per-command rate limits
//! - [`sweeper::Sweeper`]: expiry of boosts and stale ledger rows
//!
//! ## Serialization discipline
//!
//! Every read-modify-write runs under the per-key lock from
//! [`locks::KeyLocks`], and every multi-row write is a single
//! [`store::Store::apply`] batch, so interleaved commands never observe
//! half-applied state.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod clock;
pub mod config;
pub mod cooldown;
pub mod curve;
pub mod economy;
pub mod error;
pub mod locks;
pub mod random;
pub mod store;
pub mod sweeper;
pub mod types;
pub mod xp;

pub use config::{ProgressionConfig, ProgressionProfile};
pub use error::{EngineError, StoreError};
pub use types::*;
