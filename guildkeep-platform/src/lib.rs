//! # guildkeep-platform: Chat Platform Adapter
//!
//! The bot never talks to a chat service directly. Everything it needs from
//! one goes through the [`Platform`] trait:
//!
//!   - member lookup and resolution of `@mention` / id / `name#1234` refs
//!   - role grants and revocations
//!   - outbound messages
//!
//! On top of the trait this crate provides:
//!
//!   - [`retry`]: bounded exponential backoff for transient failures
//!   - [`queue::GrantQueue`]: background role grants that survive hiccups
//!   - [`mock::MockPlatform`]: in-memory platform for tests and local runs

pub mod error;
pub mod mock;
pub mod platform;
pub mod queue;
pub mod retry;
pub mod types;

pub use error::PlatformError;
pub use mock::MockPlatform;
pub use platform::Platform;
pub use types::{Member, MemberRef, Permissions};
