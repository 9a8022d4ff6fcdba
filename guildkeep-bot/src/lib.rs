//! # guildkeep-bot: Community Bot Runtime
//!
//! Wires the progression engines in `guildkeep-core` to a chat platform.
//!
//! ```text
//!  platform events ──▶ systems::EventPump ──▶ ingress::Ingress
//!                         (workers, deadline)      │
//!                                                  ├─▶ XpEngine::on_message
//!                                                  │       └─▶ rewards::RewardsMapper
//!                                                  └─▶ commands::Dispatcher
//!                                                          └─▶ XpEngine / EconomyEngine
//! ```
//!
//! ## Modules
//!
//! - `config`: `guildkeep.toml` sections and validation
//! - `events`: what the platform delivers
//! - `commands`: command table, argument parsers, dispatch, reply text
//! - `rewards`: level-up announcements and role rewards
//! - `ingress`: per-event handling
//! - `systems`: worker pool and background tasks
//! - `console`: stdin/stdout adapter for local runs

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod commands;
pub mod config;
pub mod console;
pub mod events;
pub mod ingress;
pub mod rewards;
pub mod systems;

pub use config::GuildkeepConfig;
pub use events::PlatformEvent;
