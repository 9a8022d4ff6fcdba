//! `guildkeep`: runs the bot against the terminal.
//!
//! Reads `<user id> <message>` lines from stdin and prints replies. Stops on
//! Ctrl-C or end of input.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use guildkeep_bot::commands::Dispatcher;
use guildkeep_bot::config::{GuildkeepConfig, LogFormat};
use guildkeep_bot::console::{self, ConsolePlatform, ConsoleSession};
use guildkeep_bot::ingress::{GuildSeed, Ingress};
use guildkeep_bot::rewards::RewardsMapper;
use guildkeep_bot::systems::{self, EventPump};
use guildkeep_core::clock::SystemClock;
use guildkeep_core::cooldown::CooldownLedger;
use guildkeep_core::economy::EconomyEngine;
use guildkeep_core::locks::KeyLocks;
use guildkeep_core::random::SeededRandom;
use guildkeep_core::store::SqliteStore;
use guildkeep_core::sweeper::Sweeper;
use guildkeep_core::xp::XpEngine;
use guildkeep_core::{ChannelId, GuildId};
use guildkeep_platform::queue::GrantQueue;
use guildkeep_platform::Permissions;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Community bot with leveling and an economy.
#[derive(Debug, Parser)]
#[command(name = "guildkeep", version, about)]
struct Args {
    /// Configuration file.
    #[arg(short, long, env = "GUILDKEEP_CONFIG", default_value = "guildkeep.toml")]
    config: PathBuf,

    /// Guild id console messages belong to.
    #[arg(long, default_value_t = 1)]
    guild: u64,

    /// Channel id console messages are posted in.
    #[arg(long, default_value_t = 1)]
    channel: u64,

    /// Give every console user administrator rights.
    #[arg(long)]
    admin: bool,
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::from_default_env().add_directive("guildkeep=info".parse()?);
    let installed = match format {
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!("cannot install log subscriber: {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 1. Config
    let config_found = args.config.exists();
    let mut config = if config_found {
        GuildkeepConfig::from_file(&args.config)?
    } else {
        GuildkeepConfig::default()
    };
    config.apply_env(|key| std::env::var(key).ok());
    init_tracing(config.bot.log_format)?;
    if !config_found {
        warn!(path = %args.config.display(), "Config file not found, using defaults");
    }
    config.validate()?;

    let profile = config.progression.resolve();
    info!(?profile, "Progression profile resolved");

    // 2. Store
    let store = Arc::new(
        SqliteStore::open(&config.store.path, &config.store)
            .with_context(|| format!("cannot open store at {}", config.store.path))?,
    );
    if !store.integrity_check()? {
        bail!("store at {} failed its integrity check", config.store.path);
    }
    info!(path = %config.store.path, "Store opened");

    // 3. Engines
    let clock = Arc::new(SystemClock);
    let rng = Arc::new(SeededRandom::from_entropy());
    let locks = KeyLocks::new();
    let xp = Arc::new(XpEngine::new(
        store.clone(),
        clock.clone(),
        rng.clone(),
        locks.clone(),
        profile.clone(),
    ));
    let economy = Arc::new(EconomyEngine::new(
        store.clone(),
        clock.clone(),
        rng,
        locks.clone(),
        profile,
    ));
    let ledger = Arc::new(CooldownLedger::new(store.clone(), clock.clone()));

    // 4. Platform and handlers
    let platform = Arc::new(ConsolePlatform::new());
    let (grants, grant_worker) = GrantQueue::new(
        platform.clone(),
        config.rewards.retry_policy(),
        config.rewards.queue_capacity,
    );
    let rewards = Arc::new(RewardsMapper::new(platform.clone(), xp.clone(), grants));
    let dispatcher = Dispatcher::new(
        config.bot.prefix.clone(),
        xp.clone(),
        economy.clone(),
        ledger.clone(),
        platform.clone(),
        rewards.clone(),
        config.bot.announce_channel_id,
    );
    let seed = GuildSeed {
        level_roles: config.level_roles()?,
        shop: config.shop_roles()?,
    };
    let ingress = Arc::new(Ingress::new(
        xp,
        economy,
        platform.clone(),
        rewards,
        dispatcher,
        config.bot.announce_channel_id,
        seed,
    ));

    // 5. Tasks
    let (shutdown, _) = broadcast::channel(1);
    let background = systems::spawn_background(
        Sweeper::new(store, clock, ledger, locks),
        Duration::from_secs(config.maintenance.sweep_interval_seconds),
        grant_worker,
        &shutdown,
    );

    let (events_tx, events_rx) = mpsc::channel(config.bot.event_buffer.max(1));
    let session = ConsoleSession {
        guild: GuildId(args.guild),
        channel: ChannelId(args.channel),
        permissions: if args.admin {
            Permissions::ADMINISTRATOR
        } else {
            Permissions::empty()
        },
    };
    let reader = tokio::spawn(console::read_events(platform, session, events_tx));
    let pump = tokio::spawn(
        EventPump::new(ingress, config.bot.workers, config.bot.handler_deadline())
            .run(events_rx, shutdown.subscribe()),
    );
    let interrupt = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                let _ = interrupt.send(());
            }
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });
    info!(prefix = %config.bot.prefix, guild = args.guild, "guildkeep running");

    // 6. Run until Ctrl-C or end of input
    let stats = pump.await?;

    let _ = shutdown.send(());
    reader.abort();
    for task in background {
        let _ = task.await;
    }
    info!(
        handled = stats.handled,
        timed_out = stats.timed_out,
        panicked = stats.panicked,
        "guildkeep stopped"
    );
    Ok(())
}
