//! Prefix commands: the registry table, argument parsing and dispatch.
//!
//! Each command is one [`CommandSpec`] row naming its usage, required
//! permissions, ledger cooldown and argument parser. The [`Dispatcher`]
//! walks a message through permission check, parsing, cooldown and
//! execution, and turns the outcome into a reply.

pub mod dispatch;
pub mod parse;
pub mod render;

use guildkeep_core::error::{EngineError, Result};
use guildkeep_core::RoleId;
use guildkeep_platform::{MemberRef, Permissions};

use parse::{parse_member_ref, parse_minutes, parse_multiplier, parse_positive, parse_role};

pub use dispatch::Dispatcher;

/// Boost multiplier when `boostxp` is given none.
pub const DEFAULT_BOOST_MULTIPLIER: f64 = 2.0;

/// Rows shown by `leaderboard`.
pub const LEADERBOARD_SIZE: usize = 10;

/// A parsed invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Level and XP of the caller or a member.
    Xp(Option<MemberRef>),
    /// Level, XP and leaderboard position.
    Rank(Option<MemberRef>),
    /// Top members of the guild.
    Leaderboard,
    /// Wallet and rep.
    Balance(Option<MemberRef>),
    /// Daily claim.
    Daily,
    /// Weekly claim.
    Weekly,
    /// Give one rep point.
    Rep(MemberRef),
    /// List roles for sale.
    Shop,
    /// Buy a listed role.
    Buy(RoleId),
    /// Roll, optionally wagering.
    Dice(Option<u64>),
    /// Admin XP grant.
    GrantXp {
        /// Recipient.
        member: MemberRef,
        /// XP to add.
        amount: u64,
    },
    /// Admin XP boost.
    BoostXp {
        /// Recipient.
        member: MemberRef,
        /// Boost length.
        minutes: i64,
        /// Multiplier.
        multiplier: f64,
    },
    /// Give a badge.
    AwardBadge {
        /// Recipient.
        member: MemberRef,
        /// Badge name.
        badge: String,
    },
    /// Take a badge away.
    RemoveBadge {
        /// Holder.
        member: MemberRef,
        /// Badge name.
        badge: String,
    },
    /// Badges of the caller or a member.
    ListBadges(Option<MemberRef>),
    /// Delete a member's record.
    ResetUser(MemberRef),
    /// List or reprice a role.
    ShopAdd {
        /// Role.
        role: RoleId,
        /// Price.
        price: u64,
    },
    /// Delist a role.
    ShopRemove(RoleId),
    /// Map a level to a reward role.
    SetLevelRole {
        /// Level reached.
        level: u32,
        /// Role granted.
        role: RoleId,
    },
    /// Command overview.
    Help,
}

/// One row of the command table.
pub struct CommandSpec {
    /// Invocation name, lowercase.
    pub name: &'static str,
    /// Argument synopsis shown on bad input.
    pub usage: &'static str,
    /// One-line description for `help`.
    pub summary: &'static str,
    /// Bits the caller must hold.
    pub permissions: Permissions,
    /// Per-user ledger cooldown in seconds; 0 for none.
    pub cooldown_secs: u64,
    /// Argument parser.
    pub parse: fn(&[&str]) -> Result<Command>,
}

impl std::fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("permissions", &self.permissions)
            .field("cooldown_secs", &self.cooldown_secs)
            .finish_non_exhaustive()
    }
}

fn arity(args: &[&str], min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&args.len()) {
        Ok(())
    } else if args.len() < min {
        Err(EngineError::invalid("missing arguments"))
    } else {
        Err(EngineError::invalid("too many arguments"))
    }
}

fn optional_member(args: &[&str]) -> Result<Option<MemberRef>> {
    arity(args, 0, 1)?;
    args.first().map(|a| parse_member_ref(a)).transpose()
}

fn no_args(args: &[&str], command: Command) -> Result<Command> {
    arity(args, 0, 0)?;
    Ok(command)
}

/// Every command the bot understands.
pub static REGISTRY: &[CommandSpec] = &[
    CommandSpec {
        name: "xp",
        usage: "xp [member]",
        summary: "Show level and XP",
        permissions: Permissions::empty(),
        cooldown_secs: 0,
        parse: |args| optional_member(args).map(Command::Xp),
    },
    CommandSpec {
        name: "rank",
        usage: "rank [member]",
        summary: "Show level, XP and leaderboard position",
        permissions: Permissions::empty(),
        cooldown_secs: 5,
        parse: |args| optional_member(args).map(Command::Rank),
    },
    CommandSpec {
        name: "leaderboard",
        usage: "leaderboard",
        summary: "Top members by level",
        permissions: Permissions::empty(),
        cooldown_secs: 10,
        parse: |args| no_args(args, Command::Leaderboard),
    },
    CommandSpec {
        name: "balance",
        usage: "balance [member]",
        summary: "Show wallet and rep",
        permissions: Permissions::empty(),
        cooldown_secs: 0,
        parse: |args| optional_member(args).map(Command::Balance),
    },
    CommandSpec {
        name: "daily",
        usage: "daily",
        summary: "Claim the daily reward",
        permissions: Permissions::empty(),
        cooldown_secs: 0,
        parse: |args| no_args(args, Command::Daily),
    },
    CommandSpec {
        name: "weekly",
        usage: "weekly",
        summary: "Claim the weekly reward",
        permissions: Permissions::empty(),
        cooldown_secs: 0,
        parse: |args| no_args(args, Command::Weekly),
    },
    CommandSpec {
        name: "rep",
        usage: "rep <member>",
        summary: "Give a member one reputation point",
        permissions: Permissions::empty(),
        cooldown_secs: 0,
        parse: |args| {
            arity(args, 1, 1)?;
            parse_member_ref(args[0]).map(Command::Rep)
        },
    },
    CommandSpec {
        name: "shop",
        usage: "shop",
        summary: "List roles for sale",
        permissions: Permissions::empty(),
        cooldown_secs: 0,
        parse: |args| no_args(args, Command::Shop),
    },
    CommandSpec {
        name: "buy",
        usage: "buy <role>",
        summary: "Buy a role from the shop",
        permissions: Permissions::empty(),
        cooldown_secs: 3,
        parse: |args| {
            arity(args, 1, 1)?;
            parse_role(args[0]).map(Command::Buy)
        },
    },
    CommandSpec {
        name: "dice",
        usage: "dice [amount]",
        summary: "Roll 1-100, optionally wagering coins on a high roll",
        permissions: Permissions::empty(),
        cooldown_secs: 5,
        parse: |args| {
            arity(args, 0, 1)?;
            let wager = args.first().map(|a| parse_positive(a, "wager")).transpose()?;
            Ok(Command::Dice(wager))
        },
    },
    CommandSpec {
        name: "grantxp",
        usage: "grantxp <member> <amount>",
        summary: "Give a member XP",
        permissions: Permissions::ADMINISTRATOR,
        cooldown_secs: 0,
        parse: |args| {
            arity(args, 2, 2)?;
            Ok(Command::GrantXp {
                member: parse_member_ref(args[0])?,
                amount: parse_positive(args[1], "amount")?,
            })
        },
    },
    CommandSpec {
        name: "boostxp",
        usage: "boostxp <member> <minutes|duration> [multiplier]",
        summary: "Multiply a member's message XP for a while",
        permissions: Permissions::ADMINISTRATOR,
        cooldown_secs: 0,
        parse: |args| {
            arity(args, 2, 3)?;
            Ok(Command::BoostXp {
                member: parse_member_ref(args[0])?,
                minutes: parse_minutes(args[1])?,
                multiplier: args
                    .get(2)
                    .map(|a| parse_multiplier(a))
                    .transpose()?
                    .unwrap_or(DEFAULT_BOOST_MULTIPLIER),
            })
        },
    },
    CommandSpec {
        name: "awardbadge",
        usage: "awardbadge <member> <badge>",
        summary: "Give a member a badge",
        permissions: Permissions::MANAGE_GUILD,
        cooldown_secs: 0,
        parse: |args| {
            arity(args, 2, 2)?;
            Ok(Command::AwardBadge {
                member: parse_member_ref(args[0])?,
                badge: args[1].to_string(),
            })
        },
    },
    CommandSpec {
        name: "removebadge",
        usage: "removebadge <member> <badge>",
        summary: "Take a badge from a member",
        permissions: Permissions::MANAGE_GUILD,
        cooldown_secs: 0,
        parse: |args| {
            arity(args, 2, 2)?;
            Ok(Command::RemoveBadge {
                member: parse_member_ref(args[0])?,
                badge: args[1].to_string(),
            })
        },
    },
    CommandSpec {
        name: "listbadges",
        usage: "listbadges [member]",
        summary: "Show badges",
        permissions: Permissions::empty(),
        cooldown_secs: 0,
        parse: |args| optional_member(args).map(Command::ListBadges),
    },
    CommandSpec {
        name: "resetuser",
        usage: "resetuser <member>",
        summary: "Erase a member's XP, wallet, boost and inventory",
        permissions: Permissions::MANAGE_GUILD,
        cooldown_secs: 0,
        parse: |args| {
            arity(args, 1, 1)?;
            parse_member_ref(args[0]).map(Command::ResetUser)
        },
    },
    CommandSpec {
        name: "shopadd",
        usage: "shopadd <role> <price>",
        summary: "List or reprice a role in the shop",
        permissions: Permissions::MANAGE_GUILD,
        cooldown_secs: 0,
        parse: |args| {
            arity(args, 2, 2)?;
            Ok(Command::ShopAdd {
                role: parse_role(args[0])?,
                price: parse_positive(args[1], "price")?,
            })
        },
    },
    CommandSpec {
        name: "shopremove",
        usage: "shopremove <role>",
        summary: "Remove a role from the shop",
        permissions: Permissions::MANAGE_GUILD,
        cooldown_secs: 0,
        parse: |args| {
            arity(args, 1, 1)?;
            parse_role(args[0]).map(Command::ShopRemove)
        },
    },
    CommandSpec {
        name: "setlevelrole",
        usage: "setlevelrole <level> <role>",
        summary: "Grant a role on reaching a level",
        permissions: Permissions::MANAGE_GUILD,
        cooldown_secs: 0,
        parse: |args| {
            arity(args, 2, 2)?;
            let level = parse_positive(args[0], "level")?;
            let level = u32::try_from(level).map_err(|_| EngineError::invalid("level is too large"))?;
            Ok(Command::SetLevelRole {
                level,
                role: parse_role(args[1])?,
            })
        },
    },
    CommandSpec {
        name: "help",
        usage: "help",
        summary: "List commands",
        permissions: Permissions::empty(),
        cooldown_secs: 0,
        parse: |_| Ok(Command::Help),
    },
];

/// Registry row for `name`.
#[must_use]
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    REGISTRY.iter().find(|spec| spec.name == name)
}
