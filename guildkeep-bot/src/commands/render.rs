//! Reply text for command outcomes.

use std::fmt::Write as _;

use guildkeep_core::economy::{Claim, Claimed, DiceRoll, Purchase};
use guildkeep_core::xp::RankInfo;
use guildkeep_core::{Boost, EngineError, RoleId, ShopEntry, UserId, UserState};

use super::parse::format_duration;
use super::{CommandSpec, REGISTRY};

/// `<@id>`.
#[must_use]
pub fn mention(user: UserId) -> String {
    format!("<@{user}>")
}

/// `xp` reply.
#[must_use]
pub fn xp(info: &RankInfo) -> String {
    format!(
        "{} is level {} with {}/{} XP.",
        mention(info.state.key.user),
        info.state.level,
        info.state.xp,
        info.threshold
    )
}

/// `rank` reply.
#[must_use]
pub fn rank(info: &RankInfo) -> String {
    let position = info
        .position
        .map_or_else(|| "unranked".to_string(), |p| format!("#{p}"));
    format!(
        "{} is {position}: level {}, {}/{} XP.",
        mention(info.state.key.user),
        info.state.level,
        info.state.xp,
        info.threshold
    )
}

/// `leaderboard` reply.
#[must_use]
pub fn leaderboard(entries: &[UserState]) -> String {
    if entries.is_empty() {
        return "Nobody has earned XP here yet.".to_string();
    }
    let mut out = String::from("Leaderboard\n");
    for (i, state) in entries.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} level {} ({} XP)",
            i + 1,
            mention(state.key.user),
            state.level,
            state.xp
        );
    }
    out.trim_end().to_string()
}

/// `balance` reply.
#[must_use]
pub fn balance(user: UserId, currency: u64, rep: u64) -> String {
    format!("{} has {currency} coins and {rep} rep.", mention(user))
}

/// `daily` / `weekly` reply.
#[must_use]
pub fn claimed(claim: Claim, c: &Claimed) -> String {
    let what = match claim {
        Claim::Daily => "daily",
        Claim::Weekly => "weekly",
    };
    format!("You claimed your {what} {} coins. Balance: {}.", c.amount, c.balance)
}

/// `rep` reply.
#[must_use]
pub fn rep_given(target: UserId, total: u64) -> String {
    format!("You gave {} a rep point. They now have {total}.", mention(target))
}

/// `shop` reply.
#[must_use]
pub fn shop(entries: &[ShopEntry]) -> String {
    if entries.is_empty() {
        return "The shop is empty.".to_string();
    }
    let mut out = String::from("Roles for sale\n");
    for entry in entries {
        let _ = writeln!(out, "<@&{}> for {} coins", entry.role, entry.price);
    }
    out.trim_end().to_string()
}

/// `buy` reply.
#[must_use]
pub fn purchase(p: &Purchase) -> String {
    format!("You bought <@&{}> for {} coins. Balance: {}.", p.role, p.price, p.balance)
}

/// `dice` reply.
#[must_use]
pub fn dice(roll: &DiceRoll) -> String {
    match &roll.wager {
        None => format!("You rolled {}.", roll.roll),
        Some(w) if w.won => format!(
            "You rolled {} and won {} coins. Balance: {}.",
            roll.roll, w.amount, w.balance
        ),
        Some(w) => format!(
            "You rolled {} and lost {} coins. Balance: {}.",
            roll.roll, w.amount, w.balance
        ),
    }
}

/// `grantxp` reply.
#[must_use]
pub fn granted(user: UserId, amount: u64, level: u32) -> String {
    format!("Gave {} {amount} XP. They are level {level}.", mention(user))
}

/// `boostxp` reply.
#[must_use]
pub fn boosted(boost: &Boost, minutes: i64) -> String {
    format!(
        "{} earns {}x XP for the next {}.",
        mention(boost.key.user),
        boost.multiplier,
        format_duration(chrono::Duration::minutes(minutes))
    )
}

/// `listbadges` reply.
#[must_use]
pub fn badges(user: UserId, badges: &[String]) -> String {
    if badges.is_empty() {
        format!("{} has no badges.", mention(user))
    } else {
        format!("{} has: {}", mention(user), badges.join(", "))
    }
}

/// `awardbadge` reply.
#[must_use]
pub fn badge_awarded(user: UserId, badge: &str) -> String {
    format!("Gave {} the `{badge}` badge.", mention(user))
}

/// `removebadge` reply.
#[must_use]
pub fn badge_removed(user: UserId, badge: &str, removed: bool) -> String {
    if removed {
        format!("Took the `{badge}` badge from {}.", mention(user))
    } else {
        format!("{} does not have the `{badge}` badge.", mention(user))
    }
}

/// `resetuser` reply.
#[must_use]
pub fn reset(user: UserId, existed: bool) -> String {
    if existed {
        format!("Reset all progress of {}.", mention(user))
    } else {
        format!("{} has no progress to reset.", mention(user))
    }
}

/// `shopadd` reply.
#[must_use]
pub fn listed(role: RoleId, price: u64) -> String {
    format!("<@&{role}> is now for sale at {price} coins.")
}

/// `shopremove` reply.
#[must_use]
pub fn delisted(role: RoleId) -> String {
    format!("<@&{role}> is no longer for sale.")
}

/// `setlevelrole` reply.
#[must_use]
pub fn level_role_set(level: u32, role: RoleId) -> String {
    format!("Members reaching level {level} will receive <@&{role}>.")
}

/// Level-up announcement.
#[must_use]
pub fn level_up(user: UserId, level: u32) -> String {
    format!("{} reached level {level}!", mention(user))
}

/// Summary announcement for a long run of level-ups.
#[must_use]
pub fn level_run(user: UserId, from: u32, to: u32) -> String {
    format!("{} climbed from level {from} to level {to}!", mention(user))
}

/// `help` reply.
#[must_use]
pub fn help(prefix: &str) -> String {
    let mut out = String::from("Commands\n");
    for spec in REGISTRY {
        let _ = writeln!(out, "{prefix}{} - {}", spec.usage, spec.summary);
    }
    out.trim_end().to_string()
}

/// Reply for a failed command.
#[must_use]
pub fn error(prefix: &str, spec: &CommandSpec, err: &EngineError) -> String {
    match err {
        EngineError::Cooldown { retry_after } => {
            format!("Slow down! Try again in {}.", format_duration(*retry_after))
        }
        EngineError::Insufficient { missing } => {
            format!("You need {missing} more coins.")
        }
        EngineError::NotListed => "That role is not for sale.".to_string(),
        EngineError::AlreadyOwned => "You already have that.".to_string(),
        EngineError::Forbidden(_) => "I am not allowed to do that here.".to_string(),
        EngineError::StoreUnavailable(_) => "Something went wrong, please try again later.".to_string(),
        EngineError::InvalidArgument { reason } => {
            format!("{}. Usage: `{prefix}{}`", capitalise(reason), spec.usage)
        }
        EngineError::PermissionDenied { required } => {
            format!("You need the {required} permission to use this.")
        }
    }
}

fn capitalise(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
