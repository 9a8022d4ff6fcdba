//! Argument parsers shared by the command table.

use std::sync::LazyLock;

use chrono::Duration;
use guildkeep_core::error::{EngineError, Result};
use guildkeep_core::{RoleId, UserId};
use guildkeep_platform::MemberRef;
use regex::Regex;

/// Longest duration accepted by user-facing timers and boosts.
#[must_use]
pub fn user_timer_max() -> Duration {
    Duration::days(7)
}

/// Longest duration accepted for member timeouts.
#[must_use]
pub fn timeout_max() -> Duration {
    Duration::days(28)
}

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)([smhd])$").expect("valid regex"));
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^<@!?(\d+)>$").expect("valid regex"));
static ROLE_MENTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^<@&(\d+)>$").expect("valid regex"));
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+)#(\d{4})$").expect("valid regex"));

/// Split `<prefix><name> <args...>` into a lowercased name and its arguments.
/// Returns `None` when `content` is not a command.
#[must_use]
pub fn split_invocation<'a>(prefix: &str, content: &'a str) -> Option<(String, Vec<&'a str>)> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let mut parts = rest.split_whitespace();
    let name = parts.next()?;
    Some((name.to_lowercase(), parts.collect()))
}

/// Parse `<n><unit>` with unit one of `s m h d`, rejecting zero and
/// anything longer than `max`.
///
/// # Errors
/// [`EngineError::InvalidArgument`] on malformed or out-of-range input.
pub fn parse_duration(token: &str, max: Duration) -> Result<Duration> {
    let caps = DURATION_RE
        .captures(token)
        .ok_or_else(|| EngineError::invalid(format!("`{token}` is not a duration like 30m or 2h")))?;
    let value: i64 = caps[1]
        .parse()
        .map_err(|_| EngineError::invalid(format!("`{token}` is too large")))?;
    let unit_seconds = match &caps[2] {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        _ => 86_400,
    };
    let seconds = value
        .checked_mul(unit_seconds)
        .filter(|s| *s <= max.num_seconds())
        .ok_or_else(|| EngineError::invalid(format!("duration may not exceed {}", format_duration(max))))?;
    if seconds == 0 {
        return Err(EngineError::invalid("duration must be positive"));
    }
    Ok(Duration::seconds(seconds))
}

/// Whole minutes from either a bare number of minutes or a duration token.
///
/// # Errors
/// [`EngineError::InvalidArgument`] when the input is malformed, longer
/// than [`user_timer_max`] or shorter than a minute.
pub fn parse_minutes(token: &str) -> Result<i64> {
    let duration = match token.parse::<i64>() {
        Ok(minutes) if minutes > 0 && minutes <= user_timer_max().num_minutes() => Duration::minutes(minutes),
        Ok(_) => {
            return Err(EngineError::invalid(format!(
                "minutes must be between 1 and {}",
                user_timer_max().num_minutes()
            )));
        }
        Err(_) => parse_duration(token, user_timer_max())?,
    };
    match duration.num_minutes() {
        0 => Err(EngineError::invalid("duration must be at least one minute")),
        minutes => Ok(minutes),
    }
}

/// `<@123>`, `<@!123>`, `123` or `name#1234`.
///
/// # Errors
/// [`EngineError::InvalidArgument`] if the token matches none of them.
pub fn parse_member_ref(token: &str) -> Result<MemberRef> {
    if let Some(caps) = MENTION_RE.captures(token) {
        return snowflake(&caps[1]).map(|id| MemberRef::Id(UserId(id)));
    }
    if token.bytes().all(|b| b.is_ascii_digit()) && !token.is_empty() {
        return snowflake(token).map(|id| MemberRef::Id(UserId(id)));
    }
    if let Some(caps) = TAG_RE.captures(token) {
        let discriminator = caps[2]
            .parse()
            .map_err(|_| EngineError::invalid(format!("`{token}` has a bad discriminator")))?;
        return Ok(MemberRef::Tag {
            name: caps[1].to_string(),
            discriminator,
        });
    }
    Err(EngineError::invalid(format!("`{token}` is not a member mention, id or name#1234")))
}

/// `<@&123>` or `123`.
///
/// # Errors
/// [`EngineError::InvalidArgument`] otherwise.
pub fn parse_role(token: &str) -> Result<RoleId> {
    let raw = ROLE_MENTION_RE
        .captures(token)
        .map_or(token, |caps| caps.get(1).map_or(token, |m| m.as_str()));
    snowflake(raw).map(RoleId)
}

/// A strictly positive integer.
///
/// # Errors
/// [`EngineError::InvalidArgument`] for zero, negatives or non-numbers.
pub fn parse_positive(token: &str, what: &str) -> Result<u64> {
    match token.parse::<u64>() {
        Ok(0) | Err(_) => Err(EngineError::invalid(format!("{what} must be a positive whole number"))),
        Ok(n) => Ok(n),
    }
}

/// A finite decimal number.
///
/// # Errors
/// [`EngineError::InvalidArgument`] otherwise.
pub fn parse_multiplier(token: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .ok()
        .filter(|m| m.is_finite())
        .ok_or_else(|| EngineError::invalid(format!("`{token}` is not a number")))
}

fn snowflake(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| EngineError::invalid(format!("`{raw}` is not a valid id")))
}

/// `1d 2h 3m 4s`, skipping zero parts. Partial seconds round up so a
/// remaining wait never shows as `0s`.
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let millis = d.num_milliseconds().max(0);
    let mut secs = millis / 1000 + i64::from(millis % 1000 != 0);
    if secs == 0 {
        return "0s".to_string();
    }
    let mut parts = Vec::with_capacity(4);
    for (unit, size) in [("d", 86_400), ("h", 3600), ("m", 60), ("s", 1)] {
        let n = secs / size;
        if n > 0 {
            parts.push(format!("{n}{unit}"));
            secs %= size;
        }
    }
    parts.join(" ")
}
