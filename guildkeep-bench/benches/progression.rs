//! guildkeep benchmark suite.
//!
//! Targets on a development laptop:
//!   threshold_settle_level_1_to_100 ..... < 5μs
//!   message_award_in_memory_store ....... < 100μs
//!   leaderboard_top10_of_1000 ........... < 2ms

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use guildkeep_core::clock::ManualClock;
use guildkeep_core::config::ProgressionProfile;
use guildkeep_core::curve::LevelCurve;
use guildkeep_core::locks::KeyLocks;
use guildkeep_core::random::SeededRandom;
use guildkeep_core::store::SqliteStore;
use guildkeep_core::xp::XpEngine;
use guildkeep_core::{GuildId, UserId, UserKey, UserState};

const GUILD: GuildId = GuildId(1);

fn engine() -> XpEngine {
    let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid date");
    XpEngine::new(
        Arc::new(SqliteStore::open_in_memory().expect("open")),
        Arc::new(ManualClock::new(start)),
        Arc::new(SeededRandom::new(7)),
        KeyLocks::new(),
        ProgressionProfile::default(),
    )
}

/// Benchmark: one grant crossing 99 levels (target: < 5μs).
fn bench_settle(c: &mut Criterion) {
    let curve = LevelCurve::Quadratic;
    let total = curve.cumulative(100);
    c.bench_function("threshold_settle_level_1_to_100", |b| {
        b.iter(|| {
            let mut state = UserState::new(UserKey::new(UserId(1), GUILD));
            state.xp = black_box(total);
            let ups = curve.settle(&mut state);
            black_box(ups);
        });
    });
}

/// Benchmark: message XP award including the store write (target: < 100μs).
fn bench_message_award(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let xp = engine();
    let key = UserKey::new(UserId(1), GUILD);
    let mut at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().expect("valid date");
    c.bench_function("message_award_in_memory_store", |b| {
        b.iter(|| {
            at += Duration::seconds(61);
            let award = rt.block_on(xp.on_message(key, at)).expect("award");
            black_box(award);
        });
    });
}

/// Benchmark: top-10 query over 1000 members (target: < 2ms).
fn bench_leaderboard(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");
    let xp = engine();
    for user in 0..1000 {
        let key = UserKey::new(UserId(user), GUILD);
        let _ = rt.block_on(xp.grant_xp(key, 1 + user * 37 % 5000)).expect("grant");
    }
    c.bench_function("leaderboard_top10_of_1000", |b| {
        b.iter(|| {
            let top = xp.leaderboard(black_box(GUILD), 10).expect("leaderboard");
            black_box(top);
        });
    });
}

criterion_group!(benches, bench_settle, bench_message_award, bench_leaderboard);
criterion_main!(benches);
