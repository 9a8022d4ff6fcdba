//! Level thresholds and the level-settlement loop.
//!
//! `threshold(L)` is the XP needed to advance from level `L` to `L + 1`.
//! Settling subtracts thresholds until the remainder is below the current
//! level's threshold, so one grant may cross several levels.

use serde::{Deserialize, Serialize};

use crate::types::{LevelUp, UserState};

/// Progression curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LevelCurve {
    /// `5·L² + 50·L + 100`.
    #[default]
    Quadratic,
    /// `per_level · L`.
    Linear {
        /// XP per level step.
        per_level: u64,
    },
}

impl LevelCurve {
    /// XP required to leave `level`.
    #[must_use]
    pub fn threshold(self, level: u32) -> u64 {
        let l = u64::from(level);
        match self {
            Self::Quadratic => 5 * l * l + 50 * l + 100,
            Self::Linear { per_level } => per_level.max(1).saturating_mul(l.max(1)),
        }
    }

    /// Settle `state`: convert surplus XP into levels.
    ///
    /// Returns one [`LevelUp`] per level crossed, in increasing order.
    pub fn settle(self, state: &mut UserState) -> Vec<LevelUp> {
        let mut ups = Vec::new();
        loop {
            let needed = self.threshold(state.level);
            if state.xp < needed {
                break;
            }
            state.xp -= needed;
            state.level += 1;
            ups.push(LevelUp {
                key: state.key,
                new_level: state.level,
            });
        }
        ups
    }

    /// Total XP needed to go from level 1 to `level` with zero carry-over.
    #[must_use]
    pub fn cumulative(self, level: u32) -> u64 {
        (1..level).map(|l| self.threshold(l)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GuildId, UserId, UserKey};

    fn state(xp: u64, level: u32) -> UserState {
        UserState {
            xp,
            level,
            ..UserState::new(UserKey::new(UserId(7), GuildId(9)))
        }
    }

    #[test]
    fn quadratic_thresholds() {
        assert_eq!(LevelCurve::Quadratic.threshold(1), 155);
        assert_eq!(LevelCurve::Quadratic.threshold(2), 220);
        assert_eq!(LevelCurve::Quadratic.threshold(10), 1100);
    }

    #[test]
    fn linear_thresholds() {
        let curve = LevelCurve::Linear { per_level: 100 };
        assert_eq!(curve.threshold(1), 100);
        assert_eq!(curve.threshold(4), 400);
    }

    #[test]
    fn settle_single_step() {
        let mut s = state(170, 1);
        let ups = LevelCurve::Quadratic.settle(&mut s);
        assert_eq!(ups.len(), 1);
        assert_eq!(ups[0].new_level, 2);
        assert_eq!((s.xp, s.level), (15, 2));
    }

    #[test]
    fn settle_multiple_steps_in_order() {
        // 155 + 220 + 295 = 670 takes level 1 to level 4.
        let mut s = state(680, 1);
        let ups = LevelCurve::Quadratic.settle(&mut s);
        let levels: Vec<u32> = ups.iter().map(|u| u.new_level).collect();
        assert_eq!(levels, vec![2, 3, 4]);
        assert_eq!((s.xp, s.level), (10, 4));
    }

    #[test]
    fn settle_below_threshold_is_noop() {
        let mut s = state(154, 1);
        assert!(LevelCurve::Quadratic.settle(&mut s).is_empty());
        assert_eq!((s.xp, s.level), (154, 1));
    }

    #[test]
    fn cumulative_matches_sum() {
        assert_eq!(LevelCurve::Quadratic.cumulative(1), 0);
        assert_eq!(LevelCurve::Quadratic.cumulative(3), 155 + 220);
    }

    #[test]
    fn curve_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            curve: LevelCurve,
        }
        let w: Wrapper = toml::from_str("curve = { kind = \"linear\", per_level = 100 }")
            .expect("parse");
        assert_eq!(w.curve, LevelCurve::Linear { per_level: 100 });
    }
}
