//! Level curve: reaching level `n` takes `5·n²` experience.

use serde::{Deserialize, Serialize};

pub const EXP_PER_LEVEL_UNIT: i64 = 5;

/// Highest reachable level. Experience beyond its threshold counts toward it.
pub const MAX_LEVEL: u32 = 1_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: u32,
    pub exp: i64,
    /// Experience at which the current level was reached.
    pub current_level_exp: i64,
    pub next_level_exp: i64,
    /// Progress through the current level, in `0.0..100.0`.
    pub percent: f64,
}

/// `floor(sqrt(exp / 5))`, capped at [`MAX_LEVEL`]; negative experience
/// counts as zero.
pub fn level_for_exp(exp: i64) -> u32 {
    if exp <= 0 {
        return 0;
    }
    let exp = capped(exp);
    let mut level = ((exp as f64) / EXP_PER_LEVEL_UNIT as f64).sqrt().floor() as u32;
    // Correct float rounding near perfect squares.
    while exp_for_level(level + 1) <= exp {
        level += 1;
    }
    while level > 0 && exp_for_level(level) > exp {
        level -= 1;
    }
    level
}

/// Total experience needed to reach `level`.
pub fn exp_for_level(level: u32) -> i64 {
    let level = i64::from(level);
    level.saturating_mul(level).saturating_mul(EXP_PER_LEVEL_UNIT)
}

pub fn next_level_exp(level: u32) -> i64 {
    exp_for_level(level.saturating_add(1))
}

pub fn level_progress(exp: i64) -> LevelProgress {
    let level = level_for_exp(exp);
    let current_level_exp = exp_for_level(level);
    let next_level_exp = next_level_exp(level);
    let gained = (capped(exp) - current_level_exp).max(0) as f64;
    let percent = gained / (next_level_exp - current_level_exp) as f64 * 100.0;
    LevelProgress {
        level,
        exp,
        current_level_exp,
        next_level_exp,
        percent,
    }
}

fn capped(exp: i64) -> i64 {
    exp.min(exp_for_level(MAX_LEVEL))
}
