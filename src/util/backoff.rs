use std::time::Duration;

use rand::Rng;

pub const DEFAULT_INTERVAL_MILLIS: u64 = 1_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_MAX_INTERVAL_MILLIS: u64 = 5 * 60 * 1_000;
pub const RANDOM_FACTOR: f64 = 0.5;

/// Exponential backoff with jitter, used to space out retried flushes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub interval_millis: u64,
    pub backoff_factor: f64,
    pub max_interval_millis: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            interval_millis: DEFAULT_INTERVAL_MILLIS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            max_interval_millis: DEFAULT_MAX_INTERVAL_MILLIS,
        }
    }
}

impl BackoffConfig {
    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_with_rng(attempt, *self, &mut rand::thread_rng()))
    }
}

fn calculate_backoff_with_rng<R: Rng + ?Sized>(attempt: u32, config: BackoffConfig, rng: &mut R) -> u64 {
    let exponent = attempt.min(i32::MAX as u32) as i32;
    let base = (config.interval_millis as f64) * config.backoff_factor.powi(exponent);
    let jitter = RANDOM_FACTOR * base * rng.gen_range(-1.0..=1.0);
    (base + jitter)
        .round()
        .clamp(0.0, config.max_interval_millis as f64) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn deterministic_with_seeded_rng() {
        let mut rng = StdRng::seed_from_u64(42);
        let value = calculate_backoff_with_rng(3, BackoffConfig::default(), &mut rng);
        assert!(value > 0);
        assert!(value <= DEFAULT_MAX_INTERVAL_MILLIS);
    }

    #[test]
    fn backoff_grows_with_attempts() {
        let mut rng = StdRng::seed_from_u64(1);
        let first = calculate_backoff_with_rng(0, BackoffConfig::default(), &mut rng);
        let mut rng = StdRng::seed_from_u64(1);
        let later = calculate_backoff_with_rng(4, BackoffConfig::default(), &mut rng);
        assert!(later >= first);
    }

    #[test]
    fn delay_is_capped() {
        let config = BackoffConfig {
            max_interval_millis: 10,
            ..Default::default()
        };
        assert!(config.delay(30) <= Duration::from_millis(10));
    }
}
