//! Tuning knobs of the write buffer.

use std::time::Duration;

use crate::store::error::{invalid_argument, StoreResult};
use crate::store::MAX_BATCH_WRITES;
use crate::util::backoff::BackoffConfig;

/// Default quiet period before queued writes are flushed (30 seconds).
pub const DEFAULT_DEBOUNCE_MILLIS: u64 = 30_000;
/// Default lifetime of a delete tombstone (5 minutes).
pub const DEFAULT_TOMBSTONE_TTL_MILLIS: u64 = 5 * 60 * 1_000;

#[derive(Clone, Debug, PartialEq)]
pub struct SyncSettings {
    debounce: Duration,
    tombstone_ttl: Duration,
    max_batch_writes: usize,
    retry: BackoffConfig,
}

impl SyncSettings {
    /// Creates settings after validating values.
    pub fn new(debounce: Duration, tombstone_ttl: Duration) -> StoreResult<Self> {
        validate_tombstone_ttl(tombstone_ttl)?;
        Ok(Self {
            debounce,
            tombstone_ttl,
            ..Self::default()
        })
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn tombstone_ttl(&self) -> Duration {
        self.tombstone_ttl
    }

    pub fn max_batch_writes(&self) -> usize {
        self.max_batch_writes
    }

    pub fn retry(&self) -> &BackoffConfig {
        &self.retry
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_tombstone_ttl(mut self, ttl: Duration) -> StoreResult<Self> {
        validate_tombstone_ttl(ttl)?;
        self.tombstone_ttl = ttl;
        Ok(self)
    }

    pub fn with_max_batch_writes(mut self, max: usize) -> StoreResult<Self> {
        if max == 0 || max > MAX_BATCH_WRITES {
            return Err(invalid_argument(format!(
                "max_batch_writes must be between 1 and {MAX_BATCH_WRITES}"
            )));
        }
        self.max_batch_writes = max;
        Ok(self)
    }

    pub fn with_retry(mut self, retry: BackoffConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MILLIS),
            tombstone_ttl: Duration::from_millis(DEFAULT_TOMBSTONE_TTL_MILLIS),
            max_batch_writes: MAX_BATCH_WRITES,
            retry: BackoffConfig::default(),
        }
    }
}

fn validate_tombstone_ttl(ttl: Duration) -> StoreResult<()> {
    if ttl.is_zero() {
        return Err(invalid_argument("tombstone_ttl must be greater than zero"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.debounce(), Duration::from_secs(30));
        assert_eq!(settings.tombstone_ttl(), Duration::from_secs(300));
        assert_eq!(settings.max_batch_writes(), MAX_BATCH_WRITES);
    }

    #[test]
    fn validates_values() {
        let err = SyncSettings::new(Duration::from_secs(1), Duration::ZERO).unwrap_err();
        assert_eq!(err.code_str(), "store/invalid-argument");
        assert!(SyncSettings::default().with_max_batch_writes(0).is_err());
        assert!(SyncSettings::default().with_max_batch_writes(501).is_err());
        assert_eq!(
            SyncSettings::default()
                .with_max_batch_writes(2)
                .unwrap()
                .max_batch_writes(),
            2
        );
    }
}
