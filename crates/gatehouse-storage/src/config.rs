use gatehouse_core::constants::{
    DEFAULT_CLEANUP_FRACTION, DEFAULT_MAX_TX_STORAGE_BYTES, DEFAULT_STORAGE_CHECK_INTERVAL_SECS,
    MIN_STORAGE_CHECK_INTERVAL_SECS,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{StorageError, StorageResult};

/// On-disk layout and retention settings.
///
/// All controller state lives under one base directory:
///
/// ```text
/// <base>/config.json
/// <base>/users.json
/// <base>/blocked_users.json
/// <base>/daily_stats.json
/// <base>/failed_transactions_cache.jsonl
/// <base>/transactions/transactions_YYYYMMDD.jsonl
/// ```
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for all controller files
    pub base_dir: PathBuf,

    /// Cap on the total size of the daily transaction files
    pub max_bytes: u64,

    /// Fraction of the cap freed once the cap is exceeded
    pub cleanup_fraction: f64,

    /// Interval between retention checks (never below one minute)
    pub check_interval: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            max_bytes: DEFAULT_MAX_TX_STORAGE_BYTES,
            cleanup_fraction: DEFAULT_CLEANUP_FRACTION,
            check_interval: Duration::from_secs(DEFAULT_STORAGE_CHECK_INTERVAL_SECS),
        }
    }
}

impl StorageConfig {
    /// Create a new storage configuration rooted at `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Default::default()
        }
    }

    /// Set the transaction storage cap in bytes
    pub fn max_bytes(mut self, max: u64) -> Self {
        self.max_bytes = max;
        self
    }

    /// Set the transaction storage cap in gigabytes
    pub fn max_gigabytes(mut self, gb: f64) -> Self {
        self.max_bytes = (gb * 1024.0 * 1024.0 * 1024.0) as u64;
        self
    }

    /// Set the fraction of the cap to free on cleanup
    pub fn cleanup_fraction(mut self, fraction: f64) -> Self {
        self.cleanup_fraction = fraction;
        self
    }

    /// Set the retention check interval
    pub fn check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Check the settings before the stores are opened.
    pub fn validate(&self) -> StorageResult<()> {
        if self.max_bytes == 0 {
            return Err(StorageError::Configuration(
                "transaction storage cap must be positive".into(),
            ));
        }
        if !(self.cleanup_fraction > 0.0 && self.cleanup_fraction <= 1.0) {
            return Err(StorageError::Configuration(format!(
                "cleanup fraction must be in (0, 1], got {}",
                self.cleanup_fraction
            )));
        }
        Ok(())
    }

    /// Retention interval with the one-minute floor applied.
    pub fn effective_check_interval(&self) -> Duration {
        self.check_interval
            .max(Duration::from_secs(MIN_STORAGE_CHECK_INTERVAL_SECS))
    }

    /// Bytes to free once usage exceeds the cap.
    pub fn free_target(&self, usage: u64) -> u64 {
        let by_fraction = (self.max_bytes as f64 * self.cleanup_fraction) as u64;
        usage.saturating_sub(self.max_bytes).min(by_fraction)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn transactions_dir(&self) -> PathBuf {
        self.base_dir.join("transactions")
    }

    pub fn config_path(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    pub fn users_path(&self) -> PathBuf {
        self.base_dir.join("users.json")
    }

    pub fn blocked_path(&self) -> PathBuf {
        self.base_dir.join("blocked_users.json")
    }

    pub fn stats_path(&self) -> PathBuf {
        self.base_dir.join("daily_stats.json")
    }

    pub fn failure_cache_path(&self) -> PathBuf {
        self.base_dir.join("failed_transactions_cache.jsonl")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert_eq!(config.max_bytes, 16 * 1024 * 1024 * 1024);
        assert_eq!(config.cleanup_fraction, 0.5);
        assert_eq!(config.check_interval, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = StorageConfig::new("/var/lib/gatehouse")
            .max_gigabytes(2.0)
            .cleanup_fraction(0.25)
            .check_interval(Duration::from_secs(10));

        assert_eq!(config.max_bytes, 2 * 1024 * 1024 * 1024);
        assert_eq!(config.effective_check_interval(), Duration::from_secs(60));
        assert_eq!(
            config.transactions_dir(),
            PathBuf::from("/var/lib/gatehouse/transactions")
        );
    }

    #[rstest]
    #[case(0.0)]
    #[case(-0.1)]
    #[case(1.5)]
    fn test_invalid_fraction(#[case] fraction: f64) {
        let config = StorageConfig::default().cleanup_fraction(fraction);
        assert!(config.validate().is_err());
    }

    #[rstest]
    #[case(900, 0)]
    #[case(1_100, 100)]
    #[case(5_000, 500)]
    fn test_free_target(#[case] usage: u64, #[case] expected: u64) {
        let config = StorageConfig::default().max_bytes(1_000).cleanup_fraction(0.5);
        assert_eq!(config.free_target(usage), expected);
    }
}
