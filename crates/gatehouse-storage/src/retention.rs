//! Size-bounded retention for the daily transaction files.
//!
//! When the daily files together exceed the configured cap, whole files are
//! deleted oldest first (by modification time) until
//! `min(usage - cap, cap * cleanup_fraction)` bytes have been freed. The
//! current day's file is only deleted when every older file together cannot
//! free enough.

use crate::config::StorageConfig;
use crate::error::StorageResult;
use crate::transaction_log::{daily_file_name, is_daily_file};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug)]
struct DailyFile {
    path: PathBuf,
    name: String,
    len: u64,
    modified: SystemTime,
}

fn list_daily_files(dir: &Path) -> StorageResult<Vec<DailyFile>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !is_daily_file(&name) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        files.push(DailyFile {
            path: entry.path(),
            name,
            len: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    Ok(files)
}

/// Total bytes used by the daily files in `dir`.
pub fn usage_bytes(dir: &Path) -> StorageResult<u64> {
    Ok(list_daily_files(dir)?.iter().map(|f| f.len).sum())
}

/// Delete daily files oldest first until at least `target` bytes are freed.
///
/// The file for `today` is kept unless the other files cannot free `target`
/// bytes. Returns the number of bytes freed; files that fail to delete are
/// logged and skipped.
pub fn purge_oldest(dir: &Path, target: u64, today: NaiveDate) -> StorageResult<u64> {
    let mut files = list_daily_files(dir)?;
    files.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));

    let today_name = daily_file_name(today);
    let (todays, older): (Vec<_>, Vec<_>) = files.into_iter().partition(|f| f.name == today_name);

    let mut freed = 0u64;
    for file in older.iter().chain(todays.iter()) {
        if freed >= target {
            break;
        }
        if file.name == today_name {
            warn!(file = %file.name, "deleting current day's transaction file to meet storage cap");
        }
        match std::fs::remove_file(&file.path) {
            Ok(()) => {
                freed += file.len;
                info!(file = %file.name, bytes = file.len, "purged transaction file");
            }
            Err(e) => error!(file = %file.name, error = %e, "failed to purge transaction file"),
        }
    }

    info!(freed_bytes = freed, target_bytes = target, "transaction purge completed");
    Ok(freed)
}

/// Storage usage figures for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StorageMetrics {
    pub bytes_used: u64,
    pub cap_bytes: u64,
    pub cleanup_fraction: f64,
}

/// Enforces the storage cap on a transaction directory.
#[derive(Debug, Clone)]
pub struct RetentionMonitor {
    dir: PathBuf,
    config: StorageConfig,
}

impl RetentionMonitor {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            dir: config.transactions_dir(),
            config,
        }
    }

    /// Current usage against the cap.
    pub fn metrics(&self) -> StorageResult<StorageMetrics> {
        Ok(StorageMetrics {
            bytes_used: usage_bytes(&self.dir)?,
            cap_bytes: self.config.max_bytes,
            cleanup_fraction: self.config.cleanup_fraction,
        })
    }

    /// Purge until usage is at or below the cap. Returns the bytes freed.
    ///
    /// Stops early if a pass frees nothing, so undeletable files never spin
    /// the monitor.
    pub fn enforce_once(&self) -> StorageResult<u64> {
        let mut total_freed = 0;
        loop {
            let usage = usage_bytes(&self.dir)?;
            if usage <= self.config.max_bytes {
                break;
            }

            let target = self.config.free_target(usage);
            warn!(
                usage_bytes = usage,
                cap_bytes = self.config.max_bytes,
                target_bytes = target,
                "transaction storage exceeded cap, purging oldest files"
            );

            let freed = purge_oldest(&self.dir, target, Local::now().date_naive())?;
            if freed == 0 {
                error!(usage_bytes = usage, "storage cap exceeded but nothing could be purged");
                break;
            }
            total_freed += freed;
        }
        Ok(total_freed)
    }

    /// Run [`enforce_once`](Self::enforce_once) on the check interval until
    /// `shutdown` changes or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let interval = self.config.effective_check_interval();
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "retention monitor started");
            loop {
                if let Err(e) = self.enforce_once() {
                    error!(error = %e, "retention check failed");
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.changed() => break,
                }
            }
            info!("retention monitor stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::FileTimes;
    use std::time::Duration;

    fn write_day(dir: &Path, date: NaiveDate, bytes: usize, age_secs: u64) {
        let path = dir.join(daily_file_name(date));
        std::fs::write(&path, vec![b'x'; bytes]).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_secs);
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_times(FileTimes::new().set_modified(mtime)).unwrap();
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, d).unwrap()
    }

    fn remaining(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = list_daily_files(dir).unwrap().into_iter().map(|f| f.name).collect();
        names.sort();
        names
    }

    #[test]
    fn test_usage_counts_daily_files_only() {
        let dir = tempfile::tempdir().unwrap();
        write_day(dir.path(), day(1), 100, 10);
        write_day(dir.path(), day(2), 50, 5);
        std::fs::write(dir.path().join("other.txt"), vec![0u8; 1_000]).unwrap();

        assert_eq!(usage_bytes(dir.path()).unwrap(), 150);
    }

    #[test]
    fn test_purge_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        write_day(dir.path(), day(1), 100, 300);
        write_day(dir.path(), day(2), 100, 200);
        write_day(dir.path(), day(3), 100, 100);

        let freed = purge_oldest(dir.path(), 150, day(3)).unwrap();
        assert_eq!(freed, 200);
        assert_eq!(remaining(dir.path()), vec![daily_file_name(day(3))]);
    }

    #[test]
    fn test_purge_keeps_today_when_possible() {
        let dir = tempfile::tempdir().unwrap();
        // Today's file is the oldest by mtime but must survive
        write_day(dir.path(), day(5), 100, 500);
        write_day(dir.path(), day(4), 100, 100);

        let freed = purge_oldest(dir.path(), 80, day(5)).unwrap();
        assert_eq!(freed, 100);
        assert_eq!(remaining(dir.path()), vec![daily_file_name(day(5))]);
    }

    #[test]
    fn test_purge_deletes_today_when_unavoidable() {
        let dir = tempfile::tempdir().unwrap();
        write_day(dir.path(), day(1), 10, 100);
        write_day(dir.path(), day(2), 500, 10);

        let freed = purge_oldest(dir.path(), 200, day(2)).unwrap();
        assert_eq!(freed, 510);
        assert!(remaining(dir.path()).is_empty());
    }

    #[test]
    fn test_enforce_brings_usage_under_cap() {
        let base = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(base.path()).max_bytes(250).cleanup_fraction(0.5);
        let tx_dir = config.transactions_dir();
        std::fs::create_dir_all(&tx_dir).unwrap();

        for d in 1..=5 {
            write_day(&tx_dir, day(d), 100, u64::from(10 - d) * 60);
        }

        let monitor = RetentionMonitor::new(config);
        let freed = monitor.enforce_once().unwrap();

        let metrics = monitor.metrics().unwrap();
        assert!(metrics.bytes_used <= 250);
        assert_eq!(freed, 300);
        assert_eq!(
            remaining(&tx_dir),
            vec![daily_file_name(day(4)), daily_file_name(day(5))]
        );
    }

    #[test]
    fn test_enforce_under_cap_is_noop() {
        let base = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(base.path()).max_bytes(1_000);
        std::fs::create_dir_all(config.transactions_dir()).unwrap();
        write_day(&config.transactions_dir(), day(1), 100, 10);

        let monitor = RetentionMonitor::new(config);
        assert_eq!(monitor.enforce_once().unwrap(), 0);
    }
}
