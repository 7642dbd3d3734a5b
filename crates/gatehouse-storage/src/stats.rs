//! Per-day access counters persisted to `daily_stats.json`.
//!
//! File shape, keyed by local date:
//!
//! ```json
//! { "2025-06-01": { "date": "2025-06-01", "valid_entries": 12,
//!                   "invalid_entries": 3, "blocked_entries": 0 } }
//! ```

use crate::error::StorageResult;
use chrono::{Local, NaiveDate};
use gatehouse_core::persist::{read_json_or_default, write_json_atomic};
use gatehouse_core::{AccessStatus, TodayCounts};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Counters for one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayRow {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub valid_entries: u64,
    #[serde(default)]
    pub invalid_entries: u64,
    #[serde(default)]
    pub blocked_entries: u64,
}

impl DayRow {
    fn counts(&self) -> TodayCounts {
        TodayCounts {
            granted: self.valid_entries,
            denied: self.invalid_entries,
            blocked: self.blocked_entries,
            total: self.valid_entries + self.invalid_entries + self.blocked_entries,
        }
    }
}

/// Daily counters with write-through persistence.
#[derive(Debug)]
pub struct DailyStats {
    path: PathBuf,
    rows: Mutex<BTreeMap<String, DayRow>>,
}

impl DailyStats {
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let rows = read_json_or_default(&path);
        Self {
            path,
            rows: Mutex::new(rows),
        }
    }

    /// Count one transaction on `date` and persist.
    ///
    /// The in-memory counter is kept even if the write fails.
    pub fn record(&self, date: NaiveDate, status: AccessStatus) -> StorageResult<()> {
        let key = date.format("%Y-%m-%d").to_string();
        let mut rows = self.rows.lock();
        let row = rows.entry(key.clone()).or_insert_with(|| DayRow {
            date: key,
            ..Default::default()
        });
        match status {
            AccessStatus::Granted => row.valid_entries += 1,
            AccessStatus::Denied => row.invalid_entries += 1,
            AccessStatus::Blocked => row.blocked_entries += 1,
        }
        write_json_atomic(&self.path, &*rows)?;
        Ok(())
    }

    pub fn counts(&self, date: NaiveDate) -> TodayCounts {
        self.rows
            .lock()
            .get(&date.format("%Y-%m-%d").to_string())
            .map(DayRow::counts)
            .unwrap_or_default()
    }

    /// Counters for the controller's current local day.
    pub fn today(&self) -> TodayCounts {
        self.counts(Local::now().date_naive())
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily_stats.json");
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let stats = DailyStats::load(&path);
        stats.record(date, AccessStatus::Granted).unwrap();
        stats.record(date, AccessStatus::Granted).unwrap();
        stats.record(date, AccessStatus::Blocked).unwrap();

        let counts = DailyStats::load(&path).counts(date);
        assert_eq!(
            counts,
            TodayCounts {
                granted: 2,
                denied: 0,
                blocked: 1,
                total: 3
            }
        );
    }

    #[test]
    fn test_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daily_stats.json");
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        DailyStats::load(&path).record(date, AccessStatus::Denied).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["2025-06-01"]["invalid_entries"], 1);
        assert_eq!(json["2025-06-01"]["date"], "2025-06-01");
    }

    #[test]
    fn test_unknown_day_is_zero() {
        let dir = tempfile::tempdir().unwrap();
        let stats = DailyStats::load(dir.path().join("daily_stats.json"));
        assert_eq!(stats.today(), TodayCounts::default());
    }
}
