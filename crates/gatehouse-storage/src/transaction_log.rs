//! Durable transaction log.
//!
//! Every emitted transaction is appended as one compact JSON line to the
//! file for its calendar day, `transactions_YYYYMMDD.jsonl`, and pushed onto
//! a bounded in-memory ring of the most recent records. Queries are served
//! from the ring when it holds enough records, and otherwise by reading the
//! tails of the newest daily files.

use crate::error::StorageResult;
use crate::jsonl::append_transaction;
use chrono::NaiveDate;
use gatehouse_core::Transaction;
use gatehouse_core::constants::{
    DAILY_FILE_PREFIX, JSONL_EXTENSION, RECENT_BUFFER_CAPACITY, TAIL_CHUNK_BYTES,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File name of the daily log for `date`.
pub fn daily_file_name(date: NaiveDate) -> String {
    format!("{DAILY_FILE_PREFIX}{}.{JSONL_EXTENSION}", date.format("%Y%m%d"))
}

/// Whether `name` looks like a daily log file.
pub fn is_daily_file(name: &str) -> bool {
    name.starts_with(DAILY_FILE_PREFIX)
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext == JSONL_EXTENSION)
}

/// Daily log files in `dir`, newest day first.
pub(crate) fn daily_files_newest_first(dir: &Path) -> StorageResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if is_daily_file(name) && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    // YYYYMMDD names sort chronologically
    files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));
    Ok(files)
}

/// Append-only daily log plus the recent ring.
#[derive(Debug)]
pub struct TransactionStore {
    dir: PathBuf,
    recent: Mutex<VecDeque<Transaction>>,
    capacity: usize,
    append_lock: Mutex<()>,
}

impl TransactionStore {
    /// Open the log in `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        Self::with_capacity(dir, RECENT_BUFFER_CAPACITY)
    }

    /// Open the log with a custom recent ring capacity.
    pub fn with_capacity(dir: impl Into<PathBuf>, capacity: usize) -> StorageResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            append_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the daily file for `date`.
    pub fn daily_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(daily_file_name(date))
    }

    /// Record a transaction in the recent ring and the daily file.
    ///
    /// The ring is updated even if the file append fails; the error is
    /// returned for the caller to log.
    pub fn record(&self, tx: &Transaction) -> StorageResult<()> {
        self.remember(tx.clone());
        self.append(tx)
    }

    /// Append to the daily file only.
    pub fn append(&self, tx: &Transaction) -> StorageResult<()> {
        let path = self.daily_path(tx.local_date());
        let _guard = self.append_lock.lock();
        append_transaction(&path, tx)
    }

    fn remember(&self, tx: Transaction) {
        let mut recent = self.recent.lock();
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        if self.capacity > 0 {
            recent.push_back(tx);
        }
    }

    /// Number of records in the recent ring.
    pub fn recent_len(&self) -> usize {
        self.recent.lock().len()
    }

    /// Up to `limit` most recent transactions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Transaction> {
        if limit == 0 {
            return Vec::new();
        }
        {
            let recent = self.recent.lock();
            if recent.len() >= limit {
                return recent.iter().rev().take(limit).cloned().collect();
            }
        }

        match self.read_tail(limit) {
            Ok(records) => records,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "tail read failed, serving recent ring");
                self.recent.lock().iter().rev().take(limit).cloned().collect()
            }
        }
    }

    /// Read up to `limit` transactions from the ends of the daily files,
    /// newest first.
    ///
    /// Only the last 256 KiB of each file is examined; a line cut by the
    /// chunk boundary is skipped.
    pub fn read_tail(&self, limit: usize) -> StorageResult<Vec<Transaction>> {
        let mut out = Vec::with_capacity(limit);
        for path in daily_files_newest_first(&self.dir)? {
            let chunk = match read_last_chunk(&path, TAIL_CHUNK_BYTES) {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "skipping unreadable daily file");
                    continue;
                }
            };

            for line in chunk.lines().rev() {
                if let Ok(tx) = serde_json::from_str::<Transaction>(line) {
                    out.push(tx);
                    if out.len() >= limit {
                        return Ok(out);
                    }
                }
            }
        }
        Ok(out)
    }
}

fn read_last_chunk(path: &Path, chunk: u64) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    file.seek(SeekFrom::Start(len.saturating_sub(chunk)))?;
    let mut buf = Vec::with_capacity(len.min(chunk) as usize);
    file.read_to_end(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
