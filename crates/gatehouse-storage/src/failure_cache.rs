//! Persistent cache of transactions that failed to upload.
//!
//! Same line format as the daily files. Appends are cheap and happen from
//! the uploader; reconciliation loads the whole cache, retries it, and then
//! either rewrites it atomically with the survivors or removes it. Records
//! appended while a retry pass is running are carried over.

use crate::error::StorageResult;
use crate::jsonl::{append_transaction, read_transactions, rewrite_transactions};
use gatehouse_core::Transaction;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::info;

/// Failed-upload cache file.
#[derive(Debug)]
pub struct FailureCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FailureCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one transaction.
    pub fn append(&self, tx: &Transaction) -> StorageResult<()> {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        append_transaction(&self.path, tx)
    }

    /// All cached transactions, oldest first. Missing cache reads as empty.
    pub fn load(&self) -> StorageResult<Vec<Transaction>> {
        let _guard = self.lock.lock();
        read_transactions(&self.path)
    }

    /// Record the outcome of a retry pass over the first `processed`
    /// entries returned by [`load`](Self::load).
    ///
    /// The cache is rewritten with `still_failing` followed by anything
    /// appended since the load, or removed when nothing remains. Returns the
    /// number of entries left in the cache.
    pub fn complete_pass(
        &self,
        processed: usize,
        still_failing: Vec<Transaction>,
    ) -> StorageResult<usize> {
        let _guard = self.lock.lock();
        let appended = read_transactions(&self.path)?.into_iter().skip(processed);
        let mut remaining = still_failing;
        remaining.extend(appended);

        if remaining.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => info!(path = %self.path.display(), "failure cache drained"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(0);
        }

        rewrite_transactions(&self.path, &remaining)?;
        info!(remaining = remaining.len(), "failure cache rewritten");
        Ok(remaining.len())
    }

    /// Whether the cache file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Number of cached transactions.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.load()?.len())
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}
