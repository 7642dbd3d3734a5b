//! In-memory cloud sink for tests and offline development.

use crate::sink::{CloudSink, UploadRecord};
use crate::{Result, SyncError};
use gatehouse_core::CardCode;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Sink that stores uploads in memory.
///
/// Reachability and per-card failures can be toggled to simulate outages
/// and partial reconciliation.
#[derive(Debug)]
pub struct MemorySink {
    reachable: AtomicBool,
    rejecting: Mutex<HashSet<CardCode>>,
    uploaded: Mutex<Vec<UploadRecord>>,
    attempts: AtomicUsize,
}

impl Default for MemorySink {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            rejecting: Mutex::new(HashSet::new()),
            uploaded: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Reject uploads for `card` until [`accept`](Self::accept) is called.
    pub fn reject(&self, card: CardCode) {
        self.rejecting.lock().insert(card);
    }

    pub fn accept(&self, card: CardCode) {
        self.rejecting.lock().remove(&card);
    }

    /// Records stored so far, in upload order.
    pub fn uploaded(&self) -> Vec<UploadRecord> {
        self.uploaded.lock().clone()
    }

    /// Upload attempts, successful or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl CloudSink for MemorySink {
    async fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn upload(&self, record: &UploadRecord) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::unreachable("memory sink offline"));
        }
        if self.rejecting.lock().contains(&record.transaction.card) {
            return Err(SyncError::rejected(format!(
                "card {} rejected",
                record.transaction.card
            )));
        }
        self.uploaded.lock().push(record.clone());
        Ok(())
    }
}
