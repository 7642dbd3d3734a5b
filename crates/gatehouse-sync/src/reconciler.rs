//! Periodic retry of cached transactions.

use crate::Result;
use crate::service::SyncService;
use crate::sink::CloudSink;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ReconcileReport {
    /// Cached transactions the pass tried to upload.
    pub attempted: usize,
    pub uploaded: usize,
    /// Entries left in the cache afterwards, including late arrivals.
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No sink, or the sink was unreachable; the cache was not touched.
    Offline,
    Completed(ReconcileReport),
}

impl<S: CloudSink> SyncService<S> {
    /// Retry every cached transaction once.
    ///
    /// Uploaded entries leave the cache; failed ones stay in their original
    /// order. Passes never overlap, so an entry is not sent twice by
    /// concurrent passes.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Cache`](crate::SyncError::Cache) if the cache
    /// cannot be read or rewritten. Upload failures are not errors.
    pub async fn reconcile_once(&self) -> Result<ReconcileOutcome> {
        let Some(sink) = &self.sink else {
            return Ok(ReconcileOutcome::Offline);
        };
        let _pass = self.pass_lock.lock().await;
        if !sink.is_reachable().await {
            debug!("sink unreachable, skipping reconciliation");
            return Ok(ReconcileOutcome::Offline);
        }

        let cached = self.cache.load()?;
        if cached.is_empty() {
            return Ok(ReconcileOutcome::Completed(ReconcileReport::default()));
        }
        info!(count = cached.len(), "reconciling cached transactions");

        let mut still_failing = Vec::new();
        let mut uploaded = 0usize;
        for (index, tx) in cached.iter().enumerate() {
            if index > 0 && !self.config.pacing.is_zero() {
                tokio::time::sleep(self.config.pacing).await;
            }
            match self.upload_with_timeout(sink, tx).await {
                Ok(()) => uploaded += 1,
                Err(e) => {
                    debug!(card = %tx.card, error = %e, "retry failed");
                    still_failing.push(tx.clone());
                }
            }
        }

        let remaining = self.cache.complete_pass(cached.len(), still_failing)?;
        let report = ReconcileReport {
            attempted: cached.len(),
            uploaded,
            remaining,
        };
        info!(
            attempted = report.attempted,
            uploaded = report.uploaded,
            remaining = report.remaining,
            "reconciliation pass complete"
        );
        Ok(ReconcileOutcome::Completed(report))
    }

    /// Run [`reconcile_once`](Self::reconcile_once) on a schedule until
    /// `shutdown` fires.
    ///
    /// The first pass waits `initial_delay`. Later passes wait the online
    /// interval after a pass that reached the sink and the offline interval
    /// otherwise.
    pub fn spawn_reconciler(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut pause = self.config.initial_delay;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
                pause = self.next_pause().await;
            }
            info!("reconciler stopped");
        })
    }

    async fn next_pause(&self) -> Duration {
        match self.reconcile_once().await {
            Ok(ReconcileOutcome::Completed(_)) => self.config.online_interval,
            Ok(ReconcileOutcome::Offline) => self.config.offline_interval,
            Err(e) => {
                error!(error = %e, "reconciliation pass failed");
                self.config.online_interval
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::memory::MemorySink;
    use chrono::{TimeZone, Utc};
    use gatehouse_core::{AccessStatus, CardCode, ReaderId, Transaction};
    use gatehouse_storage::FailureCache;

    fn tx(card: u64) -> Transaction {
        Transaction::new(
            "Test",
            CardCode::new(card),
            ReaderId::new(2).unwrap(),
            AccessStatus::Denied,
            Utc.timestamp_opt(1_700_000_000 + card as i64, 0).unwrap(),
        )
    }

    fn service(sink: Arc<MemorySink>, dir: &tempfile::TempDir) -> Arc<SyncService<MemorySink>> {
        let cache = Arc::new(FailureCache::new(dir.path().join("cache.jsonl")));
        let config = SyncConfig::new("site-1").pacing(Duration::ZERO);
        Arc::new(SyncService::new(Some(sink), cache, config))
    }

    #[tokio::test]
    async fn test_offline_pass_leaves_cache_alone() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        sink.set_reachable(false);
        let sync = service(sink.clone(), &dir);
        sync.cache().append(&tx(1)).unwrap();

        assert_eq!(sync.reconcile_once().await.unwrap(), ReconcileOutcome::Offline);
        assert_eq!(sync.cache().len().unwrap(), 1);
        assert_eq!(sink.attempts(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_pass_is_offline() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Arc::new(FailureCache::new(dir.path().join("cache.jsonl")));
        let sync: SyncService<MemorySink> = SyncService::new(None, cache, SyncConfig::default());
        assert_eq!(sync.reconcile_once().await.unwrap(), ReconcileOutcome::Offline);
    }

    #[tokio::test]
    async fn test_partial_success_keeps_failures_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let sync = service(sink.clone(), &dir);
        for card in 1..=4 {
            sync.cache().append(&tx(card)).unwrap();
        }
        sink.reject(CardCode::new(2));
        sink.reject(CardCode::new(4));

        let outcome = sync.reconcile_once().await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Completed(ReconcileReport {
                attempted: 4,
                uploaded: 2,
                remaining: 2,
            })
        );
        assert_eq!(sync.cache().load().unwrap(), vec![tx(2), tx(4)]);
    }

    #[tokio::test]
    async fn test_second_pass_does_not_duplicate_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let sync = service(sink.clone(), &dir);
        sync.cache().append(&tx(1)).unwrap();
        sync.cache().append(&tx(2)).unwrap();

        sync.reconcile_once().await.unwrap();
        let second = sync.reconcile_once().await.unwrap();

        assert_eq!(second, ReconcileOutcome::Completed(ReconcileReport::default()));
        assert_eq!(sink.uploaded().len(), 2);
        assert!(!sync.cache().exists());
    }

    #[tokio::test]
    async fn test_concurrent_passes_upload_each_entry_once() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let sync = service(sink.clone(), &dir);
        for card in 1..=3 {
            sync.cache().append(&tx(card)).unwrap();
        }

        let (a, b) = tokio::join!(sync.reconcile_once(), sync.reconcile_once());
        a.unwrap();
        b.unwrap();
        assert_eq!(sink.uploaded().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconciler_task_runs_after_initial_delay() {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(MemorySink::new());
        let sync = service(sink.clone(), &dir);
        sync.cache().append(&tx(1)).unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = sync.clone().spawn_reconciler(shutdown_rx);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(sink.uploaded().is_empty());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(sink.uploaded().len(), 1);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
