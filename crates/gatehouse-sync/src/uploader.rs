//! Live upload of new transactions.

use crate::service::{SyncService, UploadReceiver};
use crate::sink::CloudSink;
use gatehouse_core::Transaction;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// What happened to one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Stored by the sink.
    Uploaded,
    /// Written to the failure cache for a later retry.
    Cached,
    /// Neither uploaded nor cached; only the daily file has it.
    Lost,
}

impl<S: CloudSink> SyncService<S> {
    /// Upload `tx`, or cache it when the sink is missing, unreachable or
    /// fails.
    pub async fn deliver(&self, tx: Transaction) -> Delivery {
        if let Some(sink) = &self.sink {
            if sink.is_reachable().await {
                match self.upload_with_timeout(sink, &tx).await {
                    Ok(()) => {
                        debug!(card = %tx.card, "transaction uploaded");
                        return Delivery::Uploaded;
                    }
                    Err(e) => warn!(card = %tx.card, error = %e, "upload failed, caching"),
                }
            } else {
                debug!(card = %tx.card, "sink unreachable, caching");
            }
        }
        self.cache_failed(&tx)
    }

    fn cache_failed(&self, tx: &Transaction) -> Delivery {
        match self.cache.append(tx) {
            Ok(()) => Delivery::Cached,
            Err(e) => {
                error!(card = %tx.card, error = %e, "failed to cache transaction");
                Delivery::Lost
            }
        }
    }

    /// Drain the upload queue until `shutdown` fires.
    ///
    /// Transactions still queued at shutdown are cached without an upload
    /// attempt.
    pub fn spawn_uploader(
        self: Arc<Self>,
        mut rx: UploadReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(configured = self.is_configured(), "uploader started");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    next = rx.recv() => match next {
                        Some(tx) => {
                            self.deliver(tx).await;
                        }
                        None => break,
                    },
                }
            }

            rx.close();
            let mut drained = 0usize;
            while let Ok(tx) = rx.try_recv() {
                self.cache_failed(&tx);
                drained += 1;
            }
            info!(drained, "uploader stopped");
        })
    }
}
