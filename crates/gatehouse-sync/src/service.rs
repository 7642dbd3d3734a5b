//! Shared state of the upload pipeline.

use crate::config::SyncConfig;
use crate::sink::{CloudSink, UploadRecord};
use crate::{Result, SyncError};
use gatehouse_core::Transaction;
use gatehouse_storage::FailureCache;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};

/// Sink, failure cache and settings shared by the uploader and the
/// reconciler.
///
/// A service without a sink behaves like a permanently offline one: every
/// transaction goes to the failure cache and waits for a sink.
pub struct SyncService<S> {
    pub(crate) sink: Option<Arc<S>>,
    pub(crate) cache: Arc<FailureCache>,
    pub(crate) config: SyncConfig,
    entity_id: RwLock<String>,
    pub(crate) pass_lock: tokio::sync::Mutex<()>,
}

/// Snapshot of the sync pipeline for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub configured: bool,
    pub reachable: bool,
    pub cached: usize,
}

impl<S: CloudSink> SyncService<S> {
    pub fn new(sink: Option<Arc<S>>, cache: Arc<FailureCache>, config: SyncConfig) -> Self {
        let entity_id = RwLock::new(config.entity_id.clone());
        Self {
            sink,
            cache,
            config,
            entity_id,
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.sink.is_some()
    }

    pub fn cache(&self) -> &Arc<FailureCache> {
        &self.cache
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn entity_id(&self) -> String {
        self.entity_id.read().clone()
    }

    /// Change the site identifier used for later uploads.
    pub fn set_entity_id(&self, entity_id: impl Into<String>) {
        *self.entity_id.write() = entity_id.into();
    }

    pub(crate) async fn upload_with_timeout(&self, sink: &S, tx: &Transaction) -> Result<()> {
        let record = UploadRecord::new(tx.clone(), self.entity_id());
        let limit = self.config.upload_timeout;
        match tokio::time::timeout(limit, sink.upload(&record)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::timeout(limit.as_millis() as u64)),
        }
    }

    pub async fn status(&self) -> SyncStatus {
        let reachable = match &self.sink {
            Some(sink) => sink.is_reachable().await,
            None => false,
        };
        SyncStatus {
            configured: self.sink.is_some(),
            reachable,
            cached: self.cache.len().unwrap_or(0),
        }
    }
}

/// Sending half of the upload queue.
///
/// Enqueueing never blocks, so it is safe from reader callbacks. If the
/// uploader has stopped, the transaction goes straight to the failure cache.
#[derive(Debug, Clone)]
pub struct SyncQueue {
    tx: mpsc::UnboundedSender<Transaction>,
    fallback: Arc<FailureCache>,
}

/// Receiving half of the upload queue, consumed by the uploader task.
pub type UploadReceiver = mpsc::UnboundedReceiver<Transaction>;

impl SyncQueue {
    pub fn channel(fallback: Arc<FailureCache>) -> (Self, UploadReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fallback }, rx)
    }

    /// Queue `transaction` for upload.
    pub fn enqueue(&self, transaction: Transaction) {
        if let Err(mpsc::error::SendError(transaction)) = self.tx.send(transaction) {
            warn!(card = %transaction.card, "uploader stopped, caching transaction");
            if let Err(e) = self.fallback.append(&transaction) {
                error!(card = %transaction.card, error = %e, "failed to cache transaction");
            }
        }
    }
}
