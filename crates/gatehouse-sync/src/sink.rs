//! Cloud sink abstraction.
//!
//! The sink is whatever remote store the site uploads transactions to. The
//! controller only needs to know whether it is reachable right now and
//! whether one upload succeeded.
//!
//! Methods return `impl Future + Send` so sink calls can run inside spawned
//! tasks; implementations may still be written with `async fn`.

use crate::Result;
use chrono::{DateTime, Utc};
use gatehouse_core::Transaction;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Payload sent to the sink: the transaction plus upload metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    #[serde(flatten)]
    pub transaction: Transaction,
    /// When the record was handed to the sink.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    /// Site identifier.
    pub entity_id: String,
}

impl UploadRecord {
    pub fn new(transaction: Transaction, entity_id: impl Into<String>) -> Self {
        Self {
            transaction,
            created_at: Utc::now(),
            entity_id: entity_id.into(),
        }
    }
}

/// Remote store for transactions.
pub trait CloudSink: Send + Sync + 'static {
    /// Whether the sink can be reached right now.
    fn is_reachable(&self) -> impl Future<Output = bool> + Send;

    /// Upload one record.
    ///
    /// # Errors
    ///
    /// Any error means the record was not stored and must be retried.
    fn upload(&self, record: &UploadRecord) -> impl Future<Output = Result<()>> + Send;
}
