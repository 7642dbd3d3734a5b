//! Cloud upload pipeline for Gatehouse
//!
//! Every recorded transaction is queued for upload to a remote sink. The
//! pipeline has two workers sharing one [`SyncService`]:
//!
//! - **Uploader**: drains the [`SyncQueue`] and uploads each transaction,
//!   appending it to the failure cache when the sink is missing, unreachable
//!   or fails
//! - **Reconciler**: periodically retries the failure cache and removes what
//!   the sink accepted
//!
//! Both workers stop when their `watch` shutdown signal fires.
//!
//! # Example
//!
//! ```no_run
//! use gatehouse_storage::FailureCache;
//! use gatehouse_sync::{MemorySink, SyncConfig, SyncQueue, SyncService};
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! # async fn example() {
//! let cache = Arc::new(FailureCache::new("/var/lib/gatehouse/failed.jsonl"));
//! let sink = Arc::new(MemorySink::new());
//! let sync = Arc::new(SyncService::new(Some(sink), cache.clone(), SyncConfig::new("site-1")));
//!
//! let (queue, rx) = SyncQueue::channel(cache);
//! let (_shutdown_tx, shutdown_rx) = watch::channel(false);
//! sync.clone().spawn_uploader(rx, shutdown_rx.clone());
//! sync.spawn_reconciler(shutdown_rx);
//! # drop(queue);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod reconciler;
pub mod service;
pub mod sink;
pub mod uploader;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use memory::MemorySink;
pub use reconciler::{ReconcileOutcome, ReconcileReport};
pub use service::{SyncQueue, SyncService, SyncStatus, UploadReceiver};
pub use sink::{CloudSink, UploadRecord};
pub use uploader::Delivery;
