//! Storage layer for the Gatehouse access controller.
//!
//! Everything the controller persists lives in plain files under one base
//! directory, so a controller keeps working with no database and survives
//! power loss with at most the line being written.
//!
//! # Components
//!
//! - [`TransactionStore`] - append-only daily JSONL files plus an in-memory
//!   ring of the most recent transactions
//! - [`RetentionMonitor`] - keeps the daily files under a size cap by
//!   deleting whole days, oldest first
//! - [`FailureCache`] - transactions waiting to be re-sent to the cloud
//! - [`UserDirectory`], [`BlockList`] - card holder and block list files
//! - [`DailyStats`] - per-day counters
//!
//! # Examples
//!
//! ```no_run
//! use gatehouse_core::{AccessStatus, CardCode, ReaderId, Transaction};
//! use gatehouse_storage::{StorageConfig, TransactionStore};
//!
//! # fn example() -> gatehouse_storage::StorageResult<()> {
//! let config = StorageConfig::new("/var/lib/gatehouse").max_gigabytes(4.0);
//! let store = TransactionStore::open(config.transactions_dir())?;
//!
//! let tx = Transaction::new(
//!     "Alice",
//!     CardCode::new(1234),
//!     ReaderId::new(1)?,
//!     AccessStatus::Granted,
//!     chrono::Utc::now(),
//! );
//! store.record(&tx)?;
//!
//! for tx in store.recent(10) {
//!     println!("{} {} {}", tx.timestamp, tx.name, tx.status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Durability
//!
//! Transaction lines are appended and flushed one at a time. Whole-file
//! state (directory, stats, rewritten failure cache) is written to a
//! temporary sibling and renamed over the original.

pub mod config;
pub mod directory;
pub mod error;
pub mod failure_cache;
mod jsonl;
pub mod retention;
pub mod stats;
pub mod transaction_log;

pub use config::StorageConfig;
pub use directory::{BlockList, UserDirectory};
pub use error::{StorageError, StorageResult};
pub use failure_cache::FailureCache;
pub use retention::{RetentionMonitor, StorageMetrics, purge_oldest, usage_bytes};
pub use stats::DailyStats;
pub use transaction_log::{TransactionStore, daily_file_name};
