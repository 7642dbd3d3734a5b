//! Gatehouse access controller.
//!
//! This crate assembles the hardware, storage and sync layers into a
//! working controller:
//!
//! - [`engine`]: the access decision engine (directory snapshot, repeat-read
//!   rate limiting, entry/exit gating)
//! - [`controller`]: the card read pipeline and the administrative
//!   operations
//! - [`reports`]: CSV export, usage analytics and per-holder reports
//!
//! # Example
//!
//! ```no_run
//! use gatehouse_controller::AccessController;
//! use gatehouse_core::{CardCode, ReaderId, UserRecord};
//! use gatehouse_hardware::mock::MockGpio;
//! use gatehouse_storage::StorageConfig;
//! use gatehouse_sync::MemorySink;
//! use std::sync::Arc;
//! use tokio::sync::watch;
//!
//! # async fn example() -> gatehouse_controller::Result<()> {
//! let controller = AccessController::<MemorySink>::builder(StorageConfig::new("/var/lib/gatehouse"))
//!     .gpio(Arc::new(MockGpio::new()))
//!     .build()?;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let workers = controller.start_workers(shutdown_rx)?;
//!
//! controller.add_user(CardCode::new(1234), UserRecord::new("u1", "Alice"))?;
//! controller.present_card(ReaderId::new(1)?, CardCode::new(1234));
//!
//! let _ = shutdown_tx.send(true);
//! workers.join().await;
//! # Ok(())
//! # }
//! ```

pub mod controller;
pub mod engine;
pub mod error;
pub mod reports;

pub use controller::{AccessController, ControllerBuilder, ControllerStatus, Workers};
pub use engine::{AccessEngine, Decision, DirectorySnapshot, EntryExitTracker, ScanRateLimiter};
pub use error::{ControllerError, Result};
pub use reports::{Analytics, ReportUser, TimelineEntry, TopUser, UserReport};
