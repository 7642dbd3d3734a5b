//! The assembled access controller.
//!
//! [`AccessController`] wires the reader bank, decision engine, relays,
//! transaction store and upload queue into one pipeline, and exposes the
//! administrative operations.
//!
//! # Pipeline
//!
//! Each validated card read runs synchronously on the reader's callback:
//!
//! 1. The engine decides (or drops a duplicate)
//! 2. A granted read pulses the reader's relay
//! 3. Unless suppressed, a transaction is written to the recent ring and
//!    today's file, counted in the daily statistics and queued for upload
//!
//! Failures in step 3 are logged and never undo steps 1 and 2.

use crate::engine::{AccessEngine, Decision};
use crate::error::{ControllerError, Result};
use crate::reports::{self, Analytics, ReportUser, UserReport};
use chrono::{DateTime, Utc};
use gatehouse_core::{
    CardCode, ControllerConfig, ReaderId, RelayAction, RelayId, TodayCounts, Transaction,
    UserRecord,
};
use gatehouse_hardware::{
    CardHandler, DataLine, GpioDriver, HoldState, ReaderBank, RelayActuator,
};
use gatehouse_storage::{
    BlockList, DailyStats, FailureCache, RetentionMonitor, StorageConfig, StorageError,
    StorageMetrics, TransactionStore, UserDirectory,
};
use gatehouse_sync::{
    CloudSink, ReconcileOutcome, SyncConfig, SyncQueue, SyncService, SyncStatus, UploadReceiver,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Transactions scanned per report day, and the overall scan cap.
const ANALYTICS_PER_DAY: usize = 500;
const ANALYTICS_MAX: usize = 5000;

/// Everything a card read touches.
struct Pipeline {
    engine: AccessEngine,
    relays: RelayActuator,
    store: TransactionStore,
    stats: DailyStats,
    queue: SyncQueue,
}

impl Pipeline {
    fn handle(&self, reader: ReaderId, card: CardCode, now: DateTime<Utc>) -> Option<Decision> {
        let decision = self.engine.decide(card, reader, now)?;

        if let Some(relay) = decision.relay_to_pulse
            && let Err(e) = self.relays.pulse(relay)
        {
            error!(relay = %relay, card = %card, error = %e, "relay pulse failed");
        }

        if decision.suppress_transaction {
            return Some(decision);
        }

        let tx = Transaction::new(
            decision.display_name.clone(),
            card,
            reader,
            decision.status,
            now,
        );
        info!(
            card = %card,
            reader = %reader,
            name = %tx.name,
            status = %tx.status,
            "transaction recorded"
        );

        if let Err(e) = self.store.record(&tx) {
            error!(card = %card, error = %e, "failed to persist transaction");
        }
        if let Err(e) = self.stats.record(tx.local_date(), tx.status) {
            error!(card = %card, error = %e, "failed to update daily stats");
        }
        self.queue.enqueue(tx);

        Some(decision)
    }
}

/// Point-in-time view of the controller for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub entity_id: String,
    pub sync: SyncStatus,
    /// `None` when the transaction directory could not be measured.
    pub storage: Option<StorageMetrics>,
    /// Reader number -> frame length.
    pub readers: BTreeMap<u8, u8>,
    pub relays: BTreeMap<u8, HoldState>,
    pub today: TodayCounts,
    pub allowed_cards: usize,
    pub blocked_cards: usize,
}

/// Handles of the background workers.
#[derive(Debug)]
pub struct Workers {
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task failed");
            }
        }
    }
}

/// Assembles an [`AccessController`].
///
/// # Examples
///
/// ```no_run
/// use gatehouse_controller::ControllerBuilder;
/// use gatehouse_hardware::mock::MockGpio;
/// use gatehouse_storage::StorageConfig;
/// use gatehouse_sync::MemorySink;
/// use std::sync::Arc;
///
/// # async fn example() -> gatehouse_controller::Result<()> {
/// let controller = ControllerBuilder::<MemorySink>::new(StorageConfig::new("/var/lib/gatehouse"))
///     .gpio(Arc::new(MockGpio::new()))
///     .build()?;
/// println!("{:?}", controller.today_counts());
/// # Ok(())
/// # }
/// ```
pub struct ControllerBuilder<S> {
    storage: StorageConfig,
    config: Option<ControllerConfig>,
    sync: SyncConfig,
    sink: Option<Arc<S>>,
    gpio: Option<Arc<dyn GpioDriver>>,
    pulse_duration: Option<Duration>,
    runtime: Option<Handle>,
}

impl<S: CloudSink> ControllerBuilder<S> {
    pub fn new(storage: StorageConfig) -> Self {
        Self {
            storage,
            config: None,
            sync: SyncConfig::default(),
            sink: None,
            gpio: None,
            pulse_duration: None,
            runtime: None,
        }
    }

    /// Start from `config` instead of the saved `config.json`.
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Upload timing. The entity id always comes from the controller
    /// configuration.
    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.sync = config;
        self
    }

    pub fn sink(mut self, sink: Arc<S>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn gpio(mut self, gpio: Arc<dyn GpioDriver>) -> Self {
        self.gpio = Some(gpio);
        self
    }

    pub fn pulse_duration(mut self, duration: Duration) -> Self {
        self.pulse_duration = Some(duration);
        self
    }

    /// Runtime for relay restore tasks. Defaults to the current runtime.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Open the storage files, initialize the relays and build the
    /// pipeline.
    ///
    /// # Errors
    ///
    /// Fails on an invalid storage or controller configuration, a missing
    /// GPIO driver or runtime, an unusable base directory, or relay
    /// initialization failure.
    pub fn build(self) -> Result<AccessController<S>> {
        self.storage.validate()?;
        std::fs::create_dir_all(self.storage.base_dir()).map_err(StorageError::from)?;

        let gpio = self
            .gpio
            .ok_or_else(|| ControllerError::configuration("no GPIO driver"))?;
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|e| ControllerError::configuration(format!("no tokio runtime: {e}")))?,
        };
        let config = match self.config {
            Some(config) => {
                config.validate()?;
                config
            }
            None => ControllerConfig::load_or_default(&self.storage.config_path()),
        };

        let mut relays = RelayActuator::new(gpio, config.relay_count(), runtime)?;
        if let Some(duration) = self.pulse_duration {
            relays = relays.with_pulse_duration(duration);
        }

        let store = TransactionStore::open(self.storage.transactions_dir())?;
        let stats = DailyStats::load(self.storage.stats_path());
        let users = UserDirectory::load(self.storage.users_path());
        let blocked = BlockList::load(self.storage.blocked_path());
        let cache = Arc::new(FailureCache::new(self.storage.failure_cache_path()));

        let engine = AccessEngine::new(&config, relays.relay_count());
        engine.rebuild(&users, &blocked);

        let mut sync_config = self.sync;
        sync_config.entity_id = config.entity_id.clone();
        let (queue, upload_rx) = SyncQueue::channel(Arc::clone(&cache));
        let sync = Arc::new(SyncService::new(self.sink, cache, sync_config));

        let pipeline = Arc::new(Pipeline {
            engine,
            relays,
            store,
            stats,
            queue,
        });
        let handler: CardHandler = {
            let pipeline = Arc::clone(&pipeline);
            Arc::new(move |reader, card| {
                pipeline.handle(reader, card, Utc::now());
            })
        };
        let readers = ReaderBank::new(&config, handler);

        info!(
            base_dir = %self.storage.base_dir().display(),
            readers = readers.readers().len(),
            relays = pipeline.relays.relay_count(),
            cloud = sync.is_configured(),
            entity_id = %config.entity_id,
            "access controller ready"
        );

        Ok(AccessController {
            pipeline,
            readers,
            users,
            blocked,
            config: RwLock::new(config),
            retention: RetentionMonitor::new(self.storage.clone()),
            storage: self.storage,
            sync,
            upload_rx: Mutex::new(Some(upload_rx)),
        })
    }
}

/// RFID access controller.
pub struct AccessController<S> {
    pipeline: Arc<Pipeline>,
    readers: ReaderBank,
    users: UserDirectory,
    blocked: BlockList,
    config: RwLock<ControllerConfig>,
    storage: StorageConfig,
    retention: RetentionMonitor,
    sync: Arc<SyncService<S>>,
    upload_rx: Mutex<Option<UploadReceiver>>,
}

impl<S: CloudSink> AccessController<S> {
    pub fn builder(storage: StorageConfig) -> ControllerBuilder<S> {
        ControllerBuilder::new(storage)
    }

    /// Spawn the retention monitor, uploader and reconciler.
    ///
    /// Must be called from within the tokio runtime, and only once.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the workers were already started.
    pub fn start_workers(&self, shutdown: watch::Receiver<bool>) -> Result<Workers> {
        let upload_rx = self
            .upload_rx
            .lock()
            .take()
            .ok_or_else(|| ControllerError::configuration("workers already started"))?;

        let handles = vec![
            self.retention.clone().spawn(shutdown.clone()),
            Arc::clone(&self.sync).spawn_uploader(upload_rx, shutdown.clone()),
            Arc::clone(&self.sync).spawn_reconciler(shutdown),
        ];
        info!(workers = handles.len(), "background workers started");
        Ok(Workers { handles })
    }

    /// Feed a falling edge from a reader's data lines.
    pub fn on_edge(&self, reader: ReaderId, line: DataLine, tick: u32) {
        self.readers.on_edge(reader, line, tick);
    }

    /// Run the pipeline for an already decoded card read.
    pub fn present_card(&self, reader: ReaderId, card: CardCode) -> Option<Decision> {
        self.pipeline.handle(reader, card, Utc::now())
    }

    /// Up to `limit` transactions, newest first.
    pub fn recent_transactions(&self, limit: usize) -> Vec<Transaction> {
        self.pipeline.store.recent(limit)
    }

    pub fn today_counts(&self) -> TodayCounts {
        self.pipeline.stats.today()
    }

    /// Apply an operator relay command.
    ///
    /// # Errors
    ///
    /// Fails for a relay that is not wired or a failed line write.
    pub fn force_relay(&self, relay: RelayId, action: RelayAction) -> Result<()> {
        self.pipeline.relays.apply(relay, action)?;
        Ok(())
    }

    pub fn hold_states(&self) -> BTreeMap<RelayId, HoldState> {
        self.pipeline.relays.hold_states()
    }

    pub fn config(&self) -> ControllerConfig {
        self.config.read().clone()
    }

    /// Validate, persist and apply a new configuration.
    ///
    /// Reader decoders are recreated only when their settings changed; the
    /// scan delay, entry/exit settings and entity id apply to the next read.
    /// Nothing is applied if validation or saving fails.
    pub fn update_config(&self, new_config: ControllerConfig) -> Result<()> {
        new_config.validate()?;
        let mut current = self.config.write();
        new_config.save(&self.storage.config_path())?;

        if current.decoders_changed(&new_config) {
            let recreated = self.readers.reconfigure(&new_config);
            info!(recreated, "reader decoders reconfigured");
        }
        self.pipeline.engine.apply_config(&new_config);
        self.sync.set_entity_id(new_config.entity_id.clone());

        info!(
            scan_delay_secs = new_config.scan_delay_seconds,
            entry_exit = new_config.entry_exit_tracking.enabled,
            min_gap_secs = new_config.entry_exit_tracking.min_gap_seconds,
            "configuration updated"
        );
        *current = new_config;
        Ok(())
    }

    /// Usage of the transaction directory against its cap.
    pub fn storage_metrics(&self) -> Result<StorageMetrics> {
        Ok(self.retention.metrics()?)
    }

    pub async fn status(&self) -> ControllerStatus {
        let storage = match self.retention.metrics() {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(error = %e, "failed to measure transaction storage");
                None
            }
        };
        let snapshot = self.pipeline.engine.snapshot();

        ControllerStatus {
            entity_id: self.sync.entity_id(),
            sync: self.sync.status().await,
            storage,
            readers: self
                .readers
                .settings()
                .into_iter()
                .map(|(reader, settings)| (reader.as_u8(), settings.bits))
                .collect(),
            relays: self
                .hold_states()
                .into_iter()
                .map(|(relay, hold)| (relay.as_u8(), hold))
                .collect(),
            today: self.today_counts(),
            allowed_cards: snapshot.allowed_count(),
            blocked_cards: snapshot.blocked_count(),
        }
    }

    fn rebuild_snapshot(&self) {
        self.pipeline.engine.rebuild(&self.users, &self.blocked);
    }

    pub fn add_user(&self, card: CardCode, record: UserRecord) -> Result<()> {
        self.users.add(card, record)?;
        self.rebuild_snapshot();
        Ok(())
    }

    pub fn remove_user(&self, card: CardCode) -> Result<UserRecord> {
        let record = self.users.remove(card)?;
        self.rebuild_snapshot();
        Ok(record)
    }

    pub fn block_card(&self, card: CardCode) -> Result<()> {
        self.blocked.block(card)?;
        self.rebuild_snapshot();
        Ok(())
    }

    pub fn unblock_card(&self, card: CardCode) -> Result<()> {
        self.blocked.unblock(card)?;
        self.rebuild_snapshot();
        Ok(())
    }

    pub fn set_privacy(&self, card: CardCode, enabled: bool) -> Result<()> {
        self.users.set_privacy(card, enabled)?;
        self.rebuild_snapshot();
        Ok(())
    }

    /// Directory entries keyed by card string.
    pub fn users(&self) -> BTreeMap<String, UserRecord> {
        self.users.all()
    }

    /// Block list entries keyed by card string.
    pub fn blocked_cards(&self) -> BTreeMap<String, bool> {
        self.blocked.all()
    }

    /// Re-read both directory files, e.g. after an external edit. Returns
    /// the number of users and block list entries loaded.
    pub fn reload_directory(&self) -> (usize, usize) {
        let users = self.users.reload();
        let blocked = self.blocked.reload();
        self.rebuild_snapshot();
        (users, blocked)
    }

    /// The `limit` most recent transactions as CSV.
    pub fn export_csv(&self, limit: usize) -> String {
        reports::transactions_csv(&self.recent_transactions(limit))
    }

    /// Transactions scanned by reports covering `days` days.
    fn history(&self, days: u32) -> Vec<Transaction> {
        let limit = (days as usize)
            .saturating_mul(ANALYTICS_PER_DAY)
            .min(ANALYTICS_MAX);
        self.recent_transactions(limit)
    }

    /// Usage figures for the last `days` days, optionally for one card.
    pub fn analytics(&self, days: u32, card: Option<CardCode>) -> Analytics {
        reports::analytics(&self.history(days), days, card, Utc::now())
    }

    /// Access history of the holder of `card` over the last `days` days.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` when `card` has no directory entry.
    pub fn user_report(&self, card: CardCode, days: u32) -> Result<UserReport> {
        let record = self
            .users
            .get(card)
            .ok_or_else(|| StorageError::card_not_found("user", card.to_string()))?;
        let user = ReportUser {
            name: record.name,
            card,
            id: record.id,
            ref_id: record.ref_id,
            blocked: self.blocked.is_blocked(card),
        };
        Ok(reports::user_report(user, &self.history(days), days, Utc::now()))
    }

    /// Run one reconciliation pass now.
    pub async fn reconcile_now(&self) -> Result<ReconcileOutcome> {
        Ok(self.sync.reconcile_once().await?)
    }
}

impl<S> std::fmt::Debug for AccessController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessController")
            .field("base_dir", &self.storage.base_dir())
            .field("readers", &self.readers)
            .field("relays", &self.pipeline.relays)
            .finish_non_exhaustive()
    }
}
