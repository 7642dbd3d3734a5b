use gatehouse_core::constants::{
    DEFAULT_ENTITY_ID, RECONCILE_INITIAL_DELAY_SECS, RECONCILE_OFFLINE_INTERVAL_SECS,
    RECONCILE_ONLINE_INTERVAL_SECS, RECONCILE_PACING_MS,
};
use std::time::Duration;

/// Timing for the uploader and the reconciler.
///
/// # Example
///
/// ```
/// use gatehouse_sync::SyncConfig;
/// use std::time::Duration;
///
/// let config = SyncConfig::new("site-7")
///     .online_interval(Duration::from_secs(120))
///     .pacing(Duration::ZERO);
/// assert_eq!(config.entity_id, "site-7");
/// ```
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Site identifier attached to every upload
    pub entity_id: String,

    /// Pause between reconciliation passes while the sink is reachable
    pub online_interval: Duration,

    /// Pause between reconciliation passes while offline or unconfigured
    pub offline_interval: Duration,

    /// Delay before the first reconciliation pass
    pub initial_delay: Duration,

    /// Pause between two cached uploads within a pass
    pub pacing: Duration,

    /// Upper bound on one upload
    pub upload_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            entity_id: DEFAULT_ENTITY_ID.to_string(),
            online_interval: Duration::from_secs(RECONCILE_ONLINE_INTERVAL_SECS),
            offline_interval: Duration::from_secs(RECONCILE_OFFLINE_INTERVAL_SECS),
            initial_delay: Duration::from_secs(RECONCILE_INITIAL_DELAY_SECS),
            pacing: Duration::from_millis(RECONCILE_PACING_MS),
            upload_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            ..Default::default()
        }
    }

    pub fn online_interval(mut self, interval: Duration) -> Self {
        self.online_interval = interval;
        self
    }

    pub fn offline_interval(mut self, interval: Duration) -> Self {
        self.offline_interval = interval;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }
}
