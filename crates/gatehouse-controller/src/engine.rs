//! Access decision engine.
//!
//! Turns a validated card read into a [`Decision`]. The engine keeps three
//! pieces of state, each behind its own lock:
//!
//! - a [`DirectorySnapshot`] of allowed, blocked and per-card records,
//!   replaced wholesale whenever the directory changes
//! - a [`ScanRateLimiter`] that drops repeat reads of one card
//! - an [`EntryExitTracker`] that decides whether a scan is worth recording
//!
//! # Decision Flow
//!
//! 1. **Rate limit**: a card accepted less than `scan_delay` ago is dropped
//!    with no decision at all
//! 2. **Membership**: blocked beats allowed; allowed cards are granted and
//!    their reader's relay is pulsed; everything else is denied
//! 3. **Privacy**: granted cards of privacy-protected holders open the door
//!    but leave no transaction
//! 4. **Entry/exit gating**: when enabled, a scan is recorded only if the
//!    card's previous recorded scan is at least `min_gap_seconds` old
//!
//! # Examples
//!
//! ```
//! use chrono::Utc;
//! use gatehouse_controller::engine::{AccessEngine, DirectorySnapshot};
//! use gatehouse_core::{AccessStatus, CardCode, ControllerConfig, ReaderId, UserRecord};
//! use std::collections::{HashMap, HashSet};
//!
//! let engine = AccessEngine::new(&ControllerConfig::default(), 3);
//! let records = HashMap::from([(CardCode::new(42), UserRecord::new("u1", "Alice"))]);
//! engine.replace_snapshot(DirectorySnapshot::new(records, HashSet::new()));
//!
//! let reader = ReaderId::new(2).unwrap();
//! let decision = engine.decide(CardCode::new(42), reader, Utc::now()).unwrap();
//! assert_eq!(decision.status, AccessStatus::Granted);
//! assert_eq!(decision.display_name, "Alice");
//! assert_eq!(decision.relay_to_pulse.map(|r| r.as_u8()), Some(2));
//! ```

use chrono::{DateTime, TimeDelta, Utc};
use gatehouse_core::constants::{BLOCKED_NAME, ENTRY_EXIT_RETENTION_SECS, UNKNOWN_NAME};
use gatehouse_core::{
    AccessStatus, CardCode, ControllerConfig, EntryExitConfig, ReaderId, RelayId, UserRecord,
};
use gatehouse_storage::{BlockList, UserDirectory};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Point-in-time view of the user directory and block list.
#[derive(Debug, Clone, Default)]
pub struct DirectorySnapshot {
    records: HashMap<CardCode, UserRecord>,
    blocked: HashSet<CardCode>,
}

impl DirectorySnapshot {
    /// Build a snapshot from directory records (every record is an allowed
    /// card) and the blocked card set.
    pub fn new(records: HashMap<CardCode, UserRecord>, blocked: HashSet<CardCode>) -> Self {
        Self { records, blocked }
    }

    /// Read the current contents of both files.
    pub fn capture(users: &UserDirectory, blocked: &BlockList) -> Self {
        Self::new(users.records(), blocked.blocked_codes())
    }

    pub fn is_allowed(&self, card: CardCode) -> bool {
        self.records.contains_key(&card)
    }

    pub fn is_blocked(&self, card: CardCode) -> bool {
        self.blocked.contains(&card)
    }

    pub fn record(&self, card: CardCode) -> Option<&UserRecord> {
        self.records.get(&card)
    }

    pub fn allowed_count(&self) -> usize {
        self.records.len()
    }

    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }

    /// Status, display name and privacy flag for `card`.
    fn classify(&self, card: CardCode) -> (AccessStatus, String, bool) {
        if self.is_blocked(card) {
            return (AccessStatus::Blocked, BLOCKED_NAME.to_string(), false);
        }
        match self.record(card) {
            Some(user) => {
                let name = if user.name.is_empty() {
                    UNKNOWN_NAME.to_string()
                } else {
                    user.name.clone()
                };
                (AccessStatus::Granted, name, user.privacy_protected)
            }
            None => (AccessStatus::Denied, UNKNOWN_NAME.to_string(), false),
        }
    }
}

fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// True when `now` is less than `window` after `since`. A clock that stepped
/// back behind `since` counts as outside the window.
fn within(since: DateTime<Utc>, now: DateTime<Utc>, window: TimeDelta) -> bool {
    let elapsed = now.signed_duration_since(since);
    elapsed >= TimeDelta::zero() && elapsed < window
}

#[derive(Debug)]
struct RateState {
    delay: TimeDelta,
    last_accepted: HashMap<CardCode, DateTime<Utc>>,
}

/// Drops repeat reads of the same card inside the scan delay.
///
/// Only accepted reads move the window: a card held against the reader is
/// accepted again once `delay` has passed since its last accepted read.
#[derive(Debug)]
pub struct ScanRateLimiter {
    state: Mutex<RateState>,
}

impl ScanRateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self {
            state: Mutex::new(RateState {
                delay: to_delta(delay),
                last_accepted: HashMap::new(),
            }),
        }
    }

    /// Whether a read of `card` at `now` should be processed. Accepting it
    /// starts a new window and forgets windows that have closed.
    pub fn should_process(&self, card: CardCode, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        let delay = state.delay;
        if let Some(last) = state.last_accepted.get(&card)
            && within(*last, now, delay)
        {
            return false;
        }
        state.last_accepted.retain(|_, last| within(*last, now, delay));
        state.last_accepted.insert(card, now);
        true
    }

    /// Cards with an open window.
    pub fn tracked_cards(&self) -> usize {
        self.state.lock().last_accepted.len()
    }

    /// Change the delay; existing windows are kept.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = to_delta(delay);
    }

    pub fn delay(&self) -> Duration {
        self.state.lock().delay.to_std().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy)]
struct LastScan {
    timestamp: DateTime<Utc>,
    reader: ReaderId,
}

#[derive(Debug)]
struct TrackerState {
    config: EntryExitConfig,
    last_scan: HashMap<CardCode, LastScan>,
}

/// Records a scan only when the card has been away long enough.
///
/// With tracking enabled, the first scan of a card is remembered but not
/// recorded. A later scan is recorded, and becomes the new reference, only
/// when at least `min_gap_seconds` have passed since the reference scan.
/// Reference scans older than [`ENTRY_EXIT_RETENTION_SECS`] (or the gap, if
/// longer) are forgotten, after which the card starts over with a first scan.
#[derive(Debug)]
pub struct EntryExitTracker {
    state: Mutex<TrackerState>,
}

impl EntryExitTracker {
    pub fn new(config: EntryExitConfig) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                config,
                last_scan: HashMap::new(),
            }),
        }
    }

    /// Whether a scan of `card` on `reader` at `now` should produce a
    /// transaction.
    pub fn should_emit(&self, card: CardCode, reader: ReaderId, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock();
        if !state.config.enabled {
            return true;
        }

        let min_gap = to_delta(Duration::from_secs(state.config.min_gap_seconds));
        let (remember, emit) = match state.last_scan.get(&card) {
            None => (true, false),
            Some(last) if within(last.timestamp, now, min_gap) => (false, false),
            Some(_) => (true, true),
        };
        if remember {
            let retention = min_gap.max(to_delta(Duration::from_secs(ENTRY_EXIT_RETENTION_SECS)));
            state
                .last_scan
                .retain(|_, scan| within(scan.timestamp, now, retention));
            state.last_scan.insert(
                card,
                LastScan {
                    timestamp: now,
                    reader,
                },
            );
        }
        emit
    }

    /// Apply new settings; remembered scans are kept.
    pub fn configure(&self, config: EntryExitConfig) {
        self.state.lock().config = config;
    }

    pub fn config(&self) -> EntryExitConfig {
        self.state.lock().config
    }

    /// Cards with a remembered reference scan.
    pub fn tracked_cards(&self) -> usize {
        self.state.lock().last_scan.len()
    }

    /// Time and reader of the reference scan for `card`.
    pub fn last_scan(&self, card: CardCode) -> Option<(DateTime<Utc>, ReaderId)> {
        self.state
            .lock()
            .last_scan
            .get(&card)
            .map(|scan| (scan.timestamp, scan.reader))
    }
}

/// Outcome of one accepted card read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: AccessStatus,
    pub display_name: String,
    /// Relay to pulse; set only for granted reads.
    pub relay_to_pulse: Option<RelayId>,
    /// True when no transaction should be recorded for this read.
    pub suppress_transaction: bool,
}

/// Decides what happens to each card read.
#[derive(Debug)]
pub struct AccessEngine {
    snapshot: RwLock<Arc<DirectorySnapshot>>,
    limiter: ScanRateLimiter,
    tracker: EntryExitTracker,
    relay_count: u8,
}

impl AccessEngine {
    /// Create an engine with an empty directory, which denies every card.
    pub fn new(config: &ControllerConfig, relay_count: u8) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(DirectorySnapshot::default())),
            limiter: ScanRateLimiter::new(config.scan_delay()),
            tracker: EntryExitTracker::new(config.entry_exit_tracking),
            relay_count,
        }
    }

    /// Current directory snapshot.
    pub fn snapshot(&self) -> Arc<DirectorySnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// Swap in a new snapshot. Decisions already in flight finish against
    /// the snapshot they started with.
    pub fn replace_snapshot(&self, snapshot: DirectorySnapshot) {
        info!(
            allowed = snapshot.allowed_count(),
            blocked = snapshot.blocked_count(),
            "directory snapshot rebuilt"
        );
        *self.snapshot.write() = Arc::new(snapshot);
    }

    /// Rebuild the snapshot from the directory files.
    pub fn rebuild(&self, users: &UserDirectory, blocked: &BlockList) {
        self.replace_snapshot(DirectorySnapshot::capture(users, blocked));
    }

    /// Apply the scan delay and entry/exit settings of `config`.
    pub fn apply_config(&self, config: &ControllerConfig) {
        self.limiter.set_delay(config.scan_delay());
        self.tracker.configure(config.entry_exit_tracking);
    }

    pub fn limiter(&self) -> &ScanRateLimiter {
        &self.limiter
    }

    pub fn tracker(&self) -> &EntryExitTracker {
        &self.tracker
    }

    /// Decide on a read of `card` at `reader`.
    ///
    /// Returns `None` when the read is a duplicate inside the scan delay;
    /// such reads have no effect at all.
    pub fn decide(&self, card: CardCode, reader: ReaderId, now: DateTime<Utc>) -> Option<Decision> {
        // Step 1: Rate limiting
        if !self.limiter.should_process(card, now) {
            info!(card = %card, reader = %reader, "duplicate scan ignored");
            return None;
        }

        // Step 2: Membership, blocked first
        let (status, display_name, privacy_protected) = self.snapshot().classify(card);
        let relay_to_pulse = status
            .is_granted()
            .then(|| reader.relay(self.relay_count));
        debug!(card = %card, reader = %reader, status = %status, "access decided");

        // Step 3: Privacy protection
        // Step 4: Entry/exit gating
        let suppress_transaction = if privacy_protected {
            info!(card = %card, "privacy protected, transaction skipped");
            true
        } else if !self.tracker.should_emit(card, reader, now) {
            info!(card = %card, reader = %reader, "entry/exit gap not satisfied, transaction skipped");
            true
        } else {
            false
        };

        Some(Decision {
            status,
            display_name,
            relay_to_pulse,
            suppress_transaction,
        })
    }
}
