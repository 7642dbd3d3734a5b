//! Core constants for the Gatehouse access controller.
//!
//! Defaults here mirror the values a freshly installed controller starts
//! with before any `config.json` exists. Everything that the administrative
//! surface can change at runtime lives in [`ControllerConfig`]; the values
//! below are either defaults for those settings or fixed properties of the
//! hardware and storage layout.
//!
//! # Usage
//!
//! ```
//! use gatehouse_core::constants::*;
//!
//! assert!(SUPPORTED_BIT_WIDTHS.contains(&DEFAULT_WIEGAND_BITS));
//! assert_eq!(RECENT_BUFFER_CAPACITY, 200);
//! ```
//!
//! [`ControllerConfig`]: crate::config::ControllerConfig

// ============================================================================
// Readers and relays
// ============================================================================

/// Lowest valid reader/relay number.
pub const MIN_DEVICE_NUMBER: u8 = 1;

/// Highest valid reader/relay number (one controller drives at most 8 doors).
pub const MAX_DEVICE_NUMBER: u8 = 8;

/// Number of readers wired on a stock controller.
pub const DEFAULT_READER_COUNT: u8 = 3;

/// Duration of an automatic door pulse after a grant, in milliseconds.
pub const RELAY_PULSE_MS: u64 = 1000;

// ============================================================================
// Wiegand framing
// ============================================================================

/// Frame lengths the decoder knows how to turn into card codes.
pub const SUPPORTED_BIT_WIDTHS: [u8; 2] = [26, 34];

/// Default frame length for a reader with no explicit setting.
pub const DEFAULT_WIEGAND_BITS: u8 = 26;

/// Default maximum gap between two bits of one frame, in milliseconds.
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 25;

// ============================================================================
// Access policy
// ============================================================================

/// Default debounce window for repeat reads of the same card, in seconds.
pub const DEFAULT_SCAN_DELAY_SECS: u64 = 60;

/// Default minimum gap between two recorded scans when entry/exit
/// tracking is enabled, in seconds.
pub const DEFAULT_MIN_GAP_SECS: u64 = 300;

/// How long the entry/exit tracker remembers a reference scan, in seconds.
/// A card unseen for longer starts over as if scanned for the first time.
pub const ENTRY_EXIT_RETENTION_SECS: u64 = 7 * 24 * 3600;

/// Display name recorded for cards with no directory entry.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Display name recorded for blocked cards.
pub const BLOCKED_NAME: &str = "Blocked";

/// Entity identifier attached to uploads when none is configured.
pub const DEFAULT_ENTITY_ID: &str = "default_entity";

// ============================================================================
// Transaction storage
// ============================================================================

/// Capacity of the in-memory recent transaction ring.
pub const RECENT_BUFFER_CAPACITY: usize = 200;

/// Default cap for the daily transaction files (16 GiB).
pub const DEFAULT_MAX_TX_STORAGE_BYTES: u64 = 16 * 1024 * 1024 * 1024;

/// Default fraction of the cap to free once the cap is exceeded.
pub const DEFAULT_CLEANUP_FRACTION: f64 = 0.5;

/// Default interval between retention checks, in seconds.
pub const DEFAULT_STORAGE_CHECK_INTERVAL_SECS: u64 = 300;

/// Retention checks never run more often than once a minute.
pub const MIN_STORAGE_CHECK_INTERVAL_SECS: u64 = 60;

/// Bytes read from the end of each daily file when the recent ring cannot
/// answer a query.
pub const TAIL_CHUNK_BYTES: u64 = 256 * 1024;

/// Prefix of daily transaction files (`transactions_YYYYMMDD.jsonl`).
pub const DAILY_FILE_PREFIX: &str = "transactions_";

/// Extension of daily transaction and failure cache files.
pub const JSONL_EXTENSION: &str = "jsonl";

// ============================================================================
// Cloud synchronization
// ============================================================================

/// Reconciliation interval while the sink is reachable, in seconds.
pub const RECONCILE_ONLINE_INTERVAL_SECS: u64 = 300;

/// Reconciliation interval while offline or unconfigured, in seconds.
pub const RECONCILE_OFFLINE_INTERVAL_SECS: u64 = 600;

/// Delay before the first reconciliation pass after startup, in seconds.
pub const RECONCILE_INITIAL_DELAY_SECS: u64 = 60;

/// Pause between two cached uploads during reconciliation, in milliseconds.
pub const RECONCILE_PACING_MS: u64 = 500;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bits_supported() {
        assert!(SUPPORTED_BIT_WIDTHS.contains(&DEFAULT_WIEGAND_BITS));
    }

    #[test]
    #[allow(clippy::assertions_on_constants)]
    fn test_intervals_ordered() {
        assert!(RECONCILE_ONLINE_INTERVAL_SECS < RECONCILE_OFFLINE_INTERVAL_SECS);
        assert!(MIN_STORAGE_CHECK_INTERVAL_SECS <= DEFAULT_STORAGE_CHECK_INTERVAL_SECS);
        assert!(DEFAULT_READER_COUNT <= MAX_DEVICE_NUMBER);
    }
}
