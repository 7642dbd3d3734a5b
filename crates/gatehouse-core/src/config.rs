//! Live-reloadable controller configuration.
//!
//! The on-disk form is `config.json`:
//!
//! ```json
//! {
//!   "wiegand_bits": { "reader_1": 26, "reader_2": 26, "reader_3": 34 },
//!   "wiegand_timeout_ms": 25,
//!   "scan_delay_seconds": 60,
//!   "entry_exit_tracking": { "enabled": false, "min_gap_seconds": 300 },
//!   "entity_id": "default_entity",
//!   "parity": { "26": "standard", "34": "none" }
//! }
//! ```
//!
//! Every key is optional; missing keys take their default values.

use crate::constants::{
    DEFAULT_ENTITY_ID, DEFAULT_FRAME_TIMEOUT_MS, DEFAULT_MIN_GAP_SECS, DEFAULT_READER_COUNT,
    DEFAULT_SCAN_DELAY_SECS, DEFAULT_WIEGAND_BITS, SUPPORTED_BIT_WIDTHS,
};
use crate::persist::{read_json_or_default, write_json_atomic};
use crate::{Error, ReaderId, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Parity check applied to frames of one bit width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParityScheme {
    /// Leading bit is even parity over the first half of the data bits,
    /// trailing bit is odd parity over the second half.
    Standard,
    /// Parity bits are stripped but not verified.
    None,
}

/// Frame length configured for each reader.
///
/// Serialized with `reader_N` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, u8>", into = "BTreeMap<String, u8>")]
pub struct WiegandBits(BTreeMap<ReaderId, u8>);

impl WiegandBits {
    pub fn new(bits: BTreeMap<ReaderId, u8>) -> Self {
        Self(bits)
    }

    /// Frame length for `reader`, defaulting to 26 bits.
    #[must_use]
    pub fn get(&self, reader: ReaderId) -> u8 {
        self.0.get(&reader).copied().unwrap_or(DEFAULT_WIEGAND_BITS)
    }

    pub fn set(&mut self, reader: ReaderId, bits: u8) {
        self.0.insert(reader, bits);
    }

    /// Configured readers in ascending order.
    pub fn readers(&self) -> impl Iterator<Item = ReaderId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReaderId, u8)> + '_ {
        self.0.iter().map(|(r, b)| (*r, *b))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for WiegandBits {
    fn default() -> Self {
        let bits = (1..=DEFAULT_READER_COUNT)
            .filter_map(|n| ReaderId::new(n).ok())
            .map(|r| (r, DEFAULT_WIEGAND_BITS))
            .collect();
        Self(bits)
    }
}

impl TryFrom<BTreeMap<String, u8>> for WiegandBits {
    type Error = Error;

    fn try_from(raw: BTreeMap<String, u8>) -> Result<Self> {
        let mut bits = BTreeMap::new();
        for (key, width) in raw {
            let number = key.strip_prefix("reader_").unwrap_or(&key);
            bits.insert(number.parse::<ReaderId>()?, width);
        }
        Ok(Self(bits))
    }
}

impl From<WiegandBits> for BTreeMap<String, u8> {
    fn from(bits: WiegandBits) -> Self {
        bits.0
            .into_iter()
            .map(|(reader, width)| (format!("reader_{reader}"), width))
            .collect()
    }
}

/// Entry/exit gating settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryExitConfig {
    pub enabled: bool,
    pub min_gap_seconds: u64,
}

impl Default for EntryExitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_gap_seconds: DEFAULT_MIN_GAP_SECS,
        }
    }
}

fn default_parity() -> BTreeMap<u8, ParityScheme> {
    BTreeMap::from([(26, ParityScheme::Standard), (34, ParityScheme::None)])
}

/// Controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub wiegand_bits: WiegandBits,
    pub wiegand_timeout_ms: u64,
    pub scan_delay_seconds: u64,
    pub entry_exit_tracking: EntryExitConfig,
    pub entity_id: String,
    pub parity: BTreeMap<u8, ParityScheme>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            wiegand_bits: WiegandBits::default(),
            wiegand_timeout_ms: DEFAULT_FRAME_TIMEOUT_MS,
            scan_delay_seconds: DEFAULT_SCAN_DELAY_SECS,
            entry_exit_tracking: EntryExitConfig::default(),
            entity_id: DEFAULT_ENTITY_ID.to_string(),
            parity: default_parity(),
        }
    }
}

impl ControllerConfig {
    /// Load from `path`, using defaults for a missing or corrupt file.
    ///
    /// An invalid but parseable file (for example an unsupported bit width)
    /// is also replaced by defaults, so the controller always starts.
    pub fn load_or_default(path: &Path) -> Self {
        let config: Self = read_json_or_default(path);
        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }
        }
    }

    /// Atomically persist to `path`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)
    }

    /// Check the configuration before it is applied.
    ///
    /// # Errors
    /// Returns `Error::UnsupportedBitWidth` for a reader with a frame length
    /// other than 26 or 34, and `Error::Config` for a zero frame timeout or an
    /// empty reader list.
    pub fn validate(&self) -> Result<()> {
        if self.wiegand_bits.is_empty() {
            return Err(Error::Config("at least one reader must be configured".into()));
        }
        for (_, bits) in self.wiegand_bits.iter() {
            if !SUPPORTED_BIT_WIDTHS.contains(&bits) {
                return Err(Error::UnsupportedBitWidth { bits });
            }
        }
        if self.wiegand_timeout_ms == 0 {
            return Err(Error::Config("wiegand_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn bits_for(&self, reader: ReaderId) -> u8 {
        self.wiegand_bits.get(reader)
    }

    /// Parity scheme for a frame length; unknown widths are not verified.
    #[must_use]
    pub fn parity_for(&self, bits: u8) -> ParityScheme {
        self.parity.get(&bits).copied().unwrap_or(ParityScheme::None)
    }

    #[must_use]
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_millis(self.wiegand_timeout_ms)
    }

    #[must_use]
    pub fn scan_delay(&self) -> Duration {
        Duration::from_secs(self.scan_delay_seconds)
    }

    /// Number of relays to drive: one per configured reader.
    #[must_use]
    pub fn relay_count(&self) -> u8 {
        self.wiegand_bits
            .readers()
            .map(|r| r.as_u8())
            .max()
            .unwrap_or(DEFAULT_READER_COUNT)
    }

    /// Whether applying `other` requires recreating the reader decoders.
    #[must_use]
    pub fn decoders_changed(&self, other: &ControllerConfig) -> bool {
        self.wiegand_bits != other.wiegand_bits
            || self.wiegand_timeout_ms != other.wiegand_timeout_ms
            || self.parity != other.parity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.wiegand_bits.len(), 3);
        assert_eq!(config.bits_for(ReaderId::new(2).unwrap()), 26);
        assert_eq!(config.frame_timeout(), Duration::from_millis(25));
        assert_eq!(config.scan_delay(), Duration::from_secs(60));
        assert!(!config.entry_exit_tracking.enabled);
        assert_eq!(config.entry_exit_tracking.min_gap_seconds, 300);
        assert_eq!(config.parity_for(26), ParityScheme::Standard);
        assert_eq!(config.parity_for(34), ParityScheme::None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{"wiegand_bits":{"reader_1":34},"scan_delay_seconds":5}"#;
        let config: ControllerConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.bits_for(ReaderId::new(1).unwrap()), 34);
        assert_eq!(config.wiegand_bits.len(), 1);
        assert_eq!(config.scan_delay_seconds, 5);
        assert_eq!(config.wiegand_timeout_ms, DEFAULT_FRAME_TIMEOUT_MS);
        assert_eq!(config.entity_id, DEFAULT_ENTITY_ID);
    }

    #[test]
    fn test_wiegand_bits_serialized_with_reader_keys() {
        let json = serde_json::to_value(ControllerConfig::default()).unwrap();
        assert_eq!(json["wiegand_bits"]["reader_1"], 26);
        assert_eq!(json["parity"]["26"], "standard");
    }

    #[rstest]
    #[case(24)]
    #[case(32)]
    #[case(37)]
    fn test_validate_rejects_bit_width(#[case] bits: u8) {
        let mut config = ControllerConfig::default();
        config.wiegand_bits.set(ReaderId::new(1).unwrap(), bits);
        assert!(matches!(
            config.validate(),
            Err(Error::UnsupportedBitWidth { bits: b }) if b == bits
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ControllerConfig {
            wiegand_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_corrupt_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "][").unwrap();
        assert_eq!(ControllerConfig::load_or_default(&path), ControllerConfig::default());

        std::fs::write(&path, r#"{"wiegand_bits":{"reader_1":40}}"#).unwrap();
        assert_eq!(ControllerConfig::load_or_default(&path), ControllerConfig::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = ControllerConfig::default();
        config.entry_exit_tracking.enabled = true;
        config.entity_id = "site-7".into();
        config.save(&path).unwrap();

        assert_eq!(ControllerConfig::load_or_default(&path), config);
    }

    #[test]
    fn test_decoders_changed() {
        let base = ControllerConfig::default();
        let mut other = base.clone();
        other.scan_delay_seconds = 1;
        assert!(!base.decoders_changed(&other));

        other.wiegand_timeout_ms = 50;
        assert!(base.decoders_changed(&other));
    }

    #[test]
    fn test_relay_count() {
        let mut config = ControllerConfig::default();
        assert_eq!(config.relay_count(), 3);
        config.wiegand_bits.set(ReaderId::new(5).unwrap(), 26);
        assert_eq!(config.relay_count(), 5);
    }
}
