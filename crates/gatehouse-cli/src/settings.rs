//! Process settings from environment variables.

use anyhow::{Context, Result, bail};
use gatehouse_core::constants::{MAX_DEVICE_NUMBER, MIN_DEVICE_NUMBER};
use gatehouse_core::{ControllerConfig, ReaderId};
use gatehouse_storage::StorageConfig;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BASE_DIR: &str = "gatehouse-data";

/// Which cloud sink uploads go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// No sink; every transaction waits in the failure cache.
    None,
    /// In-process sink, for trying the controller without a backend.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub storage: StorageConfig,
    pub sink: SinkKind,
    pub entity_id: Option<String>,
    pub scan_delay_seconds: Option<u64>,
    pub wiegand_timeout_ms: Option<u64>,
    pub reader_bits: BTreeMap<ReaderId, u8>,
}

fn parse<T>(name: &str, value: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim().parse::<T>().with_context(|| format!("invalid {name}: {v:?}")))
        .transpose()
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through `lookup`, which returns a variable's value if
    /// it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let base_dir = lookup("BASE_DIR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_DIR.to_string());
        let mut storage = StorageConfig::new(PathBuf::from(base_dir));

        if let Some(gb) = parse::<f64>("MAX_TX_STORAGE_GB", lookup("MAX_TX_STORAGE_GB"))? {
            storage = storage.max_gigabytes(gb);
        }
        if let Some(fraction) = parse::<f64>("CLEANUP_FRACTION", lookup("CLEANUP_FRACTION"))? {
            storage = storage.cleanup_fraction(fraction);
        }
        if let Some(secs) =
            parse::<u64>("TX_STORAGE_CHECK_INTERVAL", lookup("TX_STORAGE_CHECK_INTERVAL"))?
        {
            storage = storage.check_interval(Duration::from_secs(secs));
        }
        storage.validate().context("invalid storage settings")?;

        let sink = match lookup("CLOUD_SINK").as_deref().map(str::trim) {
            None | Some("") | Some("none") => SinkKind::None,
            Some("memory") => SinkKind::Memory,
            Some(other) => bail!("invalid CLOUD_SINK: {other:?} (expected none or memory)"),
        };

        let mut reader_bits = BTreeMap::new();
        for n in MIN_DEVICE_NUMBER..=MAX_DEVICE_NUMBER {
            let name = format!("WIEGAND_BITS_READER_{n}");
            if let Some(bits) = parse::<u8>(&name, lookup(&name))? {
                reader_bits.insert(ReaderId::new(n)?, bits);
            }
        }

        Ok(Self {
            storage,
            sink,
            entity_id: lookup("ENTITY_ID").filter(|v| !v.trim().is_empty()),
            scan_delay_seconds: parse("SCAN_DELAY_SECONDS", lookup("SCAN_DELAY_SECONDS"))?,
            wiegand_timeout_ms: parse("WIEGAND_TIMEOUT_MS", lookup("WIEGAND_TIMEOUT_MS"))?,
            reader_bits,
        })
    }

    /// Overlay the variables that were set onto a loaded configuration.
    pub fn apply(&self, config: &mut ControllerConfig) {
        if let Some(entity_id) = &self.entity_id {
            config.entity_id = entity_id.clone();
        }
        if let Some(delay) = self.scan_delay_seconds {
            config.scan_delay_seconds = delay;
        }
        if let Some(timeout) = self.wiegand_timeout_ms {
            config.wiegand_timeout_ms = timeout;
        }
        for (reader, bits) in &self.reader_bits {
            config.wiegand_bits.set(*reader, *bits);
        }
    }
}
