//! Per-reader decoders with live reconfiguration.
//!
//! Each reader owns one [`WiegandDecoder`] behind its own lock, so edges on
//! different readers never contend. Reconfiguration takes the bank's write
//! lock and swaps whole decoders: an edge either sees the old decoder with
//! its old bit count or a fresh decoder with the new one.

use crate::wiegand::{DataLine, Frame, WiegandDecoder, extract_card_code};
use gatehouse_core::{CardCode, ControllerConfig, ParityScheme, ReaderId};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Callback receiving validated card codes.
pub type CardHandler = Arc<dyn Fn(ReaderId, CardCode) + Send + Sync>;

/// Decoder settings for one reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderSettings {
    pub bits: u8,
    pub frame_timeout: Duration,
    pub parity: ParityScheme,
}

impl ReaderSettings {
    pub fn from_config(config: &ControllerConfig, reader: ReaderId) -> Self {
        let bits = config.bits_for(reader);
        Self {
            bits,
            frame_timeout: config.frame_timeout(),
            parity: config.parity_for(bits),
        }
    }
}

struct ReaderSlot {
    settings: ReaderSettings,
    decoder: Mutex<WiegandDecoder>,
}

impl ReaderSlot {
    fn new(settings: ReaderSettings) -> Self {
        Self {
            settings,
            decoder: Mutex::new(WiegandDecoder::new(settings.bits, settings.frame_timeout)),
        }
    }
}

/// All readers wired to the controller.
pub struct ReaderBank {
    slots: RwLock<BTreeMap<ReaderId, ReaderSlot>>,
    handler: CardHandler,
}

impl ReaderBank {
    /// Create decoders for every reader in `config`.
    pub fn new(config: &ControllerConfig, handler: CardHandler) -> Self {
        let slots = config
            .wiegand_bits
            .readers()
            .map(|reader| (reader, ReaderSlot::new(ReaderSettings::from_config(config, reader))))
            .collect();

        Self {
            slots: RwLock::new(slots),
            handler,
        }
    }

    /// Feed a falling edge from `reader`.
    ///
    /// Runs the card handler synchronously when the edge completes a valid
    /// frame, after the bank and decoder locks are released. Invalid frames
    /// are logged and dropped; a panicking handler is logged and does not
    /// affect later reads.
    pub fn on_edge(&self, reader: ReaderId, line: DataLine, tick: u32) {
        let completed = {
            let slots = self.slots.read();
            let Some(slot) = slots.get(&reader) else {
                debug!(reader = %reader, "edge from unconfigured reader ignored");
                return;
            };

            let mut completed = None;
            slot.decoder
                .lock()
                .on_edge(line, tick, |frame| completed = Some(frame));
            completed.map(|frame| (slot.settings.parity, frame))
        };

        if let Some((parity, frame)) = completed {
            self.dispatch(reader, parity, frame);
        }
    }

    fn dispatch(&self, reader: ReaderId, parity: ParityScheme, frame: Frame) {
        let card = match extract_card_code(frame.bits, frame.value, parity) {
            Ok(card) => card,
            Err(e) => {
                warn!(reader = %reader, bits = frame.bits, error = %e, "dropped read");
                return;
            }
        };

        debug!(reader = %reader, card = %card, "card read");
        let handler = &self.handler;
        if panic::catch_unwind(AssertUnwindSafe(|| handler(reader, card))).is_err() {
            error!(reader = %reader, card = %card, "card handler panicked, read discarded");
        }
    }

    /// Apply new reader settings.
    ///
    /// Readers whose settings changed get a fresh decoder, readers no longer
    /// configured are removed, and new readers are added. Returns the number
    /// of decoders recreated.
    pub fn reconfigure(&self, config: &ControllerConfig) -> usize {
        let mut slots = self.slots.write();
        slots.retain(|reader, _| config.wiegand_bits.readers().any(|r| r == *reader));

        let mut recreated = 0;
        for reader in config.wiegand_bits.readers() {
            let settings = ReaderSettings::from_config(config, reader);
            let unchanged = slots.get(&reader).is_some_and(|s| s.settings == settings);
            if !unchanged {
                slots.insert(reader, ReaderSlot::new(settings));
                recreated += 1;
                info!(
                    reader = %reader,
                    bits = settings.bits,
                    timeout_ms = settings.frame_timeout.as_millis() as u64,
                    "reader decoder recreated"
                );
            }
        }
        recreated
    }

    /// Current settings, by reader.
    pub fn settings(&self) -> BTreeMap<ReaderId, ReaderSettings> {
        self.slots
            .read()
            .iter()
            .map(|(reader, slot)| (*reader, slot.settings))
            .collect()
    }

    pub fn readers(&self) -> Vec<ReaderId> {
        self.slots.read().keys().copied().collect()
    }
}

impl std::fmt::Debug for ReaderBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderBank")
            .field("settings", &self.settings())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wiegand::encode_frame;
    use std::sync::{OnceLock, Weak};

    fn collecting_bank(config: &ControllerConfig) -> (ReaderBank, Arc<Mutex<Vec<(ReaderId, CardCode)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: CardHandler = Arc::new(move |reader, card| sink.lock().push((reader, card)));
        (ReaderBank::new(config, handler), seen)
    }

    fn send(bank: &ReaderBank, reader: ReaderId, frame: Frame, start: u32) {
        for (i, line) in frame.lines().enumerate() {
            bank.on_edge(reader, line, start + i as u32 * 1_000);
        }
    }

    fn reader(n: u8) -> ReaderId {
        ReaderId::new(n).unwrap()
    }

    #[test]
    fn test_valid_frame_reaches_handler() {
        let (bank, seen) = collecting_bank(&ControllerConfig::default());
        let frame = encode_frame(CardCode::new(1234), 26).unwrap();

        send(&bank, reader(2), frame, 0);
        assert_eq!(*seen.lock(), vec![(reader(2), CardCode::new(1234))]);
    }

    #[test]
    fn test_bad_parity_is_dropped() {
        let (bank, seen) = collecting_bank(&ControllerConfig::default());
        let mut frame = encode_frame(CardCode::new(1234), 26).unwrap();
        frame.value ^= 1 << 3;

        send(&bank, reader(1), frame, 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_readers_are_independent() {
        let (bank, seen) = collecting_bank(&ControllerConfig::default());
        let a = encode_frame(CardCode::new(1), 26).unwrap();
        let b = encode_frame(CardCode::new(2), 26).unwrap();

        // Interleave edges from two readers
        for (i, (la, lb)) in a.lines().zip(b.lines()).enumerate() {
            let tick = i as u32 * 1_000;
            bank.on_edge(reader(1), la, tick);
            bank.on_edge(reader(3), lb, tick + 10);
        }

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&(reader(1), CardCode::new(1))));
        assert!(seen.contains(&(reader(3), CardCode::new(2))));
    }

    #[test]
    fn test_unconfigured_reader_ignored() {
        let (bank, seen) = collecting_bank(&ControllerConfig::default());
        let frame = encode_frame(CardCode::new(9), 26).unwrap();

        send(&bank, reader(7), frame, 0);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_reconfigure_discards_partial_frame() {
        let mut config = ControllerConfig::default();
        let (bank, seen) = collecting_bank(&config);
        let short = encode_frame(CardCode::new(10), 26).unwrap();

        // Half a 26-bit frame, then the reader switches to 34 bits
        for (i, line) in short.lines().take(13).enumerate() {
            bank.on_edge(reader(1), line, i as u32 * 1_000);
        }
        config.wiegand_bits.set(reader(1), 34);
        assert_eq!(bank.reconfigure(&config), 1);

        let long = encode_frame(CardCode::new(0xFFFF_0000), 34).unwrap();
        send(&bank, reader(1), long, 20_000);

        assert_eq!(*seen.lock(), vec![(reader(1), CardCode::new(0xFFFF_0000))]);
        assert_eq!(bank.settings()[&reader(1)].bits, 34);
    }

    #[test]
    fn test_reconfigure_keeps_unchanged_readers() {
        let config = ControllerConfig::default();
        let (bank, _) = collecting_bank(&config);
        assert_eq!(bank.reconfigure(&config), 0);
    }

    #[test]
    fn test_reconfigure_adds_and_removes_readers() {
        let mut config = ControllerConfig::default();
        let (bank, _) = collecting_bank(&config);

        let mut bits = BTreeMap::new();
        bits.insert(reader(1), 26);
        bits.insert(reader(4), 34);
        config.wiegand_bits = gatehouse_core::WiegandBits::new(bits);

        assert_eq!(bank.reconfigure(&config), 1);
        assert_eq!(bank.readers(), vec![reader(1), reader(4)]);
    }

    #[test]
    fn test_handler_may_reconfigure_the_bank() {
        let bank_slot: Arc<OnceLock<Weak<ReaderBank>>> = Arc::new(OnceLock::new());
        let slot = Arc::clone(&bank_slot);
        let recreated = Arc::new(Mutex::new(None));
        let out = Arc::clone(&recreated);

        // Needs the bank's write lock from inside the frame handler
        let handler: CardHandler = Arc::new(move |reader, _| {
            let Some(bank) = slot.get().and_then(Weak::upgrade) else {
                return;
            };
            let mut config = ControllerConfig::default();
            config.wiegand_bits.set(reader, 34);
            *out.lock() = Some(bank.reconfigure(&config));
        });
        let bank = Arc::new(ReaderBank::new(&ControllerConfig::default(), handler));
        assert!(bank_slot.set(Arc::downgrade(&bank)).is_ok());

        send(&bank, reader(1), encode_frame(CardCode::new(5), 26).unwrap(), 0);

        assert_eq!(*recreated.lock(), Some(1));
        assert_eq!(bank.settings()[&reader(1)].bits, 34);
    }

    #[test]
    fn test_panicking_handler_isolated() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&calls);
        let handler: CardHandler = Arc::new(move |_, card| {
            *counter.lock() += 1;
            if card.value() == 13 {
                panic!("unlucky card");
            }
        });
        let bank = ReaderBank::new(&ControllerConfig::default(), handler);

        send(&bank, reader(1), encode_frame(CardCode::new(13), 26).unwrap(), 0);
        send(&bank, reader(1), encode_frame(CardCode::new(14), 26).unwrap(), 100_000);

        assert_eq!(*calls.lock(), 2);
    }
}
