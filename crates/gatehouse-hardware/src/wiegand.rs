//! Wiegand frame decoding.
//!
//! A Wiegand reader signals each bit as a short low pulse on one of two data
//! lines: D0 for a zero, D1 for a one. The decoder shifts one bit in per
//! falling edge and emits a frame once the configured number of bits has
//! arrived. A gap between edges longer than the frame timeout means the
//! previous frame was abandoned part way, so the partial bits are discarded
//! before the new edge is counted.
//!
//! # Frame layout
//!
//! ```text
//! 26-bit:  P | 12 data bits | 12 data bits | P
//!          ^ even parity over first half    ^ odd parity over second half
//! ```
//!
//! 34-bit frames have the same shape with 16-bit halves. Many 34-bit
//! formats use vendor parity, so by default only the framing bits are
//! stripped; see [`ParityScheme`].
//!
//! # Examples
//!
//! ```
//! use gatehouse_core::{CardCode, ParityScheme};
//! use gatehouse_hardware::wiegand::{encode_frame, extract_card_code, WiegandDecoder};
//! use std::time::Duration;
//!
//! let frame = encode_frame(CardCode::new(0x12_3456), 26).unwrap();
//! let mut decoder = WiegandDecoder::new(26, Duration::from_millis(25));
//!
//! let mut decoded = None;
//! for (i, line) in frame.lines().enumerate() {
//!     decoder.on_edge(line, i as u32 * 2_000, |f| {
//!         decoded = Some(extract_card_code(f.bits, f.value, ParityScheme::Standard));
//!     });
//! }
//! assert_eq!(decoded.unwrap().unwrap(), CardCode::new(0x12_3456));
//! ```

use crate::{HardwareError, Result};
use gatehouse_core::constants::SUPPORTED_BIT_WIDTHS;
use gatehouse_core::{CardCode, ParityScheme};
use std::time::Duration;
use tracing::trace;

/// Wiegand data line an edge arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataLine {
    /// Zero bit.
    D0,
    /// One bit.
    D1,
}

/// A complete, not yet validated frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub bits: u8,
    pub value: u64,
}

impl Frame {
    /// Data lines that transmit this frame, most significant bit first.
    pub fn lines(&self) -> impl Iterator<Item = DataLine> + use<> {
        let value = self.value;
        (0..self.bits).rev().map(move |i| {
            if (value >> i) & 1 == 1 {
                DataLine::D1
            } else {
                DataLine::D0
            }
        })
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    value: u64,
    bit_count: u8,
    last_tick: Option<u32>,
}

impl Accumulator {
    fn reset(&mut self) {
        self.value = 0;
        self.bit_count = 0;
        self.last_tick = None;
    }
}

/// Clears the accumulator when dropped, including during unwinding.
struct ResetGuard<'a>(&'a mut Accumulator);

impl Drop for ResetGuard<'_> {
    fn drop(&mut self) {
        self.0.reset();
    }
}

/// Bit accumulator for a single reader.
#[derive(Debug)]
pub struct WiegandDecoder {
    expected_bits: u8,
    timeout_us: u32,
    acc: Accumulator,
}

impl WiegandDecoder {
    /// Create a decoder expecting `expected_bits` per frame.
    ///
    /// Timeouts longer than the tick counter range are clamped to it.
    pub fn new(expected_bits: u8, frame_timeout: Duration) -> Self {
        let timeout_us = u32::try_from(frame_timeout.as_micros()).unwrap_or(u32::MAX);
        Self {
            expected_bits,
            timeout_us,
            acc: Accumulator::default(),
        }
    }

    #[must_use]
    pub fn expected_bits(&self) -> u8 {
        self.expected_bits
    }

    #[must_use]
    pub fn frame_timeout(&self) -> Duration {
        Duration::from_micros(u64::from(self.timeout_us))
    }

    /// Bits accumulated towards the current frame.
    #[must_use]
    pub fn bit_count(&self) -> u8 {
        self.acc.bit_count
    }

    /// Feed one falling edge observed at `tick` (microseconds, wrapping).
    ///
    /// When the edge completes a frame, `on_frame` is called with it and the
    /// accumulator is cleared afterwards whatever the callback does. Returns
    /// `true` if a frame was emitted.
    pub fn on_edge<F>(&mut self, line: DataLine, tick: u32, on_frame: F) -> bool
    where
        F: FnOnce(Frame),
    {
        if let Some(last) = self.acc.last_tick
            && tick.wrapping_sub(last) > self.timeout_us
        {
            if self.acc.bit_count > 0 {
                trace!(bits = self.acc.bit_count, "frame timeout, discarding partial frame");
            }
            self.acc.reset();
        }

        self.acc.value = (self.acc.value << 1) | u64::from(line == DataLine::D1);
        self.acc.bit_count += 1;
        self.acc.last_tick = Some(tick);

        if self.acc.bit_count < self.expected_bits {
            return false;
        }

        let frame = Frame {
            bits: self.acc.bit_count,
            value: self.acc.value,
        };
        let _reset = ResetGuard(&mut self.acc);
        on_frame(frame);
        true
    }
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 }
}

/// Validate a frame and return the card code between its parity bits.
///
/// # Errors
///
/// Returns `HardwareError::UnsupportedFrameLength` for frames other than 26
/// or 34 bits, and `HardwareError::ParityMismatch` when `scheme` is
/// [`ParityScheme::Standard`] and either parity bit is wrong.
pub fn extract_card_code(bits: u8, value: u64, scheme: ParityScheme) -> Result<CardCode> {
    if !SUPPORTED_BIT_WIDTHS.contains(&bits) {
        return Err(HardwareError::unsupported_length(bits));
    }

    let data_bits = u32::from(bits - 2);
    let data = (value >> 1) & mask(data_bits);

    if scheme == ParityScheme::Standard {
        let half = data_bits / 2;
        let leading = (value >> (data_bits + 1)) & 1;
        let trailing = value & 1;
        let first = data >> half;
        let second = data & mask(half);

        let even_ok = (first.count_ones() + leading as u32) % 2 == 0;
        let odd_ok = (second.count_ones() + trailing as u32) % 2 == 1;
        if !(even_ok && odd_ok) {
            return Err(HardwareError::parity(bits));
        }
    }

    Ok(CardCode::new(data))
}

/// Build a frame carrying `code` with standard parity bits.
///
/// Used to simulate readers and in tests.
///
/// # Errors
///
/// Returns `HardwareError::UnsupportedFrameLength` for unsupported widths and
/// `HardwareError::ConfigurationError` if the code does not fit the frame.
pub fn encode_frame(code: CardCode, bits: u8) -> Result<Frame> {
    if !SUPPORTED_BIT_WIDTHS.contains(&bits) {
        return Err(HardwareError::unsupported_length(bits));
    }

    let data_bits = u32::from(bits - 2);
    let data = code.value();
    if data > mask(data_bits) {
        return Err(HardwareError::configuration(format!(
            "card code {code} does not fit a {bits}-bit frame"
        )));
    }

    let half = data_bits / 2;
    let leading = u64::from((data >> half).count_ones() % 2);
    let trailing = u64::from((data & mask(half)).count_ones() % 2 == 0);
    let value = (leading << (data_bits + 1)) | (data << 1) | trailing;

    Ok(Frame { bits, value })
}
