//! Hardware layer for the Gatehouse access controller.
//!
//! This crate turns raw reader edges into card codes and card decisions into
//! relay movements. It knows nothing about users or transactions; the
//! controller crate wires it to the access pipeline.
//!
//! # Readers
//!
//! Card readers speak Wiegand: one falling edge per bit on either the D0 or
//! D1 line. [`WiegandDecoder`] accumulates bits for one reader and
//! [`extract_card_code`] validates the framing and parity of a complete
//! frame. [`ReaderBank`] owns one decoder per reader and hands validated
//! codes to a [`CardHandler`]:
//!
//! ```
//! use gatehouse_core::{CardCode, ControllerConfig, ReaderId};
//! use gatehouse_hardware::readers::{CardHandler, ReaderBank};
//! use gatehouse_hardware::wiegand::encode_frame;
//! use std::sync::Arc;
//!
//! let handler: CardHandler = Arc::new(|reader, card| {
//!     println!("reader {reader} read card {card}");
//! });
//! let bank = ReaderBank::new(&ControllerConfig::default(), handler);
//!
//! let reader = ReaderId::new(1).unwrap();
//! let frame = encode_frame(CardCode::new(4242), 26).unwrap();
//! for (i, line) in frame.lines().enumerate() {
//!     bank.on_edge(reader, line, i as u32 * 2_000);
//! }
//! ```
//!
//! # Relays
//!
//! [`RelayActuator`] drives door relays through a [`GpioDriver`]. Granted
//! reads pulse the door open for one second; operators can hold a door open
//! or closed.
//!
//! # Thread Safety
//!
//! Edge callbacks from different readers may run concurrently on different
//! threads. Each decoder and each relay has its own lock, so readers never
//! contend with each other.
//!
//! [`WiegandDecoder`]: wiegand::WiegandDecoder
//! [`extract_card_code`]: wiegand::extract_card_code
//! [`ReaderBank`]: readers::ReaderBank
//! [`CardHandler`]: readers::CardHandler
//! [`RelayActuator`]: relay::RelayActuator
//! [`GpioDriver`]: gpio::GpioDriver

pub mod error;
pub mod gpio;
pub mod mock;
pub mod readers;
pub mod relay;
pub mod wiegand;

// Re-export commonly used types for convenience
pub use error::{HardwareError, Result};
pub use gpio::{GpioDriver, LineLevel};
pub use readers::{CardHandler, ReaderBank, ReaderSettings};
pub use relay::{HoldState, RelayActuator};
pub use wiegand::{DataLine, Frame, WiegandDecoder, encode_frame, extract_card_code};
