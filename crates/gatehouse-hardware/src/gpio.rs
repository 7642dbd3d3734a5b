//! GPIO driver abstraction for door relays.
//!
//! Relays are active-low: driving the line low energizes the strike and
//! opens the door, high is the closed resting level.
//!
//! Unlike the async device traits, [`GpioDriver`] is synchronous. Line writes
//! happen from reader interrupt callbacks, which run the access pipeline to
//! completion before the next edge arrives and cannot await.

use crate::Result;
use gatehouse_core::RelayId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Logic level of a relay output line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineLevel {
    Low,
    High,
}

impl LineLevel {
    /// Level that opens the door.
    pub const OPEN: LineLevel = LineLevel::Low;

    /// Level that keeps the door closed.
    pub const CLOSED: LineLevel = LineLevel::High;
}

/// Driver for relay output lines.
pub trait GpioDriver: Send + Sync {
    /// Drive the line wired to `relay` to `level`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::LineWrite` if the line cannot be driven, or
    /// `HardwareError::UnknownRelay` if no line is wired to `relay`.
    fn set_line(&self, relay: RelayId, level: LineLevel) -> Result<()>;

    /// Human-readable driver name for status and logs.
    fn name(&self) -> &str {
        "gpio"
    }
}

impl<T: GpioDriver + ?Sized> GpioDriver for Arc<T> {
    fn set_line(&self, relay: RelayId, level: LineLevel) -> Result<()> {
        (**self).set_line(relay, level)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
