//! Mock hardware for testing and development.
//!
//! [`MockGpio`] records every line write so tests can assert on relay
//! behaviour without physical hardware, and can be switched into a failing
//! mode to exercise error paths.

use crate::gpio::{GpioDriver, LineLevel};
use crate::{HardwareError, Result};
use gatehouse_core::RelayId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
struct Lines {
    levels: BTreeMap<RelayId, LineLevel>,
    history: Vec<(RelayId, LineLevel)>,
}

/// In-memory GPIO driver.
///
/// # Examples
///
/// ```
/// use gatehouse_core::RelayId;
/// use gatehouse_hardware::gpio::{GpioDriver, LineLevel};
/// use gatehouse_hardware::mock::MockGpio;
///
/// let gpio = MockGpio::new();
/// let relay = RelayId::new(1).unwrap();
/// gpio.set_line(relay, LineLevel::Low).unwrap();
/// assert_eq!(gpio.level(relay), Some(LineLevel::Low));
/// ```
#[derive(Debug, Default)]
pub struct MockGpio {
    lines: Mutex<Lines>,
    failing: AtomicBool,
}

impl MockGpio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to `relay`, if any.
    pub fn level(&self, relay: RelayId) -> Option<LineLevel> {
        self.lines.lock().levels.get(&relay).copied()
    }

    /// Every write so far, oldest first.
    pub fn history(&self) -> Vec<(RelayId, LineLevel)> {
        self.lines.lock().history.clone()
    }

    /// Number of times `relay` was driven open.
    pub fn open_count(&self, relay: RelayId) -> usize {
        self.lines
            .lock()
            .history
            .iter()
            .filter(|(r, level)| *r == relay && *level == LineLevel::OPEN)
            .count()
    }

    /// Make subsequent writes fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl GpioDriver for MockGpio {
    fn set_line(&self, relay: RelayId, level: LineLevel) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HardwareError::line_write(relay.as_u8(), "mock failure"));
        }
        let mut lines = self.lines.lock();
        lines.levels.insert(relay, level);
        lines.history.push((relay, level));
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_history() {
        let gpio = MockGpio::new();
        let relay = RelayId::new(2).unwrap();

        gpio.set_line(relay, LineLevel::Low).unwrap();
        gpio.set_line(relay, LineLevel::High).unwrap();

        assert_eq!(gpio.level(relay), Some(LineLevel::High));
        assert_eq!(gpio.history().len(), 2);
        assert_eq!(gpio.open_count(relay), 1);
    }

    #[test]
    fn test_failing_mode() {
        let gpio = MockGpio::new();
        let relay = RelayId::new(1).unwrap();
        gpio.set_failing(true);

        assert!(gpio.set_line(relay, LineLevel::Low).is_err());
        assert_eq!(gpio.level(relay), None);
    }
}
