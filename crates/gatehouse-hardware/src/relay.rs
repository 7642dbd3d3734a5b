//! Door relay state machine.
//!
//! Every relay is either under automatic control, where a granted read
//! pulses the door open for a moment, or held open or closed by an operator.
//! A hold always wins over automatic pulses until it is cleared with
//! [`RelayAction::Normal`].
//!
//! ```text
//!                open_hold                 close_hold
//!   Automatic ────────────► OpenHold ◄──────────────────► CloseHold
//!       ▲                      │                               │
//!       └──────── normal ──────┴──────────── normal ───────────┘
//! ```
//!
//! All transitions on one relay are serialized by that relay's lock. Pulses
//! are fire-and-forget: the line is driven open immediately and a runtime
//! task restores the closed level after the pulse duration, unless a hold or
//! a newer pulse took over in the meantime.

use crate::gpio::{GpioDriver, LineLevel};
use crate::{HardwareError, Result};
use gatehouse_core::constants::{MAX_DEVICE_NUMBER, RELAY_PULSE_MS};
use gatehouse_core::{ReaderId, RelayAction, RelayId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

/// Control mode of one relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldState {
    /// Pulses on granted reads.
    Automatic,
    /// Held open by an operator.
    OpenHold,
    /// Held closed by an operator.
    CloseHold,
}

#[derive(Debug)]
struct RelayState {
    hold: HoldState,
    pulse_generation: u64,
}

type RelaySlot = Arc<Mutex<RelayState>>;

/// Drives the door relays.
pub struct RelayActuator {
    gpio: Arc<dyn GpioDriver>,
    relays: BTreeMap<RelayId, RelaySlot>,
    pulse_duration: Duration,
    runtime: Handle,
}

impl RelayActuator {
    /// Initialize `relay_count` relays to the closed level.
    ///
    /// Pulse restore tasks are spawned on `runtime`, so pulses may be
    /// requested from threads outside the runtime.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::InitializationFailed` if any line cannot be
    /// driven, and `HardwareError::ConfigurationError` for a relay count
    /// outside 1-8.
    pub fn new(gpio: Arc<dyn GpioDriver>, relay_count: u8, runtime: Handle) -> Result<Self> {
        if relay_count == 0 || relay_count > MAX_DEVICE_NUMBER {
            return Err(HardwareError::configuration(format!(
                "relay count must be 1-{MAX_DEVICE_NUMBER}, got {relay_count}"
            )));
        }

        let mut relays = BTreeMap::new();
        for n in 1..=relay_count {
            let relay = RelayId::new(n)?;
            gpio.set_line(relay, LineLevel::CLOSED).map_err(|e| {
                HardwareError::initialization_failed(format!("relay {relay}: {e}"))
            })?;
            relays.insert(
                relay,
                Arc::new(Mutex::new(RelayState {
                    hold: HoldState::Automatic,
                    pulse_generation: 0,
                })),
            );
        }

        info!(relays = relay_count, driver = gpio.name(), "relays initialized closed");

        Ok(Self {
            gpio,
            relays,
            pulse_duration: Duration::from_millis(RELAY_PULSE_MS),
            runtime,
        })
    }

    /// Override how long an automatic pulse keeps the door open.
    #[must_use]
    pub fn with_pulse_duration(mut self, duration: Duration) -> Self {
        self.pulse_duration = duration;
        self
    }

    pub fn relay_count(&self) -> u8 {
        self.relays.len() as u8
    }

    /// Relay that opens the door watched by `reader`.
    pub fn relay_for(&self, reader: ReaderId) -> RelayId {
        reader.relay(self.relay_count())
    }

    fn slot(&self, relay: RelayId) -> Result<&RelaySlot> {
        self.relays
            .get(&relay)
            .ok_or_else(|| HardwareError::unknown_relay(relay.as_u8()))
    }

    /// Current control mode of `relay`.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::UnknownRelay` for a relay that is not wired.
    pub fn hold_state(&self, relay: RelayId) -> Result<HoldState> {
        Ok(self.slot(relay)?.lock().hold)
    }

    /// Control modes of all relays.
    pub fn hold_states(&self) -> BTreeMap<RelayId, HoldState> {
        self.relays
            .iter()
            .map(|(relay, slot)| (*relay, slot.lock().hold))
            .collect()
    }

    /// Apply an operator command.
    ///
    /// `Normal` without an active hold changes nothing. Clearing a hold
    /// returns the line to the closed level without pulsing.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::UnknownRelay` for a relay that is not wired,
    /// or the driver's error if the line write fails. The hold state is only
    /// changed after a successful write.
    pub fn apply(&self, relay: RelayId, action: RelayAction) -> Result<()> {
        let slot = self.slot(relay)?;
        let mut state = slot.lock();

        let (level, hold) = match action {
            RelayAction::Normal if state.hold == HoldState::Automatic => {
                debug!(relay = %relay, "relay already under automatic control");
                return Ok(());
            }
            RelayAction::Normal => (LineLevel::CLOSED, HoldState::Automatic),
            RelayAction::OpenHold => (LineLevel::OPEN, HoldState::OpenHold),
            RelayAction::CloseHold => (LineLevel::CLOSED, HoldState::CloseHold),
        };

        self.gpio.set_line(relay, level)?;
        state.hold = hold;
        state.pulse_generation = state.pulse_generation.wrapping_add(1);
        info!(relay = %relay, ?action, "relay command applied");
        Ok(())
    }

    /// Pulse `relay` open after a granted read.
    ///
    /// Returns `Ok(false)` without touching the line while a hold is active.
    /// Does not block: the closed level is restored by a spawned task.
    ///
    /// # Errors
    ///
    /// Returns `HardwareError::UnknownRelay` for a relay that is not wired,
    /// or the driver's error if the line cannot be driven open.
    pub fn pulse(&self, relay: RelayId) -> Result<bool> {
        let slot = self.slot(relay)?;
        let generation = {
            let mut state = slot.lock();
            if state.hold != HoldState::Automatic {
                debug!(relay = %relay, hold = ?state.hold, "hold active, pulse ignored");
                return Ok(false);
            }
            self.gpio.set_line(relay, LineLevel::OPEN)?;
            state.pulse_generation = state.pulse_generation.wrapping_add(1);
            state.pulse_generation
        };

        let slot = Arc::clone(slot);
        let gpio = Arc::clone(&self.gpio);
        let duration = self.pulse_duration;
        self.runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            let state = slot.lock();
            if state.hold != HoldState::Automatic || state.pulse_generation != generation {
                return;
            }
            if let Err(e) = gpio.set_line(relay, LineLevel::CLOSED) {
                error!(relay = %relay, error = %e, "failed to close relay after pulse");
            }
        });

        debug!(relay = %relay, duration_ms = duration.as_millis() as u64, "relay pulsed");
        Ok(true)
    }
}

impl std::fmt::Debug for RelayActuator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayActuator")
            .field("driver", &self.gpio.name())
            .field("holds", &self.hold_states())
            .field("pulse_duration", &self.pulse_duration)
            .finish()
    }
}
