//! Error types for hardware operations.
//!
//! Covers the two things that can go wrong at the hardware edge: a frame that
//! does not decode into a card code, and a GPIO line that cannot be driven.
//! Frame errors are always dropped reads; line errors at startup are fatal.

/// Result type alias for hardware operations.
pub type Result<T> = std::result::Result<T, HardwareError>;

/// Errors that can occur during hardware operations.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Frame length the decoder cannot interpret.
    #[error("Unsupported frame length: {bits} bits")]
    UnsupportedFrameLength { bits: u8 },

    /// Frame failed its parity check.
    #[error("Parity check failed for {bits}-bit frame")]
    ParityMismatch { bits: u8 },

    /// Relay number with no driver line.
    #[error("Unknown relay: {relay}")]
    UnknownRelay { relay: u8 },

    /// Driving a GPIO line failed.
    #[error("Line write failed on relay {relay}: {message}")]
    LineWrite { relay: u8, message: String },

    /// Device initialization failed.
    #[error("Initialization failed: {message}")]
    InitializationFailed { message: String },

    /// Device configuration error.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    /// Core type validation error.
    #[error(transparent)]
    Core(#[from] gatehouse_core::Error),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    /// Create a new unsupported frame length error.
    pub fn unsupported_length(bits: u8) -> Self {
        Self::UnsupportedFrameLength { bits }
    }

    /// Create a new parity mismatch error.
    pub fn parity(bits: u8) -> Self {
        Self::ParityMismatch { bits }
    }

    /// Create a new unknown relay error.
    pub fn unknown_relay(relay: u8) -> Self {
        Self::UnknownRelay { relay }
    }

    /// Create a new line write error.
    pub fn line_write(relay: u8, message: impl Into<String>) -> Self {
        Self::LineWrite {
            relay,
            message: message.into(),
        }
    }

    /// Create a new initialization failed error.
    pub fn initialization_failed(message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            message: message.into(),
        }
    }

    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// Whether this error describes a bad read rather than a device fault.
    pub fn is_dropped_read(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFrameLength { .. } | Self::ParityMismatch { .. }
        )
    }
}
