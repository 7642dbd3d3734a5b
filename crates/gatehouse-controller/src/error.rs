use gatehouse_hardware::HardwareError;
use gatehouse_storage::StorageError;
use gatehouse_sync::SyncError;
use thiserror::Error;

/// Errors surfaced by the controller's operations.
///
/// The access pipeline itself never returns these: decode, durability and
/// upload failures are logged where they happen. They reach callers only
/// from startup and administrative operations.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Shared type validation or configuration persistence failed
    #[error(transparent)]
    Core(#[from] gatehouse_core::Error),

    /// Relay or reader hardware failed
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// Directory, statistics or transaction files failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Failure cache could not be reconciled
    #[error(transparent)]
    Sync(#[from] SyncError),

    /// Controller was assembled with missing or invalid parts
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ControllerError {
    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result type alias for controller operations.
pub type Result<T> = std::result::Result<T, ControllerError>;
