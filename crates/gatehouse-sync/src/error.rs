use gatehouse_storage::StorageError;
use thiserror::Error;

/// Errors raised while delivering transactions to the cloud sink.
///
/// Every sink error is retryable: the transaction goes to the failure cache
/// and is re-sent by the reconciler.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Sink could not be reached
    #[error("Sink unreachable: {message}")]
    Unreachable { message: String },

    /// Sink refused the record
    #[error("Upload rejected: {message}")]
    Rejected { message: String },

    /// Upload did not finish in time
    #[error("Upload timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Failure cache could not be read or written
    #[error("Failure cache error: {0}")]
    Cache(#[from] StorageError),
}

impl SyncError {
    /// Create a new unreachable error.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Create a new rejected error.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
