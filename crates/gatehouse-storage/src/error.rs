use thiserror::Error;

/// Storage-specific error types for the Gatehouse access controller.
///
/// These errors represent failures writing or reading the transaction log,
/// the failure cache, and the directory files. None of them ever changes an
/// access decision; callers log them and carry on.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Shared type validation or persistence failed
    #[error(transparent)]
    Core(#[from] gatehouse_core::Error),

    /// Entity not found in a directory file
    #[error("Entity not found: {entity_type} with {field}={value}")]
    NotFound {
        entity_type: String,
        field: String,
        value: String,
    },

    /// Data validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    /// Create a not-found error for a card number.
    pub fn card_not_found(entity_type: impl Into<String>, card: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            field: "card_number".to_string(),
            value: card.into(),
        }
    }
}

/// Specialized result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
