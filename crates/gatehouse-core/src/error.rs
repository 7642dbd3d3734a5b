use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identifier errors
    #[error("Invalid card code: {0}")]
    InvalidCardCode(String),

    #[error("Invalid reader ID: {value}")]
    InvalidReaderId { value: String },

    #[error("Invalid relay ID: {value}")]
    InvalidRelayId { value: String },

    // Frame errors
    #[error("Unsupported Wiegand bit width: {bits}")]
    UnsupportedBitWidth { bits: u8 },

    #[error("Invalid relay action: {0}")]
    InvalidRelayAction(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
