//! Error types for ledgersync

use thiserror::Error;

/// Result type alias for ledgersync operations
pub type Result<T> = std::result::Result<T, LedgerSyncError>;

/// Main error type shared by the ledgersync crates
#[derive(Error, Debug)]
pub enum LedgerSyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown sync action: {0}")]
    UnknownAction(String),

    #[error("Invalid tenant scope: {0}")]
    InvalidScope(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),
}
