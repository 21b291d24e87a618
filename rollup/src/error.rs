//! Error types for the rollup engines

use thiserror::Error;

/// Result type for rollup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Rollup errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger error
    #[error("Ledger error: {0}")]
    Core(#[from] balance_core::Error),

    /// Audit hook error
    #[error("Audit error: {0}")]
    Audit(String),

    /// Scheduling error
    #[error("Schedule error: {0}")]
    Schedule(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
