//! Error types for the ledger engine

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Operator misconfiguration (never retried automatically)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Not enough budget to provision a new archive unit
    #[error("Insufficient budget: need {required}, have {available}")]
    InsufficientBudget {
        /// Funding required for one new unit
        required: u64,
        /// Budget reported by the provisioner
        available: u64,
    },

    /// Archive unit refused a transfer or could not be reached
    #[error("Transfer rejected: {0}")]
    TransferRejected(String),

    /// Tip requested but no certificate store is configured
    #[error("Tip is not certified: {0}")]
    Uncertified(String),

    /// Internal invariant broken (a bug, not a normal condition)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Value cannot be represented in the ledger value model
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Malformed LEB128 input
    #[error("LEB128 decode error: {0}")]
    Leb128(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a migration pass hitting this error may simply be retried later
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::InsufficientBudget { .. } | Error::TransferRejected(_)
        )
    }
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
