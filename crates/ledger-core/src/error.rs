//! Error types for ledger-core

use thiserror::Error;

/// Result type alias using ledger-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ledger-core storage and record operations
#[derive(Error, Debug)]
pub enum Error {
    /// Record store error
    #[error("Store error: {0}")]
    Store(String),

    /// Duplicate key on `add`
    #[error("Duplicate key {key} in {collection}")]
    DuplicateKey {
        /// Collection name
        collection: &'static str,
        /// Offending key
        key: String,
    },

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Fatal construction-time misconfiguration of the host bridge.
///
/// Never retried: a bridge that fails to construct stays unavailable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No counterpart origin was configured
    #[error("host origin is required")]
    MissingOrigin,

    /// Origin is not a bare http(s) scheme+host+port
    #[error("invalid host origin '{0}': expected http(s)://host[:port]")]
    InvalidOrigin(String),

    /// Origin is well-formed but not on the allow-list
    #[error("host origin '{0}' is not in the allow-list")]
    OriginNotAllowed(String),

    /// No counterpart window reference is available
    #[error("host window not available")]
    MissingHostWindow,

    /// Config file could not be read or parsed
    #[error("invalid bridge configuration: {0}")]
    Invalid(String),
}
