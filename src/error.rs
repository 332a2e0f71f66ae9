//! Error types for the RPA gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the RPA gateway
///
/// Device automation outcomes are not errors: the device client folds every
/// transport and protocol fault into a [`TaskResult`](crate::devices::TaskResult).
/// These variants cover configuration, registry lookups and the synchronous
/// status query, which reports an unreachable device as an error.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Device id is not registered
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Device registration rejected (empty id, bad endpoint)
    #[error("invalid device: {0}")]
    InvalidDevice(String),

    /// Device endpoint could not be reached or answered garbage
    #[error("device connection error: {0}")]
    Connection(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
