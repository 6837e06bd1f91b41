//! Error types for storage operations.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] onyx_crypto::CryptoError),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The blinded key cache was used before `load`.
    #[error("Known blinded keys must be loaded on start")]
    NotLoaded,

    /// `load` was called a second time.
    #[error("Known blinded keys load must only be called once")]
    AlreadyLoaded,

    /// A mapping or lookup argument has the wrong kind of id.
    #[error("Invalid blinded mapping: {0}")]
    InvalidMapping(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;
