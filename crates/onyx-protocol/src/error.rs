//! Error types for protocol operations.

use thiserror::Error;

/// Errors that can occur while building or parsing wire formats.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] onyx_crypto::CryptoError),

    /// A frame, envelope or typed response does not have the expected shape.
    #[error("Framing error: {0}")]
    Framing(String),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An onion path must contain at least one relay.
    #[error("Onion path is empty")]
    EmptyPath,

    /// A relay record is unusable.
    #[error("Invalid snode: {0}")]
    InvalidSnode(String),

    /// A destination URL could not be turned into a relay target.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// SOGS endpoints must start with `/`.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl ProtocolError {
    /// Shorthand for a [`ProtocolError::Framing`] error.
    pub fn framing(message: impl Into<String>) -> Self {
        ProtocolError::Framing(message.into())
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
