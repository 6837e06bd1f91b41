//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed (invalid ciphertext or key).
    #[error("Decryption failed: invalid ciphertext or key")]
    Decryption,

    /// Signature verification failed.
    #[error("Signature verification failed")]
    SignatureVerification,

    /// The sender key embedded in a blinded message does not match the
    /// blinded key it was sent from.
    #[error("Invalid signature: sender key does not match blinded key")]
    InvalidSignature,

    /// Invalid key length.
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length.
        expected: usize,
        /// Actual key length.
        actual: usize,
    },

    /// Input is shorter than the minimum the format allows.
    #[error("Data too short: need more than {minimum} bytes, got {actual}")]
    DataTooShort {
        /// Minimum length (exclusive).
        minimum: usize,
        /// Actual length.
        actual: usize,
    },

    /// Unknown version byte on a blinded message.
    #[error("Unsupported message version: {0}")]
    UnsupportedVersion(u8),

    /// Invalid hex string format.
    #[error("Invalid hex string: {0}")]
    InvalidHexFormat(String),

    /// A point is not a valid prime-order curve point.
    #[error("Invalid curve point: {0}")]
    InvalidPoint(&'static str),

    /// A session id has the wrong prefix or length.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),
}

/// Result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
