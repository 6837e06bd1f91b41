//! Error types for the onyx client.

use thiserror::Error;

use crate::config::ConfigError;
use crate::time::TimeError;

/// Errors that can occur in client operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// No account is available to sign with.
    #[error("No account identity is loaded")]
    NoIdentity,

    /// A server public key or URL is unusable.
    #[error("Invalid server: {0}")]
    InvalidServer(String),

    /// The server answered with a body we cannot use.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A blocking task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Clock error.
    #[error("Time error: {0}")]
    Time(#[from] TimeError),

    /// Onion transport error.
    #[error("Network error: {0}")]
    Net(#[from] onyx_net::OnionError),

    /// Storage error.
    #[error("Storage error: {0}")]
    Store(#[from] onyx_store::StoreError),

    /// Wire format error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] onyx_protocol::ProtocolError),

    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] onyx_crypto::CryptoError),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether the user can fix this (clock skew, being offline).
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, CoreError::Net(e) if e.is_user_actionable())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use onyx_net::OnionError;

    #[test]
    fn test_user_actionable_passes_through() {
        assert!(CoreError::from(OnionError::ClockOutOfSync).is_user_actionable());
        assert!(CoreError::from(OnionError::Offline).is_user_actionable());
        assert!(!CoreError::from(OnionError::ServerError).is_user_actionable());
        assert!(!CoreError::NoIdentity.is_user_actionable());
    }

    #[test]
    fn test_offline_message_is_stable() {
        let err = CoreError::from(OnionError::Offline);
        assert!(err.to_string().contains(onyx_net::ERROR_CODE_NO_CONNECT));
    }
}
