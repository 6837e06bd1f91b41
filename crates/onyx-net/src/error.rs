//! Error types for onion requests.
//!
//! Every failure of a single attempt maps to one variant. Whether the
//! retry loop tries again is decided by [`OnionError::is_retryable`] and
//! nothing else.

use thiserror::Error;

use onyx_protocol::limits::CLOCK_OUT_OF_SYNC_MESSAGE;

/// Stable code surfaced when the network could not be reached at all.
pub const ERROR_CODE_NO_CONNECT: &str = "ERROR_CODE_NO_CONNECT";

/// Errors that can occur while sending an onion request.
#[derive(Error, Debug)]
pub enum OnionError {
    /// Building or parsing a wire format failed.
    #[error("Protocol error: {0}")]
    Protocol(#[from] onyx_protocol::ProtocolError),

    /// A local cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[from] onyx_crypto::CryptoError),

    /// The destination's response could not be decrypted or parsed.
    #[error("Failed to decode onion response: {0}")]
    Decode(String),

    /// A relay rejected our timestamp (406 or 425).
    #[error("{}", CLOCK_OUT_OF_SYNC_MESSAGE)]
    ClockOutOfSync,

    /// A relay answered 421; the swarm was updated or pruned.
    #[error("421 handled. Retry this request with a new target node")]
    SwarmInvalid,

    /// A 421 arrived without a destination relay or account to attach it to.
    #[error("Status 421 without a destination relay or associated key: {0}")]
    InvalidSwarmContext(String),

    /// The destination relay reported that the node it needed is unknown.
    #[error("Next node not found: {ed25519} (status {status})")]
    NodeNotFound {
        /// Id of the missing relay.
        ed25519: String,
        /// Status the destination returned.
        status: u16,
    },

    /// The destination relay failed; its failure counter was incremented.
    #[error("Bad relay handled. Retry this request. Status: {status}")]
    RelayFault {
        /// Id of the failing relay.
        ed25519: String,
        /// Status the relay returned.
        status: u16,
    },

    /// The path failed before reaching the destination.
    #[error("Bad path handled. Retry this request. Status: {status}")]
    PathFault {
        /// HTTP status of the guard response, or 8888 when there was none.
        status: u16,
    },

    /// The local network is unreachable.
    #[error("Network unreachable")]
    NetworkUnreachable,

    /// Every attempt failed because the network is unreachable.
    #[error("{}", ERROR_CODE_NO_CONNECT)]
    Offline,

    /// The destination server is failing; retrying will not help.
    #[error("Oxen Server error")]
    ServerError,

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// The guard returned an empty body.
    #[error("Target node returned an empty response")]
    EmptyResponse,

    /// A non-relay destination answered with a status outside 200-299.
    #[error("Destination returned status {status}")]
    DestinationStatus {
        /// Status from the response meta.
        status: u16,
    },

    /// No onion path is available.
    #[error("No onion path available")]
    NoPath,

    /// The HTTP request to the guard failed (timeout, refused, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A background task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl OnionError {
    /// Whether another attempt, on a fresh path, may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            OnionError::InvalidSwarmContext(_)
            | OnionError::RelayFault { .. }
            | OnionError::PathFault { .. }
            | OnionError::NetworkUnreachable
            | OnionError::EmptyResponse
            | OnionError::DestinationStatus { .. }
            | OnionError::NoPath
            | OnionError::Transport(_) => true,
            OnionError::Protocol(_)
            | OnionError::Crypto(_)
            | OnionError::Decode(_)
            | OnionError::ClockOutOfSync
            | OnionError::SwarmInvalid
            | OnionError::NodeNotFound { .. }
            | OnionError::Offline
            | OnionError::ServerError
            | OnionError::Cancelled
            | OnionError::Internal(_) => false,
        }
    }

    /// Whether the user can fix this (clock or connectivity).
    pub fn is_user_actionable(&self) -> bool {
        matches!(self, OnionError::ClockOutOfSync | OnionError::Offline)
    }

    /// Stable error code, for the conditions that have one.
    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            OnionError::Offline => Some(ERROR_CODE_NO_CONNECT),
            _ => None,
        }
    }

    /// The error reported once all attempts are used up.
    pub fn into_exhausted(self) -> Self {
        match self {
            OnionError::NetworkUnreachable => OnionError::Offline,
            other => other,
        }
    }
}

/// Result type for onion requests.
pub type Result<T> = std::result::Result<T, OnionError>;
