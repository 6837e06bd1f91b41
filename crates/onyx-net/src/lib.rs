//! # onyx-net
//!
//! Onion request transport for onyx.
//!
//! This crate provides:
//! - **Transport**: HTTPS POST of a layered payload to a guard relay
//! - **Response processing**: path-layer checks, decryption, V4 decoding
//! - **Classification**: mapping failures to errors and ejecting bad relays
//! - **Retries**: [`OnionClient`] retries recoverable failures on fresh paths
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use onyx_net::{MemoryRelayPool, MemorySwarmTable, OnionClient, OnionConfig};
//! use onyx_net::{ReqwestTransport, TransportConfig};
//!
//! let transport = Arc::new(ReqwestTransport::new(TransportConfig::default())?);
//! let pool = Arc::new(MemoryRelayPool::new(relays, paths));
//! let client = OnionClient::new(
//!     OnionConfig::default(),
//!     transport,
//!     pool,
//!     Arc::new(MemorySwarmTable::new()),
//! );
//! let response = client.send_to_snode(&target, body, &headers, None, &cancel).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod failure;
pub mod pool;
pub mod response;
pub mod transport;

pub use classifier::Classifier;
pub use client::{endpoint_of, path_string, OnionClient};
pub use config::{OnionConfig, RetryPolicy, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};
pub use error::{OnionError, Result, ERROR_CODE_NO_CONNECT};
pub use failure::FailureRegistry;
pub use pool::{MemoryRelayPool, MemorySwarmTable, RelayPool, SwarmTable};
pub use response::{decode_onion_result, SnodeResponse};
pub use transport::{
    BoxFuture, OnionTransport, ReqwestTransport, TransportConfig, TransportResponse,
    DEFAULT_REQUEST_TIMEOUT,
};

pub use tokio_util::sync::CancellationToken;
