//! # onyx-core
//!
//! Client layer of onyx: configuration, the network clock, the account
//! identity, and requests to community servers (SOGS), the file server and
//! the push notification server over onion paths.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use onyx_core::{ClientConfig, OnyxClient, SendOptions, SogsServer, StaticIdentity};
//! use onyx_crypto::AccountKeyPair;
//! use onyx_net::CancellationToken;
//!
//! let identity = Arc::new(StaticIdentity::new(AccountKeyPair::generate()));
//! let client = OnyxClient::open(ClientConfig::default(), identity, relays, paths)?;
//!
//! let server = SogsServer::new("https://open.getsession.org", server_pubkey_hex)?;
//! let cancel = CancellationToken::new();
//! client.sogs().refresh_capabilities(&server, &cancel).await?;
//! let response = client
//!     .sogs()
//!     .send_json_to_sogs(&server, "GET", "/rooms", None, &SendOptions::default(), &cancel)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod sogs;
pub mod time;

pub use client::OnyxClient;
pub use config::{
    ClientConfig, ClientConfigBuilder, ConfigError, NetworkConfig, SogsConfig, StorageConfig,
};
pub use error::{CoreError, Result};
pub use identity::{IdentityProvider, StaticIdentity};
pub use sogs::{
    remove_message_padding, DecodedInboxMessage, SendOptions, ServerResponse, SogsClient,
    SogsServer,
};
pub use time::{NetworkTime, TimeError};
