//! # onyx-protocol
//!
//! Wire formats for the onyx transport core.
//!
//! This crate provides:
//! - **V4 framing**: `l<len>:<meta><len>:<body>e` request/response frames
//! - **Onion layering**: per-hop encryption of a request for a path of relays
//! - **SOGS**: request signing, batch subrequests and typed response bodies
//!
//! Nothing here performs I/O; see `onyx-net` for the transport.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod limits;
pub mod onion;
pub mod sogs;
pub mod v4;

#[cfg(test)]
mod proptests;

pub use error::{ProtocolError, Result};
pub use onion::{
    build_onion_payload, decode_ciphertext_plus_json, encode_ciphertext_plus_json, peel_layer,
    snode_destination_payload, FinalRelayTarget, OnionDestination, OnionPath, OnionPayload, Snode,
};
pub use v4::{
    decode_v4_request, decode_v4_response, encode_v4, encode_v4_request, encode_v4_response,
    DestinationRequest, Headers, V4Body, V4Response,
};
