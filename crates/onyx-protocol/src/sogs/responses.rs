//! Typed SOGS response bodies.
//!
//! Batch subresponses are validated against these types before anything
//! else looks at them; a body that does not fit is a framing error for
//! that entry.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProtocolError, Result};
use crate::limits::BLIND_CAPABILITY;

/// `GET /capabilities`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    /// Capabilities the server supports.
    pub capabilities: Vec<String>,
    /// Capabilities we asked for that the server lacks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing: Option<Vec<String>>,
}

impl CapabilitiesResponse {
    /// Whether the server only accepts blinded ids.
    pub fn requires_blinding(&self) -> bool {
        self.capabilities.iter().any(|c| c == BLIND_CAPABILITY)
    }
}

/// Room details included in a poll when they changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDetails {
    /// Room token.
    #[serde(default)]
    pub token: Option<String>,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Room image file id.
    #[serde(default)]
    pub image_id: Option<u64>,
    /// Public admins.
    #[serde(default)]
    pub admins: Vec<String>,
    /// Public moderators.
    #[serde(default)]
    pub moderators: Vec<String>,
    /// Admins visible only to moderators.
    #[serde(default)]
    pub hidden_admins: Vec<String>,
    /// Moderators visible only to moderators.
    #[serde(default)]
    pub hidden_moderators: Vec<String>,
}

/// `GET /room/{room}/pollInfo/{info_updates}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollInfoResponse {
    /// Room token.
    pub token: String,
    /// Recently active users.
    pub active_users: u64,
    /// Whether we may read.
    pub read: bool,
    /// Whether we may post.
    pub write: bool,
    /// Whether we may upload files.
    pub upload: bool,
    /// Present when the room info changed since `info_updates`.
    #[serde(default)]
    pub details: Option<RoomDetails>,
}

/// One room message from `/messages/since` or `/messages/recent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessage {
    /// Server message id.
    pub id: u64,
    /// Room sequence number.
    pub seqno: u64,
    /// Author id (`05` or `15`).
    #[serde(default)]
    pub session_id: Option<String>,
    /// Unix seconds with fraction.
    #[serde(default)]
    pub posted: Option<f64>,
    /// Unix seconds of the last edit.
    #[serde(default)]
    pub edited: Option<f64>,
    /// Set on deletion tombstones.
    #[serde(default)]
    pub deleted: Option<bool>,
    /// Base64 message data; `null` for deletions.
    #[serde(default)]
    pub data: Option<String>,
    /// Base64 signature over `data`.
    #[serde(default)]
    pub signature: Option<String>,
    /// Reaction map, passed through untyped.
    #[serde(default)]
    pub reactions: Option<Value>,
}

/// One blinded direct message from `/inbox` or `/outbox`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxMessage {
    /// Inbox message id.
    pub id: u64,
    /// Blinded id of the sender.
    pub sender: String,
    /// Blinded id of the recipient.
    pub recipient: String,
    /// Unix seconds with fraction.
    pub posted_at: f64,
    /// Base64 encrypted message.
    pub message: String,
}

impl InboxMessage {
    /// `posted_at` in whole milliseconds.
    pub fn posted_at_ms(&self) -> u64 {
        (self.posted_at * 1000.0).floor().max(0.0) as u64
    }

    /// Decode the base64 message.
    pub fn decode_message(&self) -> Result<Vec<u8>> {
        STANDARD
            .decode(&self.message)
            .map_err(|e| ProtocolError::framing(format!("inbox message {}: {e}", self.id)))
    }
}

/// Parse a JSON body into `T`, mapping schema errors to `Framing`.
pub fn parse_typed<T: serde::de::DeserializeOwned>(kind: &str, body: &Value) -> Result<T> {
    T::deserialize(body)
        .map_err(|e| ProtocolError::framing(format!("invalid {kind} response: {e}")))
}
