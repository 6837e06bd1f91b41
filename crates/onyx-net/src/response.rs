//! Decoding guard responses.
//!
//! The guard's HTTP status is classified first: a relay error on the way
//! is never encrypted under our key. Only then is the body decrypted with
//! the destination key and the destination's own status checked.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value;
use tracing::{debug, error};

use onyx_crypto::{decrypt_gcm, SymmetricKey};
use onyx_protocol::limits::STATUS_NO_STATUS;
use onyx_protocol::{decode_v4_response, Snode, V4Response};

use crate::classifier::Classifier;
use crate::error::{OnionError, Result};
use crate::transport::TransportResponse;

/// Decrypted answer of a relay destination.
#[derive(Debug, Clone, PartialEq)]
pub struct SnodeResponse {
    /// `status_code` (or `status`) from the decrypted JSON.
    pub status: u16,
    /// The `body` field, usually a JSON-encoded string.
    pub body: Value,
}

impl SnodeResponse {
    /// Body as text: strings as-is, anything else re-serialized.
    pub fn body_text(&self) -> String {
        value_text(&self.body)
    }

    /// Body parsed as JSON, when it is a JSON-encoded string or an object.
    pub fn body_json(&self) -> Option<Value> {
        match &self.body {
            Value::String(text) => serde_json::from_str(text).ok(),
            Value::Null => None,
            other => Some(other.clone()),
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decrypt a relay response body.
///
/// The text is either `{"result": "<base64>"}` or bare base64.
pub fn decode_onion_result(key: &SymmetricKey, text: &str) -> Result<Vec<u8>> {
    let encoded = serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|json| json.get("result").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| text.trim().to_string());
    let ciphertext = STANDARD
        .decode(encoded)
        .map_err(|e| OnionError::Decode(format!("invalid base64: {}", e)))?;
    decrypt_gcm(key, &ciphertext).map_err(|e| OnionError::Decode(e.to_string()))
}

/// Process the guard's answer to a request for a relay destination.
pub async fn process_snode_response(
    classifier: &Classifier,
    response: TransportResponse,
    key: &SymmetricKey,
    guard: &Snode,
    destination: &Snode,
    associated_with: Option<&str>,
) -> Result<SnodeResponse> {
    let text = response.text();
    classifier
        .check_path_status(
            response.status,
            &text,
            &guard.pubkey_ed25519,
            Some(&destination.pubkey_ed25519),
            associated_with,
        )
        .await?;

    if text.is_empty() {
        return Err(OnionError::EmptyResponse);
    }

    let plaintext = decode_onion_result(key, &text).map_err(|e| {
        error!(destination = %destination.ed25519_str(), error = %e, "failed to decrypt relay response");
        e
    })?;
    let json: Value = serde_json::from_slice(&plaintext)
        .map_err(|e| OnionError::Decode(format!("invalid response JSON: {}", e)))?;

    let status = json
        .get("status_code")
        .or_else(|| json.get("status"))
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .unwrap_or(STATUS_NO_STATUS);
    let body = json.get("body").cloned().unwrap_or(Value::Null);
    debug!(status, "relay destination responded");

    classifier
        .check_destination_status(
            status,
            &value_text(&body),
            Some(&destination.pubkey_ed25519),
            associated_with,
        )
        .await?;

    Ok(SnodeResponse { status, body })
}

/// Process the guard's answer to a V4 request for a server destination.
pub async fn process_v4_response(
    classifier: &Classifier,
    response: TransportResponse,
    key: &SymmetricKey,
    guard: &Snode,
) -> Result<V4Response> {
    classifier
        .check_path_status(
            response.status,
            &response.text(),
            &guard.pubkey_ed25519,
            None,
            None,
        )
        .await?;

    if response.body.is_empty() {
        return Err(OnionError::EmptyResponse);
    }

    let plaintext =
        decrypt_gcm(key, &response.body).map_err(|e| OnionError::Decode(e.to_string()))?;
    let decoded = decode_v4_response(&plaintext)?;

    let status = decoded.status_code();
    if !(200..=299).contains(&status) {
        return Err(OnionError::DestinationStatus { status });
    }
    debug!(status, content_type = ?decoded.content_type(), "server destination responded");
    Ok(decoded)
}
