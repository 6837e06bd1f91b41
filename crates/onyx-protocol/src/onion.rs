//! Onion request layering.
//!
//! A request to a destination is wrapped once for the destination and
//! once per relay of the path, innermost first:
//!
//! ```text
//! guard payload = cpj(ctx_0.ct, {ephemeral_key})
//! ctx_0         = enc(guard,  cpj(ctx_1.ct, {destination: hop_1, ephemeral_key}))
//! ...
//! ctx_n         = enc(hop_n,  cpj(dest.ct,  {<final instruction>, ephemeral_key}))
//! dest          = enc(destination, payload)
//! ```
//!
//! where `cpj(ct, json) = u32-le(len(ct)) || ct || utf8(json)`. Each relay
//! peels one layer, reads its instruction and forwards the inner
//! ciphertext. Only the destination context's key is kept: the response
//! comes back encrypted under it and is not re-layered.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use onyx_crypto::{
    decrypt_from_ephemeral, encrypt_for_pubkey, short_key, SymmetricKey, X25519PublicKey,
    X25519StaticPrivateKey,
};

use crate::error::{ProtocolError, Result};
use crate::limits::{DEFAULT_HTTP_PORT, LSRPC_TARGET};
use crate::v4::Headers;

const LENGTH_PREFIX_SIZE: usize = 4;

/// A service node usable as a relay or as a destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Snode {
    /// Ed25519 key, hex. Used as the node's id.
    pub pubkey_ed25519: String,
    /// X25519 key, hex. Onion layers are encrypted to it.
    pub pubkey_x25519: String,
    /// IPv4 address.
    pub ip: String,
    /// HTTPS port.
    pub port: u16,
}

impl Snode {
    /// Create a relay record.
    pub fn new(
        pubkey_ed25519: impl Into<String>,
        pubkey_x25519: impl Into<String>,
        ip: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            pubkey_ed25519: pubkey_ed25519.into(),
            pubkey_x25519: pubkey_x25519.into(),
            ip: ip.into(),
            port,
        }
    }

    /// Parsed X25519 key.
    pub fn x25519_key(&self) -> Result<X25519PublicKey> {
        X25519PublicKey::from_hex(&self.pubkey_x25519).map_err(|e| {
            ProtocolError::InvalidSnode(format!("{}: {}", self.ed25519_str(), e))
        })
    }

    /// Shortened ed25519 id for logs.
    pub fn ed25519_str(&self) -> String {
        short_key(&self.pubkey_ed25519)
    }
}

/// An ordered, non-empty list of relays. The first is the guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Snode>", into = "Vec<Snode>")]
pub struct OnionPath {
    hops: Vec<Snode>,
}

impl OnionPath {
    /// Build a path.
    ///
    /// # Errors
    ///
    /// Returns `EmptyPath` if `hops` is empty.
    pub fn new(hops: Vec<Snode>) -> Result<Self> {
        if hops.is_empty() {
            return Err(ProtocolError::EmptyPath);
        }
        Ok(Self { hops })
    }

    /// The first relay.
    pub fn guard(&self) -> &Snode {
        &self.hops[0]
    }

    /// All relays, guard first.
    pub fn hops(&self) -> &[Snode] {
        &self.hops
    }

    /// Number of relays.
    pub fn len(&self) -> usize {
        self.hops.len()
    }

    /// Always false; kept for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    /// Whether a relay with this ed25519 key is on the path.
    pub fn contains(&self, ed25519: &str) -> bool {
        self.hops.iter().any(|hop| hop.pubkey_ed25519 == ed25519)
    }
}

impl TryFrom<Vec<Snode>> for OnionPath {
    type Error = ProtocolError;

    fn try_from(hops: Vec<Snode>) -> Result<Self> {
        OnionPath::new(hops)
    }
}

impl From<OnionPath> for Vec<Snode> {
    fn from(path: OnionPath) -> Self {
        path.hops
    }
}

/// Where the last relay forwards a request for a non-relay server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalRelayTarget {
    /// Destination host name.
    pub host: String,
    /// `Some("http")` for plain-http servers; https otherwise.
    pub protocol: Option<String>,
    /// Explicit port, if any.
    pub port: Option<u16>,
}

impl FinalRelayTarget {
    /// Derive the target from a URL. An `http` scheme forces
    /// `protocol: http` and a port (default 80).
    pub fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| ProtocolError::InvalidUrl(format!("{url} has no host")))?
            .to_string();
        if url.scheme() == "http" {
            Ok(Self {
                host,
                protocol: Some("http".into()),
                port: Some(url.port().unwrap_or(DEFAULT_HTTP_PORT)),
            })
        } else {
            Ok(Self {
                host,
                protocol: None,
                port: url.port(),
            })
        }
    }

    fn is_http(&self) -> bool {
        self.protocol.as_deref() == Some("http")
    }

    fn instruction(&self) -> Map<String, Value> {
        let mut instruction = Map::new();
        instruction.insert("host".into(), json!(self.host));
        instruction.insert("target".into(), json!(LSRPC_TARGET));
        instruction.insert("method".into(), json!("POST"));
        if self.is_http() {
            instruction.insert("protocol".into(), json!("http"));
            instruction.insert(
                "port".into(),
                json!(self.port.unwrap_or(DEFAULT_HTTP_PORT)),
            );
        }
        instruction
    }
}

/// The end point of an onion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnionDestination {
    /// A service node; the last relay forwards by ed25519 key.
    Snode(Snode),
    /// A server reached through the last relay's lsrpc endpoint.
    Server {
        /// Server's X25519 key.
        x25519: X25519PublicKey,
        /// Host/protocol/port the last relay should contact.
        target: FinalRelayTarget,
    },
}

impl OnionDestination {
    /// Key the destination layer is encrypted to.
    pub fn x25519_key(&self) -> Result<X25519PublicKey> {
        match self {
            OnionDestination::Snode(snode) => snode.x25519_key(),
            OnionDestination::Server { x25519, .. } => Ok(*x25519),
        }
    }

    /// The destination relay, if any.
    pub fn snode(&self) -> Option<&Snode> {
        match self {
            OnionDestination::Snode(snode) => Some(snode),
            OnionDestination::Server { .. } => None,
        }
    }

    fn last_hop_instruction(&self) -> Map<String, Value> {
        match self {
            OnionDestination::Snode(snode) => {
                let mut instruction = Map::new();
                instruction.insert("destination".into(), json!(snode.pubkey_ed25519));
                instruction
            }
            OnionDestination::Server { target, .. } => target.instruction(),
        }
    }
}

/// Result of layering a request.
#[derive(Debug)]
pub struct OnionPayload {
    /// Bytes to POST to the guard.
    pub guard_payload: Vec<u8>,
    /// Key that decrypts the destination's response.
    pub destination_key: SymmetricKey,
    /// Ephemeral key of the destination layer.
    pub destination_ephemeral_key: X25519PublicKey,
}

/// `u32-le(len(ciphertext)) || ciphertext || utf8(json)`.
pub fn encode_ciphertext_plus_json(ciphertext: &[u8], payload: &Value) -> Result<Vec<u8>> {
    let len = u32::try_from(ciphertext.len())
        .map_err(|_| ProtocolError::framing("ciphertext too large"))?;
    let json = serde_json::to_vec(payload)?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + ciphertext.len() + json.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(ciphertext);
    out.extend_from_slice(&json);
    Ok(out)
}

/// Inverse of [`encode_ciphertext_plus_json`].
pub fn decode_ciphertext_plus_json(data: &[u8]) -> Result<(Vec<u8>, Value)> {
    if data.len() < LENGTH_PREFIX_SIZE {
        return Err(ProtocolError::framing("missing ciphertext length"));
    }
    let (prefix, rest) = data.split_at(LENGTH_PREFIX_SIZE);
    let mut len_bytes = [0u8; LENGTH_PREFIX_SIZE];
    len_bytes.copy_from_slice(prefix);
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > rest.len() {
        return Err(ProtocolError::framing(format!(
            "ciphertext length {} exceeds payload of {} bytes",
            len,
            rest.len()
        )));
    }
    let (ciphertext, json) = rest.split_at(len);
    let value = serde_json::from_slice(json)
        .map_err(|e| ProtocolError::framing(format!("invalid layer JSON: {e}")))?;
    Ok((ciphertext.to_vec(), value))
}

/// Destination payload for a service node:
/// `cpj(utf8(body), {"body": null, "headers": {...}})`.
pub fn snode_destination_payload(body: &str, headers: &Headers) -> Result<Vec<u8>> {
    encode_ciphertext_plus_json(body.as_bytes(), &json!({ "body": null, "headers": headers }))
}

/// Wrap `destination_payload` for `destination` through `path`.
pub fn build_onion_payload(
    path: &OnionPath,
    destination: &OnionDestination,
    destination_payload: &[u8],
) -> Result<OnionPayload> {
    let destination_ctx = encrypt_for_pubkey(&destination.x25519_key()?, destination_payload)?;
    let destination_key = destination_ctx.symmetric_key.clone();
    let destination_ephemeral_key = destination_ctx.ephemeral_key;

    let hops = path.hops();
    let mut ctx = destination_ctx;
    for (i, hop) in hops.iter().enumerate().rev() {
        let mut instruction = match hops.get(i + 1) {
            Some(next) => {
                let mut forward = Map::new();
                forward.insert("destination".into(), json!(next.pubkey_ed25519));
                forward
            }
            None => destination.last_hop_instruction(),
        };
        instruction.insert("ephemeral_key".into(), json!(ctx.ephemeral_key.to_hex()));

        let plaintext = encode_ciphertext_plus_json(&ctx.ciphertext, &Value::Object(instruction))?;
        ctx = encrypt_for_pubkey(&hop.x25519_key()?, &plaintext)?;
    }

    let guard_payload = encode_ciphertext_plus_json(
        &ctx.ciphertext,
        &json!({ "ephemeral_key": ctx.ephemeral_key.to_hex() }),
    )?;

    Ok(OnionPayload {
        guard_payload,
        destination_key,
        destination_ephemeral_key,
    })
}

/// Relay side of one layer: decode `cpj`, decrypt with `private`, and
/// return the inner plaintext together with the outer JSON.
///
/// The outer JSON must carry the `ephemeral_key` used for this layer.
pub fn peel_layer(
    private: &X25519StaticPrivateKey,
    payload: &[u8],
) -> Result<(SymmetricKey, Vec<u8>, Value)> {
    let (ciphertext, outer) = decode_ciphertext_plus_json(payload)?;
    let ephemeral_hex = outer
        .get("ephemeral_key")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::framing("layer without ephemeral_key"))?;
    let ephemeral = X25519PublicKey::from_hex(ephemeral_hex)?;
    let (key, plaintext) = decrypt_from_ephemeral(private, &ephemeral, &ciphertext)?;
    Ok((key, plaintext, outer))
}
