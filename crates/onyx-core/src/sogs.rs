//! Community server (SOGS), file server and push server requests.
//!
//! Every request goes through the onion client as a V4 request. Requests to
//! a community server are signed with `X-SOGS-*` headers, with the blinded
//! key when the server advertises the `blind` capability. File server and
//! push server requests are not signed.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};
use url::Url;

use onyx_crypto::{
    decode_hex_32, decrypt_blinded_message, short_key, try_match_blinded_with_standard,
    AccountKeyPair, X25519PublicKey,
};
use onyx_net::{CancellationToken, OnionClient};
use onyx_protocol::sogs::{
    build_batch_body, demux_batch_response, sign_request, BatchMode, BatchResponse, BatchRow,
    CapabilitiesResponse, InboxMessage, SogsAuthHeaders, SogsRequest,
};
use onyx_protocol::{Headers, ProtocolError, V4Body, V4Response};
use onyx_store::{BlindedIdMapping, KnownBlindedKeys};

use crate::config::{ClientConfig, NetworkConfig, SogsConfig};
use crate::error::{CoreError, Result};
use crate::identity::IdentityProvider;
use crate::time::NetworkTime;

const CONTENT_TYPE: &str = "Content-Type";
const CONTENT_TYPE_JSON: &str = "application/json";
const CONTENT_TYPE_BINARY: &str = "application/octet-stream";

/// A server reachable through the onion client: base URL plus key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SogsServer {
    base_url: String,
    public_key: [u8; 32],
}

impl SogsServer {
    /// Parse a server from its base URL and hex public key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidServer` if the URL does not parse or the key is not
    /// 32 bytes of hex.
    pub fn new(base_url: impl Into<String>, public_key_hex: &str) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| CoreError::InvalidServer(format!("{base_url}: {e}")))?;
        let public_key = decode_hex_32(public_key_hex)
            .map_err(|e| CoreError::InvalidServer(format!("public key: {e}")))?;
        Ok(Self {
            base_url,
            public_key,
        })
    }

    /// Base URL without a trailing `/`.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Server public key.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// Server public key, lowercase hex.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// Full URL of `endpoint` on this server.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEndpoint` unless `endpoint` starts with `/`.
    pub fn url_for(&self, endpoint: &str) -> Result<Url> {
        if !endpoint.starts_with('/') {
            return Err(ProtocolError::InvalidEndpoint(format!(
                "endpoint needs a leading /: {endpoint}"
            ))
            .into());
        }
        let url = format!("{}{}", self.base_url, endpoint);
        Url::parse(&url).map_err(|e| CoreError::InvalidServer(format!("{url}: {e}")))
    }

    fn x25519(&self) -> Result<X25519PublicKey> {
        Ok(X25519PublicKey::from_bytes(&self.public_key)?)
    }
}

/// Per-request options for community server calls.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Sign with the blinded key. `None` follows the server's capabilities.
    pub blinded: Option<bool>,
    /// Extra headers. The `X-SOGS-*` headers win over these.
    pub headers: Headers,
    /// Send without `X-SOGS-*` headers.
    pub unsigned: bool,
}

impl SendOptions {
    /// Force blinded or unblinded signing.
    pub fn blinded(mut self, blinded: bool) -> Self {
        self.blinded = Some(blinded);
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Skip signing.
    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }
}

/// A successful server response.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerResponse {
    /// HTTP status reported by the server.
    pub status: u16,
    /// Body interpreted by content type.
    pub body: V4Body,
    /// Raw body bytes.
    pub body_binary: Option<Vec<u8>>,
}

impl ServerResponse {
    /// JSON view of the body.
    pub fn json(&self) -> Option<Value> {
        self.body.as_json()
    }

    /// Raw body bytes; empty when the response had no body.
    pub fn bytes(&self) -> &[u8] {
        self.body_binary.as_deref().unwrap_or_default()
    }
}

impl From<V4Response> for ServerResponse {
    fn from(response: V4Response) -> Self {
        Self {
            status: response.status_code(),
            body: response.body,
            body_binary: response.body_binary,
        }
    }
}

/// A decrypted inbox or outbox message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInboxMessage {
    /// Inbox message id.
    pub id: u64,
    /// Posted time in milliseconds.
    pub posted_at_ms: u64,
    /// Blinded id of the other party.
    pub other_blinded_id: String,
    /// Verified `05` id of the sender; us for an outbox message.
    pub sender_session_id: String,
    /// `05` id of the other party, when known.
    pub other_session_id: Option<String>,
    /// Message content with padding removed.
    pub content: Vec<u8>,
}

/// Strip the `0x80 0x00*` padding from a message.
///
/// Content without a padding marker is returned unchanged.
pub fn remove_message_padding(content: &[u8]) -> &[u8] {
    for (index, byte) in content.iter().enumerate().rev() {
        match byte {
            0x80 => return &content[..index],
            0x00 => continue,
            _ => break,
        }
    }
    content
}

/// Client for community, file and push servers.
pub struct SogsClient {
    network: NetworkConfig,
    sogs: SogsConfig,
    onion: Arc<OnionClient>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<NetworkTime>,
    blinded_keys: Arc<KnownBlindedKeys>,
    capabilities: RwLock<HashMap<String, CapabilitiesResponse>>,
}

impl std::fmt::Debug for SogsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SogsClient")
            .field("network", &self.network)
            .field("sogs", &self.sogs)
            .field("onion", &self.onion)
            .finish_non_exhaustive()
    }
}

impl SogsClient {
    /// Create a client.
    pub fn new(
        config: &ClientConfig,
        onion: Arc<OnionClient>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<NetworkTime>,
        blinded_keys: Arc<KnownBlindedKeys>,
    ) -> Self {
        Self {
            network: config.network.clone(),
            sogs: config.sogs.clone(),
            onion,
            identity,
            clock,
            blinded_keys,
            capabilities: RwLock::new(HashMap::new()),
        }
    }

    /// The onion client.
    pub fn onion(&self) -> &Arc<OnionClient> {
        &self.onion
    }

    /// The blinded id cache.
    pub fn blinded_keys(&self) -> &Arc<KnownBlindedKeys> {
        &self.blinded_keys
    }

    /// The network clock.
    pub fn clock(&self) -> &Arc<NetworkTime> {
        &self.clock
    }

    fn account(&self) -> Result<Arc<AccountKeyPair>> {
        self.identity.account().ok_or(CoreError::NoIdentity)
    }

    // ==================== Capabilities ====================

    /// Remember the capabilities of a server.
    pub async fn set_capabilities(&self, server: &SogsServer, capabilities: CapabilitiesResponse) {
        debug!(
            server = %server.base_url(),
            capabilities = ?capabilities.capabilities,
            "server capabilities updated"
        );
        self.capabilities
            .write()
            .await
            .insert(server.base_url().to_string(), capabilities);
    }

    /// Last known capabilities of a server.
    pub async fn capabilities(&self, server: &SogsServer) -> Option<CapabilitiesResponse> {
        self.capabilities.read().await.get(server.base_url()).cloned()
    }

    /// Whether requests to `server` are signed with the blinded key.
    pub async fn requires_blinding(&self, server: &SogsServer) -> bool {
        match self.capabilities.read().await.get(server.base_url()) {
            Some(capabilities) => capabilities.requires_blinding(),
            None => self.sogs.blind_by_default,
        }
    }

    /// Fetch and remember the capabilities of a server.
    pub async fn refresh_capabilities(
        &self,
        server: &SogsServer,
        cancel: &CancellationToken,
    ) -> Result<Option<CapabilitiesResponse>> {
        let response = self
            .send_batch(server, &[BatchRow::Capabilities], BatchMode::Batch, cancel)
            .await?;
        Ok(response.capabilities)
    }

    // ==================== Signing ====================

    /// `X-SOGS-*` headers for a request, signed on a blocking thread.
    pub async fn sign(
        &self,
        server: &SogsServer,
        method: &str,
        endpoint: &str,
        body: Option<&[u8]>,
        blinded: bool,
    ) -> Result<SogsAuthHeaders> {
        let account = self.account()?;
        let now_ms = self.clock.now_ms()?;
        let server_public_key = *server.public_key();
        let method = method.to_string();
        let endpoint = endpoint.to_string();
        let body = body.map(<[u8]>::to_vec);

        tokio::task::spawn_blocking(move || {
            let request = SogsRequest {
                server_public_key: &server_public_key,
                method: &method,
                endpoint: &endpoint,
                body: body.as_deref(),
                blinded,
            };
            sign_request(&account, &request, now_ms)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("signing task failed: {e}")))
    }

    // ==================== Community servers ====================

    /// Send a JSON request to a community server.
    #[instrument(skip_all, fields(server = %server.base_url(), method = %method, endpoint = %endpoint))]
    pub async fn send_json_to_sogs(
        &self,
        server: &SogsServer,
        method: &str,
        endpoint: &str,
        body: Option<&Value>,
        options: &SendOptions,
        cancel: &CancellationToken,
    ) -> Result<ServerResponse> {
        let body = body.map(serde_json::to_vec).transpose()?;
        self.send_to_sogs(server, method, endpoint, body, CONTENT_TYPE_JSON, options, cancel)
            .await
    }

    /// Send a binary request to a community server.
    #[instrument(skip_all, fields(server = %server.base_url(), method = %method, endpoint = %endpoint, len = body.len()))]
    pub async fn send_binary_to_sogs(
        &self,
        server: &SogsServer,
        method: &str,
        endpoint: &str,
        body: &[u8],
        options: &SendOptions,
        cancel: &CancellationToken,
    ) -> Result<ServerResponse> {
        self.send_to_sogs(
            server,
            method,
            endpoint,
            Some(body.to_vec()),
            CONTENT_TYPE_BINARY,
            options,
            cancel,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn send_to_sogs(
        &self,
        server: &SogsServer,
        method: &str,
        endpoint: &str,
        body: Option<Vec<u8>>,
        content_type: &str,
        options: &SendOptions,
        cancel: &CancellationToken,
    ) -> Result<ServerResponse> {
        let url = server.url_for(endpoint)?;
        let mut headers = options.headers.clone();
        if !options.unsigned {
            let blinded = match options.blinded {
                Some(blinded) => blinded,
                None => self.requires_blinding(server).await,
            };
            self.sign(server, method, endpoint, body.as_deref(), blinded)
                .await?
                .merge_into(&mut headers);
        }
        headers.insert(CONTENT_TYPE.into(), content_type.into());

        let response = self
            .onion
            .send_to_non_snode(&server.x25519()?, &url, method, &headers, body.as_deref(), cancel)
            .await?;
        Ok(response.into())
    }

    /// Send `rows` as one `/batch` or `/sequence` request.
    ///
    /// Capabilities found in the response are remembered for the server.
    #[instrument(skip_all, fields(server = %server.base_url(), rows = rows.len(), mode = ?mode))]
    pub async fn send_batch(
        &self,
        server: &SogsServer,
        rows: &[BatchRow],
        mode: BatchMode,
        cancel: &CancellationToken,
    ) -> Result<BatchResponse> {
        let body = build_batch_body(rows)?;
        let response = self
            .send_to_sogs(
                server,
                "POST",
                mode.endpoint(),
                Some(body),
                CONTENT_TYPE_JSON,
                &SendOptions::default(),
                cancel,
            )
            .await?;

        let json = response.json().ok_or_else(|| {
            CoreError::InvalidResponse(format!("{} response is not JSON", mode.endpoint()))
        })?;
        let demuxed = demux_batch_response(rows, &json)?;
        if let Some(capabilities) = &demuxed.capabilities {
            self.set_capabilities(server, capabilities.clone()).await;
        }
        Ok(demuxed)
    }

    /// Decrypt inbox or outbox messages received from `server`.
    ///
    /// Messages that fail to decode or decrypt are skipped. For inbox
    /// messages the sender's blinded id is checked against the key embedded
    /// in the message and the mapping is cached. Our own blinded id on the
    /// server is cached as well.
    #[instrument(skip_all, fields(server = %server.base_url(), count = messages.len(), is_outbox = is_outbox))]
    pub async fn process_inbox_messages(
        &self,
        server: &SogsServer,
        messages: &[InboxMessage],
        is_outbox: bool,
    ) -> Result<Vec<DecodedInboxMessage>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }
        let account = self.account()?;
        let server_hex = server.public_key_hex();
        self.blinded_keys
            .find_cached_our_blinded_pubkey_or_look_it_up(&server_hex, &account)?;

        let server_public_key = *server.public_key();
        let owned = messages.to_vec();
        let decrypted = tokio::task::spawn_blocking(move || {
            decrypt_inbox_batch(&owned, is_outbox, &server_public_key, &account)
        })
        .await
        .map_err(|e| CoreError::Internal(format!("inbox decryption task failed: {e}")))?;

        let mut out = Vec::with_capacity(decrypted.len());
        for mut message in decrypted {
            if is_outbox {
                message.other_session_id = self
                    .blinded_keys
                    .get_cached_naked_key_from_blinded(&message.other_blinded_id, &server_hex)?;
            } else {
                self.remember_sender(&message, server, &server_hex)?;
                message.other_session_id = Some(message.sender_session_id.clone());
            }
            out.push(message);
        }
        Ok(out)
    }

    fn remember_sender(
        &self,
        message: &DecodedInboxMessage,
        server: &SogsServer,
        server_hex: &str,
    ) -> Result<()> {
        let matched = try_match_blinded_with_standard(
            &message.sender_session_id,
            &message.other_blinded_id,
            server.public_key(),
        )
        .unwrap_or(false);
        if !matched {
            warn!(
                sender = %short_key(&message.other_blinded_id),
                "could not match blinded sender with its session id"
            );
            return Ok(());
        }
        self.blinded_keys.add(BlindedIdMapping {
            blinded_id: message.other_blinded_id.clone(),
            server_public_key: server_hex.to_string(),
            real_session_id: message.sender_session_id.clone(),
        })?;
        Ok(())
    }

    // ==================== File server ====================

    fn file_server(&self) -> Result<SogsServer> {
        SogsServer::new(&self.network.file_server_url, &self.network.file_server_pubkey)
    }

    fn push_server(&self) -> Result<SogsServer> {
        SogsServer::new(&self.network.push_server_url, &self.network.push_server_pubkey)
    }

    async fn send_unsigned(
        &self,
        server: &SogsServer,
        method: &str,
        endpoint: &str,
        body: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<ServerResponse> {
        let url = server.url_for(endpoint)?;
        let response = self
            .onion
            .send_to_non_snode(&server.x25519()?, &url, method, &Headers::new(), body, cancel)
            .await?;
        Ok(response.into())
    }

    /// Send JSON to the file server.
    #[instrument(skip_all, fields(method = %method, endpoint = %endpoint))]
    pub async fn send_json_to_file_server(
        &self,
        method: &str,
        endpoint: &str,
        body: Option<&Value>,
        cancel: &CancellationToken,
    ) -> Result<ServerResponse> {
        let body = body.map(serde_json::to_vec).transpose()?;
        self.send_unsigned(&self.file_server()?, method, endpoint, body.as_deref(), cancel)
            .await
    }

    /// Upload bytes to the file server.
    #[instrument(skip_all, fields(method = %method, endpoint = %endpoint, len = body.len()))]
    pub async fn send_binary_to_file_server(
        &self,
        method: &str,
        endpoint: &str,
        body: &[u8],
        cancel: &CancellationToken,
    ) -> Result<ServerResponse> {
        self.send_unsigned(&self.file_server()?, method, endpoint, Some(body), cancel)
            .await
    }

    /// Download bytes from the file server.
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn get_binary_from_file_server(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let response = self
            .send_unsigned(&self.file_server()?, "GET", endpoint, None, cancel)
            .await?;
        Ok(response.bytes().to_vec())
    }

    // ==================== Push server ====================

    /// Send JSON to the push notification server.
    #[instrument(skip_all, fields(method = %method, endpoint = %endpoint))]
    pub async fn send_json_to_push_server(
        &self,
        method: &str,
        endpoint: &str,
        body: Option<&Value>,
        cancel: &CancellationToken,
    ) -> Result<ServerResponse> {
        let body = body.map(serde_json::to_vec).transpose()?;
        self.send_unsigned(&self.push_server()?, method, endpoint, body.as_deref(), cancel)
            .await
    }
}

fn decrypt_inbox_batch(
    messages: &[InboxMessage],
    is_outbox: bool,
    server_public_key: &[u8; 32],
    account: &AccountKeyPair,
) -> Vec<DecodedInboxMessage> {
    messages
        .iter()
        .filter_map(|message| {
            let other = if is_outbox {
                &message.recipient
            } else {
                &message.sender
            };
            let data = match message.decode_message() {
                Ok(data) => data,
                Err(e) => {
                    warn!(id = message.id, error = %e, "skipping undecodable inbox message");
                    return None;
                }
            };
            match decrypt_blinded_message(&data, is_outbox, other, server_public_key, account) {
                Ok(decrypted) => Some(DecodedInboxMessage {
                    id: message.id,
                    posted_at_ms: message.posted_at_ms(),
                    other_blinded_id: other.clone(),
                    sender_session_id: decrypted.sender_session_id,
                    other_session_id: None,
                    content: remove_message_padding(&decrypted.plaintext).to_vec(),
                }),
                Err(e) => {
                    warn!(id = message.id, error = %e, "failed to decrypt inbox message");
                    None
                }
            }
        })
        .collect()
}
