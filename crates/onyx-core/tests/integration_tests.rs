//! Integration tests for onyx-core.
//!
//! A mock network peels every onion layer with the relays' keys, opens the
//! V4 request with the destination server's key and answers with scripted
//! V4 responses. Tests then inspect the request the server received.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};

use onyx_core::{
    ClientConfig, CoreError, NetworkTime, SendOptions, SogsClient, SogsServer, StaticIdentity,
};
use onyx_crypto::{
    derive_blinding_values, encrypt_blinded_message, encrypt_gcm, verify_signature,
    AccountKeyPair, X25519StaticPrivateKey,
};
use onyx_net::{
    BoxFuture, CancellationToken, MemoryRelayPool, MemorySwarmTable, OnionClient, OnionError,
    OnionTransport, TransportResponse,
};
use onyx_protocol::sogs::signer::signable_bytes;
use onyx_protocol::sogs::{
    BatchBody, BatchMode, BatchRow, BatchRowKind, CapabilitiesResponse, InboxMessage, SogsRequest,
};
use onyx_protocol::{
    decode_ciphertext_plus_json, decode_v4_request, encode_v4_response, peel_layer,
    DestinationRequest, Headers, OnionPath, Snode,
};
use onyx_store::{KnownBlindedKeys, MemorySettingsStore};

// ==================== Mock Network ====================

enum Reply {
    Json { code: u16, body: Value },
    Bytes { code: u16, body: Vec<u8> },
    Unreachable,
}

#[derive(Debug, Clone)]
struct Received {
    /// Final relay's forwarding instruction.
    instruction: Value,
    /// Public key of the server that opened the request.
    server: String,
    request: DestinationRequest,
}

struct MockNetwork {
    relays: Vec<(String, X25519StaticPrivateKey)>,
    servers: Vec<X25519StaticPrivateKey>,
    replies: Mutex<VecDeque<Reply>>,
    received: Mutex<Vec<Received>>,
    posts: AtomicUsize,
}

impl MockNetwork {
    fn script(&self, replies: Vec<Reply>) {
        self.replies.lock().unwrap().extend(replies);
    }

    fn posts(&self) -> usize {
        self.posts.load(Ordering::SeqCst)
    }

    fn last(&self) -> Received {
        self.received.lock().unwrap().last().cloned().unwrap()
    }

    fn relay_key(&self, ed25519: &str) -> Option<&X25519StaticPrivateKey> {
        self.relays
            .iter()
            .find(|(id, _)| id == ed25519)
            .map(|(_, key)| key)
    }

    fn route(&self, guard: &Snode, payload: &[u8]) -> (onyx_crypto::SymmetricKey, Received) {
        let mut current = guard.pubkey_ed25519.clone();
        let mut payload = payload.to_vec();
        loop {
            let (_, plaintext, _) = peel_layer(self.relay_key(&current).unwrap(), &payload).unwrap();
            let (_, instruction) = decode_ciphertext_plus_json(&plaintext).unwrap();
            payload = plaintext;

            if let Some(next) = instruction.get("destination").and_then(Value::as_str) {
                current = next.to_string();
                continue;
            }
            for server in &self.servers {
                if let Ok((key, frame, _)) = peel_layer(server, &payload) {
                    let request = decode_v4_request(&frame).unwrap();
                    return (
                        key,
                        Received {
                            instruction,
                            server: server.public_key().to_hex(),
                            request,
                        },
                    );
                }
            }
            panic!("no server could open the request");
        }
    }
}

impl OnionTransport for MockNetwork {
    fn post<'a>(
        &'a self,
        guard: &'a Snode,
        payload: Vec<u8>,
    ) -> BoxFuture<'a, onyx_net::Result<TransportResponse>> {
        Box::pin(async move {
            self.posts.fetch_add(1, Ordering::SeqCst);
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Reply::Json {
                    code: 200,
                    body: json!({}),
                });
            let (key, received) = self.route(guard, &payload);
            self.received.lock().unwrap().push(received);

            let (code, content_type, body) = match reply {
                Reply::Json { code, body } => {
                    (code, "application/json", body.to_string().into_bytes())
                }
                Reply::Bytes { code, body } => (code, "application/octet-stream", body),
                Reply::Unreachable => return Err(OnionError::NetworkUnreachable),
            };
            let mut headers = Headers::new();
            headers.insert("content-type".into(), content_type.into());
            let frame = encode_v4_response(code, &headers, Some(&body)).unwrap();
            Ok(TransportResponse::new(200, encrypt_gcm(&key, &frame).unwrap()))
        })
    }
}

// ==================== Harness ====================

const SEED: [u8; 32] = [7u8; 32];

struct Harness {
    network: Arc<MockNetwork>,
    client: SogsClient,
    account: AccountKeyPair,
    server: SogsServer,
    blinded_keys: Arc<KnownBlindedKeys>,
}

fn relay(n: u8) -> (Snode, X25519StaticPrivateKey) {
    let private = X25519StaticPrivateKey::generate();
    let snode = Snode::new(
        hex::encode([n; 32]),
        private.public_key().to_hex(),
        format!("10.1.0.{n}"),
        22000,
    );
    (snode, private)
}

fn harness() -> Harness {
    harness_with(StaticIdentity::new(AccountKeyPair::from_seed(&SEED)))
}

fn harness_with(identity: StaticIdentity) -> Harness {
    let mut relays = Vec::new();
    let mut relay_keys = Vec::new();
    for n in 1..=3 {
        let (snode, private) = relay(n);
        relay_keys.push((snode.pubkey_ed25519.clone(), private));
        relays.push(snode);
    }

    let sogs_key = X25519StaticPrivateKey::generate();
    let files_key = X25519StaticPrivateKey::generate();
    let push_key = X25519StaticPrivateKey::generate();
    let server = SogsServer::new("https://open.example.org", &sogs_key.public_key().to_hex()).unwrap();

    let config = ClientConfig::builder()
        .with_in_memory_storage()
        .with_retry_backoff(Duration::from_millis(1))
        .with_file_server("http://files.example.org", files_key.public_key().to_hex())
        .with_push_server("https://push.example.org", push_key.public_key().to_hex())
        .build_validated()
        .unwrap();

    let network = Arc::new(MockNetwork {
        relays: relay_keys,
        servers: vec![sogs_key, files_key, push_key],
        replies: Mutex::new(VecDeque::new()),
        received: Mutex::new(Vec::new()),
        posts: AtomicUsize::new(0),
    });
    let path = OnionPath::new(relays.clone()).unwrap();
    let onion = Arc::new(OnionClient::new(
        config.network.onion_config(),
        network.clone(),
        Arc::new(MemoryRelayPool::new(relays, vec![path])),
        Arc::new(MemorySwarmTable::new()),
    ));

    let blinded_keys = Arc::new(KnownBlindedKeys::new(Arc::new(MemorySettingsStore::new())));
    blinded_keys.load().unwrap();

    let client = SogsClient::new(
        &config,
        onion,
        Arc::new(identity),
        Arc::new(NetworkTime::new()),
        blinded_keys.clone(),
    );

    Harness {
        network,
        client,
        account: AccountKeyPair::from_seed(&SEED),
        server,
        blinded_keys,
    }
}

fn header<'a>(received: &'a Received, name: &str) -> &'a str {
    received.request.headers.get(name).map(String::as_str).unwrap_or("")
}

/// Rebuild the signable buffer from the received headers and verify the
/// signature under the key named in `X-SOGS-Pubkey`.
fn assert_signature_valid(received: &Received, server: &SogsServer) {
    let pubkey = header(received, "X-SOGS-Pubkey");
    let timestamp: u64 = header(received, "X-SOGS-Timestamp").parse().unwrap();
    let nonce: [u8; 16] = STANDARD
        .decode(header(received, "X-SOGS-Nonce"))
        .unwrap()
        .try_into()
        .unwrap();
    let signature = STANDARD.decode(header(received, "X-SOGS-Signature")).unwrap();

    let request = SogsRequest {
        server_public_key: server.public_key(),
        method: &received.request.method,
        endpoint: &received.request.endpoint,
        body: received.request.body.as_deref(),
        blinded: pubkey.starts_with("15"),
    };
    let signable = signable_bytes(&request, &nonce, timestamp);
    let key: [u8; 32] = hex::decode(&pubkey[2..]).unwrap().try_into().unwrap();
    verify_signature(&key, &signable, &signature).unwrap();
}

fn blind_capabilities() -> CapabilitiesResponse {
    CapabilitiesResponse {
        capabilities: vec!["sogs".into(), "blind".into()],
        missing: None,
    }
}

// ==================== Community Server Tests ====================

mod sogs_tests {
    use super::*;

    #[tokio::test]
    async fn test_unblinded_server_signs_with_00() {
        let h = harness();
        h.network.script(vec![Reply::Json {
            code: 200,
            body: json!([{"token": "lokinet"}]),
        }]);

        let response = h
            .client
            .send_json_to_sogs(&h.server, "GET", "/rooms", None, &SendOptions::default(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.json().unwrap()[0]["token"], "lokinet");

        let received = h.network.last();
        assert_eq!(received.request.method, "GET");
        assert_eq!(received.request.endpoint, "/rooms");
        assert_eq!(received.instruction["host"], "open.example.org");
        assert_eq!(header(&received, "X-SOGS-Pubkey"), h.account.unblinded_id());
        assert!(header(&received, "X-SOGS-Pubkey").starts_with("00"));
        assert_eq!(header(&received, "Content-Type"), "application/json");
        assert_signature_valid(&received, &h.server);
    }

    #[tokio::test]
    async fn test_blinded_server_signs_with_15() {
        let h = harness();
        h.client.set_capabilities(&h.server, blind_capabilities()).await;
        assert!(h.client.requires_blinding(&h.server).await);

        h.client
            .send_json_to_sogs(
                &h.server,
                "GET",
                "/room/lokinet/messages/recent",
                None,
                &SendOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let received = h.network.last();
        let expected = derive_blinding_values(h.server.public_key(), &h.account).blinded_id();
        assert_eq!(header(&received, "X-SOGS-Pubkey"), expected);
        assert!(expected.starts_with("15"));
        assert_signature_valid(&received, &h.server);
    }

    #[tokio::test]
    async fn test_explicit_blinding_overrides_capabilities() {
        let h = harness();
        h.client
            .send_json_to_sogs(
                &h.server,
                "GET",
                "/capabilities",
                None,
                &SendOptions::default().blinded(true),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(header(&h.network.last(), "X-SOGS-Pubkey").starts_with("15"));
    }

    #[tokio::test]
    async fn test_body_is_covered_by_signature() {
        let h = harness();
        let body = json!({"data": "aGVsbG8=", "signature": "c2ln"});
        h.client
            .send_json_to_sogs(
                &h.server,
                "POST",
                "/room/lokinet/message",
                Some(&body),
                &SendOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let received = h.network.last();
        let sent: Value = serde_json::from_slice(received.request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, body);
        assert_signature_valid(&received, &h.server);
    }

    #[tokio::test]
    async fn test_caller_headers_merged_sogs_headers_win() {
        let h = harness();
        let options = SendOptions::default()
            .with_header("X-Extra", "yes")
            .with_header("X-SOGS-Pubkey", "spoofed");
        h.client
            .send_json_to_sogs(&h.server, "GET", "/rooms", None, &options, &CancellationToken::new())
            .await
            .unwrap();

        let received = h.network.last();
        assert_eq!(header(&received, "X-Extra"), "yes");
        assert_eq!(header(&received, "X-SOGS-Pubkey"), h.account.unblinded_id());
    }

    #[tokio::test]
    async fn test_unsigned_request_has_no_sogs_headers() {
        let h = harness_with(StaticIdentity::empty());
        h.client
            .send_json_to_sogs(
                &h.server,
                "GET",
                "/room/lokinet",
                None,
                &SendOptions::default().unsigned(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let received = h.network.last();
        assert!(received.request.headers.keys().all(|k| !k.starts_with("X-SOGS")));
        assert_eq!(header(&received, "Content-Type"), "application/json");
    }

    #[tokio::test]
    async fn test_signing_without_identity_fails_before_sending() {
        let h = harness_with(StaticIdentity::empty());
        let err = h
            .client
            .send_json_to_sogs(&h.server, "GET", "/rooms", None, &SendOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NoIdentity));
        assert_eq!(h.network.posts(), 0);
    }

    #[tokio::test]
    async fn test_endpoint_without_slash_fails_before_sending() {
        let h = harness();
        let err = h
            .client
            .send_json_to_sogs(&h.server, "GET", "rooms", None, &SendOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Protocol(_)));
        assert_eq!(h.network.posts(), 0);
    }

    #[tokio::test]
    async fn test_binary_upload() {
        let h = harness();
        h.network.script(vec![Reply::Json {
            code: 201,
            body: json!({"id": 42}),
        }]);
        let data = vec![0xde, 0xad, 0xbe, 0xef];
        let response = h
            .client
            .send_binary_to_sogs(
                &h.server,
                "POST",
                "/room/lokinet/file",
                &data,
                &SendOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(response.status, 201);
        assert_eq!(response.json().unwrap()["id"], 42);

        let received = h.network.last();
        assert_eq!(received.request.body.as_deref(), Some(&data[..]));
        assert_eq!(header(&received, "Content-Type"), "application/octet-stream");
        assert_signature_valid(&received, &h.server);
    }

    #[tokio::test]
    async fn test_timestamp_uses_network_clock() {
        let h = harness();
        h.client.clock().set_offset_ms(3_600_000);
        h.client
            .send_json_to_sogs(&h.server, "GET", "/rooms", None, &SendOptions::default(), &CancellationToken::new())
            .await
            .unwrap();

        let sent: u64 = header(&h.network.last(), "X-SOGS-Timestamp").parse().unwrap();
        let local = onyx_core::time::now_ms().unwrap() / 1000;
        assert!(local - sent >= 3_599 && local - sent <= 3_601, "sent {sent}, local {local}");
    }

    #[tokio::test]
    async fn test_offline_is_user_actionable() {
        let h = harness();
        h.network.script(vec![Reply::Unreachable, Reply::Unreachable, Reply::Unreachable]);
        let err = h
            .client
            .send_json_to_sogs(&h.server, "GET", "/rooms", None, &SendOptions::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Net(OnionError::Offline)));
        assert!(err.is_user_actionable());
        assert_eq!(h.network.posts(), 3);
    }
}

// ==================== Batch Tests ====================

mod batch_tests {
    use super::*;

    #[tokio::test]
    async fn test_batch_demux_is_positional() {
        let h = harness();
        h.network.script(vec![Reply::Json {
            code: 200,
            body: json!([
                {"code": 200, "body": {"capabilities": ["sogs", "blind"]}},
                {"code": 200, "body": [{"id": 1, "seqno": 10, "session_id": "15ab", "posted": 1.5}]},
                {"code": 200, "body": null},
                {"code": 403, "body": "forbidden"},
            ]),
        }]);

        let rows = vec![
            BatchRow::Capabilities,
            BatchRow::Messages {
                room: "lokinet".into(),
                since_seqno: None,
            },
            BatchRow::Inbox { since_id: Some(5) },
            BatchRow::DeleteMessage {
                room: "lokinet".into(),
                message_id: 9,
            },
        ];
        let response = h
            .client
            .send_batch(&h.server, &rows, BatchMode::Batch, &CancellationToken::new())
            .await
            .unwrap();

        assert!(response.capabilities.unwrap().requires_blinding());
        let kinds: Vec<BatchRowKind> = response.entries.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BatchRowKind::Capabilities,
                BatchRowKind::Messages,
                BatchRowKind::Inbox,
                BatchRowKind::DeleteMessage
            ]
        );
        match &response.entries[1].body {
            Ok(BatchBody::Messages(messages)) => assert_eq!(messages[0].seqno, 10),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(&response.entries[2].body, Ok(BatchBody::Inbox(list)) if list.is_empty()));
        assert_eq!(response.entries[3].code, 403);
        assert!(matches!(response.entries[3].body, Ok(BatchBody::Unavailable)));

        let received = h.network.last();
        assert_eq!(received.request.method, "POST");
        assert_eq!(received.request.endpoint, "/batch");
        let sent: Value = serde_json::from_slice(received.request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent[0]["path"], "/capabilities");
        assert_eq!(sent[1]["path"], "/room/lokinet/messages/recent?reactors=5");
        assert_eq!(sent[2]["path"], "/inbox/since/5");
        assert_eq!(sent[3]["method"], "DELETE");
        assert_signature_valid(&received, &h.server);

        // capabilities from the batch switch later requests to the blinded key
        assert!(h.client.requires_blinding(&h.server).await);
    }

    #[tokio::test]
    async fn test_refresh_capabilities_then_blinded_request() {
        let h = harness();
        h.network.script(vec![
            Reply::Json {
                code: 200,
                body: json!([{"code": 200, "body": {"capabilities": ["sogs", "blind"]}}]),
            },
            Reply::Json {
                code: 200,
                body: json!({}),
            },
        ]);
        let cancel = CancellationToken::new();

        let capabilities = h.client.refresh_capabilities(&h.server, &cancel).await.unwrap();
        assert!(capabilities.unwrap().requires_blinding());
        assert!(header(&h.network.last(), "X-SOGS-Pubkey").starts_with("00"));

        h.client
            .send_json_to_sogs(&h.server, "GET", "/rooms", None, &SendOptions::default(), &cancel)
            .await
            .unwrap();
        assert!(header(&h.network.last(), "X-SOGS-Pubkey").starts_with("15"));
    }

    #[tokio::test]
    async fn test_sequence_with_missing_entries() {
        let h = harness();
        h.network.script(vec![Reply::Json {
            code: 200,
            body: json!([{"code": 404, "body": null}]),
        }]);
        let rows = vec![
            BatchRow::UpdateRoom {
                room: "lokinet".into(),
                image_id: 3,
            },
            BatchRow::PollInfo {
                room: "lokinet".into(),
                info_updates: 1,
            },
        ];
        let response = h
            .client
            .send_batch(&h.server, &rows, BatchMode::Sequence, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(h.network.last().request.endpoint, "/sequence");
        assert_eq!(response.entries.len(), 1);
        assert_eq!(response.entries[0].kind, BatchRowKind::UpdateRoom);
        assert!(response.capabilities.is_none());
    }

    #[tokio::test]
    async fn test_schema_failure_is_per_entry() {
        let h = harness();
        h.network.script(vec![Reply::Json {
            code: 200,
            body: json!([
                {"code": 200, "body": {"token": "lokinet"}},
                {"code": 200, "body": []},
            ]),
        }]);
        let rows = vec![
            BatchRow::PollInfo {
                room: "lokinet".into(),
                info_updates: 0,
            },
            BatchRow::Outbox { since_id: None },
        ];
        let response = h
            .client
            .send_batch(&h.server, &rows, BatchMode::Batch, &CancellationToken::new())
            .await
            .unwrap();
        assert!(response.entries[0].body.is_err());
        assert!(matches!(&response.entries[1].body, Ok(BatchBody::Outbox(list)) if list.is_empty()));
    }

    #[tokio::test]
    async fn test_non_json_batch_response() {
        let h = harness();
        h.network.script(vec![Reply::Bytes {
            code: 200,
            body: vec![1, 2, 3],
        }]);
        let err = h
            .client
            .send_batch(&h.server, &[BatchRow::Capabilities], BatchMode::Batch, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidResponse(_)));
    }
}

// ==================== Inbox Tests ====================

mod inbox_tests {
    use super::*;

    fn padded(content: &[u8]) -> Vec<u8> {
        let mut out = content.to_vec();
        out.push(0x80);
        out.extend_from_slice(&[0u8; 7]);
        out
    }

    fn blinded_message(
        id: u64,
        from: &AccountKeyPair,
        to: &AccountKeyPair,
        server: &SogsServer,
        content: &[u8],
    ) -> InboxMessage {
        let from_values = derive_blinding_values(server.public_key(), from);
        let to_values = derive_blinding_values(server.public_key(), to);
        let data = encrypt_blinded_message(
            &padded(content),
            from,
            server.public_key(),
            Some(to_values.blinded_public()),
        )
        .unwrap();
        InboxMessage {
            id,
            sender: from_values.blinded_id(),
            recipient: to_values.blinded_id(),
            posted_at: 1_700_000_000.123,
            message: STANDARD.encode(data),
        }
    }

    #[tokio::test]
    async fn test_inbox_message_decrypted_and_sender_cached() {
        let h = harness();
        let alice = AccountKeyPair::from_seed(&[9u8; 32]);
        let message = blinded_message(11, &alice, &h.account, &h.server, b"hi there");

        let decoded = h
            .client
            .process_inbox_messages(&h.server, &[message.clone()], false)
            .await
            .unwrap();

        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, 11);
        assert_eq!(decoded[0].content, b"hi there");
        assert_eq!(decoded[0].posted_at_ms, 1_700_000_000_123);
        assert_eq!(decoded[0].sender_session_id, alice.session_id());
        assert_eq!(decoded[0].other_session_id.as_deref(), Some(alice.session_id().as_str()));

        let server_hex = h.server.public_key_hex();
        assert_eq!(
            h.blinded_keys
                .get_cached_naked_key_from_blinded(&message.sender, &server_hex)
                .unwrap(),
            Some(alice.session_id())
        );
        // our own blinded id is cached too
        assert_eq!(
            h.blinded_keys
                .find_cached_blinded_id_from_unblinded(&h.account.session_id(), &server_hex)
                .unwrap(),
            Some(message.recipient.clone())
        );
    }

    #[tokio::test]
    async fn test_outbox_message_resolves_known_recipient() {
        let h = harness();
        let bob = AccountKeyPair::from_seed(&[10u8; 32]);

        // learn bob's mapping from an inbox message first
        let incoming = blinded_message(1, &bob, &h.account, &h.server, b"hello");
        h.client
            .process_inbox_messages(&h.server, &[incoming], false)
            .await
            .unwrap();

        let outgoing = blinded_message(2, &h.account, &bob, &h.server, b"hello back");
        let decoded = h
            .client
            .process_inbox_messages(&h.server, &[outgoing], true)
            .await
            .unwrap();

        assert_eq!(decoded[0].content, b"hello back");
        assert_eq!(decoded[0].sender_session_id, h.account.session_id());
        assert_eq!(decoded[0].other_session_id.as_deref(), Some(bob.session_id().as_str()));
    }

    #[tokio::test]
    async fn test_bad_messages_are_skipped() {
        let h = harness();
        let alice = AccountKeyPair::from_seed(&[9u8; 32]);
        let good = blinded_message(3, &alice, &h.account, &h.server, b"ok");

        let mut not_base64 = good.clone();
        not_base64.id = 4;
        not_base64.message = "%%%".into();

        let mut tampered = good.clone();
        tampered.id = 5;
        let mut data = STANDARD.decode(&good.message).unwrap();
        data[3] ^= 0xff;
        tampered.message = STANDARD.encode(data);

        let mut multibyte_sender = good.clone();
        multibyte_sender.id = 6;
        multibyte_sender.sender = format!("1é{}", "a".repeat(63));
        assert_eq!(multibyte_sender.sender.len(), 66);

        let decoded = h
            .client
            .process_inbox_messages(
                &h.server,
                &[not_base64, good, tampered, multibyte_sender],
                false,
            )
            .await
            .unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].id, 3);
    }

    #[tokio::test]
    async fn test_empty_inbox_needs_no_identity() {
        let h = harness_with(StaticIdentity::empty());
        let decoded = h.client.process_inbox_messages(&h.server, &[], false).await.unwrap();
        assert!(decoded.is_empty());
    }
}

// ==================== File And Push Server Tests ====================

mod file_server_tests {
    use super::*;

    #[tokio::test]
    async fn test_download_from_file_server() {
        let h = harness_with(StaticIdentity::empty());
        h.network.script(vec![Reply::Bytes {
            code: 200,
            body: b"attachment bytes".to_vec(),
        }]);

        let bytes = h
            .client
            .get_binary_from_file_server("/file/12", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(bytes, b"attachment bytes");

        let received = h.network.last();
        assert_eq!(received.request.method, "GET");
        assert_eq!(received.request.endpoint, "/file/12");
        assert!(received.request.headers.is_empty());
        assert_eq!(received.instruction["host"], "files.example.org");
        assert_eq!(received.instruction["protocol"], "http");
    }

    #[tokio::test]
    async fn test_upload_to_file_server() {
        let h = harness_with(StaticIdentity::empty());
        h.network.script(vec![Reply::Json {
            code: 200,
            body: json!({"id": "abc"}),
        }]);
        let response = h
            .client
            .send_binary_to_file_server("POST", "/file", b"blob", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(response.json().unwrap()["id"], "abc");
        assert_eq!(h.network.last().request.body.as_deref(), Some(&b"blob"[..]));
    }

    #[tokio::test]
    async fn test_json_to_file_server_and_push_server_use_their_keys() {
        let h = harness_with(StaticIdentity::empty());
        let cancel = CancellationToken::new();

        h.client
            .send_json_to_file_server("GET", "/session_version?platform=desktop", None, &cancel)
            .await
            .unwrap();
        let file_request = h.network.last();
        assert_eq!(file_request.request.endpoint, "/session_version?platform=desktop");

        h.client
            .send_json_to_push_server("POST", "/notify", Some(&json!({"data": "x"})), &cancel)
            .await
            .unwrap();
        let push_request = h.network.last();
        assert_eq!(push_request.instruction["host"], "push.example.org");
        assert_ne!(push_request.server, file_request.server);
        assert!(push_request.request.headers.is_empty());
    }
}
