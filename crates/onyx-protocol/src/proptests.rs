//! Property-based tests for wire formats.
//!
//! - Framing roundtrips with and without a body
//! - Decoders reject arbitrary input without panicking
//! - Peeling every layer of an onion recovers the destination payload

use proptest::prelude::*;
use serde_json::json;

use crate::sogs::{demux_batch_response, BatchRow};
use crate::{
    build_onion_payload, decode_ciphertext_plus_json, decode_v4_request, decode_v4_response,
    encode_ciphertext_plus_json, peel_layer, DestinationRequest, Headers, OnionDestination,
    OnionPath, Snode,
};
use onyx_crypto::X25519StaticPrivateKey;

fn header_map() -> impl Strategy<Value = Headers> {
    prop::collection::btree_map("[a-zA-Z-]{1,16}", "[ -~]{0,32}", 0..4)
}

// ==================== V4 Framing Property Tests ====================

proptest! {
    /// Requests survive encode/decode, including the no-body case.
    #[test]
    fn v4_request_roundtrip(
        method in "(GET|POST|PUT|DELETE)",
        endpoint in "/[a-z0-9/]{0,40}",
        headers in header_map(),
        body in prop::option::of(prop::collection::vec(any::<u8>(), 0..256)),
    ) {
        let request = DestinationRequest { method, endpoint, headers, body };
        let decoded = decode_v4_request(&request.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, request);
    }

    /// The response decoder never panics.
    #[test]
    fn v4_decode_arbitrary(data in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_v4_response(&data);
    }

    /// Frames with a valid prefix but random tails do not panic either.
    #[test]
    fn v4_decode_prefixed(tail in prop::collection::vec(any::<u8>(), 0..64)) {
        let mut data = b"l2:{}".to_vec();
        data.extend_from_slice(&tail);
        let _ = decode_v4_response(&data);
    }
}

// ==================== Onion Envelope Property Tests ====================

proptest! {
    /// `ciphertext-plus-json` roundtrips for any ciphertext.
    #[test]
    fn cpj_roundtrip(ciphertext in prop::collection::vec(any::<u8>(), 0..512), key in "[a-z_]{1,12}") {
        let mut object = serde_json::Map::new();
        object.insert(key, json!("value"));
        let payload = serde_json::Value::Object(object);
        let encoded = encode_ciphertext_plus_json(&ciphertext, &payload).unwrap();
        let (decoded, json) = decode_ciphertext_plus_json(&encoded).unwrap();
        prop_assert_eq!(decoded, ciphertext);
        prop_assert_eq!(json, payload);
    }

    /// The envelope decoder never panics.
    #[test]
    fn cpj_decode_arbitrary(data in prop::collection::vec(any::<u8>(), 0..128)) {
        let _ = decode_ciphertext_plus_json(&data);
    }
}

proptest! {
    /// Each relay peels one layer, forwards to the next hop, and the
    /// destination recovers the payload with the key the client kept.
    #[test]
    fn onion_peels_to_destination(
        hops in 1usize..=6,
        payload in prop::collection::vec(any::<u8>(), 0..512),
    ) {
        let keys: Vec<X25519StaticPrivateKey> =
            (0..=hops).map(|_| X25519StaticPrivateKey::generate()).collect();
        let snodes: Vec<Snode> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| {
                Snode::new(
                    hex::encode([i as u8 + 1; 32]),
                    key.public_key().to_hex(),
                    format!("10.0.0.{}", i + 1),
                    22000,
                )
            })
            .collect();
        let (relay_keys, destination_key) = keys.split_at(hops);
        let path = OnionPath::new(snodes[..hops].to_vec()).unwrap();
        let destination = OnionDestination::Snode(snodes[hops].clone());

        let onion = build_onion_payload(&path, &destination, &payload).unwrap();
        let mut layer = onion.guard_payload.clone();
        for (i, key) in relay_keys.iter().enumerate() {
            let (_, plaintext, _) = peel_layer(key, &layer).unwrap();
            let (_, instruction) = decode_ciphertext_plus_json(&plaintext).unwrap();
            prop_assert_eq!(
                &instruction["destination"],
                &json!(snodes[i + 1].pubkey_ed25519)
            );
            layer = plaintext;
        }

        let (key, plaintext, _) = peel_layer(&destination_key[0], &layer).unwrap();
        prop_assert_eq!(plaintext, payload);
        prop_assert_eq!(key, onion.destination_key);
    }
}

// ==================== Batch Property Tests ====================

proptest! {
    /// Every received entry is paired with the subrequest at its index.
    #[test]
    fn batch_demux_positional(ids in prop::collection::vec(any::<u32>(), 1..8)) {
        let rows: Vec<BatchRow> = ids
            .iter()
            .map(|id| BatchRow::DeleteMessage { room: "r".into(), message_id: u64::from(*id) })
            .collect();
        let response: Vec<_> = ids.iter().map(|_| json!({"code": 200})).collect();
        let demuxed = demux_batch_response(&rows, &json!(response)).unwrap();
        prop_assert_eq!(demuxed.entries.len(), rows.len());
    }
}
