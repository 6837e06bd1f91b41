//! Fuzz target for onion layer parsing.
//!
//! The `len || ciphertext || json` envelope and layer peeling must reject
//! malformed input without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use onyx_crypto::X25519StaticPrivateKey;
use onyx_protocol::{decode_ciphertext_plus_json, peel_layer};

fuzz_target!(|data: &[u8]| {
    let _ = decode_ciphertext_plus_json(data);

    let key = X25519StaticPrivateKey::generate();
    let _ = peel_layer(&key, data);
});
