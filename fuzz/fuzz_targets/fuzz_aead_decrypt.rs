//! Fuzz target for AEAD decryption.
//!
//! AES-GCM onion responses and XChaCha20 blinded messages from the network
//! are attacker controlled; decryption must fail cleanly.

#![no_main]

use libfuzzer_sys::fuzz_target;
use onyx_crypto::{decrypt_blinded_message, decrypt_gcm, AccountKeyPair, SymmetricKey};

const SERVER_PK: [u8; 32] = [0x42; 32];
const OTHER: &str = "15c3b3c6f32f0ab5a57f853cc4f30f5da7fda5624b0c77b3fb0829de562ada081d";

fuzz_target!(|data: &[u8]| {
    let key = SymmetricKey::generate();
    let _ = decrypt_gcm(&key, data);

    let account = AccountKeyPair::from_seed(&[7u8; 32]);
    let _ = decrypt_blinded_message(data, false, OTHER, &SERVER_PK, &account);
    let _ = decrypt_blinded_message(data, true, OTHER, &SERVER_PK, &account);
});
