//! Property-based tests for cryptographic primitives.
//!
//! These focus on:
//!
//! - Onion layer and blinded message roundtrips
//! - Signatures made under a blinded key verifying under that key
//! - Malformed input being rejected without panicking

use proptest::prelude::*;

use crate::{
    blinded_sign, decrypt_blinded_message, decrypt_from_ephemeral, decrypt_gcm,
    derive_blinding_values, encrypt_blinded_message, encrypt_for_pubkey, encrypt_gcm,
    try_match_blinded_with_standard, verify_signature, AccountKeyPair, SymmetricKey,
    X25519StaticPrivateKey,
};

// ==================== Onion Layer Property Tests ====================

proptest! {
    /// A layer encrypted to a hop decrypts with the hop's static key.
    #[test]
    fn onion_layer_roundtrip(plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
        let hop = X25519StaticPrivateKey::generate();
        let ctx = encrypt_for_pubkey(&hop.public_key(), &plaintext).unwrap();
        let (key, decrypted) = decrypt_from_ephemeral(&hop, &ctx.ephemeral_key, &ctx.ciphertext).unwrap();
        prop_assert_eq!(plaintext, decrypted);
        prop_assert_eq!(key, ctx.symmetric_key);
    }

    /// Arbitrary bytes never decrypt under a random key.
    #[test]
    fn gcm_rejects_garbage(data in prop::collection::vec(any::<u8>(), 0..128)) {
        let key = SymmetricKey::generate();
        prop_assert!(decrypt_gcm(&key, &data).is_err());
    }

    /// GCM output is exactly iv + plaintext + tag.
    #[test]
    fn gcm_length(plaintext in prop::collection::vec(any::<u8>(), 0..256)) {
        let key = SymmetricKey::generate();
        let encrypted = encrypt_gcm(&key, &plaintext).unwrap();
        prop_assert_eq!(encrypted.len(), plaintext.len() + 28);
    }
}

// ==================== Blinding Property Tests ====================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Blinded signatures verify under the blinded key for any server.
    #[test]
    fn blinded_signature_verifies(
        seed in any::<[u8; 32]>(),
        server in any::<[u8; 32]>(),
        message in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let account = AccountKeyPair::from_seed(&seed);
        let values = derive_blinding_values(&server, &account);
        let signature = blinded_sign(&message, &account, &values);
        prop_assert!(verify_signature(values.blinded_public(), &message, &signature).is_ok());
    }

    /// An account always matches its own blinded id.
    #[test]
    fn blinded_id_matches_own_session_id(seed in any::<[u8; 32]>(), server in any::<[u8; 32]>()) {
        let account = AccountKeyPair::from_seed(&seed);
        let blinded = derive_blinding_values(&server, &account).blinded_id();
        prop_assert!(try_match_blinded_with_standard(&account.session_id(), &blinded, &server).unwrap());
    }

    /// Blinded messages decrypt for the recipient and name the sender.
    #[test]
    fn blinded_message_roundtrip(
        sender_seed in any::<[u8; 32]>(),
        recipient_seed in any::<[u8; 32]>(),
        server in any::<[u8; 32]>(),
        message in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        let sender = AccountKeyPair::from_seed(&sender_seed);
        let recipient = AccountKeyPair::from_seed(&recipient_seed);
        let sender_blinded = derive_blinding_values(&server, &sender);
        let recipient_blinded = derive_blinding_values(&server, &recipient);

        let data = encrypt_blinded_message(&message, &sender, &server, Some(recipient_blinded.blinded_public())).unwrap();
        let decrypted = decrypt_blinded_message(&data, false, &sender_blinded.blinded_id(), &server, &recipient).unwrap();
        prop_assert_eq!(decrypted.plaintext, message);
        prop_assert_eq!(decrypted.sender_session_id, sender.session_id());
    }

    /// Random data never decrypts as a blinded message.
    #[test]
    fn blinded_decrypt_rejects_garbage(
        seed in any::<[u8; 32]>(),
        data in prop::collection::vec(any::<u8>(), 0..128),
    ) {
        let account = AccountKeyPair::from_seed(&seed);
        let other = derive_blinding_values(&[9u8; 32], &AccountKeyPair::generate()).blinded_id();
        prop_assert!(decrypt_blinded_message(&data, false, &other, &[9u8; 32], &account).is_err());
    }
}
