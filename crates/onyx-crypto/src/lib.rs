//! # onyx-crypto
//!
//! Cryptographic primitives for the onyx messaging client.
//!
//! This crate provides:
//! - **X25519 + AES-256-GCM** onion layers ([`x25519::encrypt_for_pubkey`])
//! - **XChaCha20-Poly1305** for blinded direct messages
//! - **BLAKE2b / SHA-512** hashing
//! - **Ed25519** account keys and server-scoped key blinding
//!
//! ## Security
//!
//! All secret data uses `zeroize` for secure memory cleanup.
//! Symmetric keys compare in constant time via `subtle`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod blinding;
pub mod error;
pub mod hash;
pub mod identity;
pub mod symmetric;
pub mod x25519;

#[cfg(test)]
mod proptests;

pub use blinding::{
    blinded_sign, derive_blinded_id, derive_blinding_values, decrypt_blinded_message,
    encrypt_blinded_message, plain_sign, try_match_blinded_with_standard, BlindingValues,
    DecryptedBlindedMessage,
};
pub use error::{CryptoError, Result};
pub use hash::{blake2b_256, blake2b_512, decode_hex_32, sha512};
pub use identity::{
    is_blinded_id, is_non_blinded_id, short_key, strip_prefix, verify_signature, AccountKeyPair,
    KeyPrefix, SESSION_ID_HEX_LEN,
};
pub use symmetric::{decrypt_gcm, encrypt_gcm, Nonce, SymmetricKey, KEY_SIZE, NONCE_SIZE};
pub use x25519::{
    decrypt_from_ephemeral, encrypt_for_pubkey, EncryptionContext, X25519PublicKey,
    X25519StaticPrivateKey,
};
