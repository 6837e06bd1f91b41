//! X25519 key agreement for onion layers.
//!
//! Every onion layer is encrypted to a hop's static X25519 key with a
//! fresh ephemeral key pair. The layer key is
//! `HMAC-SHA256(key = "LOKI", msg = X25519(ephemeral, hop))` and the layer
//! itself is AES-256-GCM (see [`crate::symmetric::encrypt_gcm`]).
//!
//! ## Security Notes
//!
//! - Private keys are zeroized on drop
//! - Uses OsRng for key generation
//! - Shared secrets are zeroized after use

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::symmetric::{decrypt_gcm, encrypt_gcm, SymmetricKey};
use crate::{CryptoError, Result};

/// Size of X25519 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 32;

/// Size of X25519 private key in bytes.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// Size of shared secret in bytes.
pub const SHARED_SECRET_SIZE: usize = 32;

/// HMAC key used to turn a raw X25519 secret into an onion layer key.
const ONION_KEY_SALT: &[u8] = b"LOKI";

/// X25519 public key for key exchange.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey {
    bytes: [u8; PUBLIC_KEY_SIZE],
}

impl X25519PublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: PUBLIC_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; PUBLIC_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Parse a 64-character hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self {
            bytes: crate::hash::decode_hex_32(s)?,
        })
    }

    /// Get the key as bytes.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.bytes
    }

    /// Convert to byte array.
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.bytes
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl std::fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "X25519PublicKey({:02x}{:02x}..)",
            self.bytes[0], self.bytes[1]
        )
    }
}

impl From<PublicKey> for X25519PublicKey {
    fn from(key: PublicKey) -> Self {
        Self {
            bytes: key.to_bytes(),
        }
    }
}

impl From<[u8; PUBLIC_KEY_SIZE]> for X25519PublicKey {
    fn from(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self { bytes }
    }
}

impl From<&X25519PublicKey> for PublicKey {
    fn from(key: &X25519PublicKey) -> Self {
        PublicKey::from(key.bytes)
    }
}

/// X25519 static private key.
///
/// Relays hold one of these; the client only needs it in tests that peel
/// onion layers.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct X25519StaticPrivateKey {
    bytes: [u8; PRIVATE_KEY_SIZE],
}

impl X25519StaticPrivateKey {
    /// Generate a new random private key.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        Self {
            bytes: secret.to_bytes(),
        }
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: PRIVATE_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; PRIVATE_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the corresponding public key.
    pub fn public_key(&self) -> X25519PublicKey {
        let secret = StaticSecret::from(self.bytes);
        X25519PublicKey::from(PublicKey::from(&secret))
    }

    /// Perform Diffie-Hellman key exchange.
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> SharedSecret {
        let secret = StaticSecret::from(self.bytes);
        let shared = secret.diffie_hellman(&PublicKey::from(peer_public));
        SharedSecret {
            bytes: shared.to_bytes(),
        }
    }
}

impl std::fmt::Debug for X25519StaticPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X25519StaticPrivateKey([REDACTED])")
    }
}

/// X25519 ephemeral key pair, consumed by a single key agreement.
pub struct X25519EphemeralKeyPair {
    secret: EphemeralSecret,
    public: X25519PublicKey,
}

impl X25519EphemeralKeyPair {
    /// Generate a new ephemeral key pair.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public_key = PublicKey::from(&secret);
        Self {
            secret,
            public: X25519PublicKey::from(public_key),
        }
    }

    /// Get the public key.
    pub fn public_key(&self) -> &X25519PublicKey {
        &self.public
    }

    /// Perform Diffie-Hellman and consume the ephemeral key.
    pub fn diffie_hellman(self, peer_public: &X25519PublicKey) -> SharedSecret {
        let shared = self.secret.diffie_hellman(&PublicKey::from(peer_public));
        SharedSecret {
            bytes: shared.to_bytes(),
        }
    }
}

impl std::fmt::Debug for X25519EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "X25519EphemeralKeyPair {{ public: {:?} }}", self.public)
    }
}

/// Shared secret derived from Diffie-Hellman key exchange.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; SHARED_SECRET_SIZE],
}

impl SharedSecret {
    /// Get the shared secret as bytes.
    pub fn as_bytes(&self) -> &[u8; SHARED_SECRET_SIZE] {
        &self.bytes
    }

    /// Derive the onion layer key: `HMAC-SHA256(key = "LOKI", msg = secret)`.
    pub fn derive_onion_key(&self) -> Result<SymmetricKey> {
        let mut mac = Hmac::<Sha256>::new_from_slice(ONION_KEY_SALT)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        mac.update(&self.bytes);
        let key: [u8; 32] = mac.finalize().into_bytes().into();
        Ok(SymmetricKey::from(key))
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSecret([REDACTED])")
    }
}

/// Output of one onion encryption step.
///
/// `symmetric_key` is only meaningful for the destination-facing context;
/// it is the single key that decrypts the response.
#[derive(Clone)]
pub struct EncryptionContext {
    /// `iv || ciphertext || tag`.
    pub ciphertext: Vec<u8>,
    /// Layer key shared with the recipient of this layer.
    pub symmetric_key: SymmetricKey,
    /// Ephemeral public key the recipient needs to derive `symmetric_key`.
    pub ephemeral_key: X25519PublicKey,
}

impl std::fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("ciphertext_len", &self.ciphertext.len())
            .field("ephemeral_key", &self.ephemeral_key)
            .finish_non_exhaustive()
    }
}

/// Encrypt `plaintext` to `recipient` under a fresh ephemeral key.
pub fn encrypt_for_pubkey(
    recipient: &X25519PublicKey,
    plaintext: &[u8],
) -> Result<EncryptionContext> {
    let ephemeral = X25519EphemeralKeyPair::generate();
    let ephemeral_key = *ephemeral.public_key();
    let symmetric_key = ephemeral.diffie_hellman(recipient).derive_onion_key()?;
    let ciphertext = encrypt_gcm(&symmetric_key, plaintext)?;

    Ok(EncryptionContext {
        ciphertext,
        symmetric_key,
        ephemeral_key,
    })
}

/// Recipient side of [`encrypt_for_pubkey`]: recover the layer key and
/// decrypt the layer.
pub fn decrypt_from_ephemeral(
    recipient: &X25519StaticPrivateKey,
    ephemeral_key: &X25519PublicKey,
    ciphertext: &[u8],
) -> Result<(SymmetricKey, Vec<u8>)> {
    let key = recipient.diffie_hellman(ephemeral_key).derive_onion_key()?;
    let plaintext = decrypt_gcm(&key, ciphertext)?;
    Ok((key, plaintext))
}
