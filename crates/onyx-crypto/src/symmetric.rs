//! Symmetric AEAD used by the onion channel and by blinded messages.
//!
//! Two ciphers are in use:
//!
//! - **AES-256-GCM** for onion layers. Wire format is `iv (12) || ciphertext || tag (16)`.
//! - **XChaCha20-Poly1305** for blinded direct messages. The caller places
//!   the 24-byte nonce itself, see [`crate::blinding`].
//!
//! ## Security Notes
//!
//! - Keys are zeroized on drop
//! - Nonces and IVs are randomly generated using OsRng
//! - NEVER reuse a nonce with the same key

use aes_gcm::Aes256Gcm;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CryptoError, Result};

/// Size of symmetric key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM IV in bytes.
pub const GCM_IV_SIZE: usize = 12;

/// Size of the XChaCha20 nonce in bytes.
pub const NONCE_SIZE: usize = 24;

/// Size of the authentication tag in bytes (both ciphers).
pub const TAG_SIZE: usize = 16;

/// A 256-bit symmetric key.
///
/// The key is automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    /// Generate a new random symmetric key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 32 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the key as a byte slice.
    ///
    /// # Security
    ///
    /// Be careful with this - avoid logging or persisting the returned bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl From<[u8; KEY_SIZE]> for SymmetricKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for SymmetricKey {}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// A 192-bit nonce for XChaCha20-Poly1305.
#[derive(Clone, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    /// Create a nonce from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 24 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidKeyLength {
                expected: NONCE_SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce as a byte slice.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }
}

impl std::fmt::Debug for Nonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Nonce({:02x}{:02x}..)", self.bytes[0], self.bytes[1])
    }
}

// ============================================================================
// AES-256-GCM (onion layers)
// ============================================================================

/// Encrypt with AES-256-GCM under a fresh random IV.
///
/// Returns `iv || ciphertext || tag`.
pub fn encrypt_gcm(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let mut iv = [0u8; GCM_IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let ciphertext = cipher
        .encrypt(aes_gcm::Nonce::from_slice(&iv), plaintext)
        .map_err(|_| CryptoError::Encryption("AES-256-GCM encryption failed".into()))?;

    let mut out = Vec::with_capacity(GCM_IV_SIZE + ciphertext.len());
    out.extend_from_slice(&iv);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt `iv || ciphertext || tag` produced by [`encrypt_gcm`].
///
/// # Errors
///
/// Returns `CryptoError::Decryption` on a short input, a wrong key or a
/// tampered ciphertext.
pub fn decrypt_gcm(key: &SymmetricKey, data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < GCM_IV_SIZE + TAG_SIZE {
        return Err(CryptoError::Decryption);
    }
    let (iv, ciphertext) = data.split_at(GCM_IV_SIZE);
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    cipher
        .decrypt(aes_gcm::Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

// ============================================================================
// XChaCha20-Poly1305 (blinded messages)
// ============================================================================

/// Encrypt with XChaCha20-Poly1305 under the given nonce.
///
/// Returns `ciphertext || tag`; the nonce is not included.
pub fn encrypt_xchacha(key: &SymmetricKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(XNonce::from_slice(nonce.as_bytes()), plaintext)
        .map_err(|_| CryptoError::Encryption("XChaCha20-Poly1305 encryption failed".into()))
}

/// Decrypt `ciphertext || tag` with XChaCha20-Poly1305.
pub fn decrypt_xchacha(key: &SymmetricKey, nonce: &Nonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce.as_bytes()), ciphertext)
        .map_err(|_| CryptoError::Decryption)
}
