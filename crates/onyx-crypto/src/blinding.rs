//! Server-scoped key blinding.
//!
//! An account presents a different Ed25519 identity on every community
//! server. For a server key `S` and account scalar `a`:
//!
//! ```text
//! k  = reduce(blake2b-512(S))
//! ka = k * a  (mod L)
//! kA = ka * B
//! ```
//!
//! `kA` is the blinded public key, shown as `"15" + hex(kA)`. Signatures made
//! with [`blinded_sign`] verify as ordinary Ed25519 signatures under `kA`.
//!
//! Blinded direct messages ([`encrypt_blinded_message`]) are encrypted with
//! XChaCha20-Poly1305 under `blake2b-256(a * kB || kA || kB)` and carry the
//! sender's real Ed25519 key inside the ciphertext so the recipient can
//! verify it against the outer blinded key.

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::montgomery::MontgomeryPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;

use crate::hash::{blake2b_256, blake2b_512, sha512};
use crate::identity::{
    ed25519_to_x25519, is_blinded_id, session_id_key_bytes, strip_prefix, AccountKeyPair,
    KeyPrefix, SIGNATURE_SIZE,
};
use crate::symmetric::{decrypt_xchacha, encrypt_xchacha, Nonce, SymmetricKey, NONCE_SIZE};
use crate::{CryptoError, Result};

/// Version byte of the blinded message format.
pub const BLINDED_MESSAGE_VERSION: u8 = 0;

/// Size of an Ed25519 public key in bytes.
const ED25519_PUBLIC_SIZE: usize = 32;

/// Per-server blinding material for one account.
///
/// Recomputed on demand, never persisted.
#[derive(Clone)]
pub struct BlindingValues {
    a: Scalar,
    ka: Scalar,
    blinded_public: [u8; 32],
}

impl BlindingValues {
    /// The blinded public key `kA`.
    pub fn blinded_public(&self) -> &[u8; 32] {
        &self.blinded_public
    }

    /// `"15" + hex(kA)`.
    pub fn blinded_id(&self) -> String {
        format!(
            "{}{}",
            KeyPrefix::Blinded15.as_str(),
            hex::encode(self.blinded_public)
        )
    }
}

impl std::fmt::Debug for BlindingValues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlindingValues {{ kA: {}, .. }}", hex::encode(self.blinded_public))
    }
}

/// `k = reduce(blake2b-512(server_pk))`.
pub fn blinding_factor(server_public_key: &[u8; 32]) -> Scalar {
    Scalar::from_bytes_mod_order_wide(&blake2b_512(server_public_key))
}

/// Derive `(a, ka, kA)` for `account` on the server identified by
/// `server_public_key`. Deterministic.
pub fn derive_blinding_values(
    server_public_key: &[u8; 32],
    account: &AccountKeyPair,
) -> BlindingValues {
    let k = blinding_factor(server_public_key);
    let a = Scalar::from_bytes_mod_order(account.secret_scalar_bytes());
    let ka = k * a;
    let blinded_public = EdwardsPoint::mul_base(&ka).compress().to_bytes();

    BlindingValues {
        a,
        ka,
        blinded_public,
    }
}

/// Blinded `15` session id of `account` on a server.
pub fn derive_blinded_id(server_public_key: &[u8; 32], account: &AccountKeyPair) -> String {
    derive_blinding_values(server_public_key, account).blinded_id()
}

/// Ed25519-compatible signature under the blinded key `kA`.
pub fn blinded_sign(
    message: &[u8],
    account: &AccountKeyPair,
    values: &BlindingValues,
) -> [u8; SIGNATURE_SIZE] {
    let nonce_prefix = account.nonce_prefix();
    let r = Scalar::from_bytes_mod_order_wide(&sha512(&[
        &nonce_prefix,
        &values.blinded_public,
        message,
    ]));
    let big_r = EdwardsPoint::mul_base(&r).compress().to_bytes();
    let hram =
        Scalar::from_bytes_mod_order_wide(&sha512(&[&big_r, &values.blinded_public, message]));
    let s = r + hram * values.ka;

    let mut signature = [0u8; SIGNATURE_SIZE];
    signature[..32].copy_from_slice(&big_r);
    signature[32..].copy_from_slice(s.as_bytes());
    signature
}

/// Plain Ed25519 signature with the account key.
pub fn plain_sign(message: &[u8], account: &AccountKeyPair) -> [u8; SIGNATURE_SIZE] {
    account.sign(message)
}

/// Multiply a point by a scalar without clamping.
///
/// Rejects encodings that are non-canonical, of small order or outside the
/// prime-order subgroup, and an identity result.
pub fn scalar_mult_noclamp(scalar: &Scalar, point: &[u8; 32]) -> Result<[u8; 32]> {
    let compressed = CompressedEdwardsY(*point);
    let decompressed = compressed
        .decompress()
        .ok_or(CryptoError::InvalidPoint("not on the curve"))?;
    if decompressed.compress() != compressed {
        return Err(CryptoError::InvalidPoint("non-canonical encoding"));
    }
    if decompressed.is_small_order() {
        return Err(CryptoError::InvalidPoint("small order"));
    }
    if !decompressed.is_torsion_free() {
        return Err(CryptoError::InvalidPoint("not in the prime-order subgroup"));
    }
    let product = scalar * decompressed;
    if product.is_identity() {
        return Err(CryptoError::InvalidPoint("identity result"));
    }
    Ok(product.compress().to_bytes())
}

fn shared_blinded_key(
    secret: &Scalar,
    other_blinded: &[u8; 32],
    from_blinded: &[u8; 32],
    to_blinded: &[u8; 32],
) -> Result<SymmetricKey> {
    let combined = scalar_mult_noclamp(secret, other_blinded)?;
    Ok(SymmetricKey::from(blake2b_256(&[
        &combined,
        from_blinded,
        to_blinded,
    ])))
}

/// Encrypt `raw` from `sender` to a blinded recipient on a server.
///
/// Output: `0x00 || ciphertext || nonce (24)`.
///
/// # Errors
///
/// Returns `Encryption("Not enough recipient keys")` when no recipient key
/// is given, and `InvalidPoint` for an unusable recipient key.
pub fn encrypt_blinded_message(
    raw: &[u8],
    sender: &AccountKeyPair,
    server_public_key: &[u8; 32],
    recipient_blinded_public: Option<&[u8; 32]>,
) -> Result<Vec<u8>> {
    let recipient = recipient_blinded_public
        .ok_or_else(|| CryptoError::Encryption("Not enough recipient keys".into()))?;
    let values = derive_blinding_values(server_public_key, sender);
    let key = shared_blinded_key(&values.a, recipient, &values.blinded_public, recipient)?;

    let mut plaintext = Vec::with_capacity(raw.len() + ED25519_PUBLIC_SIZE);
    plaintext.extend_from_slice(raw);
    plaintext.extend_from_slice(&sender.ed25519_public());

    let nonce = Nonce::generate();
    let ciphertext = encrypt_xchacha(&key, &nonce, &plaintext)?;

    let mut out = Vec::with_capacity(1 + ciphertext.len() + NONCE_SIZE);
    out.push(BLINDED_MESSAGE_VERSION);
    out.extend_from_slice(&ciphertext);
    out.extend_from_slice(nonce.as_bytes());
    Ok(out)
}

/// A decrypted blinded message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedBlindedMessage {
    /// Message bytes without the trailing sender key.
    pub plaintext: Vec<u8>,
    /// Standard `05` id of the verified sender.
    pub sender_session_id: String,
}

/// Decrypt a blinded message.
///
/// `other_blinded_id` is the counterpart's blinded key (prefixed or bare
/// hex): the sender for an inbox message, the recipient for an outbox one.
///
/// # Errors
///
/// - `DataTooShort` if `data` is not longer than the nonce
/// - `UnsupportedVersion` for a version byte other than 0
/// - `Decryption` if the AEAD fails
/// - `InvalidSignature` if the embedded sender key does not blind to the
///   expected key on this server
pub fn decrypt_blinded_message(
    data: &[u8],
    is_outgoing: bool,
    other_blinded_id: &str,
    server_public_key: &[u8; 32],
    account: &AccountKeyPair,
) -> Result<DecryptedBlindedMessage> {
    if data.len() <= NONCE_SIZE {
        return Err(CryptoError::DataTooShort {
            minimum: NONCE_SIZE,
            actual: data.len(),
        });
    }

    let own = derive_blinding_values(server_public_key, account);
    let other = crate::hash::decode_hex_32(strip_prefix(other_blinded_id)?)?;

    let (from_key, to_key) = if is_outgoing {
        (own.blinded_public, other)
    } else {
        (other, own.blinded_public)
    };
    let key = shared_blinded_key(&own.a, &other, &from_key, &to_key)?;

    let version = data[0];
    if version != BLINDED_MESSAGE_VERSION {
        return Err(CryptoError::UnsupportedVersion(version));
    }
    let nonce = Nonce::from_bytes(&data[data.len() - NONCE_SIZE..])?;
    let ciphertext = &data[1..data.len() - NONCE_SIZE];
    let inner = decrypt_xchacha(&key, &nonce, ciphertext)?;

    if inner.len() < ED25519_PUBLIC_SIZE {
        return Err(CryptoError::DataTooShort {
            minimum: ED25519_PUBLIC_SIZE - 1,
            actual: inner.len(),
        });
    }
    let (plaintext, sender_bytes) = inner.split_at(inner.len() - ED25519_PUBLIC_SIZE);
    let mut sender_ed25519 = [0u8; ED25519_PUBLIC_SIZE];
    sender_ed25519.copy_from_slice(sender_bytes);

    let k = blinding_factor(server_public_key);
    let sender_blinded = scalar_mult_noclamp(&k, &sender_ed25519)?;
    if sender_blinded != from_key {
        return Err(CryptoError::InvalidSignature);
    }

    let sender_x25519 = ed25519_to_x25519(&sender_ed25519)?;
    Ok(DecryptedBlindedMessage {
        plaintext: plaintext.to_vec(),
        sender_session_id: format!(
            "{}{}",
            KeyPrefix::Standard.as_str(),
            hex::encode(sender_x25519)
        ),
    })
}

/// Check whether a standard `05` id and a blinded id belong to the same
/// account on a server.
///
/// An X25519 key maps back to two Ed25519 keys that differ only in sign;
/// both candidates are blinded and compared. Cryptographic failures are
/// reported as "no match".
///
/// # Errors
///
/// Returns `InvalidSessionId` if `standard_id` does not start with `05` or
/// `blinded_id` is not a `15`/`25` id.
pub fn try_match_blinded_with_standard(
    standard_id: &str,
    blinded_id: &str,
    server_public_key: &[u8; 32],
) -> Result<bool> {
    if KeyPrefix::of(standard_id) != Some(KeyPrefix::Standard) {
        return Err(CryptoError::InvalidSessionId(
            "standard key must start with 05".into(),
        ));
    }
    if !is_blinded_id(blinded_id) {
        return Err(CryptoError::InvalidSessionId(
            "blinded key must start with 15 or 25".into(),
        ));
    }

    let matches = || -> Result<bool> {
        let x25519 = session_id_key_bytes(standard_id)?;
        let blinded = session_id_key_bytes(blinded_id)?;
        let ed25519 = MontgomeryPoint(x25519)
            .to_edwards(0)
            .ok_or(CryptoError::InvalidPoint("no Edwards form"))?
            .compress()
            .to_bytes();

        let k = blinding_factor(server_public_key);
        let pk1 = scalar_mult_noclamp(&k, &ed25519)?;
        let mut pk2 = pk1;
        pk2[31] ^= 0b1000_0000;

        Ok(blinded == pk1 || blinded == pk2)
    };

    Ok(matches().unwrap_or(false))
}
