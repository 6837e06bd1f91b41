//! Hash primitives used by blinding and request signing.
//!
//! - BLAKE2b-512 for the blinding factor and SOGS body digests
//! - BLAKE2b-256 for blinded shared keys
//! - SHA-512 for the Ed25519 nonce and challenge derivation

use blake2::digest::consts::U32;
use blake2::{Blake2b, Blake2b512, Digest};
use sha2::Sha512;

use crate::{CryptoError, Result};

type Blake2b256 = Blake2b<U32>;

/// Size of a BLAKE2b-512 or SHA-512 digest in bytes.
pub const HASH64_SIZE: usize = 64;

/// Size of a BLAKE2b-256 digest in bytes.
pub const HASH32_SIZE: usize = 32;

/// Unkeyed BLAKE2b with a 64-byte output.
pub fn blake2b_512(data: &[u8]) -> [u8; HASH64_SIZE] {
    let mut hasher = Blake2b512::new();
    hasher.update(data);
    let mut out = [0u8; HASH64_SIZE];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Unkeyed BLAKE2b with a 32-byte output over the concatenation of `parts`.
pub fn blake2b_256(parts: &[&[u8]]) -> [u8; HASH32_SIZE] {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// SHA-512 over the concatenation of `parts`.
pub fn sha512(parts: &[&[u8]]) -> [u8; HASH64_SIZE] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; HASH64_SIZE];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Decode a hex string into exactly 32 bytes.
///
/// # Errors
///
/// Returns `InvalidHexFormat` for non-hex input and `InvalidKeyLength`
/// when the decoded length is not 32.
pub fn decode_hex_32(s: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidHexFormat(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(CryptoError::InvalidKeyLength {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}
