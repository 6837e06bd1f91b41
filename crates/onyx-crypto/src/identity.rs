//! Account keys and session id prefixes.
//!
//! A session id is a one-byte type prefix (hex encoded) followed by a
//! 32-byte key:
//!
//! | prefix | meaning                                   |
//! |--------|-------------------------------------------|
//! | `05`   | standard id, X25519 form of the account key |
//! | `00`   | unblinded Ed25519 account key (SOGS)      |
//! | `15`   | blinded Ed25519 key, server scoped        |
//! | `25`   | blinded key, newer scheme                 |

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

use crate::hash::{decode_hex_32, sha512};
use crate::{CryptoError, Result};

/// Length of a hex session id including its prefix.
pub const SESSION_ID_HEX_LEN: usize = 66;

/// Size of an Ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

/// Type prefix of a session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPrefix {
    /// `00`: raw Ed25519 account key.
    Unblinded,
    /// `05`: X25519 account key.
    Standard,
    /// `15`: blinded key.
    Blinded15,
    /// `25`: blinded key, newer scheme.
    Blinded25,
}

impl KeyPrefix {
    /// The two hex characters of this prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPrefix::Unblinded => "00",
            KeyPrefix::Standard => "05",
            KeyPrefix::Blinded15 => "15",
            KeyPrefix::Blinded25 => "25",
        }
    }

    /// Prefix of `id`, if it is a known one.
    pub fn of(id: &str) -> Option<Self> {
        match id.get(..2)? {
            "00" => Some(KeyPrefix::Unblinded),
            "05" => Some(KeyPrefix::Standard),
            "15" => Some(KeyPrefix::Blinded15),
            "25" => Some(KeyPrefix::Blinded25),
            _ => None,
        }
    }

    /// Whether this prefix denotes a blinded key.
    pub fn is_blinded(&self) -> bool {
        matches!(self, KeyPrefix::Blinded15 | KeyPrefix::Blinded25)
    }
}

/// True if `id` starts with `15` or `25`.
pub fn is_blinded_id(id: &str) -> bool {
    KeyPrefix::of(id).is_some_and(|p| p.is_blinded())
}

/// True if `id` starts with `00` or `05`.
pub fn is_non_blinded_id(id: &str) -> bool {
    matches!(
        KeyPrefix::of(id),
        Some(KeyPrefix::Unblinded | KeyPrefix::Standard)
    )
}

/// Drop the two-character prefix of a full-length session id.
///
/// # Errors
///
/// Returns `InvalidSessionId` if `id` is not ASCII.
pub fn strip_prefix(id: &str) -> Result<&str> {
    ensure_ascii(id)?;
    if id.len() == SESSION_ID_HEX_LEN {
        Ok(&id[2..])
    } else {
        Ok(id)
    }
}

/// Decode the 32 key bytes of a full-length session id.
pub fn session_id_key_bytes(id: &str) -> Result<[u8; 32]> {
    ensure_ascii(id)?;
    if id.len() != SESSION_ID_HEX_LEN {
        return Err(CryptoError::InvalidSessionId(format!(
            "expected {} hex characters, got {}",
            SESSION_ID_HEX_LEN,
            id.len()
        )));
    }
    decode_hex_32(&id[2..])
}

fn ensure_ascii(id: &str) -> Result<()> {
    if id.is_ascii() {
        Ok(())
    } else {
        Err(CryptoError::InvalidSessionId(
            "session id contains non-ASCII characters".into(),
        ))
    }
}

/// Shortened form of a key for logs: first and last four characters.
///
/// Counts characters, not bytes, so relay-supplied text is safe to pass.
pub fn short_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 8 {
        return key.to_string();
    }
    let head: String = key.chars().take(4).collect();
    let tail: String = key.chars().skip(count - 4).collect();
    format!("({head}...{tail})")
}

/// The account's long-term Ed25519 key pair.
///
/// Key generation and storage happen elsewhere; this type only wraps a
/// seed that was handed to us.
#[derive(Clone)]
pub struct AccountKeyPair {
    signing: SigningKey,
}

impl AccountKeyPair {
    /// Build from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(seed),
        }
    }

    /// Build from a hex-encoded seed.
    pub fn from_seed_hex(seed: &str) -> Result<Self> {
        Ok(Self::from_seed(&decode_hex_32(seed)?))
    }

    /// Random key pair, for tests and tooling.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    /// The 32-byte seed.
    ///
    /// # Security
    ///
    /// This exposes the secret key.
    pub fn seed(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// Ed25519 public key bytes.
    pub fn ed25519_public(&self) -> [u8; 32] {
        self.signing.verifying_key().to_bytes()
    }

    /// X25519 form of the public key.
    pub fn x25519_public(&self) -> [u8; 32] {
        let a = Scalar::from_bytes_mod_order(self.secret_scalar_bytes());
        EdwardsPoint::mul_base(&a).to_montgomery().to_bytes()
    }

    /// Standard `05` session id.
    pub fn session_id(&self) -> String {
        format!(
            "{}{}",
            KeyPrefix::Standard.as_str(),
            hex::encode(self.x25519_public())
        )
    }

    /// Unblinded `00` id used in SOGS headers.
    pub fn unblinded_id(&self) -> String {
        format!(
            "{}{}",
            KeyPrefix::Unblinded.as_str(),
            hex::encode(self.ed25519_public())
        )
    }

    /// Clamped secret scalar: `sha512(seed)[..32]` with the usual bit fixes.
    pub fn secret_scalar_bytes(&self) -> [u8; 32] {
        let expanded = sha512(&[&self.signing.to_bytes()]);
        let mut a = [0u8; 32];
        a.copy_from_slice(&expanded[..32]);
        a[0] &= 248;
        a[31] &= 127;
        a[31] |= 64;
        a
    }

    /// Nonce prefix: `sha512(seed)[32..]`.
    pub fn nonce_prefix(&self) -> [u8; 32] {
        let expanded = sha512(&[&self.signing.to_bytes()]);
        let mut prefix = [0u8; 32];
        prefix.copy_from_slice(&expanded[32..]);
        prefix
    }

    /// Standard detached Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for AccountKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountKeyPair({})", short_key(&self.session_id()))
    }
}

/// Verify a detached Ed25519 signature.
pub fn verify_signature(public: &[u8; 32], message: &[u8], signature: &[u8]) -> Result<()> {
    let key = VerifyingKey::from_bytes(public).map_err(|_| CryptoError::SignatureVerification)?;
    let signature =
        Signature::from_slice(signature).map_err(|_| CryptoError::SignatureVerification)?;
    key.verify(message, &signature)
        .map_err(|_| CryptoError::SignatureVerification)
}

/// Convert an Ed25519 public key to its X25519 form.
pub fn ed25519_to_x25519(public: &[u8; 32]) -> Result<[u8; 32]> {
    let point = CompressedEdwardsY(*public)
        .decompress()
        .ok_or(CryptoError::InvalidPoint("not an Ed25519 point"))?;
    Ok(point.to_montgomery().to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_detection() {
        assert_eq!(KeyPrefix::of("05abcdef"), Some(KeyPrefix::Standard));
        assert_eq!(KeyPrefix::of("00abcdef"), Some(KeyPrefix::Unblinded));
        assert_eq!(KeyPrefix::of("15abcdef"), Some(KeyPrefix::Blinded15));
        assert_eq!(KeyPrefix::of("25abcdef"), Some(KeyPrefix::Blinded25));
        assert_eq!(KeyPrefix::of("ff"), None);
        assert_eq!(KeyPrefix::of("0"), None);
    }

    #[test]
    fn test_blinded_and_non_blinded() {
        assert!(is_non_blinded_id("05abcdef1234"));
        assert!(is_non_blinded_id("00abcdef1234"));
        assert!(!is_non_blinded_id("15abcdef1234"));
        assert!(is_blinded_id("15abcdef1234"));
        assert!(is_blinded_id("25abcdef1234"));
        assert!(!is_blinded_id("05abcdef1234"));
    }

    #[test]
    fn test_strip_prefix() {
        let id = format!("05{}", "ab".repeat(32));
        assert_eq!(strip_prefix(&id).unwrap(), "ab".repeat(32));
        assert_eq!(strip_prefix("0511").unwrap(), "0511");
    }

    #[test]
    fn test_non_ascii_ids_are_rejected() {
        let id = format!("é{}", "a".repeat(SESSION_ID_HEX_LEN - 2));
        assert_eq!(id.len(), SESSION_ID_HEX_LEN);
        assert!(matches!(
            strip_prefix(&id),
            Err(CryptoError::InvalidSessionId(_))
        ));
        assert!(matches!(
            session_id_key_bytes(&id),
            Err(CryptoError::InvalidSessionId(_))
        ));
    }

    #[test]
    fn test_session_id_matches_x25519() {
        let account = AccountKeyPair::generate();
        let id = account.session_id();
        assert_eq!(id.len(), SESSION_ID_HEX_LEN);
        assert!(id.starts_with("05"));
        assert_eq!(session_id_key_bytes(&id).unwrap(), account.x25519_public());
    }

    #[test]
    fn test_ed25519_to_x25519_matches_account() {
        let account = AccountKeyPair::generate();
        assert_eq!(
            ed25519_to_x25519(&account.ed25519_public()).unwrap(),
            account.x25519_public()
        );
    }

    #[test]
    fn test_sign_verify() {
        let account = AccountKeyPair::generate();
        let sig = account.sign(b"payload");
        verify_signature(&account.ed25519_public(), b"payload", &sig).unwrap();
        assert!(verify_signature(&account.ed25519_public(), b"other", &sig).is_err());
    }

    #[test]
    fn test_secret_scalar_is_clamped() {
        let a = AccountKeyPair::generate().secret_scalar_bytes();
        assert_eq!(a[0] & 7, 0);
        assert_eq!(a[31] & 128, 0);
        assert_eq!(a[31] & 64, 64);
    }

    #[test]
    fn test_seed_roundtrip() {
        let account = AccountKeyPair::generate();
        let again = AccountKeyPair::from_seed_hex(&hex::encode(account.seed())).unwrap();
        assert_eq!(account.ed25519_public(), again.ed25519_public());
    }

    #[test]
    fn test_short_key() {
        assert_eq!(short_key("0123456789abcdef"), "(0123...cdef)");
        assert_eq!(short_key("0123"), "0123");
    }

    #[test]
    fn test_short_key_multibyte() {
        assert_eq!(short_key("aéééé"), "aéééé");
        assert_eq!(short_key("aéééééééé"), "(aééé...éééé)");
        assert_eq!(short_key("ééééééééé"), "(éééé...éééé)");
    }
}
