//! SOGS request signing.
//!
//! Every authenticated request carries four headers:
//!
//! | header             | value                                         |
//! |--------------------|-----------------------------------------------|
//! | `X-SOGS-Pubkey`    | `"15" + hex(kA)` or `"00" + hex(ed25519_pk)`  |
//! | `X-SOGS-Timestamp` | unix seconds of the network clock             |
//! | `X-SOGS-Nonce`     | 16 random bytes, base64                       |
//! | `X-SOGS-Signature` | signature over the signable buffer, base64    |
//!
//! The signable buffer is
//! `server_pk || nonce || ascii(ts) || method || endpoint || [blake2b-512(body)]`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;

use onyx_crypto::{blake2b_512, blinded_sign, derive_blinding_values, plain_sign, AccountKeyPair};

use crate::limits::SOGS_NONCE_SIZE;
use crate::v4::Headers;

/// Header carrying the signing key.
pub const HEADER_PUBKEY: &str = "X-SOGS-Pubkey";
/// Header carrying the timestamp in seconds.
pub const HEADER_TIMESTAMP: &str = "X-SOGS-Timestamp";
/// Header carrying the base64 nonce.
pub const HEADER_NONCE: &str = "X-SOGS-Nonce";
/// Header carrying the base64 signature.
pub const HEADER_SIGNATURE: &str = "X-SOGS-Signature";

/// What gets signed.
#[derive(Debug, Clone, Copy)]
pub struct SogsRequest<'a> {
    /// Server's Ed25519 public key.
    pub server_public_key: &'a [u8; 32],
    /// HTTP method, upper case.
    pub method: &'a str,
    /// Path and query, starting with `/`.
    pub endpoint: &'a str,
    /// Request body, if any.
    pub body: Option<&'a [u8]>,
    /// Sign with the server-scoped blinded key.
    pub blinded: bool,
}

/// The four `X-SOGS-*` header values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SogsAuthHeaders {
    /// `15`- or `00`-prefixed signing key.
    pub pubkey: String,
    /// Unix seconds.
    pub timestamp: u64,
    /// Base64 nonce.
    pub nonce: String,
    /// Base64 signature.
    pub signature: String,
}

impl SogsAuthHeaders {
    /// As a header map.
    pub fn to_headers(&self) -> Headers {
        let mut headers = Headers::new();
        self.merge_into(&mut headers);
        headers
    }

    /// Insert the four headers into `headers`, replacing existing values.
    pub fn merge_into(&self, headers: &mut Headers) {
        headers.insert(HEADER_PUBKEY.into(), self.pubkey.clone());
        headers.insert(HEADER_TIMESTAMP.into(), self.timestamp.to_string());
        headers.insert(HEADER_NONCE.into(), self.nonce.clone());
        headers.insert(HEADER_SIGNATURE.into(), self.signature.clone());
    }
}

/// Sign a request with a fresh random nonce.
pub fn sign_request(
    account: &AccountKeyPair,
    request: &SogsRequest<'_>,
    network_time_ms: u64,
) -> SogsAuthHeaders {
    let mut nonce = [0u8; SOGS_NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    sign_request_with_nonce(account, request, network_time_ms, &nonce)
}

/// Sign a request with a caller-provided nonce.
pub fn sign_request_with_nonce(
    account: &AccountKeyPair,
    request: &SogsRequest<'_>,
    network_time_ms: u64,
    nonce: &[u8; SOGS_NONCE_SIZE],
) -> SogsAuthHeaders {
    let timestamp = network_time_ms / 1000;
    let signable = signable_bytes(request, nonce, timestamp);

    let (pubkey, signature) = if request.blinded {
        let values = derive_blinding_values(request.server_public_key, account);
        (values.blinded_id(), blinded_sign(&signable, account, &values))
    } else {
        (account.unblinded_id(), plain_sign(&signable, account))
    };

    SogsAuthHeaders {
        pubkey,
        timestamp,
        nonce: STANDARD.encode(nonce),
        signature: STANDARD.encode(signature),
    }
}

/// The exact bytes covered by the signature.
pub fn signable_bytes(
    request: &SogsRequest<'_>,
    nonce: &[u8; SOGS_NONCE_SIZE],
    timestamp: u64,
) -> Vec<u8> {
    let timestamp = timestamp.to_string();
    let mut out = Vec::with_capacity(
        32 + SOGS_NONCE_SIZE + timestamp.len() + request.method.len() + request.endpoint.len() + 64,
    );
    out.extend_from_slice(request.server_public_key);
    out.extend_from_slice(nonce);
    out.extend_from_slice(timestamp.as_bytes());
    out.extend_from_slice(request.method.as_bytes());
    out.extend_from_slice(request.endpoint.as_bytes());
    if let Some(body) = request.body {
        out.extend_from_slice(&blake2b_512(body));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use onyx_crypto::{derive_blinded_id, verify_signature};

    const SERVER: [u8; 32] = [0x16; 32];
    const NONCE: [u8; SOGS_NONCE_SIZE] = [7; SOGS_NONCE_SIZE];

    fn request(blinded: bool, body: Option<&'static [u8]>) -> SogsRequest<'static> {
        SogsRequest {
            server_public_key: &SERVER,
            method: "POST",
            endpoint: "/room/lokinet/message",
            body,
            blinded,
        }
    }

    fn decode_signature(headers: &SogsAuthHeaders) -> Vec<u8> {
        STANDARD.decode(&headers.signature).unwrap()
    }

    #[test]
    fn test_unblinded_headers() {
        let account = AccountKeyPair::generate();
        let req = request(false, None);
        let headers = sign_request_with_nonce(&account, &req, 1_700_000_000_999, &NONCE);

        assert_eq!(headers.pubkey, account.unblinded_id());
        assert!(headers.pubkey.starts_with("00"));
        assert_eq!(headers.timestamp, 1_700_000_000);
        assert_eq!(STANDARD.decode(&headers.nonce).unwrap(), NONCE);

        let signable = signable_bytes(&req, &NONCE, headers.timestamp);
        verify_signature(&account.ed25519_public(), &signable, &decode_signature(&headers))
            .unwrap();
    }

    #[test]
    fn test_blinded_headers() {
        let account = AccountKeyPair::generate();
        let req = request(true, Some(b"{\"data\":\"x\"}"));
        let headers = sign_request_with_nonce(&account, &req, 5_000, &NONCE);

        assert_eq!(headers.pubkey, derive_blinded_id(&SERVER, &account));
        assert!(headers.pubkey.starts_with("15"));

        let values = derive_blinding_values(&SERVER, &account);
        let signable = signable_bytes(&req, &NONCE, 5);
        verify_signature(values.blinded_public(), &signable, &decode_signature(&headers))
            .unwrap();
    }

    #[test]
    fn test_signable_layout() {
        let req = request(false, Some(b"body"));
        let signable = signable_bytes(&req, &NONCE, 42);

        let mut expected = SERVER.to_vec();
        expected.extend_from_slice(&NONCE);
        expected.extend_from_slice(b"42");
        expected.extend_from_slice(b"POST");
        expected.extend_from_slice(b"/room/lokinet/message");
        expected.extend_from_slice(&blake2b_512(b"body"));
        assert_eq!(signable, expected);
    }

    #[test]
    fn test_body_is_covered() {
        let account = AccountKeyPair::generate();
        let with_body = request(false, Some(b"a"));
        let headers = sign_request_with_nonce(&account, &with_body, 1_000, &NONCE);

        let other = signable_bytes(&request(false, Some(b"b")), &NONCE, 1);
        assert!(
            verify_signature(&account.ed25519_public(), &other, &decode_signature(&headers))
                .is_err()
        );
    }

    #[test]
    fn test_random_nonce_per_call() {
        let account = AccountKeyPair::generate();
        let req = request(false, None);
        let a = sign_request(&account, &req, 1_000);
        let b = sign_request(&account, &req, 1_000);
        assert_ne!(a.nonce, b.nonce);
        assert_eq!(STANDARD.decode(&a.nonce).unwrap().len(), SOGS_NONCE_SIZE);
    }

    #[test]
    fn test_to_headers() {
        let account = AccountKeyPair::generate();
        let headers = sign_request_with_nonce(&account, &request(false, None), 9_000, &NONCE)
            .to_headers();
        assert_eq!(headers.len(), 4);
        assert_eq!(headers[HEADER_TIMESTAMP], "9");
        assert!(headers.contains_key(HEADER_PUBKEY));
        assert!(headers.contains_key(HEADER_NONCE));
        assert!(headers.contains_key(HEADER_SIGNATURE));
    }
}
