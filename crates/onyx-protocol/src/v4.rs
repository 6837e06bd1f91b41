//! V4 request/response framing.
//!
//! A frame is a bencode-like two element list:
//!
//! ```text
//! l <len(meta)> : <meta json> [ <len(body)> : <body> ] e
//! ```
//!
//! Lengths are decimal byte counts. Request meta is
//! `{"endpoint", "headers", "method"}`; response meta is `{code, headers}`.
//! The response body is interpreted according to the `content-type`
//! header of the meta.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{ProtocolError, Result};
use crate::limits::STATUS_NO_STATUS;

/// HTTP-style header map. Sorted so encoded meta is stable.
pub type Headers = BTreeMap<String, String>;

const FRAME_START: u8 = b'l';
const FRAME_END: u8 = b'e';
const LENGTH_DELIMITER: u8 = b':';

/// A request carried to a non-relay destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationRequest {
    /// HTTP method, upper case.
    pub method: String,
    /// Path and query on the destination server.
    pub endpoint: String,
    /// Headers forwarded to the destination.
    pub headers: Headers,
    /// Optional body.
    pub body: Option<Vec<u8>>,
}

impl DestinationRequest {
    /// Request without a body.
    pub fn new(method: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            endpoint: endpoint.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Set the headers.
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Encode as a V4 frame.
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_v4_request(self)
    }
}

/// Field order here is the wire order.
#[derive(Serialize)]
struct RequestMeta<'a> {
    endpoint: &'a str,
    headers: &'a Headers,
    method: &'a str,
}

/// Decoded body of a V4 response.
#[derive(Debug, Clone, PartialEq)]
pub enum V4Body {
    /// No body part in the frame.
    None,
    /// `application/json`.
    Json(Value),
    /// `text/plain`.
    PlainText(String),
    /// `text/html`; usually an error page from a proxy.
    Html(String),
    /// `application/octet-stream` or an unknown content type.
    Bytes(Vec<u8>),
}

impl V4Body {
    /// JSON view of the body. Plain text is wrapped as `{"plainText": ...}`.
    pub fn as_json(&self) -> Option<Value> {
        match self {
            V4Body::Json(value) => Some(value.clone()),
            V4Body::PlainText(text) => Some(serde_json::json!({ "plainText": text })),
            V4Body::None | V4Body::Html(_) | V4Body::Bytes(_) => None,
        }
    }
}

/// A decoded V4 response.
#[derive(Debug, Clone, PartialEq)]
pub struct V4Response {
    /// Parsed meta object.
    pub meta: Value,
    /// Body interpreted by content type.
    pub body: V4Body,
    /// Raw body bytes, if the frame had a body part.
    pub body_binary: Option<Vec<u8>>,
}

impl V4Response {
    /// `meta.code`, or [`STATUS_NO_STATUS`] if absent.
    pub fn status_code(&self) -> u16 {
        self.meta
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|code| u16::try_from(code).ok())
            .unwrap_or(STATUS_NO_STATUS)
    }

    /// Lower-cased `content-type` from the meta headers.
    pub fn content_type(&self) -> Option<String> {
        content_type_of(&self.meta)
    }
}

/// Encode raw meta bytes and an optional body into a frame.
pub fn encode_v4(meta: &[u8], body: Option<&[u8]>) -> Vec<u8> {
    let mut out = Vec::with_capacity(meta.len() + body.map_or(0, <[u8]>::len) + 32);
    out.push(FRAME_START);
    push_part(&mut out, meta);
    if let Some(body) = body {
        push_part(&mut out, body);
    }
    out.push(FRAME_END);
    out
}

fn push_part(out: &mut Vec<u8>, part: &[u8]) {
    out.extend_from_slice(part.len().to_string().as_bytes());
    out.push(LENGTH_DELIMITER);
    out.extend_from_slice(part);
}

/// Encode a request frame with meta `{"endpoint","headers","method"}`.
pub fn encode_v4_request(request: &DestinationRequest) -> Result<Vec<u8>> {
    let meta = serde_json::to_vec(&RequestMeta {
        endpoint: &request.endpoint,
        headers: &request.headers,
        method: &request.method,
    })?;
    Ok(encode_v4(&meta, request.body.as_deref()))
}

/// Encode a response frame. Used by relays and test servers.
pub fn encode_v4_response(code: u16, headers: &Headers, body: Option<&[u8]>) -> Result<Vec<u8>> {
    #[derive(Serialize)]
    struct ResponseMeta<'a> {
        code: u16,
        headers: &'a Headers,
    }
    let meta = serde_json::to_vec(&ResponseMeta { code, headers })?;
    Ok(encode_v4(&meta, body))
}

/// Split a frame into its meta and optional body parts.
///
/// # Errors
///
/// Returns `Framing` if the frame is not delimited by `l`/`e`, a length
/// prefix is malformed, or a declared length does not match the data.
pub fn split_v4(data: &[u8]) -> Result<(&[u8], Option<&[u8]>)> {
    if data.len() < 2 || data[0] != FRAME_START || data[data.len() - 1] != FRAME_END {
        return Err(ProtocolError::framing(
            "frame must start with 'l' and end with 'e'",
        ));
    }
    let end = data.len() - 1;
    let mut pos = 1;

    let meta_len = read_length(data, &mut pos, end)?;
    let meta_end = pos
        .checked_add(meta_len)
        .filter(|meta_end| *meta_end <= end)
        .ok_or_else(|| ProtocolError::framing("meta length exceeds frame"))?;
    let meta = &data[pos..meta_end];
    pos = meta_end;

    if pos == end {
        return Ok((meta, None));
    }

    let body_len = read_length(data, &mut pos, end)?;
    if pos.checked_add(body_len) != Some(end) {
        return Err(ProtocolError::framing(format!(
            "body length mismatch: declared {}, actual {}",
            body_len,
            end - pos
        )));
    }
    Ok((meta, Some(&data[pos..end])))
}

fn read_length(data: &[u8], pos: &mut usize, end: usize) -> Result<usize> {
    let start = *pos;
    while *pos < end && data[*pos].is_ascii_digit() {
        *pos += 1;
    }
    if *pos == start || *pos >= end || data[*pos] != LENGTH_DELIMITER {
        return Err(ProtocolError::framing("malformed length prefix"));
    }
    let len = std::str::from_utf8(&data[start..*pos])
        .ok()
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(|| ProtocolError::framing("length prefix out of range"))?;
    *pos += 1;
    Ok(len)
}

/// Decode a request frame back into a [`DestinationRequest`].
pub fn decode_v4_request(data: &[u8]) -> Result<DestinationRequest> {
    #[derive(Deserialize)]
    struct OwnedRequestMeta {
        endpoint: String,
        #[serde(default)]
        headers: Headers,
        method: String,
    }
    let (meta, body) = split_v4(data)?;
    let meta: OwnedRequestMeta = serde_json::from_slice(meta)
        .map_err(|e| ProtocolError::framing(format!("invalid request meta: {e}")))?;
    Ok(DestinationRequest {
        method: meta.method,
        endpoint: meta.endpoint,
        headers: meta.headers,
        body: body.map(<[u8]>::to_vec),
    })
}

/// Decode a response frame and interpret its body.
pub fn decode_v4_response(data: &[u8]) -> Result<V4Response> {
    let (meta, body) = split_v4(data)?;
    let meta: Value = serde_json::from_slice(meta)
        .map_err(|e| ProtocolError::framing(format!("invalid response meta: {e}")))?;
    if !meta.is_object() {
        return Err(ProtocolError::framing("response meta is not an object"));
    }

    let decoded = match body {
        None => V4Body::None,
        Some(body) => interpret_body(content_type_of(&meta).as_deref(), body)?,
    };

    Ok(V4Response {
        meta,
        body: decoded,
        body_binary: body.map(<[u8]>::to_vec),
    })
}

fn content_type_of(meta: &Value) -> Option<String> {
    meta.get("headers")?
        .as_object()?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
        .and_then(|(_, value)| value.as_str())
        .map(str::to_ascii_lowercase)
}

fn interpret_body(content_type: Option<&str>, body: &[u8]) -> Result<V4Body> {
    match content_type {
        Some(ct) if ct.starts_with("application/json") => serde_json::from_slice(body)
            .map(V4Body::Json)
            .map_err(|e| ProtocolError::framing(format!("invalid JSON body: {e}"))),
        Some(ct) if ct.starts_with("text/plain") => {
            Ok(V4Body::PlainText(String::from_utf8_lossy(body).into_owned()))
        }
        Some(ct) if ct.starts_with("application/octet-stream") => Ok(V4Body::Bytes(body.to_vec())),
        Some(ct) if ct.starts_with("text/html") => {
            warn!(content_type = ct, "html body in V4 response");
            Ok(V4Body::Html(String::from_utf8_lossy(body).into_owned()))
        }
        other => {
            warn!(content_type = ?other, "unrecognized content type in V4 response");
            Ok(V4Body::Bytes(body.to_vec()))
        }
    }
}
