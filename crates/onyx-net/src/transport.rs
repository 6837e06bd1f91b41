//! HTTP transport to the guard relay.
//!
//! The guard is contacted over HTTPS with its self-signed certificate
//! accepted; the onion layers carry the actual confidentiality. The
//! transport only moves bytes: status interpretation happens in
//! [`crate::response`].

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::{ACCEPT_LANGUAGE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, Instrument};

use onyx_protocol::limits::{ONION_ACCEPT_LANGUAGE, ONION_REQUEST_PATH, ONION_USER_AGENT};
use onyx_protocol::Snode;

use crate::config::duration_millis;
use crate::error::{OnionError, Result};

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Default per-attempt timeout for the guard request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(25);

/// Status a guard uses when it could not reach the next hop.
pub const STATUS_BAD_GATEWAY: u16 = 502;

/// Raw answer from the guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Body as text. Binary bodies read as empty.
    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).unwrap_or_default()
    }

    /// Whether the guard reported `502 Bad Gateway`.
    pub fn is_bad_gateway(&self) -> bool {
        self.status == STATUS_BAD_GATEWAY
    }
}

/// Sends an onion payload to a guard relay.
///
/// This trait uses boxed futures instead of async fn so it can be used
/// as `dyn OnionTransport`.
pub trait OnionTransport: Send + Sync {
    /// POST `payload` to the guard's onion endpoint.
    ///
    /// Returns [`OnionError::NetworkUnreachable`] when the local network is
    /// down and [`OnionError::Transport`] for any other failure.
    fn post<'a>(&'a self, guard: &'a Snode, payload: Vec<u8>)
        -> BoxFuture<'a, Result<TransportResponse>>;
}

/// Settings for [`ReqwestTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Timeout for one guard request.
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    /// `User-Agent` header.
    pub user_agent: String,
    /// `Accept-Language` header.
    pub accept_language: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: ONION_USER_AGENT.to_string(),
            accept_language: ONION_ACCEPT_LANGUAGE.to_string(),
        }
    }
}

impl TransportConfig {
    /// Set the per-attempt timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the `User-Agent` header.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// [`OnionTransport`] over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl ReqwestTransport {
    /// Build the HTTP client.
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| OnionError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Onion endpoint of a guard.
    pub fn guard_url(guard: &Snode) -> String {
        format!("https://{}:{}{}", guard.ip, guard.port, ONION_REQUEST_PATH)
    }
}

impl OnionTransport for ReqwestTransport {
    fn post<'a>(
        &'a self,
        guard: &'a Snode,
        payload: Vec<u8>,
    ) -> BoxFuture<'a, Result<TransportResponse>> {
        let span = debug_span!("guard_post", guard = %guard.ed25519_str(), len = payload.len());
        Box::pin(
            async move {
                let response = self
                    .client
                    .post(Self::guard_url(guard))
                    .header(USER_AGENT, &self.config.user_agent)
                    .header(ACCEPT_LANGUAGE, &self.config.accept_language)
                    .body(payload)
                    .send()
                    .await
                    .map_err(map_reqwest_error)?;

                let status = response.status().as_u16();
                let body = response.bytes().await.map_err(map_reqwest_error)?;
                debug!(status, len = body.len(), "guard responded");
                Ok(TransportResponse::new(status, body.to_vec()))
            }
            .instrument(span),
        )
    }
}

fn map_reqwest_error(error: reqwest::Error) -> OnionError {
    if is_network_unreachable(&error) {
        OnionError::NetworkUnreachable
    } else if error.is_timeout() {
        OnionError::Transport(format!("request timed out: {}", error))
    } else {
        OnionError::Transport(error.to_string())
    }
}

fn is_network_unreachable(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if let Some(io_error) = err.downcast_ref::<io::Error>() {
            if io_error.kind() == io::ErrorKind::NetworkUnreachable {
                return true;
            }
        }
        current = err.source();
    }
    false
}
