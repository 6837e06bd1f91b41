//! Retrying onion request client.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use onyx_crypto::X25519PublicKey;
use onyx_protocol::{
    build_onion_payload, snode_destination_payload, DestinationRequest, FinalRelayTarget, Headers,
    OnionDestination, OnionPath, OnionPayload, Snode, V4Response,
};

use crate::classifier::Classifier;
use crate::config::OnionConfig;
use crate::error::{OnionError, Result};
use crate::failure::FailureRegistry;
use crate::pool::{RelayPool, SwarmTable};
use crate::response::{process_snode_response, process_v4_response, SnodeResponse};
use crate::transport::{OnionTransport, TransportResponse};

/// `ip:port` list of a path, for logs.
pub fn path_string(path: &OnionPath) -> String {
    path.hops()
        .iter()
        .map(|s| format!("{}:{}", s.ip, s.port))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Endpoint part of a URL: path plus query.
pub fn endpoint_of(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

/// Sends requests through onion paths, retrying on a fresh path when a
/// failure is recoverable.
pub struct OnionClient {
    config: OnionConfig,
    transport: Arc<dyn OnionTransport>,
    pool: Arc<dyn RelayPool>,
    classifier: Classifier,
}

impl std::fmt::Debug for OnionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnionClient")
            .field("config", &self.config)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

impl OnionClient {
    /// Create a client with a fresh failure registry.
    pub fn new(
        config: OnionConfig,
        transport: Arc<dyn OnionTransport>,
        pool: Arc<dyn RelayPool>,
        swarms: Arc<dyn SwarmTable>,
    ) -> Self {
        Self::with_failure_registry(
            config,
            transport,
            pool,
            swarms,
            Arc::new(FailureRegistry::new()),
        )
    }

    /// Create a client sharing an existing failure registry.
    pub fn with_failure_registry(
        config: OnionConfig,
        transport: Arc<dyn OnionTransport>,
        pool: Arc<dyn RelayPool>,
        swarms: Arc<dyn SwarmTable>,
        failures: Arc<FailureRegistry>,
    ) -> Self {
        let classifier = Classifier::new(failures, Arc::clone(&pool), swarms)
            .with_thresholds(config.snode_failure_threshold, config.path_failure_threshold);
        Self {
            config,
            transport,
            pool,
            classifier,
        }
    }

    /// Client settings.
    pub fn config(&self) -> &OnionConfig {
        &self.config
    }

    /// The failure counters.
    pub fn failures(&self) -> &Arc<FailureRegistry> {
        self.classifier.failures()
    }

    /// Send `body` to the relay `target`.
    ///
    /// Each attempt uses a path that does not contain `target`.
    /// `associated_with` is the account whose swarm `target` belongs to,
    /// if any; a 421 updates that swarm.
    #[instrument(skip_all, fields(target = %target.ed25519_str()))]
    pub async fn send_to_snode(
        &self,
        target: &Snode,
        body: &str,
        headers: &Headers,
        associated_with: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SnodeResponse> {
        let payload = snode_destination_payload(body, headers)?;
        let destination = OnionDestination::Snode(target.clone());

        self.config
            .snode_retry
            .run("send_to_snode", cancel, |attempt| {
                let payload = payload.clone();
                let destination = destination.clone();
                async move {
                    let path = self.pool.pick_path(Some(&target.pubkey_ed25519)).await?;
                    debug!(attempt, path = %path_string(&path), "sending onion request to relay");

                    let onion = self.layer(path.clone(), destination, payload).await?;
                    let response = self.post(&path, onion.guard_payload, cancel).await?;
                    if cancel.is_cancelled() {
                        return Err(OnionError::Cancelled);
                    }
                    process_snode_response(
                        &self.classifier,
                        response,
                        &onion.destination_key,
                        path.guard(),
                        target,
                        associated_with,
                    )
                    .await
                }
            })
            .await
    }

    /// Send a V4 request to the server at `url`.
    ///
    /// The last relay of the path forwards it to the URL's host; an `http`
    /// URL forces plain HTTP on that final hop.
    #[instrument(skip_all, fields(url = %url, method = method))]
    pub async fn send_to_non_snode(
        &self,
        destination_x25519: &X25519PublicKey,
        url: &Url,
        method: &str,
        headers: &Headers,
        body: Option<&[u8]>,
        cancel: &CancellationToken,
    ) -> Result<V4Response> {
        let target = FinalRelayTarget::from_url(url)?;
        let is_file_server = target.host == self.config.file_server_host;

        let mut request = DestinationRequest::new(method, endpoint_of(url)).with_headers(headers.clone());
        if let Some(body) = body {
            request = request.with_body(body);
        }
        let payload = request.encode()?;
        let destination = OnionDestination::Server {
            x25519: *destination_x25519,
            target,
        };

        self.config
            .non_snode_retry
            .run("send_to_non_snode", cancel, |attempt| {
                let payload = payload.clone();
                let destination = destination.clone();
                async move {
                    let path = self.pool.pick_path(None).await?;
                    debug!(attempt, path = %path_string(&path), "sending onion request to server");

                    let onion = self.layer(path.clone(), destination, payload).await?;
                    let response = self.post(&path, onion.guard_payload, cancel).await?;
                    if !is_file_server && response.is_bad_gateway() {
                        warn!("server is not responding");
                        return Err(OnionError::NetworkUnreachable);
                    }
                    if cancel.is_cancelled() {
                        return Err(OnionError::Cancelled);
                    }
                    process_v4_response(&self.classifier, response, &onion.destination_key, path.guard())
                        .await
                }
            })
            .await
    }

    async fn layer(
        &self,
        path: OnionPath,
        destination: OnionDestination,
        payload: Vec<u8>,
    ) -> Result<OnionPayload> {
        tokio::task::spawn_blocking(move || build_onion_payload(&path, &destination, &payload))
            .await
            .map_err(|e| OnionError::Internal(format!("layering task failed: {}", e)))?
            .map_err(OnionError::from)
    }

    /// POST to the guard. A failed request counts against the path, except
    /// when it was cancelled or the network is down.
    async fn post(
        &self,
        path: &OnionPath,
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<TransportResponse> {
        let guard = path.guard();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(OnionError::Cancelled),
            result = self.transport.post(guard, payload) => result,
        };
        match result {
            Ok(response) => Ok(response),
            Err(e @ (OnionError::NetworkUnreachable | OnionError::Cancelled)) => Err(e),
            Err(e) => {
                warn!(guard = %guard.ed25519_str(), error = %e, "guard request failed");
                Err(self.classifier.transport_failed(&guard.pubkey_ed25519).await)
            }
        }
    }
}
