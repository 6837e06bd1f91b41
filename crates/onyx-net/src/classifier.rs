//! Failure classification and relay ejection.
//!
//! An onion response can fail at two layers. A path-layer failure is the
//! guard's own HTTP status, returned unencrypted when some relay on the
//! way could not forward the request. A destination-layer failure is the
//! status inside the decrypted body. Each maps to an [`OnionError`] and,
//! as a side effect, updates the failure counters, the relay pool and the
//! swarm table.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use onyx_crypto::short_key;
use onyx_protocol::limits::{
    NODE_NOT_FOUND_PREFIX, OXEN_SERVER_ERROR, PATH_FAILURE_THRESHOLD, SNODE_FAILURE_THRESHOLD,
    STATUS_NO_STATUS,
};
use onyx_protocol::Snode;

use crate::error::{OnionError, Result};
use crate::failure::FailureRegistry;
use crate::pool::{RelayPool, SwarmTable};

#[derive(Debug, Deserialize)]
struct InvalidSwarmBody {
    #[serde(default)]
    snodes: Vec<Snode>,
}

fn is_clock_error(status: u16) -> bool {
    status == 406 || status == 425
}

/// Turns failed responses into errors and ejects misbehaving relays.
pub struct Classifier {
    failures: Arc<FailureRegistry>,
    pool: Arc<dyn RelayPool>,
    swarms: Arc<dyn SwarmTable>,
    snode_threshold: u32,
    path_threshold: u32,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("snode_threshold", &self.snode_threshold)
            .field("path_threshold", &self.path_threshold)
            .finish_non_exhaustive()
    }
}

impl Classifier {
    /// Create a classifier with the default thresholds.
    pub fn new(
        failures: Arc<FailureRegistry>,
        pool: Arc<dyn RelayPool>,
        swarms: Arc<dyn SwarmTable>,
    ) -> Self {
        Self {
            failures,
            pool,
            swarms,
            snode_threshold: SNODE_FAILURE_THRESHOLD,
            path_threshold: PATH_FAILURE_THRESHOLD,
        }
    }

    /// Override the ejection thresholds.
    pub fn with_thresholds(mut self, snode: u32, path: u32) -> Self {
        self.snode_threshold = snode;
        self.path_threshold = path;
        self
    }

    /// The failure counters.
    pub fn failures(&self) -> &Arc<FailureRegistry> {
        &self.failures
    }

    /// Check the guard's HTTP status.
    ///
    /// `destination` is the relay the request was for, if any; it is only
    /// used for 421 handling.
    pub async fn check_path_status(
        &self,
        status: u16,
        body: &str,
        guard: &str,
        destination: Option<&str>,
        associated_with: Option<&str>,
    ) -> Result<()> {
        if status == 200 {
            return Ok(());
        }
        warn!(status, guard = %short_key(guard), "onion request failed on path");

        if is_clock_error(status) {
            return Err(OnionError::ClockOutOfSync);
        }
        if status == 421 {
            return Err(self.handle_invalid_swarm(body, destination, associated_with).await);
        }
        if status == 404 || status == 400 {
            warn!(status, "probably a dead server; skipping bad path update");
            return Err(OnionError::PathFault { status });
        }

        match body.strip_prefix(NODE_NOT_FOUND_PREFIX) {
            Some(missing) => self.handle_node_not_found(missing, associated_with).await,
            None => self.increment_bad_path_count_or_drop(guard).await,
        }

        if body == OXEN_SERVER_ERROR {
            warn!("destination server is failing");
            return Err(OnionError::ServerError);
        }
        Err(OnionError::PathFault { status })
    }

    /// Record a guard request that produced no response at all.
    pub async fn transport_failed(&self, guard: &str) -> OnionError {
        self.increment_bad_path_count_or_drop(guard).await;
        OnionError::PathFault {
            status: STATUS_NO_STATUS,
        }
    }

    /// Check the status embedded in a decrypted relay response.
    ///
    /// A 200 from a relay clears its failure count. Non-200 statuses not
    /// covered below (400 from a relay, anything from a server) are left
    /// for the caller.
    pub async fn check_destination_status(
        &self,
        status: u16,
        body: &str,
        destination: Option<&str>,
        associated_with: Option<&str>,
    ) -> Result<()> {
        if status == 200 {
            if let Some(destination) = destination {
                self.failures.reset_snode(destination).await;
            }
            return Ok(());
        }
        info!(status, "destination returned an error");

        if is_clock_error(status) {
            return Err(OnionError::ClockOutOfSync);
        }
        if body == OXEN_SERVER_ERROR {
            warn!("destination server is failing");
            return Err(OnionError::ServerError);
        }
        if status == 421 {
            return Err(self.handle_invalid_swarm(body, destination, associated_with).await);
        }

        let Some(destination) = destination else {
            return Ok(());
        };
        if status == 400 {
            return Ok(());
        }

        if let Some(missing) = body.strip_prefix(NODE_NOT_FOUND_PREFIX) {
            self.handle_node_not_found(missing, associated_with).await;
            return Err(OnionError::NodeNotFound {
                ed25519: missing.to_string(),
                status,
            });
        }

        self.increment_bad_snode_count_or_drop(destination, associated_with)
            .await;
        Err(OnionError::RelayFault {
            ed25519: destination.to_string(),
            status,
        })
    }

    async fn handle_invalid_swarm(
        &self,
        body: &str,
        destination: Option<&str>,
        associated_with: Option<&str>,
    ) -> OnionError {
        let (Some(destination), Some(associated_with)) = (destination, associated_with) else {
            return OnionError::InvalidSwarmContext(
                "no destination relay or associated key".to_string(),
            );
        };
        info!(pubkey = %short_key(associated_with), "invalidating swarm");

        match serde_json::from_str::<InvalidSwarmBody>(body) {
            Ok(parsed) if !parsed.snodes.is_empty() => {
                warn!(
                    pubkey = %short_key(associated_with),
                    snodes = ?parsed.snodes.iter().map(Snode::ed25519_str).collect::<Vec<_>>(),
                    "wrong swarm, updating"
                );
                self.swarms.update_swarm(associated_with, parsed.snodes).await;
                return OnionError::SwarmInvalid;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "could not parse 421 body; dropping relay from swarm");
            }
        }

        self.swarms
            .drop_relay_from_swarm(associated_with, destination)
            .await;
        self.increment_bad_snode_count_or_drop(destination, Some(associated_with))
            .await;
        OnionError::SwarmInvalid
    }

    /// Forget a relay that another relay could not find.
    pub async fn handle_node_not_found(&self, ed25519: &str, associated_with: Option<&str>) {
        warn!(relay = %short_key(ed25519), "handling node not found");
        if let Some(pubkey) = associated_with {
            self.swarms.drop_relay_from_swarm(pubkey, ed25519).await;
        }
        self.pool.drop_relay(ed25519).await;
        self.failures.reset_snode(ed25519).await;
        self.pool.drop_relay_from_path(ed25519).await;
    }

    /// Count a relay failure, dropping the relay once it reaches the threshold.
    pub async fn increment_bad_snode_count_or_drop(
        &self,
        ed25519: &str,
        associated_with: Option<&str>,
    ) {
        let count = self.failures.increment_snode(ed25519).await;
        if count < self.snode_threshold {
            warn!(relay = %short_key(ed25519), count, "relay failed");
            return;
        }

        warn!(relay = %short_key(ed25519), count, "failure threshold reached; dropping relay");
        if let Some(pubkey) = associated_with {
            self.swarms.drop_relay_from_swarm(pubkey, ed25519).await;
        }
        self.pool.drop_relay(ed25519).await;
        self.failures.reset_snode(ed25519).await;
        self.pool.drop_relay_from_path(ed25519).await;
    }

    /// Count a failure of the path containing `ed25519`.
    ///
    /// Every non-guard hop gets a relay failure. At the threshold the guard
    /// is dropped together with its path. A relay in no path is counted as
    /// a plain relay failure instead.
    pub async fn increment_bad_path_count_or_drop(&self, ed25519: &str) {
        let Some(path) = self.pool.path_containing(ed25519).await else {
            info!(relay = %short_key(ed25519), "no path contains this relay");
            self.increment_bad_snode_count_or_drop(ed25519, None).await;
            return;
        };

        let guard = path.guard().pubkey_ed25519.clone();
        for hop in path.hops().iter().skip(1) {
            self.increment_bad_snode_count_or_drop(&hop.pubkey_ed25519, None)
                .await;
        }

        let count = self.failures.increment_path(&guard).await;
        if count >= self.path_threshold {
            warn!(guard = %short_key(&guard), count, "path failure threshold reached; dropping path");
            self.pool.drop_relay(&guard).await;
            self.pool.drop_path(&guard).await;
            self.failures.reset_path(&guard).await;
        } else {
            info!(guard = %short_key(&guard), count, "path failed");
        }
    }
}
