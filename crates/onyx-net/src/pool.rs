//! Relay pool, onion paths and swarms.
//!
//! The client only consumes these through the [`RelayPool`] and
//! [`SwarmTable`] traits. The in-memory implementations here back tests
//! and clients that manage their own relay list.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use onyx_crypto::short_key;
use onyx_protocol::{OnionPath, Snode};

use crate::error::{OnionError, Result};
use crate::transport::BoxFuture;

/// Source of onion paths and the set of known relays.
pub trait RelayPool: Send + Sync {
    /// Pick a path that does not contain `exclude`.
    fn pick_path<'a>(&'a self, exclude: Option<&'a str>) -> BoxFuture<'a, Result<OnionPath>>;

    /// Forget a relay entirely.
    fn drop_relay<'a>(&'a self, ed25519: &'a str) -> BoxFuture<'a, ()>;

    /// Replace a relay in whichever path holds it.
    fn drop_relay_from_path<'a>(&'a self, ed25519: &'a str) -> BoxFuture<'a, ()>;

    /// Drop the path starting at `guard`.
    fn drop_path<'a>(&'a self, guard: &'a str) -> BoxFuture<'a, ()>;

    /// The path containing a relay, if any.
    fn path_containing<'a>(&'a self, ed25519: &'a str) -> BoxFuture<'a, Option<OnionPath>>;
}

/// Which relays store the messages of each account.
pub trait SwarmTable: Send + Sync {
    /// Replace the swarm of `pubkey`.
    fn update_swarm<'a>(&'a self, pubkey: &'a str, snodes: Vec<Snode>) -> BoxFuture<'a, ()>;

    /// Remove one relay from the swarm of `pubkey`.
    fn drop_relay_from_swarm<'a>(&'a self, pubkey: &'a str, ed25519: &'a str)
        -> BoxFuture<'a, ()>;
}

#[derive(Debug, Default)]
struct PoolState {
    relays: Vec<Snode>,
    paths: Vec<OnionPath>,
}

impl PoolState {
    fn in_any_path(&self, ed25519: &str) -> bool {
        self.paths.iter().any(|path| path.contains(ed25519))
    }

    fn random_spare(&self, excluded: &str) -> Option<Snode> {
        let spares: Vec<&Snode> = self
            .relays
            .iter()
            .filter(|s| s.pubkey_ed25519 != excluded && !self.in_any_path(&s.pubkey_ed25519))
            .collect();
        spares.choose(&mut rand::thread_rng()).map(|s| (*s).clone())
    }
}

/// In-memory [`RelayPool`].
#[derive(Debug, Default)]
pub struct MemoryRelayPool {
    state: Mutex<PoolState>,
}

impl MemoryRelayPool {
    /// Create a pool from known relays and prebuilt paths.
    pub fn new(relays: Vec<Snode>, paths: Vec<OnionPath>) -> Self {
        Self {
            state: Mutex::new(PoolState { relays, paths }),
        }
    }

    /// Snapshot of the known relays.
    pub async fn relays(&self) -> Vec<Snode> {
        self.state.lock().await.relays.clone()
    }

    /// Snapshot of the current paths.
    pub async fn paths(&self) -> Vec<OnionPath> {
        self.state.lock().await.paths.clone()
    }

    /// Whether a relay is still known.
    pub async fn contains(&self, ed25519: &str) -> bool {
        self.state
            .lock()
            .await
            .relays
            .iter()
            .any(|s| s.pubkey_ed25519 == ed25519)
    }

    /// Add a path.
    pub async fn add_path(&self, path: OnionPath) {
        self.state.lock().await.paths.push(path);
    }
}

impl RelayPool for MemoryRelayPool {
    fn pick_path<'a>(&'a self, exclude: Option<&'a str>) -> BoxFuture<'a, Result<OnionPath>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            let candidates: Vec<&OnionPath> = state
                .paths
                .iter()
                .filter(|path| exclude.map_or(true, |ed| !path.contains(ed)))
                .collect();
            candidates
                .choose(&mut rand::thread_rng())
                .map(|path| (*path).clone())
                .ok_or(OnionError::NoPath)
        })
    }

    fn drop_relay<'a>(&'a self, ed25519: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let before = state.relays.len();
            state.relays.retain(|s| s.pubkey_ed25519 != ed25519);
            if state.relays.len() != before {
                info!(relay = %short_key(ed25519), remaining = state.relays.len(), "dropped relay from pool");
            }
        })
    }

    fn drop_relay_from_path<'a>(&'a self, ed25519: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let Some(index) = state.paths.iter().position(|p| p.contains(ed25519)) else {
                debug!(relay = %short_key(ed25519), "relay is not in any path");
                return;
            };

            let Some(replacement) = state.random_spare(ed25519) else {
                warn!(relay = %short_key(ed25519), "no spare relay to patch path; dropping it");
                state.paths.remove(index);
                return;
            };

            let mut hops: Vec<Snode> = state.paths[index]
                .hops()
                .iter()
                .filter(|s| s.pubkey_ed25519 != ed25519)
                .cloned()
                .collect();
            info!(
                relay = %short_key(ed25519),
                replacement = %replacement.ed25519_str(),
                path = index,
                "replacing relay in path"
            );
            hops.push(replacement);
            match OnionPath::new(hops) {
                Ok(path) => state.paths[index] = path,
                Err(_) => {
                    state.paths.remove(index);
                }
            }
        })
    }

    fn drop_path<'a>(&'a self, guard: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            match state
                .paths
                .iter()
                .position(|p| p.guard().pubkey_ed25519 == guard)
            {
                Some(index) => {
                    state.paths.remove(index);
                    info!(guard = %short_key(guard), remaining = state.paths.len(), "dropped path");
                }
                None => warn!(guard = %short_key(guard), "no path starts with this guard"),
            }
        })
    }

    fn path_containing<'a>(&'a self, ed25519: &'a str) -> BoxFuture<'a, Option<OnionPath>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .paths
                .iter()
                .find(|p| p.contains(ed25519))
                .cloned()
        })
    }
}

/// In-memory [`SwarmTable`].
#[derive(Debug, Default)]
pub struct MemorySwarmTable {
    swarms: Mutex<HashMap<String, Vec<Snode>>>,
}

impl MemorySwarmTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the swarm of `pubkey`.
    pub async fn swarm(&self, pubkey: &str) -> Vec<Snode> {
        self.swarms
            .lock()
            .await
            .get(pubkey)
            .cloned()
            .unwrap_or_default()
    }
}

impl SwarmTable for MemorySwarmTable {
    fn update_swarm<'a>(&'a self, pubkey: &'a str, snodes: Vec<Snode>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            debug!(pubkey = %short_key(pubkey), size = snodes.len(), "updating swarm");
            self.swarms.lock().await.insert(pubkey.to_string(), snodes);
        })
    }

    fn drop_relay_from_swarm<'a>(
        &'a self,
        pubkey: &'a str,
        ed25519: &'a str,
    ) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            if let Some(swarm) = self.swarms.lock().await.get_mut(pubkey) {
                swarm.retain(|s| s.pubkey_ed25519 != ed25519);
            }
        })
    }
}
