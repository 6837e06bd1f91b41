//! Wiring of the transport, stores and server client.

use std::sync::Arc;

use tracing::info;

use onyx_net::{
    FailureRegistry, MemoryRelayPool, MemorySwarmTable, OnionClient, OnionTransport,
    ReqwestTransport, RelayPool, SwarmTable,
};
use onyx_protocol::{OnionPath, Snode};
use onyx_store::{KnownBlindedKeys, MemorySettingsStore, SettingsStore, SledSettingsStore};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::identity::IdentityProvider;
use crate::sogs::SogsClient;
use crate::time::NetworkTime;

/// A ready-to-use client: onion transport, relay state and caches.
#[derive(Debug)]
pub struct OnyxClient {
    config: ClientConfig,
    sogs: SogsClient,
    failures: Arc<FailureRegistry>,
}

impl OnyxClient {
    /// Open a client over HTTPS with the given relays and paths.
    ///
    /// The settings store is opened per the storage configuration and the
    /// blinded id cache is loaded from it.
    pub fn open(
        config: ClientConfig,
        identity: Arc<dyn IdentityProvider>,
        relays: Vec<Snode>,
        paths: Vec<OnionPath>,
    ) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(config.network.transport_config())?);
        Self::with_parts(
            config,
            identity,
            transport,
            Arc::new(MemoryRelayPool::new(relays, paths)),
            Arc::new(MemorySwarmTable::new()),
        )
    }

    /// Build a client from explicit parts.
    pub fn with_parts(
        config: ClientConfig,
        identity: Arc<dyn IdentityProvider>,
        transport: Arc<dyn OnionTransport>,
        pool: Arc<dyn RelayPool>,
        swarms: Arc<dyn SwarmTable>,
    ) -> Result<Self> {
        config.validate()?;

        let store: Arc<dyn SettingsStore> = if config.storage.in_memory {
            Arc::new(MemorySettingsStore::new())
        } else {
            Arc::new(SledSettingsStore::open(&config.storage.data_dir)?)
        };
        let blinded_keys = Arc::new(KnownBlindedKeys::new(store));
        blinded_keys.load()?;

        let failures = Arc::new(FailureRegistry::new());
        let onion = Arc::new(OnionClient::with_failure_registry(
            config.network.onion_config(),
            transport,
            pool,
            swarms,
            Arc::clone(&failures),
        ));
        let sogs = SogsClient::new(
            &config,
            onion,
            identity,
            Arc::new(NetworkTime::new()),
            blinded_keys,
        );

        info!(
            in_memory = config.storage.in_memory,
            data_dir = %config.storage.data_dir.display(),
            "onyx client ready"
        );
        Ok(Self {
            config,
            sogs,
            failures,
        })
    }

    /// The configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Community, file and push server requests.
    pub fn sogs(&self) -> &SogsClient {
        &self.sogs
    }

    /// Relay and path failure counters.
    pub fn failures(&self) -> &Arc<FailureRegistry> {
        &self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use onyx_crypto::AccountKeyPair;

    #[test]
    fn test_open_in_memory() {
        let identity = Arc::new(StaticIdentity::new(AccountKeyPair::generate()));
        let client = OnyxClient::open(ClientConfig::in_memory(), identity, Vec::new(), Vec::new())
            .unwrap();
        assert!(client.sogs().blinded_keys().is_loaded());
        assert!(client.config().storage.in_memory);
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::builder()
            .with_data_dir(dir.path().join("settings"))
            .build();
        let identity = Arc::new(StaticIdentity::empty());
        let client = OnyxClient::open(config, identity, Vec::new(), Vec::new()).unwrap();
        assert!(client.sogs().blinded_keys().snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ClientConfig::builder().with_retry_attempts(0).build();
        let identity = Arc::new(StaticIdentity::empty());
        assert!(OnyxClient::open(config, identity, Vec::new(), Vec::new()).is_err());
    }
}
