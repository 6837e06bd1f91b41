//! Cache of known blinded id ↔ session id mappings.
//!
//! Matching a blinded id against contacts costs a scalar multiplication
//! per contact, so every match found is kept here and persisted as a JSON
//! array under [`KNOWN_BLINDED_KEYS_ITEM`]. The list is expected to stay
//! small.
//!
//! The cache must be loaded exactly once with [`KnownBlindedKeys::load`]
//! before any other call.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use onyx_crypto::{
    decode_hex_32, derive_blinded_id, is_blinded_id, is_non_blinded_id, short_key,
    try_match_blinded_with_standard, AccountKeyPair,
};

use crate::error::{Result, StoreError};
use crate::settings::SettingsStore;

/// Settings key of the persisted mapping list.
pub const KNOWN_BLINDED_KEYS_ITEM: &str = "knownBlindedKeys";

/// One blinded id seen on one server, and the account behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlindedIdMapping {
    /// `15`/`25` id.
    pub blinded_id: String,
    /// Server key, hex.
    pub server_public_key: String,
    /// `05` id of the account.
    pub real_session_id: String,
}

/// A conversation partner, as far as blinded matching cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    /// Session id (`05`) or blinded id (`15`/`25`).
    pub id: String,
    /// One-to-one conversation.
    pub is_private: bool,
    /// Conversation accepted by the user.
    pub is_approved: bool,
    /// Messages were exchanged.
    pub is_active: bool,
}

/// Source of contacts to probe when a blinded id is not cached.
pub trait ContactDirectory: Send + Sync {
    /// All known contacts.
    fn contacts(&self) -> Vec<Contact>;
}

/// Process-wide blinded id cache.
pub struct KnownBlindedKeys {
    store: Arc<dyn SettingsStore>,
    mappings: RwLock<Option<Vec<BlindedIdMapping>>>,
}

impl std::fmt::Debug for KnownBlindedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self
            .mappings
            .read()
            .ok()
            .and_then(|m| m.as_ref().map(Vec::len));
        f.debug_struct("KnownBlindedKeys")
            .field("mappings", &len)
            .finish_non_exhaustive()
    }
}

impl KnownBlindedKeys {
    /// Create an unloaded cache persisting to `store`.
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            mappings: RwLock::new(None),
        }
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, Option<Vec<BlindedIdMapping>>>> {
        self.mappings
            .read()
            .map_err(|_| StoreError::Database("blinded keys lock poisoned".into()))
    }

    fn write_guard(&self) -> Result<RwLockWriteGuard<'_, Option<Vec<BlindedIdMapping>>>> {
        self.mappings
            .write()
            .map_err(|_| StoreError::Database("blinded keys lock poisoned".into()))
    }

    /// Load the persisted list. A value that is not a valid list of
    /// mappings loads as empty.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyLoaded` on a second call.
    pub fn load(&self) -> Result<()> {
        let mut guard = self.write_guard()?;
        if guard.is_some() {
            return Err(StoreError::AlreadyLoaded);
        }
        let loaded = match self.store.get(KNOWN_BLINDED_KEYS_ITEM)? {
            Some(raw) if !raw.is_empty() => {
                serde_json::from_str::<Vec<BlindedIdMapping>>(&raw).unwrap_or_else(|e| {
                    error!(error = %e, "discarding unreadable known blinded keys");
                    Vec::new()
                })
            }
            _ => Vec::new(),
        };
        debug!(count = loaded.len(), "loaded known blinded keys");
        *guard = Some(loaded);
        Ok(())
    }

    /// Whether [`load`](Self::load) has run.
    pub fn is_loaded(&self) -> bool {
        self.read_guard().map(|g| g.is_some()).unwrap_or(false)
    }

    /// Copy of the current list.
    pub fn snapshot(&self) -> Result<Vec<BlindedIdMapping>> {
        let guard = self.read_guard()?;
        guard.as_ref().cloned().ok_or(StoreError::NotLoaded)
    }

    fn with_loaded<T>(&self, f: impl FnOnce(&[BlindedIdMapping]) -> T) -> Result<T> {
        let guard = self.read_guard()?;
        let mappings = guard.as_ref().ok_or(StoreError::NotLoaded)?;
        Ok(f(mappings))
    }

    fn persist(&self, mappings: &[BlindedIdMapping]) -> Result<()> {
        if mappings.is_empty() {
            return Ok(());
        }
        let json = serde_json::to_string(mappings)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.store.put(KNOWN_BLINDED_KEYS_ITEM, &json)
    }

    /// Real session id cached for `blinded_id` on a server.
    ///
    /// A non-blinded id is returned unchanged.
    pub fn get_cached_naked_key_from_blinded(
        &self,
        blinded_id: &str,
        server_public_key: &str,
    ) -> Result<Option<String>> {
        if is_non_blinded_id(blinded_id) {
            return Ok(Some(blinded_id.to_string()));
        }
        self.with_loaded(|mappings| {
            mappings
                .iter()
                .find(|m| m.server_public_key == server_public_key && m.blinded_id == blinded_id)
                .map(|m| m.real_session_id.clone())
        })
    }

    /// Like [`get_cached_naked_key_from_blinded`](Self::get_cached_naked_key_from_blinded)
    /// but on any server.
    pub fn get_cached_naked_key_from_blinded_no_server_pubkey(
        &self,
        blinded_id: &str,
    ) -> Result<Option<String>> {
        if is_non_blinded_id(blinded_id) {
            return Ok(Some(blinded_id.to_string()));
        }
        self.with_loaded(|mappings| {
            mappings
                .iter()
                .find(|m| m.blinded_id == blinded_id)
                .map(|m| m.real_session_id.clone())
        })
    }

    /// Insert or update a mapping.
    ///
    /// An existing mapping with the same real id is left alone; one with a
    /// different real id is overwritten with a warning.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` if `blinded_id` is not blinded or
    /// `real_session_id` is.
    pub fn add(&self, mapping: BlindedIdMapping) -> Result<()> {
        if is_non_blinded_id(&mapping.blinded_id) {
            return Err(StoreError::InvalidMapping(
                "blindedId is not a blinded key".into(),
            ));
        }
        if !is_non_blinded_id(&mapping.real_session_id) {
            return Err(StoreError::InvalidMapping(
                "realSessionId must not be blinded".into(),
            ));
        }

        let mut guard = self.write_guard()?;
        let mappings = guard.as_mut().ok_or(StoreError::NotLoaded)?;

        if let Some(existing) = mappings.iter_mut().find(|m| {
            m.blinded_id == mapping.blinded_id && m.server_public_key == mapping.server_public_key
        }) {
            if existing.real_session_id != mapping.real_session_id {
                warn!(
                    old = %short_key(&existing.real_session_id),
                    new = %short_key(&mapping.real_session_id),
                    server = %short_key(&mapping.server_public_key),
                    "overriding cached blinded mapping"
                );
                existing.real_session_id = mapping.real_session_id;
                self.persist(mappings)?;
            }
            return Ok(());
        }

        mappings.push(mapping);
        self.persist(mappings)
    }

    /// Cached blinded id of `unblinded_id` on a server.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` if `unblinded_id` is blinded.
    pub fn find_cached_blinded_id_from_unblinded(
        &self,
        unblinded_id: &str,
        server_public_key: &str,
    ) -> Result<Option<String>> {
        if is_blinded_id(unblinded_id) {
            return Err(StoreError::InvalidMapping(
                "lookup needs an unblinded id".into(),
            ));
        }
        self.with_loaded(|mappings| {
            mappings
                .iter()
                .find(|m| {
                    m.server_public_key == server_public_key && m.real_session_id == unblinded_id
                })
                .map(|m| m.blinded_id.clone())
        })
    }

    /// Real session id behind `blinded_id`, probing contacts when not
    /// cached. A match found by probing is added to the cache.
    ///
    /// Only private, approved contacts with a `05` id are probed.
    pub fn find_cached_blinded_match_or_look_it_up(
        &self,
        blinded_id: &str,
        server_public_key: &str,
        directory: &dyn ContactDirectory,
    ) -> Result<Option<String>> {
        if !is_blinded_id(blinded_id) {
            return Ok(Some(blinded_id.to_string()));
        }
        if let Some(found) = self.get_cached_naked_key_from_blinded(blinded_id, server_public_key)? {
            return Ok(Some(found));
        }

        let server_key = decode_hex_32(server_public_key)?;
        let found = directory
            .contacts()
            .into_iter()
            .filter(|c| c.is_private && c.is_approved && !is_blinded_id(&c.id))
            .find(|c| {
                try_match_blinded_with_standard(&c.id, blinded_id, &server_key).unwrap_or(false)
            });

        match found {
            Some(contact) => {
                debug!(
                    blinded = %short_key(blinded_id),
                    real = %short_key(&contact.id),
                    "found blinded match by probing contacts"
                );
                self.add(BlindedIdMapping {
                    blinded_id: blinded_id.to_string(),
                    server_public_key: server_public_key.to_string(),
                    real_session_id: contact.id.clone(),
                })?;
                Ok(Some(contact.id))
            }
            None => Ok(None),
        }
    }

    /// Our blinded id on a server, derived and cached on first use.
    pub fn find_cached_our_blinded_pubkey_or_look_it_up(
        &self,
        server_public_key: &str,
        account: &AccountKeyPair,
    ) -> Result<String> {
        let our_id = account.session_id();
        if let Some(found) = self.find_cached_blinded_id_from_unblinded(&our_id, server_public_key)? {
            return Ok(found);
        }
        let blinded = derive_blinded_id(&decode_hex_32(server_public_key)?, account);
        self.add(BlindedIdMapping {
            blinded_id: blinded.clone(),
            server_public_key: server_public_key.to_string(),
            real_session_id: our_id,
        })?;
        Ok(blinded)
    }

    /// Whether `id` is us: our own session id, or a blinded id cached as ours
    /// on any server.
    pub fn is_us_any_sogs(&self, id: &str, our_session_id: &str) -> Result<bool> {
        if !is_blinded_id(id) {
            return Ok(id == our_session_id);
        }
        self.with_loaded(|mappings| {
            mappings
                .iter()
                .any(|m| m.blinded_id == id && m.real_session_id == our_session_id)
        })
    }

    /// Private, active blinded contacts that belong to `unblinded_id` on any
    /// of `server_public_keys`. Results are unique by id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidMapping` if `unblinded_id` is blinded.
    pub fn find_blinded_contacts_for_unblinded(
        &self,
        unblinded_id: &str,
        server_public_keys: &[String],
        directory: &dyn ContactDirectory,
    ) -> Result<Vec<Contact>> {
        if is_blinded_id(unblinded_id) {
            return Err(StoreError::InvalidMapping(
                "lookup needs an unblinded id".into(),
            ));
        }
        let candidates: Vec<Contact> = directory
            .contacts()
            .into_iter()
            .filter(|c| c.is_private && c.is_active && is_blinded_id(&c.id))
            .collect();

        let mut found: Vec<Contact> = Vec::new();
        for server in server_public_keys {
            let Ok(server_key) = decode_hex_32(server) else {
                warn!(server = %short_key(server), "skipping invalid server key");
                continue;
            };
            for contact in &candidates {
                let matched = try_match_blinded_with_standard(unblinded_id, &contact.id, &server_key)
                    .unwrap_or(false);
                if matched && !found.iter().any(|f| f.id == contact.id) {
                    found.push(contact.clone());
                }
            }
        }
        Ok(found)
    }
}
