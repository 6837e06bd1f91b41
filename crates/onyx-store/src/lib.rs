//! # onyx-store
//!
//! Local storage for the onyx transport core.
//!
//! Provides:
//! - [`SettingsStore`]: string key/value settings, in memory or on sled
//! - [`KnownBlindedKeys`]: the persisted blinded id ↔ session id cache
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use onyx_store::{KnownBlindedKeys, SledSettingsStore};
//!
//! let store = SledSettingsStore::open(Path::new("/tmp/onyx-settings")).unwrap();
//! let cache = KnownBlindedKeys::new(Arc::new(store));
//! cache.load().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod blinded_keys;
pub mod error;
pub mod settings;

pub use blinded_keys::{
    BlindedIdMapping, Contact, ContactDirectory, KnownBlindedKeys, KNOWN_BLINDED_KEYS_ITEM,
};
pub use error::{Result, StoreError};
pub use settings::{MemorySettingsStore, SettingsStore, SledSettingsStore};
