//! String key/value settings storage.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::error::{Result, StoreError};

/// Name of the sled tree holding settings.
const SETTINGS_TREE: &str = "settings";

/// A persistent string key/value store.
pub trait SettingsStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one.
    fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// In-memory settings, for tests and ephemeral clients.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettingsStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .read()
            .map_err(|_| StoreError::Database("settings lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .write()
            .map_err(|_| StoreError::Database("settings lock poisoned".into()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings backed by a sled tree.
pub struct SledSettingsStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl std::fmt::Debug for SledSettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledSettingsStore")
            .field("entries", &self.tree.len())
            .finish_non_exhaustive()
    }
}

impl SledSettingsStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| StoreError::Database(format!("Failed to open database: {}", e)))?;
        Self::from_db(db)
    }

    /// Use an already open database.
    pub fn from_db(db: sled::Db) -> Result<Self> {
        let tree = db
            .open_tree(SETTINGS_TREE)
            .map_err(|e| StoreError::Database(format!("Failed to open settings tree: {}", e)))?;
        Ok(Self { db, tree })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| StoreError::Database(format!("Failed to flush: {}", e)))?;
        Ok(())
    }
}

impl SettingsStore for SledSettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .tree
            .get(key.as_bytes())
            .map_err(|e| StoreError::Database(format!("Failed to read {}: {}", key, e)))?;
        value
            .map(|bytes| {
                String::from_utf8(bytes.to_vec())
                    .map_err(|e| StoreError::Serialization(format!("{} is not UTF-8: {}", key, e)))
            })
            .transpose()
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.tree
            .insert(key.as_bytes(), value.as_bytes())
            .map_err(|e| StoreError::Database(format!("Failed to write {}: {}", key, e)))?;
        self.flush()
    }
}
