//! Failure counters for relays and paths.

use std::collections::HashMap;

use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct FailureCounts {
    snodes: HashMap<String, u32>,
    paths: HashMap<String, u32>,
}

/// Consecutive failure counts keyed by relay id and by guard id.
///
/// Each increment is a single locked read-modify-write, so concurrent
/// requests never lose a count.
#[derive(Debug, Default)]
pub struct FailureRegistry {
    counts: Mutex<FailureCounts>,
}

impl FailureRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one failure for a relay and return the new count.
    pub async fn increment_snode(&self, ed25519: &str) -> u32 {
        let mut counts = self.counts.lock().await;
        let count = counts.snodes.entry(ed25519.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Reset a relay's count to zero.
    pub async fn reset_snode(&self, ed25519: &str) {
        self.counts.lock().await.snodes.remove(ed25519);
    }

    /// Current count for a relay.
    pub async fn snode_failures(&self, ed25519: &str) -> u32 {
        self.counts
            .lock()
            .await
            .snodes
            .get(ed25519)
            .copied()
            .unwrap_or(0)
    }

    /// Add one failure for the path starting at `guard` and return the new count.
    pub async fn increment_path(&self, guard: &str) -> u32 {
        let mut counts = self.counts.lock().await;
        let count = counts.paths.entry(guard.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Reset a path's count to zero.
    pub async fn reset_path(&self, guard: &str) {
        self.counts.lock().await.paths.remove(guard);
    }

    /// Current count for the path starting at `guard`.
    pub async fn path_failures(&self, guard: &str) -> u32 {
        self.counts
            .lock()
            .await
            .paths
            .get(guard)
            .copied()
            .unwrap_or(0)
    }

    /// Forget every count.
    pub async fn clear(&self) {
        let mut counts = self.counts.lock().await;
        counts.snodes.clear();
        counts.paths.clear();
    }
}
