//! Network-adjusted clock.
//!
//! Signed requests carry a timestamp that servers reject when it drifts too
//! far from theirs (406/425). [`NetworkTime`] keeps the offset between the
//! local clock and the last server time seen, and signs with the corrected
//! value.

use std::sync::atomic::{AtomicI64, Ordering};

use thiserror::Error;
use tracing::debug;

/// Errors that can occur while reading the clock.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// System time error.
    #[error("System time error: {0}")]
    SystemTimeError(String),
}

/// Result type for time operations.
pub type TimeResult<T> = std::result::Result<T, TimeError>;

/// Current Unix time in milliseconds from the system clock.
///
/// # Errors
///
/// Returns `TimeError::SystemTimeError` if the system time is before
/// the Unix epoch.
pub fn now_ms() -> TimeResult<u64> {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|e| TimeError::SystemTimeError(e.to_string()))
}

/// Local clock corrected by the last known server offset.
#[derive(Debug, Default)]
pub struct NetworkTime {
    /// `local - server`, in milliseconds.
    offset_ms: AtomicI64,
}

impl NetworkTime {
    /// A clock with no correction.
    pub fn new() -> Self {
        Self::default()
    }

    /// A clock with a fixed offset (`local - server`).
    pub fn with_offset_ms(offset_ms: i64) -> Self {
        Self {
            offset_ms: AtomicI64::new(offset_ms),
        }
    }

    /// Current offset, `local - server`.
    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }

    /// Replace the offset.
    pub fn set_offset_ms(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::Relaxed);
    }

    /// Record a server timestamp observed now.
    pub fn observe_server_time_ms(&self, server_ms: u64) -> TimeResult<()> {
        let local = now_ms()?;
        let offset = local as i64 - server_ms as i64;
        debug!(offset_ms = offset, "network time offset updated");
        self.set_offset_ms(offset);
        Ok(())
    }

    /// Network time in milliseconds.
    pub fn now_ms(&self) -> TimeResult<u64> {
        let local = now_ms()? as i64;
        Ok(local.saturating_sub(self.offset_ms()).max(0) as u64)
    }
}
