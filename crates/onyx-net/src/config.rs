//! Retry and ejection settings for the onion client.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use onyx_protocol::limits::{PATH_FAILURE_THRESHOLD, SNODE_FAILURE_THRESHOLD};

use crate::error::{OnionError, Result};

/// Default number of attempts per request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Default host of the file server. A 502 from any other host means the
/// server is down rather than the path.
pub const DEFAULT_FILE_SERVER_HOST: &str = "filev2.getsession.org";

/// Fixed-backoff retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    #[serde(with = "duration_millis")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Set the number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the delay between attempts.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run `attempt` until it succeeds, fails with a non-retryable error,
    /// or the attempts are used up.
    ///
    /// The closure receives the 1-based attempt number. When the last
    /// attempt fails the error goes through [`OnionError::into_exhausted`].
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut attempt: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut number = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(OnionError::Cancelled);
            }
            let error = match attempt(number).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if !error.is_retryable() {
                warn!(operation, attempt = number, %error, "attempt failed, not retrying");
                return Err(error);
            }
            if number >= max_attempts {
                warn!(operation, attempts = number, %error, "all attempts failed");
                return Err(error.into_exhausted());
            }

            warn!(
                operation,
                attempt = number,
                retries_left = max_attempts - number,
                %error,
                "attempt failed"
            );
            tokio::select! {
                _ = cancel.cancelled() => return Err(OnionError::Cancelled),
                _ = tokio::time::sleep(self.backoff) => {}
            }
            number += 1;
        }
    }
}

/// Settings for [`crate::OnionClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnionConfig {
    /// Retries for requests to a relay destination.
    pub snode_retry: RetryPolicy,
    /// Retries for requests to a server destination.
    pub non_snode_retry: RetryPolicy,
    /// Failures after which a relay is dropped.
    pub snode_failure_threshold: u32,
    /// Failures after which a path is dropped.
    pub path_failure_threshold: u32,
    /// Host of the file server.
    pub file_server_host: String,
}

impl Default for OnionConfig {
    fn default() -> Self {
        Self {
            snode_retry: RetryPolicy::default(),
            non_snode_retry: RetryPolicy::default(),
            snode_failure_threshold: SNODE_FAILURE_THRESHOLD,
            path_failure_threshold: PATH_FAILURE_THRESHOLD,
            file_server_host: DEFAULT_FILE_SERVER_HOST.to_string(),
        }
    }
}

impl OnionConfig {
    /// Use `policy` for both destination kinds.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.snode_retry = policy;
        self.non_snode_retry = policy;
        self
    }

    /// Set both ejection thresholds.
    pub fn with_thresholds(mut self, snode: u32, path: u32) -> Self {
        self.snode_failure_threshold = snode;
        self.path_failure_threshold = path;
        self
    }

    /// Set the file server host.
    pub fn with_file_server_host(mut self, host: impl Into<String>) -> Self {
        self.file_server_host = host.into();
        self
    }
}

/// Serde adapter storing a [`Duration`] as whole milliseconds.
pub mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serialize as milliseconds.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    /// Deserialize from milliseconds.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
