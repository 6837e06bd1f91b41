//! Configuration for the onyx client.
//!
//! # Example
//!
//! ```
//! use onyx_core::config::{ClientConfig, ClientConfigBuilder};
//! use std::time::Duration;
//!
//! // Use defaults
//! let config = ClientConfig::default();
//!
//! // Or use builder for customization
//! let config = ClientConfigBuilder::new()
//!     .with_in_memory_storage()
//!     .with_request_timeout(Duration::from_secs(10))
//!     .with_retry_attempts(5)
//!     .enable_default_blinding()
//!     .build();
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use onyx_net::config::duration_millis;
use onyx_net::{
    OnionConfig, RetryPolicy, TransportConfig, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_REQUEST_TIMEOUT,
};
use onyx_protocol::limits::{PATH_FAILURE_THRESHOLD, SNODE_FAILURE_THRESHOLD};
use url::Url;

/// Default file server URL.
pub const DEFAULT_FILE_SERVER_URL: &str = "http://filev2.getsession.org";

/// Default file server X25519 public key, hex.
pub const DEFAULT_FILE_SERVER_PUBKEY: &str =
    "da21e1d886c6fbaea313f75298bd64aab03a97ce985b46bb2dad9f2089c8ee59";

/// Default push notification server URL.
pub const DEFAULT_PUSH_SERVER_URL: &str = "https://live.apns.getsession.org";

/// Default push notification server X25519 public key, hex.
pub const DEFAULT_PUSH_SERVER_PUBKEY: &str =
    "642a6585919742e5a2d4dc51244964ee2b8de0d0d8da1ac3cd53ec1d9d4cc5b5";

/// Main client configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Onion transport configuration.
    pub network: NetworkConfig,

    /// Community server behaviour.
    pub sogs: SogsConfig,

    /// Storage configuration.
    pub storage: StorageConfig,
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Create a configuration for in-memory operation (useful for testing).
    pub fn in_memory() -> Self {
        ClientConfigBuilder::new().with_in_memory_storage().build()
    }

    /// Validate the configuration.
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.storage.in_memory && self.storage.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "storage.data_dir".into(),
                reason: "data directory cannot be empty when not using in-memory storage".into(),
            });
        }

        let network = &self.network;
        if network.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "network.request_timeout".into(),
                reason: "request timeout must be greater than zero".into(),
            });
        }
        if network.snode_attempts == 0 || network.non_snode_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.attempts".into(),
                reason: "at least one attempt is required".into(),
            });
        }
        if network.snode_failure_threshold == 0 || network.path_failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "network.failure_threshold".into(),
                reason: "failure thresholds must be greater than zero".into(),
            });
        }

        validate_server("network.file_server", &network.file_server_url, &network.file_server_pubkey)?;
        validate_server("network.push_server", &network.push_server_url, &network.push_server_pubkey)?;

        Ok(())
    }
}

fn validate_server(field: &str, url: &str, pubkey: &str) -> Result<(), ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::InvalidValue {
        field: format!("{field}_url"),
        reason: e.to_string(),
    })?;
    if parsed.host_str().is_none() {
        return Err(ConfigError::Missing(format!("{field}_url host")));
    }
    if pubkey.len() != 64 || !pubkey.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ConfigError::InvalidValue {
            field: format!("{field}_pubkey"),
            reason: "expected 64 hex characters".into(),
        });
    }
    Ok(())
}

/// Onion transport configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Timeout of one guard request.
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,

    /// Attempts for requests to a relay.
    pub snode_attempts: u32,

    /// Attempts for requests to a server.
    pub non_snode_attempts: u32,

    /// Pause between attempts.
    #[serde(with = "duration_millis")]
    pub retry_backoff: Duration,

    /// Failures after which a relay is dropped.
    pub snode_failure_threshold: u32,

    /// Failures after which a path is dropped.
    pub path_failure_threshold: u32,

    /// File server base URL, without a trailing `/`.
    pub file_server_url: String,

    /// File server X25519 key, hex.
    pub file_server_pubkey: String,

    /// Push notification server base URL.
    pub push_server_url: String,

    /// Push notification server X25519 key, hex.
    pub push_server_pubkey: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            snode_attempts: DEFAULT_MAX_ATTEMPTS,
            non_snode_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_backoff: DEFAULT_BACKOFF,
            snode_failure_threshold: SNODE_FAILURE_THRESHOLD,
            path_failure_threshold: PATH_FAILURE_THRESHOLD,
            file_server_url: DEFAULT_FILE_SERVER_URL.to_string(),
            file_server_pubkey: DEFAULT_FILE_SERVER_PUBKEY.to_string(),
            push_server_url: DEFAULT_PUSH_SERVER_URL.to_string(),
            push_server_pubkey: DEFAULT_PUSH_SERVER_PUBKEY.to_string(),
        }
    }
}

impl NetworkConfig {
    /// Host part of the file server URL.
    pub fn file_server_host(&self) -> Option<String> {
        Url::parse(&self.file_server_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }

    /// Settings for the retrying onion client.
    pub fn onion_config(&self) -> OnionConfig {
        let mut config = OnionConfig {
            snode_retry: RetryPolicy::default()
                .with_max_attempts(self.snode_attempts)
                .with_backoff(self.retry_backoff),
            non_snode_retry: RetryPolicy::default()
                .with_max_attempts(self.non_snode_attempts)
                .with_backoff(self.retry_backoff),
            ..OnionConfig::default()
        }
        .with_thresholds(self.snode_failure_threshold, self.path_failure_threshold);
        if let Some(host) = self.file_server_host() {
            config = config.with_file_server_host(host);
        }
        config
    }

    /// Settings for the HTTPS transport.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig::default().with_request_timeout(self.request_timeout)
    }
}

/// Community server behaviour.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SogsConfig {
    /// Sign with the blinded key on servers whose capabilities are unknown.
    pub blind_by_default: bool,
}

/// Storage configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for the settings database.
    ///
    /// Defaults to the platform-specific data directory:
    /// - Linux: `~/.local/share/onyx`
    /// - macOS: `~/Library/Application Support/onyx`
    /// - Windows: `C:\Users\<User>\AppData\Roaming\onyx`
    pub data_dir: PathBuf,

    /// Keep settings in memory only.
    pub in_memory: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            in_memory: false,
        }
    }
}

/// Builder for [`ClientConfig`].
#[derive(Clone, Debug, Default)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<ClientConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }

    // === Storage ===

    /// Keep settings in memory only.
    pub fn with_in_memory_storage(mut self) -> Self {
        self.config.storage.in_memory = true;
        self
    }

    /// Store settings under `path`.
    pub fn with_data_dir(mut self, path: PathBuf) -> Self {
        self.config.storage.data_dir = path;
        self.config.storage.in_memory = false;
        self
    }

    // === Network ===

    /// Set the per-attempt request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.network.request_timeout = timeout;
        self
    }

    /// Set the attempt count for both relay and server requests.
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.network.snode_attempts = attempts;
        self.config.network.non_snode_attempts = attempts;
        self
    }

    /// Set the pause between attempts.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.network.retry_backoff = backoff;
        self
    }

    /// Set the relay and path ejection thresholds.
    pub fn with_failure_thresholds(mut self, snode: u32, path: u32) -> Self {
        self.config.network.snode_failure_threshold = snode;
        self.config.network.path_failure_threshold = path;
        self
    }

    /// Use another file server.
    pub fn with_file_server(mut self, url: impl Into<String>, pubkey: impl Into<String>) -> Self {
        self.config.network.file_server_url = url.into();
        self.config.network.file_server_pubkey = pubkey.into();
        self
    }

    /// Use another push notification server.
    pub fn with_push_server(mut self, url: impl Into<String>, pubkey: impl Into<String>) -> Self {
        self.config.network.push_server_url = url.into();
        self.config.network.push_server_pubkey = pubkey.into();
        self
    }

    // === Community servers ===

    /// Blind on servers whose capabilities are unknown.
    pub fn enable_default_blinding(mut self) -> Self {
        self.config.sogs.blind_by_default = true;
        self
    }

    /// Sign with the unblinded key on servers whose capabilities are unknown (default).
    pub fn disable_default_blinding(mut self) -> Self {
        self.config.sogs.blind_by_default = false;
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The field name.
        field: String,
        /// The reason it's invalid.
        reason: String,
    },

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

/// Get the default data directory for the current platform.
fn default_data_dir() -> PathBuf {
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("onyx");
    }

    if let Some(home_dir) = dirs::home_dir() {
        return home_dir.join(".onyx");
    }

    PathBuf::from(".onyx")
}
