//! Protocol constants.
//!
//! Wire paths, well-known error bodies and thresholds are defined here so
//! the transport and the classifier agree on them.

// === Onion transport ===

/// Path on the guard relay that accepts onion requests.
pub const ONION_REQUEST_PATH: &str = "/onion_req/v2";

/// Target on the last relay for requests to a non-relay server.
pub const LSRPC_TARGET: &str = "/oxen/v4/lsrpc";

/// `User-Agent` sent to the guard relay.
pub const ONION_USER_AGENT: &str = "WhatsApp";

/// `Accept-Language` sent to the guard relay.
pub const ONION_ACCEPT_LANGUAGE: &str = "en-us";

/// Port used for `http` final targets without an explicit port.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Status used when a failure carried no HTTP status at all.
pub const STATUS_NO_STATUS: u16 = 8888;

// === Relay error bodies ===

/// Body prefix a relay returns when the next hop is unknown to it.
pub const NODE_NOT_FOUND_PREFIX: &str = "Next node not found: ";

/// Body a relay returns when the destination server failed.
pub const OXEN_SERVER_ERROR: &str = "Oxen Server error";

/// Message shown when a relay rejects our timestamp.
pub const CLOCK_OUT_OF_SYNC_MESSAGE: &str =
    "Your clock is out of sync with the network. Check your clock.";

// === Ejection ===

/// Consecutive failures after which a relay is dropped.
pub const SNODE_FAILURE_THRESHOLD: u32 = 3;

/// Consecutive failures after which a path is dropped.
pub const PATH_FAILURE_THRESHOLD: u32 = 3;

// === SOGS ===

/// Size of the random nonce in signed SOGS requests.
pub const SOGS_NONCE_SIZE: usize = 16;

/// Capability advertised by servers that require blinded ids.
pub const BLIND_CAPABILITY: &str = "blind";

/// Number of reactors requested per reaction when polling messages.
pub const MESSAGE_REACTORS_LIMIT: u32 = 5;
