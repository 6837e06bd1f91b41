//! Community server (SOGS) request formats.
//!
//! - [`signer`]: `X-SOGS-*` authentication headers
//! - [`batch`]: `/batch` and `/sequence` subrequests and response demux
//! - [`responses`]: typed response schemas validated at the boundary

pub mod batch;
pub mod responses;
pub mod signer;

pub use batch::{
    build_batch_body, demux_batch_response, BatchBody, BatchEntry, BatchMode, BatchResponse,
    BatchRow, BatchRowKind, BatchSubResponse, SubRequest,
};
pub use responses::{
    CapabilitiesResponse, InboxMessage, PollInfoResponse, RoomDetails, RoomMessage,
};
pub use signer::{sign_request, sign_request_with_nonce, SogsAuthHeaders, SogsRequest};
