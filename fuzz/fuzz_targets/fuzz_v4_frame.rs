//! Fuzz target for V4 frame decoding.
//!
//! Decoding arbitrary bytes as a request or a response frame must return
//! an error or a value, never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;
use onyx_protocol::v4::split_v4;
use onyx_protocol::{decode_v4_request, decode_v4_response};

fuzz_target!(|data: &[u8]| {
    let _ = split_v4(data);
    let _ = decode_v4_response(data);
    let _ = decode_v4_request(data);
});
