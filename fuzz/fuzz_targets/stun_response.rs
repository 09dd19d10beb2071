//! Fuzz test for Binding Response decoding
//!
//! Arbitrary datagrams must never panic or read out of bounds, and whatever
//! decodes must agree with the single-endpoint decoder.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use natprobe_stun::{TransactionId, decode_binding_response, decode_response};

#[derive(Debug, Arbitrary)]
struct Input {
    /// Use the transaction ID found in the datagram instead of a random one
    matching_id: bool,
    data: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let expected = match (input.matching_id, input.data.get(8..20)) {
        (true, Some(bytes)) => {
            let mut id = [0u8; 12];
            id.copy_from_slice(bytes);
            TransactionId::from_bytes(id)
        }
        _ => TransactionId::from_bytes([0xA5; 12]),
    };

    let full = decode_binding_response(&input.data, &expected);
    let endpoint = decode_response(&input.data, &expected);

    if let Ok(response) = full {
        assert_eq!(response.endpoint(), endpoint.ok());
    }
});
