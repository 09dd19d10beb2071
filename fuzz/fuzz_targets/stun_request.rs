//! Fuzz test for request header decoding
//!
//! Arbitrary bytes must not panic; encoded requests must round-trip.

#![no_main]

use libfuzzer_sys::fuzz_target;
use natprobe_stun::{
    BINDING_REQUEST, ChangeRequest, TransactionId, decode_request_header, encode_request_with_id,
};

fuzz_target!(|data: &[u8]| {
    let _ = decode_request_header(data);

    if data.len() >= 13 {
        let mut id = [0u8; 12];
        id.copy_from_slice(&data[..12]);
        let change = ChangeRequest::new(data[12] & 1 != 0, data[12] & 2 != 0);

        let request = encode_request_with_id(change, TransactionId::from_bytes(id));
        let header = decode_request_header(&request).expect("encoded request decodes");
        assert_eq!(header.message_type, BINDING_REQUEST);
        assert_eq!(header.change_request, change);
        assert_eq!(header.transaction_id.as_bytes(), &id);
    }
});
