//! # natprobe STUN codec
//!
//! Wire codec for the subset of STUN needed to classify a NAT with the
//! RFC 3489 test sequence:
//!
//! - Binding Requests with an optional CHANGE-REQUEST attribute
//! - Binding Responses carrying MAPPED-ADDRESS (RFC 3489) and
//!   XOR-MAPPED-ADDRESS (RFC 5389), plus SOURCE-ADDRESS and CHANGED-ADDRESS
//!   for diagnostics
//!
//! The crate performs no I/O and keeps no state.
//!
//! ## Example
//!
//! ```rust
//! use natprobe_stun::{decode_response, encode_binding_response, encode_request};
//! use natprobe_stun::{MappedEndpoint, StunAttribute};
//! use std::net::Ipv4Addr;
//!
//! let (request, transaction_id) = encode_request(false, true);
//! assert_eq!(request.len(), 28);
//!
//! let endpoint = MappedEndpoint::new(Ipv4Addr::new(203, 0, 113, 5), 4000);
//! let response =
//!     encode_binding_response(&transaction_id, &[StunAttribute::XorMappedAddress(endpoint)]);
//! assert_eq!(decode_response(&response, &transaction_id), Ok(endpoint));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attribute;
pub mod binding;
pub mod error;
pub mod message;

pub use attribute::{ChangeRequest, MappedEndpoint, StunAttribute, xor_endpoint};
pub use binding::{
    BindingResponse, RequestHeader, decode_binding_response, decode_request_header,
    decode_response, encode_binding_response, encode_request, encode_request_with_id,
};
pub use error::CodecError;
pub use message::{
    BINDING_REQUEST, BINDING_RESPONSE, HEADER_SIZE, RawAttribute, StunMessage, TransactionId,
};

/// STUN magic cookie (0x2112A442)
pub const MAGIC_COOKIE: u32 = 0x2112_A442;
