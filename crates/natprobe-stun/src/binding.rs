//! Binding Request / Binding Response encoding and validation.

use crate::attribute::{ATTR_CHANGE_REQUEST, ChangeRequest, MappedEndpoint, StunAttribute};
use crate::error::CodecError;
use crate::message::{BINDING_REQUEST, BINDING_RESPONSE, StunMessage, TransactionId};

/// Header fields recovered from an encoded request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    /// Message type
    pub message_type: u16,
    /// Transaction ID
    pub transaction_id: TransactionId,
    /// CHANGE-REQUEST flags (empty when the attribute is absent)
    pub change_request: ChangeRequest,
}

/// Every address attribute recognised in a Binding Response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingResponse {
    /// MAPPED-ADDRESS
    pub mapped: Option<MappedEndpoint>,
    /// XOR-MAPPED-ADDRESS, de-obfuscated
    pub xor_mapped: Option<MappedEndpoint>,
    /// SOURCE-ADDRESS
    pub source: Option<MappedEndpoint>,
    /// CHANGED-ADDRESS
    pub changed: Option<MappedEndpoint>,
    /// The response body ended early
    pub truncated: bool,
}

impl BindingResponse {
    /// The reflexive endpoint; XOR-MAPPED-ADDRESS wins over MAPPED-ADDRESS
    #[must_use]
    pub fn endpoint(&self) -> Option<MappedEndpoint> {
        self.xor_mapped.or(self.mapped)
    }
}

/// Build a Binding Request with a fresh transaction ID.
///
/// The request is 20 bytes, or 28 when either flag adds a CHANGE-REQUEST
/// attribute.
#[must_use]
pub fn encode_request(change_ip: bool, change_port: bool) -> (Vec<u8>, TransactionId) {
    let transaction_id = TransactionId::random();
    let request =
        encode_request_with_id(ChangeRequest::new(change_ip, change_port), transaction_id);
    (request, transaction_id)
}

/// Build a Binding Request with a caller-chosen transaction ID
#[must_use]
pub fn encode_request_with_id(change: ChangeRequest, transaction_id: TransactionId) -> Vec<u8> {
    let mut message = StunMessage::new(BINDING_REQUEST, transaction_id);
    if !change.is_empty() {
        message.add_attribute(StunAttribute::ChangeRequest(change).to_raw());
    }
    message.encode()
}

/// Recover the header and CHANGE-REQUEST flags of an encoded request.
///
/// The message type is reported as found, not checked.
///
/// # Errors
///
/// Returns [`CodecError::TooShort`] if `data` cannot hold a header.
pub fn decode_request_header(data: &[u8]) -> Result<RequestHeader, CodecError> {
    let message = StunMessage::parse(data)?;
    let change_request = match message.attribute(ATTR_CHANGE_REQUEST).map(StunAttribute::decode) {
        Some(StunAttribute::ChangeRequest(change)) => change,
        _ => ChangeRequest::NONE,
    };

    Ok(RequestHeader {
        message_type: message.message_type,
        transaction_id: message.transaction_id,
        change_request,
    })
}

/// Validate a Binding Response and collect its address attributes.
///
/// The first occurrence of each attribute type is kept.
///
/// # Errors
///
/// - [`CodecError::TooShort`] if `data` is under 20 bytes
/// - [`CodecError::UnexpectedMessageType`] unless the type is 0x0101
/// - [`CodecError::TransactionMismatch`] if bytes 8..20 differ from `expected`
pub fn decode_binding_response(
    data: &[u8],
    expected: &TransactionId,
) -> Result<BindingResponse, CodecError> {
    let message = StunMessage::parse(data)?;

    if message.message_type != BINDING_RESPONSE {
        return Err(CodecError::UnexpectedMessageType(message.message_type));
    }
    if message.transaction_id != *expected {
        return Err(CodecError::TransactionMismatch);
    }

    let mut response = BindingResponse {
        truncated: message.truncated,
        ..BindingResponse::default()
    };

    for raw in &message.attributes {
        let slot = match StunAttribute::decode(raw) {
            StunAttribute::MappedAddress(ep) => Some((&mut response.mapped, ep)),
            StunAttribute::XorMappedAddress(ep) => Some((&mut response.xor_mapped, ep)),
            StunAttribute::SourceAddress(ep) => Some((&mut response.source, ep)),
            StunAttribute::ChangedAddress(ep) => Some((&mut response.changed, ep)),
            StunAttribute::ChangeRequest(_) | StunAttribute::Unknown(..) => None,
        };
        if let Some((field, ep)) = slot {
            field.get_or_insert(ep);
        }
    }

    Ok(response)
}

/// Validate a Binding Response and return the reflexive endpoint.
///
/// All attributes are walked, so a response carrying both address forms
/// resolves to the XOR-MAPPED-ADDRESS regardless of order.
///
/// # Errors
///
/// The errors of [`decode_binding_response`], plus
/// [`CodecError::AddressAttributeMissing`] when neither address attribute
/// was found.
pub fn decode_response(
    data: &[u8],
    expected: &TransactionId,
) -> Result<MappedEndpoint, CodecError> {
    decode_binding_response(data, expected)?
        .endpoint()
        .ok_or(CodecError::AddressAttributeMissing)
}

/// Build a Binding Success Response carrying `attributes` in order
#[must_use]
pub fn encode_binding_response(
    transaction_id: &TransactionId,
    attributes: &[StunAttribute],
) -> Vec<u8> {
    let mut message = StunMessage::new(BINDING_RESPONSE, *transaction_id);
    for attr in attributes {
        message.add_attribute(attr.to_raw());
    }
    message.encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{HEADER_SIZE, RawAttribute};
    use std::net::Ipv4Addr;

    fn endpoint(a: u8, b: u8, c: u8, d: u8, port: u16) -> MappedEndpoint {
        MappedEndpoint::new(Ipv4Addr::new(a, b, c, d), port)
    }

    #[test]
    fn test_encode_request_without_flags() {
        let (request, transaction_id) = encode_request(false, false);
        assert_eq!(request.len(), HEADER_SIZE);
        assert_eq!(&request[0..4], &[0x00, 0x01, 0x00, 0x00]);
        assert_eq!(&request[4..8], &[0x21, 0x12, 0xA4, 0x42]);
        assert_eq!(&request[8..20], transaction_id.as_bytes());
    }

    #[test]
    fn test_encode_request_with_change_flags() {
        let cases = [
            (false, true, 0x02u8),
            (true, false, 0x04),
            (true, true, 0x06),
        ];
        for (change_ip, change_port, flag) in cases {
            let (request, _) = encode_request(change_ip, change_port);
            assert_eq!(request.len(), 28);
            assert_eq!(&request[2..4], &[0x00, 0x08]);
            assert_eq!(&request[20..28], &[0x00, 0x03, 0x00, 0x04, 0, 0, 0, flag]);
        }
    }

    #[test]
    fn test_request_header_roundtrip() {
        for change in [
            ChangeRequest::NONE,
            ChangeRequest::new(false, true),
            ChangeRequest::new(true, false),
            ChangeRequest::new(true, true),
        ] {
            let (request, transaction_id) = encode_request(change.change_ip, change.change_port);
            let header = decode_request_header(&request).unwrap();
            assert_eq!(header.message_type, BINDING_REQUEST);
            assert_eq!(header.transaction_id, transaction_id);
            assert_eq!(header.change_request, change);
        }
    }

    #[test]
    fn test_decode_response_too_short() {
        let id = TransactionId::random();
        assert_eq!(
            decode_response(&[0x01, 0x01, 0x00], &id),
            Err(CodecError::TooShort { actual: 3 })
        );
    }

    #[test]
    fn test_decode_response_wrong_type() {
        let id = TransactionId::random();
        let (request, _) = encode_request(false, false);
        assert_eq!(
            decode_response(&request, &id),
            Err(CodecError::UnexpectedMessageType(0x0001))
        );

        let mut error_response = StunMessage::new(0x0111, id);
        error_response
            .add_attribute(StunAttribute::MappedAddress(endpoint(1, 2, 3, 4, 1000)).to_raw());
        assert_eq!(
            decode_response(&error_response.encode(), &id),
            Err(CodecError::UnexpectedMessageType(0x0111))
        );
    }

    #[test]
    fn test_decode_response_transaction_mismatch() {
        let id = TransactionId::random();
        let other = TransactionId::random();
        let response = encode_binding_response(
            &other,
            &[StunAttribute::MappedAddress(endpoint(1, 2, 3, 4, 1000))],
        );
        assert_eq!(
            decode_response(&response, &id),
            Err(CodecError::TransactionMismatch)
        );
    }

    #[test]
    fn test_decode_response_mapped_only() {
        let id = TransactionId::random();
        let response = encode_binding_response(
            &id,
            &[StunAttribute::MappedAddress(endpoint(1, 2, 3, 4, 1000))],
        );
        assert_eq!(decode_response(&response, &id), Ok(endpoint(1, 2, 3, 4, 1000)));
    }

    #[test]
    fn test_xor_mapped_takes_precedence() {
        let id = TransactionId::random();
        let mapped = StunAttribute::MappedAddress(endpoint(1, 2, 3, 4, 1000));
        let xor = StunAttribute::XorMappedAddress(endpoint(5, 6, 7, 8, 2000));

        let response = encode_binding_response(&id, &[mapped.clone(), xor.clone()]);
        assert_eq!(decode_response(&response, &id), Ok(endpoint(5, 6, 7, 8, 2000)));

        let response = encode_binding_response(&id, &[xor, mapped]);
        assert_eq!(decode_response(&response, &id), Ok(endpoint(5, 6, 7, 8, 2000)));
    }

    #[test]
    fn test_decode_skips_odd_length_attribute() {
        let id = TransactionId::random();
        let response = encode_binding_response(
            &id,
            &[
                StunAttribute::Unknown(0x8022, b"abcde".to_vec()),
                StunAttribute::MappedAddress(endpoint(9, 9, 9, 9, 9)),
            ],
        );
        // 20 header + (4 + 5 + 3) + (4 + 8)
        assert_eq!(response.len(), 44);
        assert_eq!(decode_response(&response, &id), Ok(endpoint(9, 9, 9, 9, 9)));
    }

    #[test]
    fn test_decode_response_missing_address() {
        let id = TransactionId::random();
        let response =
            encode_binding_response(&id, &[StunAttribute::Unknown(0x8022, b"srv".to_vec())]);
        assert_eq!(
            decode_response(&response, &id),
            Err(CodecError::AddressAttributeMissing)
        );
    }

    #[test]
    fn test_decode_truncated_response_keeps_complete_attributes() {
        let id = TransactionId::random();
        let response = encode_binding_response(
            &id,
            &[
                StunAttribute::MappedAddress(endpoint(1, 2, 3, 4, 1000)),
                StunAttribute::XorMappedAddress(endpoint(5, 6, 7, 8, 2000)),
            ],
        );

        // XOR-MAPPED-ADDRESS cut in half: MAPPED-ADDRESS is still usable
        let cut = &response[..response.len() - 4];
        let decoded = decode_binding_response(cut, &id).unwrap();
        assert!(decoded.truncated);
        assert_eq!(decoded.xor_mapped, None);
        assert_eq!(decode_response(cut, &id), Ok(endpoint(1, 2, 3, 4, 1000)));

        // Only the header survives
        assert_eq!(
            decode_response(&response[..HEADER_SIZE + 2], &id),
            Err(CodecError::AddressAttributeMissing)
        );
    }

    #[test]
    fn test_decode_collects_diagnostic_addresses() {
        let id = TransactionId::random();
        let response = encode_binding_response(
            &id,
            &[
                StunAttribute::MappedAddress(endpoint(198, 51, 100, 7, 50000)),
                StunAttribute::SourceAddress(endpoint(192, 0, 2, 10, 3478)),
                StunAttribute::ChangedAddress(endpoint(192, 0, 2, 11, 3479)),
            ],
        );
        let decoded = decode_binding_response(&response, &id).unwrap();
        assert_eq!(decoded.source, Some(endpoint(192, 0, 2, 10, 3478)));
        assert_eq!(decoded.changed, Some(endpoint(192, 0, 2, 11, 3479)));
        assert_eq!(decoded.endpoint(), Some(endpoint(198, 51, 100, 7, 50000)));
    }

    #[test]
    fn test_first_occurrence_wins() {
        let id = TransactionId::random();
        let mut message = StunMessage::new(BINDING_RESPONSE, id);
        message.add_attribute(StunAttribute::MappedAddress(endpoint(1, 1, 1, 1, 1)).to_raw());
        message.add_attribute(StunAttribute::MappedAddress(endpoint(2, 2, 2, 2, 2)).to_raw());
        message.add_attribute(RawAttribute::new(0x0001, vec![0, 1]));
        assert_eq!(
            decode_response(&message.encode(), &id),
            Ok(endpoint(1, 1, 1, 1, 1))
        );
    }
}
