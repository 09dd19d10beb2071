//! STUN message framing.
//!
//! The 20-byte header uses the layout shared by RFC 3489 and RFC 5389:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Message Type          |        Message Length         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Magic Cookie                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! |                  Transaction ID (96 bits)                     |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! A legacy RFC 3489 server treats the cookie as the first 32 bits of a
//! 128-bit transaction ID and echoes it back, so only bytes 8..20 are used
//! for correlation.

use crate::MAGIC_COOKIE;
use crate::error::CodecError;
use rand::RngCore;
use std::fmt;

/// STUN message header size (20 bytes)
pub const HEADER_SIZE: usize = 20;

/// Binding Request message type
pub const BINDING_REQUEST: u16 = 0x0001;

/// Binding Success Response message type
pub const BINDING_RESPONSE: u16 = 0x0101;

const ATTR_HEADER_SIZE: usize = 4;

/// 96-bit transaction ID correlating a response to its request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId([u8; 12]);

impl TransactionId {
    /// Generate a fresh random transaction ID
    #[must_use]
    pub fn random() -> Self {
        let mut id = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut id);
        Self(id)
    }

    /// Wrap raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// A type-length-value attribute as it appears on the wire (without padding)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttribute {
    /// Attribute type
    pub attr_type: u16,
    /// Attribute value, exactly `length` bytes
    pub value: Vec<u8>,
}

impl RawAttribute {
    /// Create a new raw attribute
    #[must_use]
    pub fn new(attr_type: u16, value: Vec<u8>) -> Self {
        Self { attr_type, value }
    }

    /// Bytes this attribute occupies in a message, header and padding included
    #[must_use]
    pub fn wire_len(&self) -> usize {
        ATTR_HEADER_SIZE + padded_len(self.value.len())
    }
}

/// Round up to the next multiple of 4 (STUN attribute padding)
#[must_use]
pub const fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// A STUN message: header fields plus ordered attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StunMessage {
    /// Message type (0x0001 request, 0x0101 success response, ...)
    pub message_type: u16,
    /// Transaction ID (bytes 8..20 of the header)
    pub transaction_id: TransactionId,
    /// Attributes in wire order
    pub attributes: Vec<RawAttribute>,
    /// Set by [`StunMessage::parse`] when the body ended before the declared length
    pub truncated: bool,
}

impl StunMessage {
    /// Create an empty message
    #[must_use]
    pub fn new(message_type: u16, transaction_id: TransactionId) -> Self {
        Self {
            message_type,
            transaction_id,
            attributes: Vec::new(),
            truncated: false,
        }
    }

    /// Append an attribute
    pub fn add_attribute(&mut self, attr: RawAttribute) {
        self.attributes.push(attr);
    }

    /// Length of the message body as written in the header
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.attributes.iter().map(RawAttribute::wire_len).sum()
    }

    /// Encode message to bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let body_len = self.body_len();
        let mut bytes = Vec::with_capacity(HEADER_SIZE + body_len);

        bytes.extend_from_slice(&self.message_type.to_be_bytes());
        bytes.extend_from_slice(&(body_len as u16).to_be_bytes());
        bytes.extend_from_slice(&MAGIC_COOKIE.to_be_bytes());
        bytes.extend_from_slice(self.transaction_id.as_bytes());

        for attr in &self.attributes {
            bytes.extend_from_slice(&attr.attr_type.to_be_bytes());
            bytes.extend_from_slice(&(attr.value.len() as u16).to_be_bytes());
            bytes.extend_from_slice(&attr.value);
            let padding = padded_len(attr.value.len()) - attr.value.len();
            bytes.extend(std::iter::repeat_n(0, padding));
        }

        bytes
    }

    /// Decode a message from bytes.
    ///
    /// The attribute walk stops at `min(20 + message_length, bytes.len())`.
    /// An attribute whose value would run past the end of the buffer ends the
    /// walk; everything decoded before it is kept and `truncated` is set.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TooShort`] if `bytes` cannot hold a header.
    pub fn parse(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CodecError::TooShort {
                actual: bytes.len(),
            });
        }

        let message_type = u16::from_be_bytes([bytes[0], bytes[1]]);
        let declared_len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;

        let mut transaction_id = [0u8; 12];
        transaction_id.copy_from_slice(&bytes[8..HEADER_SIZE]);

        let mut message = Self::new(message_type, TransactionId::from_bytes(transaction_id));

        let end = (HEADER_SIZE + declared_len).min(bytes.len());
        message.truncated = HEADER_SIZE + declared_len > bytes.len();

        let mut offset = HEADER_SIZE;
        while offset + ATTR_HEADER_SIZE <= end {
            let attr_type = u16::from_be_bytes([bytes[offset], bytes[offset + 1]]);
            let attr_len = u16::from_be_bytes([bytes[offset + 2], bytes[offset + 3]]) as usize;

            let value_start = offset + ATTR_HEADER_SIZE;
            let value_end = value_start + attr_len;
            if value_end > bytes.len() {
                message.truncated = true;
                break;
            }

            message
                .attributes
                .push(RawAttribute::new(attr_type, bytes[value_start..value_end].to_vec()));

            offset = value_start + padded_len(attr_len);
        }

        Ok(message)
    }

    /// First attribute of the given type
    #[must_use]
    pub fn attribute(&self, attr_type: u16) -> Option<&RawAttribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }
}
