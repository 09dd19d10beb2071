//! Error types for the STUN codec.

use thiserror::Error;

/// Errors returned while decoding STUN messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Datagram is shorter than the 20-byte STUN header
    #[error("STUN message too short: expected at least 20 bytes, got {actual}")]
    TooShort {
        /// Actual datagram length
        actual: usize,
    },

    /// Message type is not a Binding Response
    #[error("unexpected STUN message type: 0x{0:04X}")]
    UnexpectedMessageType(u16),

    /// Response transaction ID does not match the request
    #[error("transaction ID mismatch")]
    TransactionMismatch,

    /// Neither MAPPED-ADDRESS nor XOR-MAPPED-ADDRESS was present
    #[error("no MAPPED-ADDRESS or XOR-MAPPED-ADDRESS attribute in response")]
    AddressAttributeMissing,
}
