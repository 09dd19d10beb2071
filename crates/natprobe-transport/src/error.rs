//! Transport error types.

use std::io;
use std::time::Duration;

/// Errors from a single request/response exchange
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Hostname could not be resolved to an IPv4 address
    #[error("failed to resolve {host}: {reason}")]
    ResolutionFailed {
        /// Host that was looked up
        host: String,
        /// Resolver message
        reason: String,
    },

    /// No datagram arrived before the deadline
    #[error("no response within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Any other socket fault (unreachable, connection reset, bind failure)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;
