//! Discovery error types.

use crate::servers::DescriptorError;

/// Errors raised before any probe is sent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NatError {
    /// Primary and secondary name the same server
    #[error("primary and secondary server are both {0}")]
    SameServer(String),

    /// A server descriptor failed validation
    #[error("invalid server descriptor: {0}")]
    Descriptor(#[from] DescriptorError),
}
