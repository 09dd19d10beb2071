//! STUN server descriptors.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Port used when a descriptor names no port
pub const DEFAULT_STUN_PORT: u16 = 3478;

/// Server A of the classifier when nothing else is configured
pub const DEFAULT_PRIMARY: &str = "stun.t-online.de:3478";

/// Server B of the classifier when nothing else is configured
pub const DEFAULT_SECONDARY: &str = "stun.1und1.de:3478";

/// Public servers worth surveying
pub const DEFAULT_CANDIDATES: &[&str] = &[
    "stun1.l.google.com:19302",
    "stun2.l.google.com:19302",
    "stun3.l.google.com:19302",
    "stun4.l.google.com:19302",
    "stun.cloudflare.com:3478",
    "stun.1und1.de:3478",
    "stun.t-online.de:3478",
];

/// Invalid server descriptor
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    /// Host is empty
    #[error("server host is empty")]
    EmptyHost,

    /// Host contains characters no hostname or IPv4 literal can hold
    #[error("invalid server host: {0:?}")]
    InvalidHost(String),

    /// Port is zero or not a number
    #[error("invalid server port: {0:?}")]
    InvalidPort(String),
}

/// A STUN server, immutable once validated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServerDescriptor {
    host: String,
    port: u16,
}

impl ServerDescriptor {
    /// Create a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] for an empty host, a host containing
    /// whitespace, `/` or `:`, or port 0.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, DescriptorError> {
        let host = host.into();

        if host.is_empty() {
            return Err(DescriptorError::EmptyHost);
        }
        if host.chars().any(|c| c.is_whitespace() || c == '/' || c == ':') {
            return Err(DescriptorError::InvalidHost(host));
        }
        if port == 0 {
            return Err(DescriptorError::InvalidPort(port.to_string()));
        }

        Ok(Self { host, port })
    }

    /// Hostname or IPv4 literal
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// UDP port
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The built-in primary server
    #[must_use]
    pub fn default_primary() -> Self {
        Self {
            host: "stun.t-online.de".to_string(),
            port: DEFAULT_STUN_PORT,
        }
    }

    /// The built-in secondary server
    #[must_use]
    pub fn default_secondary() -> Self {
        Self {
            host: "stun.1und1.de".to_string(),
            port: DEFAULT_STUN_PORT,
        }
    }

    /// The built-in candidate list
    #[must_use]
    pub fn default_candidates() -> Vec<Self> {
        DEFAULT_CANDIDATES
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

impl FromStr for ServerDescriptor {
    type Err = DescriptorError;

    /// Parse `host` or `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DescriptorError::InvalidPort(port.to_string()))?;
                Self::new(host, port)
            }
            None => Self::new(s, DEFAULT_STUN_PORT),
        }
    }
}

impl TryFrom<String> for ServerDescriptor {
    type Error = DescriptorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ServerDescriptor> for String {
    fn from(value: ServerDescriptor) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ServerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
