//! Hostname resolution.

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use tracing::debug;

/// Resolves a STUN server hostname to an IPv4 address
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Look up `host`; `port` is passed along for resolvers that need it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ResolutionFailed`] when no IPv4 address is found.
    async fn resolve(&self, host: &str, port: u16) -> TransportResult<Ipv4Addr>;
}

/// Resolver backed by the system's `getaddrinfo`.
///
/// Results are not cached; every call performs a fresh lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    /// Create a new resolver
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> TransportResult<Ipv4Addr> {
        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return Ok(ip);
        }

        let failed = |reason: String| TransportError::ResolutionFailed {
            host: host.to_string(),
            reason,
        };

        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| failed(e.to_string()))?;

        let ip = addrs
            .filter_map(|addr| match addr.ip() {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .next()
            .ok_or_else(|| failed("no IPv4 address".to_string()))?;

        debug!("Resolved {} to {}", host, ip);
        Ok(ip)
    }
}
