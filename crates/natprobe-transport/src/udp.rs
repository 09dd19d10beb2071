//! One-shot UDP request/response exchange.
//!
//! Every call opens its own IPv4 socket, sends one datagram, waits for one
//! datagram and drops the socket on every exit path. The source address of
//! the reply is reported untouched so callers can check whether a server
//! honoured a CHANGE-REQUEST.

use crate::error::{TransportError, TransportResult};
use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

/// Receive buffer size; STUN responses are far smaller
pub const RECV_BUFFER_SIZE: usize = 2048;

/// Outcome of a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResult {
    /// The datagram that arrived
    pub payload: Vec<u8>,
    /// Where the datagram came from
    pub responding_endpoint: SocketAddrV4,
    /// Local socket address used for the exchange
    pub local_endpoint: SocketAddrV4,
}

/// A single request/response exchange over UDP.
///
/// Implementations must not retry: a timeout is a final answer.
#[async_trait]
pub trait Exchanger: Send + Sync {
    /// Send `request` to `server` and wait up to `timeout` for one datagram.
    ///
    /// `local_port` of 0 binds an ephemeral port.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Timeout`] if nothing arrives in time
    /// - [`TransportError::Io`] for bind, send or receive failures
    async fn exchange(
        &self,
        server: SocketAddrV4,
        request: &[u8],
        local_port: u16,
        timeout: Duration,
    ) -> TransportResult<ExchangeResult>;
}

/// System UDP implementation of [`Exchanger`]
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpExchanger;

impl UdpExchanger {
    /// Create a new exchanger
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn bind(local_port: u16) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

        // A pinned local port is rebound once per probe
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;

        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, local_port));
        socket.bind(&addr.into())?;

        UdpSocket::from_std(socket.into())
    }
}

#[async_trait]
impl Exchanger for UdpExchanger {
    async fn exchange(
        &self,
        server: SocketAddrV4,
        request: &[u8],
        local_port: u16,
        timeout: Duration,
    ) -> TransportResult<ExchangeResult> {
        let socket = Self::bind(local_port)?;
        let local_endpoint = ipv4_only(socket.local_addr()?)?;

        trace!("Sending {} bytes to {} from {}", request.len(), server, local_endpoint);
        socket.send_to(request, server).await?;

        let mut buf = [0u8; RECV_BUFFER_SIZE];
        let (len, from) = tokio::time::timeout(timeout, socket.recv_from(&mut buf))
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        let responding_endpoint = ipv4_only(from)?;

        debug!(
            "Received {} bytes from {} (sent to {}, local {})",
            len, responding_endpoint, server, local_endpoint
        );

        Ok(ExchangeResult {
            payload: buf[..len].to_vec(),
            responding_endpoint,
            local_endpoint,
        })
    }
}

/// Ask the OS for a currently free UDP port.
///
/// Lets a caller run several exchanges from the same local port, each on its
/// own short-lived socket.
///
/// # Errors
///
/// Returns an error if no socket can be bound.
pub fn reserve_local_port() -> io::Result<u16> {
    let socket = std::net::UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))?;
    Ok(socket.local_addr()?.port())
}

fn ipv4_only(addr: SocketAddr) -> io::Result<SocketAddrV4> {
    match addr {
        SocketAddr::V4(v4) => Ok(v4),
        SocketAddr::V6(v6) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected IPv6 address {v6}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn echo_server() -> SocketAddrV4 {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = ipv4_only(socket.local_addr().unwrap()).unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1500];
            while let Ok((len, from)) = socket.recv_from(&mut buf).await {
                let _ = socket.send_to(&buf[..len], from).await;
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_exchange_echo() {
        let server = echo_server().await;
        let result = UdpExchanger::new()
            .exchange(server, b"ping", 0, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(result.payload, b"ping");
        assert_eq!(result.responding_endpoint, server);
        assert_ne!(result.local_endpoint.port(), 0);
    }

    #[tokio::test]
    async fn test_exchange_timeout() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server = ipv4_only(silent.local_addr().unwrap()).unwrap();

        let result = UdpExchanger::new()
            .exchange(server, b"ping", 0, Duration::from_millis(100))
            .await;

        assert!(matches!(
            result,
            Err(TransportError::Timeout(d)) if d == Duration::from_millis(100)
        ));
        drop(silent);
    }

    #[tokio::test]
    async fn test_exchange_pinned_local_port() {
        let server = echo_server().await;
        let port = reserve_local_port().unwrap();
        let exchanger = UdpExchanger::new();

        for _ in 0..2 {
            let result = exchanger
                .exchange(server, b"again", port, Duration::from_secs(2))
                .await
                .unwrap();
            assert_eq!(result.local_endpoint.port(), port);
        }
    }

    #[test]
    fn test_reserve_local_port() {
        let port = reserve_local_port().unwrap();
        assert_ne!(port, 0);
    }
}
