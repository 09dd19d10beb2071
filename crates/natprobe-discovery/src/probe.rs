//! Single STUN probes.
//!
//! A probe sends one Binding Request with a fixed pair of CHANGE-REQUEST
//! flags and checks that the answer came from where the flags say it should.
//! Every failure (DNS, socket, decode, unexpected source) ends up as a
//! non-succeeding [`ProbeOutcome`]; nothing is retried and nothing panics.

use crate::servers::ServerDescriptor;
use async_trait::async_trait;
use natprobe_stun::{CodecError, MappedEndpoint, decode_binding_response, encode_request};
use natprobe_transport::{Exchanger, Resolver, SystemResolver, TransportError, UdpExchanger};
use serde::{Serialize, Serializer};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Default wait for a single response
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Which CHANGE-REQUEST flags a probe sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeVariant {
    /// No change requested
    Direct,
    /// Change port only
    Port,
    /// Change IP only
    Ip,
    /// Change both IP and port
    #[serde(rename = "ip+port")]
    IpAndPort,
}

impl ProbeVariant {
    /// Every variant, in survey order
    pub const ALL: [Self; 4] = [Self::Direct, Self::Port, Self::Ip, Self::IpAndPort];

    /// `(change_ip, change_port)`
    #[must_use]
    pub const fn flags(self) -> (bool, bool) {
        match self {
            Self::Direct => (false, false),
            Self::Port => (false, true),
            Self::Ip => (true, false),
            Self::IpAndPort => (true, true),
        }
    }

    /// Whether the server is asked to answer from another IP
    #[must_use]
    pub const fn changes_ip(self) -> bool {
        self.flags().0
    }

    /// Whether the server is asked to answer from another port
    #[must_use]
    pub const fn changes_port(self) -> bool {
        self.flags().1
    }
}

impl fmt::Display for ProbeVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Port => write!(f, "port"),
            Self::Ip => write!(f, "ip"),
            Self::IpAndPort => write!(f, "ip+port"),
        }
    }
}

impl FromStr for ProbeVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "port" => Ok(Self::Port),
            "ip" => Ok(Self::Ip),
            "ip+port" => Ok(Self::IpAndPort),
            other => Err(format!("unknown probe variant: {other}")),
        }
    }
}

/// Why a probe did not succeed
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    /// Resolution, timeout or socket fault
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    /// The datagram was not a usable Binding Response
    #[error("codec: {0}")]
    Codec(#[from] CodecError),

    /// CHANGE-REQUEST asked for another IP but the reply came from the server's
    #[error("server did not honor CHANGE-REQUEST for IP")]
    ChangeIpNotHonored,

    /// CHANGE-REQUEST asked for another port but the reply came from the server's
    #[error("server did not honor CHANGE-REQUEST for port")]
    ChangePortNotHonored,

    /// Reply came from another IP without being asked to
    #[error("response arrived from an unexpected IP")]
    UnexpectedIpChange,

    /// Reply came from another port without being asked to
    #[error("response arrived from an unexpected port")]
    UnexpectedPortChange,
}

impl ProbeFailure {
    /// True for the source-address checks, as opposed to transport or codec faults
    #[must_use]
    pub fn is_change_violation(&self) -> bool {
        matches!(
            self,
            Self::ChangeIpNotHonored
                | Self::ChangePortNotHonored
                | Self::UnexpectedIpChange
                | Self::UnexpectedPortChange
        )
    }
}

impl Serialize for ProbeFailure {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Immutable record of one probe
#[derive(Debug, Serialize)]
pub struct ProbeOutcome {
    variant: ProbeVariant,
    server: ServerDescriptor,
    succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    server_ip: Option<Ipv4Addr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mapped_endpoint: Option<MappedEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    responding_endpoint: Option<SocketAddrV4>,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_endpoint: Option<SocketAddrV4>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_address: Option<MappedEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed_address: Option<MappedEndpoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failure: Option<ProbeFailure>,
}

impl ProbeOutcome {
    /// A successful probe
    #[must_use]
    pub fn success(
        variant: ProbeVariant,
        server: ServerDescriptor,
        mapped_endpoint: MappedEndpoint,
    ) -> Self {
        Self {
            succeeded: true,
            mapped_endpoint: Some(mapped_endpoint),
            ..Self::empty(variant, server)
        }
    }

    /// A failed probe
    #[must_use]
    pub fn failure(variant: ProbeVariant, server: ServerDescriptor, failure: ProbeFailure) -> Self {
        Self {
            failure: Some(failure),
            ..Self::empty(variant, server)
        }
    }

    fn empty(variant: ProbeVariant, server: ServerDescriptor) -> Self {
        Self {
            variant,
            server,
            succeeded: false,
            server_ip: None,
            mapped_endpoint: None,
            responding_endpoint: None,
            local_endpoint: None,
            source_address: None,
            changed_address: None,
            failure: None,
        }
    }

    /// Attach the resolved server address
    #[must_use]
    pub fn with_server_ip(mut self, ip: Ipv4Addr) -> Self {
        self.server_ip = Some(ip);
        self
    }

    /// Attach the observed socket endpoints
    #[must_use]
    pub fn with_endpoints(mut self, responding: SocketAddrV4, local: SocketAddrV4) -> Self {
        self.responding_endpoint = Some(responding);
        self.local_endpoint = Some(local);
        self
    }

    /// Attach SOURCE-ADDRESS and CHANGED-ADDRESS as reported by the server
    #[must_use]
    pub fn with_diagnostics(
        mut self,
        source: Option<MappedEndpoint>,
        changed: Option<MappedEndpoint>,
    ) -> Self {
        self.source_address = source;
        self.changed_address = changed;
        self
    }

    /// Probe variant
    #[must_use]
    pub fn variant(&self) -> ProbeVariant {
        self.variant
    }

    /// Probed server
    #[must_use]
    pub fn server(&self) -> &ServerDescriptor {
        &self.server
    }

    /// Whether every check passed
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Resolved server IP, if resolution worked
    #[must_use]
    pub fn server_ip(&self) -> Option<Ipv4Addr> {
        self.server_ip
    }

    /// Reflexive endpoint; only present on success
    #[must_use]
    pub fn mapped_endpoint(&self) -> Option<MappedEndpoint> {
        self.mapped_endpoint
    }

    /// Where the reply came from
    #[must_use]
    pub fn responding_endpoint(&self) -> Option<SocketAddrV4> {
        self.responding_endpoint
    }

    /// Local socket endpoint used
    #[must_use]
    pub fn local_endpoint(&self) -> Option<SocketAddrV4> {
        self.local_endpoint
    }

    /// SOURCE-ADDRESS attribute
    #[must_use]
    pub fn source_address(&self) -> Option<MappedEndpoint> {
        self.source_address
    }

    /// CHANGED-ADDRESS attribute
    #[must_use]
    pub fn changed_address(&self) -> Option<MappedEndpoint> {
        self.changed_address
    }

    /// Why the probe failed
    #[must_use]
    pub fn failure_reason(&self) -> Option<&ProbeFailure> {
        self.failure.as_ref()
    }
}

/// Runs one probe against one server
#[async_trait]
pub trait Prober: Send + Sync {
    /// Run `variant` against `server`; never fails, see [`ProbeOutcome::succeeded`]
    async fn run(&self, server: &ServerDescriptor, variant: ProbeVariant) -> ProbeOutcome;
}

#[async_trait]
impl<P: Prober + ?Sized> Prober for &P {
    async fn run(&self, server: &ServerDescriptor, variant: ProbeVariant) -> ProbeOutcome {
        (**self).run(server, variant).await
    }
}

/// [`Prober`] speaking STUN through a [`Resolver`] and an [`Exchanger`]
#[derive(Debug, Clone)]
pub struct StunProber<R = SystemResolver, E = UdpExchanger> {
    resolver: R,
    exchanger: E,
    timeout: Duration,
    local_port: u16,
}

impl StunProber {
    /// Prober using system DNS and real UDP sockets.
    ///
    /// Every probe gets a fresh ephemeral port; pin one with
    /// [`with_local_port`](Self::with_local_port) and
    /// [`reserve_local_port`](natprobe_transport::reserve_local_port).
    #[must_use]
    pub fn system() -> Self {
        Self::new(SystemResolver::new(), UdpExchanger::new())
    }
}

impl<R: Resolver, E: Exchanger> StunProber<R, E> {
    /// Create a prober with the default 1 second timeout and ephemeral local ports
    #[must_use]
    pub fn new(resolver: R, exchanger: E) -> Self {
        Self {
            resolver,
            exchanger,
            timeout: DEFAULT_PROBE_TIMEOUT,
            local_port: 0,
        }
    }

    /// Set the per-probe response timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send every probe from this local port (0 for ephemeral)
    #[must_use]
    pub fn with_local_port(mut self, port: u16) -> Self {
        self.local_port = port;
        self
    }

    /// Per-probe timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Pinned local port, 0 when ephemeral
    #[must_use]
    pub fn local_port(&self) -> u16 {
        self.local_port
    }
}

#[async_trait]
impl<R: Resolver, E: Exchanger> Prober for StunProber<R, E> {
    async fn run(&self, server: &ServerDescriptor, variant: ProbeVariant) -> ProbeOutcome {
        let (change_ip, change_port) = variant.flags();

        let server_ip = match self.resolver.resolve(server.host(), server.port()).await {
            Ok(ip) => ip,
            Err(e) => {
                debug!("{} probe to {}: {}", variant, server, e);
                return ProbeOutcome::failure(variant, server.clone(), e.into());
            }
        };

        let (request, transaction_id) = encode_request(change_ip, change_port);
        let target = SocketAddrV4::new(server_ip, server.port());

        let exchange = match self
            .exchanger
            .exchange(target, &request, self.local_port, self.timeout)
            .await
        {
            Ok(exchange) => exchange,
            Err(e) => {
                debug!("{} probe to {}: {}", variant, server, e);
                return ProbeOutcome::failure(variant, server.clone(), e.into())
                    .with_server_ip(server_ip);
            }
        };

        let responding = exchange.responding_endpoint;
        let observed = |failure: ProbeFailure| {
            debug!("{} probe to {}: {}", variant, server, failure);
            ProbeOutcome::failure(variant, server.clone(), failure)
                .with_server_ip(server_ip)
                .with_endpoints(responding, exchange.local_endpoint)
        };

        let response = match decode_binding_response(&exchange.payload, &transaction_id) {
            Ok(response) => response,
            Err(e) => return observed(e.into()),
        };
        let Some(mapped) = response.endpoint() else {
            return observed(CodecError::AddressAttributeMissing.into());
        };

        let same_ip = *responding.ip() == server_ip;
        if change_ip && same_ip {
            return observed(ProbeFailure::ChangeIpNotHonored);
        }
        if !change_ip && !same_ip {
            return observed(ProbeFailure::UnexpectedIpChange);
        }

        let same_port = responding.port() == server.port();
        if change_port && same_port {
            return observed(ProbeFailure::ChangePortNotHonored);
        }
        if !change_port && !same_port {
            return observed(ProbeFailure::UnexpectedPortChange);
        }

        debug!(
            "{} probe to {} ({}): mapped {}, answered from {}",
            variant, server, server_ip, mapped, responding
        );

        ProbeOutcome::success(variant, server.clone(), mapped)
            .with_server_ip(server_ip)
            .with_endpoints(responding, exchange.local_endpoint)
            .with_diagnostics(response.source, response.changed)
    }
}
