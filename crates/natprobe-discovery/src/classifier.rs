//! RFC 3489 NAT type classification.
//!
//! The classifier runs at most four probes, strictly one after another,
//! against a primary server A and a secondary server B:
//!
//! 1. Reachability: `direct` to A. No answer means UDP is blocked.
//! 2. Full cone: `ip+port` to A. If A's mapping is one of our own interface
//!    addresses there is no NAT, and this probe tells an open host from a
//!    firewalled one. Otherwise an answer means a full cone NAT.
//! 3. Mapping consistency: `direct` to B. A different mapping than A's means
//!    a symmetric NAT.
//! 4. Restriction: `port` to A separates restricted from port restricted cones.
//!
//! Mappings are compared as full endpoints (IP and port) when both probes
//! left from the same local port, and by public IP alone when they did not.
//! What a failed probe to B means is configurable through
//! [`SecondaryFailurePolicy`].

use crate::error::NatError;
use crate::observer::{NoopObserver, ProbeObserver};
use crate::probe::{ProbeOutcome, ProbeVariant, Prober};
use crate::servers::ServerDescriptor;
use natprobe_stun::MappedEndpoint;
use natprobe_transport::LocalInterfaces;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Result of a classification run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NatVerdict {
    /// No answer to a plain Binding Request
    UdpBlocked,
    /// Public address, unsolicited traffic gets through
    OpenInternet,
    /// Public address behind a firewall that drops unsolicited traffic
    SymmetricFirewall,
    /// Any external host can reach the mapped endpoint
    FullCone,
    /// A new mapping per destination
    SymmetricNat,
    /// Only previously contacted IPs can reach the mapped endpoint
    RestrictedCone,
    /// Only previously contacted IP:port pairs can reach the mapped endpoint
    PortRestrictedCone,
}

impl NatVerdict {
    /// RFC 4787 style description used by common NAT test tools
    #[must_use]
    pub fn rfc4787_name(&self) -> &'static str {
        match self {
            Self::UdpBlocked => "UDP Blocked",
            Self::OpenInternet => "Open Internet, No NAT",
            Self::SymmetricFirewall => "Symmetric UDP Firewall, No NAT",
            Self::FullCone => "NAT 1, Endpoint-Independent NAT, Full Cone NAT",
            Self::RestrictedCone => "NAT 2, Address-Dependent NAT, Restricted Cone NAT",
            Self::PortRestrictedCone => {
                "NAT 3, Address- and Port-Dependent NAT, Port Restricted Cone NAT"
            }
            Self::SymmetricNat => "NAT 4, Symmetric NAT",
        }
    }

    /// Whether a NAT sits between this host and the servers
    #[must_use]
    pub fn is_natted(&self) -> bool {
        matches!(
            self,
            Self::FullCone | Self::RestrictedCone | Self::PortRestrictedCone | Self::SymmetricNat
        )
    }
}

impl fmt::Display for NatVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UdpBlocked => write!(f, "UDP Blocked"),
            Self::OpenInternet => write!(f, "Open Internet"),
            Self::SymmetricFirewall => write!(f, "Symmetric Firewall"),
            Self::FullCone => write!(f, "Full Cone NAT"),
            Self::SymmetricNat => write!(f, "Symmetric NAT"),
            Self::RestrictedCone => write!(f, "Restricted Cone NAT"),
            Self::PortRestrictedCone => write!(f, "Port Restricted Cone NAT"),
        }
    }
}

/// How a failed `direct` probe to the secondary server is treated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryFailurePolicy {
    /// A missing mapping counts as a different one, giving a symmetric NAT verdict
    #[default]
    #[serde(rename = "different")]
    TreatAsDifferent,
    /// Skip the comparison and go on to the restriction probe
    Skip,
}

/// Verdict plus everything that led to it
#[derive(Debug, Serialize)]
pub struct Classification {
    /// Final verdict
    pub verdict: NatVerdict,
    /// Probes in the order they ran
    pub probes: Vec<ProbeOutcome>,
    /// Mapping seen by the reachability probe
    pub public_endpoint: Option<MappedEndpoint>,
}

/// Decision points of a run
enum Stage {
    Reachability,
    FullCone { first: Observed },
    MappingConsistency { first: Observed },
    Restriction,
}

/// Mapping reported by a successful probe and the local port it left from
#[derive(Debug, Clone, Copy)]
struct Observed {
    mapped: MappedEndpoint,
    local_port: Option<u16>,
}

impl Observed {
    /// Whether `other` shows the same NAT mapping.
    ///
    /// Public ports are only comparable when both probes left from the same
    /// local port; otherwise only the public IP is compared.
    fn same_mapping(&self, other: &Observed) -> bool {
        match (self.local_port, other.local_port) {
            (Some(a), Some(b)) if a != b => self.mapped.ip == other.mapped.ip,
            _ => self.mapped == other.mapped,
        }
    }
}

/// NAT type detector over two STUN servers
pub struct NatDetector<P, L> {
    prober: P,
    interfaces: L,
    primary: ServerDescriptor,
    secondary: ServerDescriptor,
    secondary_policy: SecondaryFailurePolicy,
}

impl<P: Prober, L: LocalInterfaces> NatDetector<P, L> {
    /// Create a detector.
    ///
    /// # Errors
    ///
    /// Returns [`NatError::SameServer`] if `primary` and `secondary` are equal;
    /// the mapping comparison needs two distinct destinations.
    pub fn new(
        prober: P,
        interfaces: L,
        primary: ServerDescriptor,
        secondary: ServerDescriptor,
    ) -> Result<Self, NatError> {
        if primary == secondary {
            return Err(NatError::SameServer(primary.to_string()));
        }

        Ok(Self {
            prober,
            interfaces,
            primary,
            secondary,
            secondary_policy: SecondaryFailurePolicy::default(),
        })
    }

    /// Choose how a failed secondary probe is treated
    #[must_use]
    pub fn with_secondary_policy(mut self, policy: SecondaryFailurePolicy) -> Self {
        self.secondary_policy = policy;
        self
    }

    /// Server A
    #[must_use]
    pub fn primary(&self) -> &ServerDescriptor {
        &self.primary
    }

    /// Server B
    #[must_use]
    pub fn secondary(&self) -> &ServerDescriptor {
        &self.secondary
    }

    /// Run the classification silently
    pub async fn classify(&self) -> Classification {
        self.classify_with(&NoopObserver).await
    }

    /// Run the classification, reporting progress to `observer`
    pub async fn classify_with(&self, observer: &dyn ProbeObserver) -> Classification {
        let mut probes = Vec::with_capacity(4);
        let mut public_endpoint = None;
        let mut stage = Stage::Reachability;

        let verdict = loop {
            stage = match stage {
                Stage::Reachability => {
                    let outcome = self
                        .step(&self.primary, ProbeVariant::Direct, observer, &mut probes)
                        .await;
                    match outcome {
                        Some(first) => {
                            public_endpoint = Some(first.mapped);
                            Stage::FullCone { first }
                        }
                        None => break NatVerdict::UdpBlocked,
                    }
                }

                Stage::FullCone { first } => {
                    let answered = self
                        .step(&self.primary, ProbeVariant::IpAndPort, observer, &mut probes)
                        .await
                        .is_some();

                    let ip = first.mapped.ip;
                    if self.interfaces.is_local_interface_address(ip) {
                        debug!("Mapped address {} is a local interface address", ip);
                        break if answered {
                            NatVerdict::OpenInternet
                        } else {
                            NatVerdict::SymmetricFirewall
                        };
                    }
                    if answered {
                        break NatVerdict::FullCone;
                    }
                    Stage::MappingConsistency { first }
                }

                Stage::MappingConsistency { first } => {
                    let secondary = self
                        .step(&self.secondary, ProbeVariant::Direct, observer, &mut probes)
                        .await;

                    match (secondary, self.secondary_policy) {
                        (None, SecondaryFailurePolicy::Skip) => {
                            debug!("Secondary server gave no mapping, skipping comparison");
                            Stage::Restriction
                        }
                        (other, _) if !other.is_some_and(|o| first.same_mapping(&o)) => {
                            debug!(
                                "Mapping changed across servers: {} vs {:?}",
                                first.mapped,
                                other.map(|o| o.mapped)
                            );
                            break NatVerdict::SymmetricNat;
                        }
                        _ => Stage::Restriction,
                    }
                }

                Stage::Restriction => {
                    let answered = self
                        .step(&self.primary, ProbeVariant::Port, observer, &mut probes)
                        .await
                        .is_some();
                    break if answered {
                        NatVerdict::RestrictedCone
                    } else {
                        NatVerdict::PortRestrictedCone
                    };
                }
            };
        };

        info!("NAT type: {} ({} probes)", verdict, probes.len());
        observer.on_verdict(verdict);

        Classification {
            verdict,
            probes,
            public_endpoint,
        }
    }

    /// Run one probe, record it, and return its mapping if it succeeded
    async fn step(
        &self,
        server: &ServerDescriptor,
        variant: ProbeVariant,
        observer: &dyn ProbeObserver,
        probes: &mut Vec<ProbeOutcome>,
    ) -> Option<Observed> {
        observer.on_probe_started(server, variant);
        let outcome = self.prober.run(server, variant).await;
        observer.on_probe(&outcome);

        let observed = if outcome.succeeded() {
            outcome.mapped_endpoint().map(|mapped| Observed {
                mapped,
                local_port: outcome.local_endpoint().map(|local| local.port()),
            })
        } else {
            None
        };
        probes.push(outcome);
        observed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeFailure;
    use async_trait::async_trait;
    use natprobe_transport::{StaticInterfaces, TransportError};
    use std::collections::HashMap;
    use std::net::{Ipv4Addr, SocketAddrV4};
    use std::sync::Mutex;
    use std::time::Duration;

    const PUBLIC: MappedEndpoint = MappedEndpoint::new(Ipv4Addr::new(203, 0, 113, 5), 4000);

    /// Answers from a table keyed by (host, variant); missing entries time out
    #[derive(Default)]
    struct ScriptedProber {
        answers: HashMap<(String, ProbeVariant), MappedEndpoint>,
        local_ports: HashMap<String, u16>,
        calls: Mutex<Vec<(String, ProbeVariant)>>,
    }

    impl ScriptedProber {
        fn answer(mut self, host: &str, variant: ProbeVariant, mapped: MappedEndpoint) -> Self {
            self.answers.insert((host.to_string(), variant), mapped);
            self
        }

        /// Report probes to `host` as sent from this local port
        fn local_port(mut self, host: &str, port: u16) -> Self {
            self.local_ports.insert(host.to_string(), port);
            self
        }

        fn calls(&self) -> Vec<(String, ProbeVariant)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Prober for ScriptedProber {
        async fn run(&self, server: &ServerDescriptor, variant: ProbeVariant) -> ProbeOutcome {
            let key = (server.host().to_string(), variant);
            self.calls.lock().unwrap().push(key.clone());

            match self.answers.get(&key) {
                Some(mapped) => {
                    let outcome = ProbeOutcome::success(variant, server.clone(), *mapped);
                    match self.local_ports.get(server.host()) {
                        Some(&port) => outcome.with_endpoints(
                            SocketAddrV4::new(Ipv4Addr::new(198, 51, 100, 1), server.port()),
                            SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 10), port),
                        ),
                        None => outcome,
                    }
                }
                None => ProbeOutcome::failure(
                    variant,
                    server.clone(),
                    ProbeFailure::Transport(TransportError::Timeout(Duration::from_secs(1))),
                ),
            }
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        started: Mutex<Vec<ProbeVariant>>,
        finished: Mutex<usize>,
        verdict: Mutex<Option<NatVerdict>>,
    }

    impl ProbeObserver for RecordingObserver {
        fn on_probe_started(&self, _server: &ServerDescriptor, variant: ProbeVariant) {
            self.started.lock().unwrap().push(variant);
        }

        fn on_probe(&self, _outcome: &ProbeOutcome) {
            *self.finished.lock().unwrap() += 1;
        }

        fn on_verdict(&self, verdict: NatVerdict) {
            *self.verdict.lock().unwrap() = Some(verdict);
        }
    }

    fn server_a() -> ServerDescriptor {
        ServerDescriptor::new("a.stun.test", 3478).unwrap()
    }

    fn server_b() -> ServerDescriptor {
        ServerDescriptor::new("b.stun.test", 3478).unwrap()
    }

    fn not_local() -> StaticInterfaces {
        StaticInterfaces::new(vec![Ipv4Addr::new(192, 168, 1, 10)])
    }

    fn local() -> StaticInterfaces {
        StaticInterfaces::new(vec![PUBLIC.ip])
    }

    fn detector<L: LocalInterfaces>(
        prober: &ScriptedProber,
        interfaces: L,
    ) -> NatDetector<&ScriptedProber, L> {
        NatDetector::new(prober, interfaces, server_a(), server_b()).unwrap()
    }

    fn variants(classification: &Classification) -> Vec<ProbeVariant> {
        classification.probes.iter().map(ProbeOutcome::variant).collect()
    }

    #[tokio::test]
    async fn test_udp_blocked() {
        let prober = ScriptedProber::default();
        let result = detector(&prober, not_local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::UdpBlocked);
        assert_eq!(variants(&result), vec![ProbeVariant::Direct]);
        assert_eq!(result.public_endpoint, None);
    }

    #[tokio::test]
    async fn test_full_cone() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer("a.stun.test", ProbeVariant::IpAndPort, PUBLIC);
        let result = detector(&prober, not_local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::FullCone);
        assert_eq!(variants(&result), vec![ProbeVariant::Direct, ProbeVariant::IpAndPort]);
        assert_eq!(result.public_endpoint, Some(PUBLIC));
    }

    #[tokio::test]
    async fn test_open_internet() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer("a.stun.test", ProbeVariant::IpAndPort, PUBLIC);
        let result = detector(&prober, local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::OpenInternet);
        assert!(!result.verdict.is_natted());
    }

    #[tokio::test]
    async fn test_symmetric_firewall() {
        let prober = ScriptedProber::default().answer("a.stun.test", ProbeVariant::Direct, PUBLIC);
        let result = detector(&prober, local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::SymmetricFirewall);
        // Terminal: server B is never contacted
        assert_eq!(result.probes.len(), 2);
        assert!(prober.calls().iter().all(|(host, _)| host == "a.stun.test"));
    }

    #[tokio::test]
    async fn test_symmetric_nat() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer(
                "b.stun.test",
                ProbeVariant::Direct,
                MappedEndpoint::new(PUBLIC.ip, 4555),
            );
        let result = detector(&prober, not_local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::SymmetricNat);
        assert_eq!(
            variants(&result),
            vec![ProbeVariant::Direct, ProbeVariant::IpAndPort, ProbeVariant::Direct]
        );
        assert_eq!(result.probes[2].server(), &server_b());
    }

    #[tokio::test]
    async fn test_symmetric_nat_same_local_port() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer(
                "b.stun.test",
                ProbeVariant::Direct,
                MappedEndpoint::new(PUBLIC.ip, 4555),
            )
            .local_port("a.stun.test", 50000)
            .local_port("b.stun.test", 50000);
        let result = detector(&prober, not_local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::SymmetricNat);
    }

    #[tokio::test]
    async fn test_different_local_ports_compare_public_ip_only() {
        // A cone NAT gives each local port its own public port
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer(
                "b.stun.test",
                ProbeVariant::Direct,
                MappedEndpoint::new(PUBLIC.ip, 4555),
            )
            .answer("a.stun.test", ProbeVariant::Port, PUBLIC)
            .local_port("a.stun.test", 50000)
            .local_port("b.stun.test", 50001);
        let result = detector(&prober, not_local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::RestrictedCone);
        assert_eq!(result.probes.len(), 4);
    }

    #[tokio::test]
    async fn test_different_local_ports_still_catch_ip_change() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer(
                "b.stun.test",
                ProbeVariant::Direct,
                MappedEndpoint::new(Ipv4Addr::new(203, 0, 113, 6), 4000),
            )
            .local_port("a.stun.test", 50000)
            .local_port("b.stun.test", 50001);
        let result = detector(&prober, not_local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::SymmetricNat);
    }

    #[tokio::test]
    async fn test_restricted_cone() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer("b.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer("a.stun.test", ProbeVariant::Port, PUBLIC);
        let result = detector(&prober, not_local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::RestrictedCone);
        assert_eq!(
            variants(&result),
            vec![
                ProbeVariant::Direct,
                ProbeVariant::IpAndPort,
                ProbeVariant::Direct,
                ProbeVariant::Port
            ]
        );
        assert_eq!(result.probes[3].server(), &server_a());
    }

    #[tokio::test]
    async fn test_port_restricted_cone() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer("b.stun.test", ProbeVariant::Direct, PUBLIC);
        let result = detector(&prober, not_local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::PortRestrictedCone);
        assert_eq!(result.probes.len(), 4);
    }

    #[tokio::test]
    async fn test_secondary_failure_counts_as_different_by_default() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer("a.stun.test", ProbeVariant::Port, PUBLIC);
        let result = detector(&prober, not_local()).classify().await;

        assert_eq!(result.verdict, NatVerdict::SymmetricNat);
    }

    #[tokio::test]
    async fn test_secondary_failure_skipped() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer("a.stun.test", ProbeVariant::Port, PUBLIC);
        let result = detector(&prober, not_local())
            .with_secondary_policy(SecondaryFailurePolicy::Skip)
            .classify()
            .await;

        assert_eq!(result.verdict, NatVerdict::RestrictedCone);
        assert_eq!(result.probes.len(), 4);
    }

    #[tokio::test]
    async fn test_skip_policy_still_compares_mappings() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer(
                "b.stun.test",
                ProbeVariant::Direct,
                MappedEndpoint::new(Ipv4Addr::new(203, 0, 113, 6), 4000),
            );
        let result = detector(&prober, not_local())
            .with_secondary_policy(SecondaryFailurePolicy::Skip)
            .classify()
            .await;

        assert_eq!(result.verdict, NatVerdict::SymmetricNat);
    }

    #[tokio::test]
    async fn test_observer_sees_every_probe() {
        let prober = ScriptedProber::default()
            .answer("a.stun.test", ProbeVariant::Direct, PUBLIC)
            .answer("b.stun.test", ProbeVariant::Direct, PUBLIC);
        let observer = RecordingObserver::default();
        let result = detector(&prober, not_local()).classify_with(&observer).await;

        assert_eq!(*observer.started.lock().unwrap(), variants(&result));
        assert_eq!(*observer.finished.lock().unwrap(), 4);
        assert_eq!(*observer.verdict.lock().unwrap(), Some(NatVerdict::PortRestrictedCone));
    }

    #[test]
    fn test_same_server_rejected() {
        let prober = ScriptedProber::default();
        let result = NatDetector::new(&prober, not_local(), server_a(), server_a());
        assert!(matches!(result, Err(NatError::SameServer(_))));
    }

    #[test]
    fn test_verdict_names() {
        assert_eq!(NatVerdict::FullCone.to_string(), "Full Cone NAT");
        assert_eq!(NatVerdict::UdpBlocked.to_string(), "UDP Blocked");
        assert_eq!(NatVerdict::SymmetricNat.rfc4787_name(), "NAT 4, Symmetric NAT");
        assert!(NatVerdict::RestrictedCone.rfc4787_name().starts_with("NAT 2"));
        assert!(NatVerdict::PortRestrictedCone.is_natted());
        assert!(!NatVerdict::UdpBlocked.is_natted());
    }

    #[test]
    fn test_verdict_serde() {
        assert_eq!(
            serde_json::to_string(&NatVerdict::PortRestrictedCone).unwrap(),
            "\"port_restricted_cone\""
        );
        assert_eq!(
            serde_json::from_str::<SecondaryFailurePolicy>("\"different\"").unwrap(),
            SecondaryFailurePolicy::TreatAsDifferent
        );
        assert_eq!(
            serde_json::from_str::<SecondaryFailurePolicy>("\"skip\"").unwrap(),
            SecondaryFailurePolicy::Skip
        );
    }
}
