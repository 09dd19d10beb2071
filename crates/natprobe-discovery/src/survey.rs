//! Per-server capability survey.
//!
//! Runs all four probe variants against one server to see whether it can
//! serve as server A of a classification. Many public STUN servers speak
//! RFC 5389 only and ignore CHANGE-REQUEST.

use crate::observer::{NoopObserver, ProbeObserver};
use crate::probe::{ProbeOutcome, ProbeVariant, Prober};
use crate::servers::ServerDescriptor;
use serde::Serialize;
use tracing::info;

/// Outcomes of every probe variant against one server
#[derive(Debug, Serialize)]
pub struct ServerSurvey {
    /// Surveyed server
    pub server: ServerDescriptor,
    /// One outcome per variant, in [`ProbeVariant::ALL`] order
    pub probes: Vec<ProbeOutcome>,
}

impl ServerSurvey {
    fn passed(&self, variant: ProbeVariant) -> bool {
        self.probes
            .iter()
            .any(|p| p.variant() == variant && p.succeeded())
    }

    /// The plain Binding Request was answered
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        self.passed(ProbeVariant::Direct)
    }

    /// The server answers from another port on request
    #[must_use]
    pub fn honors_change_port(&self) -> bool {
        self.passed(ProbeVariant::Port)
    }

    /// The server answers from another IP on request, with or without a port change
    #[must_use]
    pub fn honors_change_ip(&self) -> bool {
        self.passed(ProbeVariant::Ip) && self.passed(ProbeVariant::IpAndPort)
    }

    /// Every check the classifier relies on works against this server
    #[must_use]
    pub fn supports_classification(&self) -> bool {
        self.is_reachable() && self.honors_change_port() && self.honors_change_ip()
    }
}

/// Run every probe variant against `server`, in order
pub async fn survey_server<P: Prober + ?Sized>(
    prober: &P,
    server: &ServerDescriptor,
) -> ServerSurvey {
    survey_server_with(prober, server, &NoopObserver).await
}

/// [`survey_server`], reporting each probe to `observer`
pub async fn survey_server_with<P: Prober + ?Sized>(
    prober: &P,
    server: &ServerDescriptor,
    observer: &dyn ProbeObserver,
) -> ServerSurvey {
    let mut probes = Vec::with_capacity(ProbeVariant::ALL.len());
    for variant in ProbeVariant::ALL {
        observer.on_probe_started(server, variant);
        let outcome = prober.run(server, variant).await;
        observer.on_probe(&outcome);
        probes.push(outcome);
    }

    let survey = ServerSurvey {
        server: server.clone(),
        probes,
    };
    info!(
        "Survey of {}: reachable={} change_port={} change_ip={}",
        server,
        survey.is_reachable(),
        survey.honors_change_port(),
        survey.honors_change_ip()
    );
    survey
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeFailure;
    use async_trait::async_trait;
    use natprobe_stun::MappedEndpoint;
    use std::net::Ipv4Addr;

    /// Passes the listed variants and fails the rest
    struct PartialServer(Vec<ProbeVariant>);

    #[async_trait]
    impl Prober for PartialServer {
        async fn run(&self, server: &ServerDescriptor, variant: ProbeVariant) -> ProbeOutcome {
            if self.0.contains(&variant) {
                let mapped = MappedEndpoint::new(Ipv4Addr::new(203, 0, 113, 5), 4000);
                ProbeOutcome::success(variant, server.clone(), mapped)
            } else if variant.changes_ip() {
                ProbeOutcome::failure(variant, server.clone(), ProbeFailure::ChangeIpNotHonored)
            } else {
                ProbeOutcome::failure(variant, server.clone(), ProbeFailure::ChangePortNotHonored)
            }
        }
    }

    fn server() -> ServerDescriptor {
        "stun.example.org".parse().unwrap()
    }

    #[tokio::test]
    async fn test_full_rfc3489_server() {
        let survey = survey_server(&PartialServer(ProbeVariant::ALL.to_vec()), &server()).await;

        let order: Vec<_> = survey.probes.iter().map(ProbeOutcome::variant).collect();
        assert_eq!(order, ProbeVariant::ALL.to_vec());
        assert!(survey.supports_classification());
    }

    #[tokio::test]
    async fn test_rfc5389_only_server() {
        let survey = survey_server(&PartialServer(vec![ProbeVariant::Direct]), &server()).await;

        assert!(survey.is_reachable());
        assert!(!survey.honors_change_port());
        assert!(!survey.honors_change_ip());
        assert!(!survey.supports_classification());
        assert_eq!(survey.probes.len(), 4);
    }

    #[tokio::test]
    async fn test_port_only_server() {
        let survey = survey_server(
            &PartialServer(vec![ProbeVariant::Direct, ProbeVariant::Port]),
            &server(),
        )
        .await;

        assert!(survey.honors_change_port());
        assert!(!survey.honors_change_ip());
    }

    #[tokio::test]
    async fn test_survey_serializes() {
        let survey = survey_server(&PartialServer(vec![ProbeVariant::Direct]), &server()).await;
        let json = serde_json::to_value(&survey).unwrap();
        assert_eq!(json["server"], "stun.example.org:3478");
        assert_eq!(json["probes"].as_array().unwrap().len(), 4);
        assert_eq!(json["probes"][1]["failure"], "server did not honor CHANGE-REQUEST for port");
    }
}
