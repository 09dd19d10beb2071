//! Progress callbacks for a classification run.

use crate::classifier::NatVerdict;
use crate::probe::{ProbeOutcome, ProbeVariant};
use crate::servers::ServerDescriptor;

/// Receives events while the classifier runs.
///
/// All methods default to no-ops. Callbacks run inline between probes, so
/// they should return quickly.
pub trait ProbeObserver: Send + Sync {
    /// A probe is about to be sent
    fn on_probe_started(&self, _server: &ServerDescriptor, _variant: ProbeVariant) {}

    /// A probe finished
    fn on_probe(&self, _outcome: &ProbeOutcome) {}

    /// The run reached a verdict
    fn on_verdict(&self, _verdict: NatVerdict) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ProbeObserver for NoopObserver {}
