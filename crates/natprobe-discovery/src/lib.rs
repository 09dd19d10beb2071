//! # natprobe discovery
//!
//! NAT type detection over STUN (RFC 3489).
//!
//! This crate provides:
//! - [`ServerDescriptor`]: validated `host:port` of a STUN server
//! - [`StunProber`]: one Binding Request with CHANGE-REQUEST flags, checked
//!   against where the answer came from
//! - [`NatDetector`]: the classic four-probe decision procedure yielding a
//!   [`NatVerdict`]
//! - [`survey_server`]: which CHANGE-REQUEST behaviours a server supports
//!
//! ## Example
//!
//! ```rust,no_run
//! use natprobe_discovery::{NatDetector, ServerDescriptor, StunProber};
//! use natprobe_transport::{SystemInterfaces, reserve_local_port};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! // One local port for the whole run lets mappings be compared port for port
//! let prober = StunProber::system().with_local_port(reserve_local_port()?);
//!
//! let detector = NatDetector::new(
//!     prober,
//!     SystemInterfaces::new(),
//!     ServerDescriptor::default_primary(),
//!     ServerDescriptor::default_secondary(),
//! )?;
//!
//! let result = detector.classify().await;
//! println!("{} ({:?})", result.verdict, result.public_endpoint);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classifier;
pub mod error;
pub mod observer;
pub mod probe;
pub mod servers;
pub mod survey;

pub use classifier::{Classification, NatDetector, NatVerdict, SecondaryFailurePolicy};
pub use error::NatError;
pub use observer::{NoopObserver, ProbeObserver};
pub use probe::{
    DEFAULT_PROBE_TIMEOUT, ProbeFailure, ProbeOutcome, ProbeVariant, Prober, StunProber,
};
pub use servers::{
    DEFAULT_CANDIDATES, DEFAULT_PRIMARY, DEFAULT_SECONDARY, DEFAULT_STUN_PORT, DescriptorError,
    ServerDescriptor,
};
pub use survey::{ServerSurvey, survey_server, survey_server_with};
