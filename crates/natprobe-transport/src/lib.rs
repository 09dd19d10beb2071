//! # natprobe transport
//!
//! Platform-facing collaborators of the NAT classifier:
//!
//! - [`Exchanger`]: one UDP request/response exchange with a timeout,
//!   reporting which remote endpoint actually answered
//! - [`Resolver`]: hostname to IPv4 lookup
//! - [`LocalInterfaces`]: "is this IPv4 address bound to one of my
//!   interfaces" predicate
//!
//! Every trait has a system-backed implementation and can be replaced in
//! tests by a scripted one.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod interfaces;
pub mod resolve;
pub mod udp;

pub use error::{TransportError, TransportResult};
pub use interfaces::{LocalInterfaces, StaticInterfaces, SystemInterfaces};
pub use resolve::{Resolver, SystemResolver};
pub use udp::{ExchangeResult, Exchanger, RECV_BUFFER_SIZE, UdpExchanger, reserve_local_port};
