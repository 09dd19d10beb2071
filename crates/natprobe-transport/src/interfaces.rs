//! Local interface address lookup.
//!
//! The classifier only needs a yes/no answer to "is this IPv4 address bound
//! to one of this host's interfaces". [`SystemInterfaces`] answers it from
//! `getifaddrs` on unix and falls back to route probing elsewhere (or when
//! `getifaddrs` fails). Loopback addresses are never considered local.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use tracing::{debug, warn};

/// Predicate over this host's interface addresses
pub trait LocalInterfaces: Send + Sync {
    /// True iff `ip` is bound to a local network interface
    fn is_local_interface_address(&self, ip: Ipv4Addr) -> bool;
}

impl<F> LocalInterfaces for F
where
    F: Fn(Ipv4Addr) -> bool + Send + Sync,
{
    fn is_local_interface_address(&self, ip: Ipv4Addr) -> bool {
        self(ip)
    }
}

/// A fixed address list, for tests and manual overrides
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticInterfaces {
    addresses: Vec<Ipv4Addr>,
}

impl StaticInterfaces {
    /// Create from a list of addresses
    #[must_use]
    pub fn new(addresses: Vec<Ipv4Addr>) -> Self {
        Self { addresses }
    }

    /// The configured addresses
    #[must_use]
    pub fn addresses(&self) -> &[Ipv4Addr] {
        &self.addresses
    }
}

impl LocalInterfaces for StaticInterfaces {
    fn is_local_interface_address(&self, ip: Ipv4Addr) -> bool {
        self.addresses.contains(&ip)
    }
}

/// Interface lookup through the operating system.
///
/// Interfaces are enumerated on every query, so address changes between
/// runs are picked up.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl SystemInterfaces {
    /// Create a new lookup
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Non-loopback IPv4 addresses currently bound on this host
    #[must_use]
    pub fn addresses(&self) -> Vec<Ipv4Addr> {
        let found = match platform::interface_addresses() {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("Interface enumeration failed ({}), falling back to route probing", e);
                route_probe_addresses()
            }
        };

        let mut seen = HashSet::new();
        let addrs: Vec<Ipv4Addr> = found
            .into_iter()
            .filter(|ip| !ip.is_loopback() && !ip.is_unspecified())
            .filter(|ip| seen.insert(*ip))
            .collect();

        debug!("Local interface addresses: {:?}", addrs);
        addrs
    }
}

impl LocalInterfaces for SystemInterfaces {
    fn is_local_interface_address(&self, ip: Ipv4Addr) -> bool {
        if ip.is_loopback() {
            return false;
        }
        self.addresses().contains(&ip)
    }
}

/// Source addresses the routing table picks for a few well-known public
/// destinations. `connect` on UDP sends nothing.
fn route_probe_addresses() -> Vec<Ipv4Addr> {
    const TARGETS: [SocketAddrV4; 3] = [
        SocketAddrV4::new(Ipv4Addr::new(8, 8, 8, 8), 80),
        SocketAddrV4::new(Ipv4Addr::new(1, 1, 1, 1), 80),
        SocketAddrV4::new(Ipv4Addr::new(9, 9, 9, 9), 80),
    ];

    TARGETS
        .iter()
        .filter_map(|target| {
            let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0)).ok()?;
            socket.connect(target).ok()?;
            match socket.local_addr().ok()? {
                std::net::SocketAddr::V4(local) => Some(*local.ip()),
                std::net::SocketAddr::V6(_) => None,
            }
        })
        .collect()
}

#[cfg(unix)]
mod platform {
    use std::io;
    use std::net::Ipv4Addr;
    use std::ptr;

    pub(super) fn interface_addresses() -> io::Result<Vec<Ipv4Addr>> {
        let mut head: *mut libc::ifaddrs = ptr::null_mut();

        // SAFETY: getifaddrs writes a heap-allocated list head into `head` and
        // returns 0 on success. The list is released with freeifaddrs below.
        if unsafe { libc::getifaddrs(&mut head) } != 0 {
            return Err(io::Error::last_os_error());
        }

        let mut addrs = Vec::new();
        let mut cursor = head;
        while !cursor.is_null() {
            // SAFETY: `cursor` is a non-null node of the list returned by getifaddrs,
            // which stays valid until freeifaddrs.
            let entry = unsafe { &*cursor };

            if !entry.ifa_addr.is_null() {
                // SAFETY: ifa_addr is non-null and points to a sockaddr owned by the list.
                let family = i32::from(unsafe { (*entry.ifa_addr).sa_family });
                if family == libc::AF_INET {
                    // SAFETY: AF_INET entries carry a sockaddr_in.
                    let sin = unsafe { &*(entry.ifa_addr as *const libc::sockaddr_in) };
                    addrs.push(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)));
                }
            }

            cursor = entry.ifa_next;
        }

        // SAFETY: `head` came from a successful getifaddrs call and is freed once.
        unsafe { libc::freeifaddrs(head) };

        Ok(addrs)
    }
}

#[cfg(not(unix))]
mod platform {
    use std::io;
    use std::net::Ipv4Addr;

    pub(super) fn interface_addresses() -> io::Result<Vec<Ipv4Addr>> {
        Ok(super::route_probe_addresses())
    }
}
