//! Typed STUN attributes.
//!
//! Only IPv4 address attributes are understood. An address attribute with
//! another family, or with a value shorter than 8 bytes, decodes to
//! [`StunAttribute::Unknown`] so that callers never see a half-parsed address.

use crate::MAGIC_COOKIE;
use crate::message::RawAttribute;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};

/// MAPPED-ADDRESS (RFC 3489)
pub const ATTR_MAPPED_ADDRESS: u16 = 0x0001;
/// CHANGE-REQUEST (RFC 3489)
pub const ATTR_CHANGE_REQUEST: u16 = 0x0003;
/// SOURCE-ADDRESS (RFC 3489)
pub const ATTR_SOURCE_ADDRESS: u16 = 0x0004;
/// CHANGED-ADDRESS (RFC 3489)
pub const ATTR_CHANGED_ADDRESS: u16 = 0x0005;
/// XOR-MAPPED-ADDRESS (RFC 5389)
pub const ATTR_XOR_MAPPED_ADDRESS: u16 = 0x0020;

const FAMILY_IPV4: u8 = 0x01;
const ADDRESS_VALUE_LEN: usize = 8;

const CHANGE_IP_FLAG: u32 = 0x04;
const CHANGE_PORT_FLAG: u32 = 0x02;

/// An IPv4 transport address as carried by the STUN address attributes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappedEndpoint {
    /// IPv4 address
    pub ip: Ipv4Addr,
    /// UDP port
    pub port: u16,
}

impl MappedEndpoint {
    /// Create a new endpoint
    #[must_use]
    pub const fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }

    /// Decode the literal `reserved | family | port | address` layout
    fn from_value(value: &[u8]) -> Option<Self> {
        if value.len() < ADDRESS_VALUE_LEN || value[1] != FAMILY_IPV4 {
            return None;
        }
        let port = u16::from_be_bytes([value[2], value[3]]);
        let ip = Ipv4Addr::new(value[4], value[5], value[6], value[7]);
        Some(Self { ip, port })
    }

    fn to_value(self) -> [u8; ADDRESS_VALUE_LEN] {
        let port = self.port.to_be_bytes();
        let ip = self.ip.octets();
        [0, FAMILY_IPV4, port[0], port[1], ip[0], ip[1], ip[2], ip[3]]
    }
}

impl fmt::Display for MappedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

impl From<SocketAddrV4> for MappedEndpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(*addr.ip(), addr.port())
    }
}

impl From<MappedEndpoint> for SocketAddrV4 {
    fn from(endpoint: MappedEndpoint) -> Self {
        SocketAddrV4::new(endpoint.ip, endpoint.port)
    }
}

/// Apply the XOR-MAPPED-ADDRESS obfuscation.
///
/// The port is XORed with the upper 16 bits of the magic cookie and the
/// address with the whole cookie. The transform is its own inverse, so the
/// same function encodes and decodes.
#[must_use]
pub fn xor_endpoint(endpoint: MappedEndpoint) -> MappedEndpoint {
    let ip = Ipv4Addr::from(u32::from(endpoint.ip) ^ MAGIC_COOKIE);
    let port = endpoint.port ^ (MAGIC_COOKIE >> 16) as u16;
    MappedEndpoint { ip, port }
}

/// CHANGE-REQUEST flags
///
/// Asks the server to send its response from a different IP and/or port
/// than the one the request arrived on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Respond from the alternate IP address
    pub change_ip: bool,
    /// Respond from the alternate port
    pub change_port: bool,
}

impl ChangeRequest {
    /// No change requested
    pub const NONE: Self = Self {
        change_ip: false,
        change_port: false,
    };

    /// Create a new flag pair
    #[must_use]
    pub const fn new(change_ip: bool, change_port: bool) -> Self {
        Self {
            change_ip,
            change_port,
        }
    }

    /// Whether neither flag is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.change_ip && !self.change_port
    }

    /// Wire value of the attribute (bit 0x04 change-IP, bit 0x02 change-port)
    #[must_use]
    pub const fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.change_ip {
            flags |= CHANGE_IP_FLAG;
        }
        if self.change_port {
            flags |= CHANGE_PORT_FLAG;
        }
        flags
    }

    /// Decode from the wire value, ignoring unknown bits
    #[must_use]
    pub const fn from_flags(flags: u32) -> Self {
        Self {
            change_ip: flags & CHANGE_IP_FLAG != 0,
            change_port: flags & CHANGE_PORT_FLAG != 0,
        }
    }
}

/// STUN attribute types understood by natprobe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StunAttribute {
    /// MAPPED-ADDRESS (0x0001)
    MappedAddress(MappedEndpoint),
    /// CHANGE-REQUEST (0x0003)
    ChangeRequest(ChangeRequest),
    /// SOURCE-ADDRESS (0x0004) - where the server sent the response from
    SourceAddress(MappedEndpoint),
    /// CHANGED-ADDRESS (0x0005) - the server's alternate IP and port
    ChangedAddress(MappedEndpoint),
    /// XOR-MAPPED-ADDRESS (0x0020), stored de-obfuscated
    XorMappedAddress(MappedEndpoint),
    /// Anything else, or a recognised type with an unusable value
    Unknown(u16, Vec<u8>),
}

impl StunAttribute {
    /// Attribute type code
    #[must_use]
    pub fn attr_type(&self) -> u16 {
        match self {
            Self::MappedAddress(_) => ATTR_MAPPED_ADDRESS,
            Self::ChangeRequest(_) => ATTR_CHANGE_REQUEST,
            Self::SourceAddress(_) => ATTR_SOURCE_ADDRESS,
            Self::ChangedAddress(_) => ATTR_CHANGED_ADDRESS,
            Self::XorMappedAddress(_) => ATTR_XOR_MAPPED_ADDRESS,
            Self::Unknown(t, _) => *t,
        }
    }

    /// Interpret a raw TLV
    #[must_use]
    pub fn decode(raw: &RawAttribute) -> Self {
        let value = raw.value.as_slice();
        let decoded = match raw.attr_type {
            ATTR_MAPPED_ADDRESS => MappedEndpoint::from_value(value).map(Self::MappedAddress),
            ATTR_SOURCE_ADDRESS => MappedEndpoint::from_value(value).map(Self::SourceAddress),
            ATTR_CHANGED_ADDRESS => MappedEndpoint::from_value(value).map(Self::ChangedAddress),
            ATTR_XOR_MAPPED_ADDRESS => MappedEndpoint::from_value(value)
                .map(xor_endpoint)
                .map(Self::XorMappedAddress),
            ATTR_CHANGE_REQUEST if value.len() >= 4 => {
                let flags = u32::from_be_bytes([value[0], value[1], value[2], value[3]]);
                Some(Self::ChangeRequest(ChangeRequest::from_flags(flags)))
            }
            _ => None,
        };
        decoded.unwrap_or_else(|| Self::Unknown(raw.attr_type, raw.value.clone()))
    }

    /// Encode into a raw TLV (padding is applied by the message encoder)
    #[must_use]
    pub fn to_raw(&self) -> RawAttribute {
        let value = match self {
            Self::MappedAddress(ep) | Self::SourceAddress(ep) | Self::ChangedAddress(ep) => {
                ep.to_value().to_vec()
            }
            Self::XorMappedAddress(ep) => xor_endpoint(*ep).to_value().to_vec(),
            Self::ChangeRequest(change) => change.flags().to_be_bytes().to_vec(),
            Self::Unknown(_, data) => data.clone(),
        };
        RawAttribute::new(self.attr_type(), value)
    }
}
