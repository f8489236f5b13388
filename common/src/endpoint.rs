//! # Endpoint Model
//!
//! An [`Endpoint`] names a potential message receiver: an IPv4 address string
//! paired with the process-wide TCP port.
//!
//! Endpoints compare equal by their address string. Ordering is numeric on the
//! parsed IPv4 address so that sets of endpoints iterate by host octet
//! (`.2` before `.10`), which keeps "first reachable wins" reproducible.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

#[derive(Debug, Clone)]
pub struct Endpoint {
    address: String,
    port: u16,
}

impl Endpoint {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into().trim().to_string(),
            port,
        }
    }

    pub fn from_ipv4(ip: Ipv4Addr, port: u16) -> Self {
        Self {
            address: ip.to_string(),
            port,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Parses the address as a dotted-quad IPv4 literal.
    pub fn ipv4(&self) -> Option<Ipv4Addr> {
        self.address.parse().ok()
    }

    /// The socket address when the endpoint holds an IPv4 literal.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ipv4()
            .map(|ip| SocketAddr::V4(SocketAddrV4::new(ip, self.port)))
    }

    /// Last octet of the address, if it is an IPv4 literal.
    pub fn host_octet(&self) -> Option<u8> {
        self.ipv4().map(|ip| ip.octets()[3])
    }

    pub fn is_empty(&self) -> bool {
        self.address.is_empty()
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl Ord for Endpoint {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.ipv4(), other.ipv4()) {
            (Some(a), Some(b)) => a.cmp(&b),
            // literals sort before unparsed names
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.address.cmp(&other.address),
        }
    }
}

impl PartialOrd for Endpoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}
