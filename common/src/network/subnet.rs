//! # Address Generator
//!
//! Derives the candidate hosts of the local `/24` from a gateway (or DNS)
//! address as the platform network layer hands it over.
//!
//! Platforms disagree on byte order: Linux routing tables and Android DHCP
//! info deliver the address little-endian, while `Ipv4Addr` conversions are
//! big-endian. [`RawAddress`] carries the order so the generator can normalize
//! before masking.

use std::net::Ipv4Addr;

use crate::endpoint::Endpoint;

const PREFIX_MASK: u32 = 0xFFFF_FF00;
const FIRST_HOST: u8 = 1;
const LAST_HOST: u8 = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// Most significant octet first (network order).
    BigEndian,
    /// Least significant octet first, e.g. `/proc/net/route`.
    LittleEndian,
}

/// A 32-bit IPv4 address exactly as delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAddress {
    pub bits: u32,
    pub order: ByteOrder,
}

impl RawAddress {
    pub fn new(bits: u32, order: ByteOrder) -> Self {
        Self { bits, order }
    }

    pub fn to_ipv4(self) -> Ipv4Addr {
        match self.order {
            ByteOrder::BigEndian => Ipv4Addr::from(self.bits),
            ByteOrder::LittleEndian => Ipv4Addr::from(self.bits.to_le_bytes()),
        }
    }
}

impl From<Ipv4Addr> for RawAddress {
    fn from(ip: Ipv4Addr) -> Self {
        Self::new(u32::from(ip), ByteOrder::BigEndian)
    }
}

/// Returns the 254 usable host endpoints of the `/24` containing `gateway`,
/// ordered by host octet.
///
/// Network and broadcast addresses are excluded. An address that cannot
/// anchor a subnet (unspecified, broadcast or multicast) yields nothing.
pub fn candidates(gateway: RawAddress, port: u16) -> Vec<Endpoint> {
    let ip: Ipv4Addr = gateway.to_ipv4();
    if !is_usable_anchor(ip) {
        return Vec::new();
    }

    let prefix: u32 = u32::from(ip) & PREFIX_MASK;
    (FIRST_HOST..=LAST_HOST)
        .map(|host| Endpoint::from_ipv4(Ipv4Addr::from(prefix | u32::from(host)), port))
        .collect()
}

/// Shorthand for an address already in host order.
pub fn candidates_for(gateway: Ipv4Addr, port: u16) -> Vec<Endpoint> {
    candidates(RawAddress::from(gateway), port)
}

/// Whether `ip` lies inside the `/24` of `anchor`.
pub fn same_prefix(anchor: Ipv4Addr, ip: Ipv4Addr) -> bool {
    u32::from(anchor) & PREFIX_MASK == u32::from(ip) & PREFIX_MASK
}

fn is_usable_anchor(ip: Ipv4Addr) -> bool {
    !(ip.is_unspecified() || ip.is_broadcast() || ip.is_multicast())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_candidate_shares_the_gateway_prefix() {
        let gateway = Ipv4Addr::new(192, 168, 1, 1);
        let list = candidates_for(gateway, 8000);

        assert_eq!(list.len(), 254);
        for ep in &list {
            let ip = ep.ipv4().unwrap();
            assert!(same_prefix(gateway, ip), "{ip} escaped the /24");
            assert!((1..=254).contains(&ip.octets()[3]));
            assert_eq!(ep.port(), 8000);
        }
    }

    #[test]
    fn network_and_broadcast_are_excluded() {
        let list = candidates_for(Ipv4Addr::new(10, 0, 7, 200), 8000);

        assert_eq!(list.first().unwrap().address(), "10.0.7.1");
        assert_eq!(list.last().unwrap().address(), "10.0.7.254");
        assert!(!list.iter().any(|e| e.address() == "10.0.7.0"));
        assert!(!list.iter().any(|e| e.address() == "10.0.7.255"));
    }

    #[test]
    fn little_endian_input_is_normalized() {
        // 192.168.1.1 as Android's DhcpInfo.dns1 / /proc/net/route hex "0101A8C0"
        let raw = RawAddress::new(0x0101_A8C0, ByteOrder::LittleEndian);
        assert_eq!(raw.to_ipv4(), Ipv4Addr::new(192, 168, 1, 1));

        let list = candidates(raw, 8000);
        assert_eq!(list.len(), 254);
        assert_eq!(list[41].address(), "192.168.1.42");
    }

    #[test]
    fn big_endian_input_is_taken_as_is() {
        let raw = RawAddress::new(0xC0A8_0101, ByteOrder::BigEndian);
        assert_eq!(raw.to_ipv4(), Ipv4Addr::new(192, 168, 1, 1));
    }

    #[test]
    fn malformed_anchor_yields_no_candidates() {
        assert!(candidates_for(Ipv4Addr::UNSPECIFIED, 8000).is_empty());
        assert!(candidates_for(Ipv4Addr::BROADCAST, 8000).is_empty());
        assert!(candidates_for(Ipv4Addr::new(224, 0, 0, 251), 8000).is_empty());
    }
}
