//! # Gateway Discovery
//!
//! Finds the address that anchors the local subnet sweep.
//!
//! Sources are tried in order: an explicitly configured gateway, the Linux
//! default route (`/proc/net/route`, little-endian hex), then the private
//! IPv4 of the best LAN interface.

use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::debug;

use crate::network::interface;
use crate::network::subnet::{ByteOrder, RawAddress};

#[cfg(target_os = "linux")]
const ROUTE_TABLE: &str = "/proc/net/route";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no usable IPv4 network interface found")]
    NoNetwork,
}

/// Supplies the gateway address for subnet discovery.
pub trait GatewaySource: Send + Sync {
    fn gateway(&self) -> Result<RawAddress, GatewayError>;
}

/// A gateway pinned by configuration or tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticGateway(pub Ipv4Addr);

impl GatewaySource for StaticGateway {
    fn gateway(&self) -> Result<RawAddress, GatewayError> {
        Ok(RawAddress::from(self.0))
    }
}

/// Reads the gateway from the host operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGateway;

impl GatewaySource for SystemGateway {
    fn gateway(&self) -> Result<RawAddress, GatewayError> {
        #[cfg(target_os = "linux")]
        {
            if let Some(raw) = default_route() {
                debug!(gateway = %raw.to_ipv4(), "using default route");
                return Ok(raw);
            }
        }

        let lan: Ipv4Addr = interface::lan_ipv4().ok_or(GatewayError::NoNetwork)?;
        debug!(address = %lan, "using LAN interface address");
        Ok(RawAddress::from(lan))
    }
}

#[cfg(target_os = "linux")]
fn default_route() -> Option<RawAddress> {
    let table: String = std::fs::read_to_string(ROUTE_TABLE).ok()?;
    parse_route_table(&table)
}

/// Picks the default route's gateway out of a `/proc/net/route` dump.
///
/// Columns are `Iface Destination Gateway Flags ...` with addresses in
/// little-endian hex.
pub fn parse_route_table(table: &str) -> Option<RawAddress> {
    table.lines().skip(1).find_map(|line| {
        let mut cols = line.split_whitespace();
        let _iface = cols.next()?;
        let destination = u32::from_str_radix(cols.next()?, 16).ok()?;
        let gateway = u32::from_str_radix(cols.next()?, 16).ok()?;

        (destination == 0 && gateway != 0).then(|| RawAddress::new(gateway, ByteOrder::LittleEndian))
    })
}
