//! Subnet sweep helpers for WebSocket "discover all"

use std::net::Ipv4Addr;

/// An IPv4 network given as a host address plus prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Subnet {
    /// Build from the configured client address and netmask bits.
    ///
    /// Returns `None` for an unparsable address or a prefix outside 8..=30,
    /// which would either sweep millions of hosts or none at all.
    pub fn from_client(client_ip: &str, netmask: u8) -> Option<Self> {
        let ip: Ipv4Addr = client_ip.trim().parse().ok()?;
        if !(8..=30).contains(&netmask) {
            return None;
        }
        let mask = u32::MAX << (32 - u32::from(netmask));
        Some(Self {
            network: Ipv4Addr::from(u32::from(ip) & mask),
            prefix_len: netmask,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Usable host addresses (network and broadcast excluded), at most `cap`
    pub fn hosts(&self, cap: usize) -> Vec<Ipv4Addr> {
        let base = u32::from(self.network);
        let size = 1u32 << (32 - u32::from(self.prefix_len));
        (1..size - 1)
            .take(cap)
            .map(|offset| Ipv4Addr::from(base + offset))
            .collect()
    }
}
