//! Storage node descriptors
//!
//! Supplied by a node directory and read-only to the uplink.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Storage node identity
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A storage node as advertised by the node directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Unique node identity
    pub id: NodeId,
    /// Piece-transfer address (e.g., "192.168.1.10:7777")
    pub address: String,
    /// Geographic region, if known
    #[serde(default)]
    pub region: Option<String>,
    /// Directory-supplied reputation/uptime score in [0.0, 1.0]
    pub reputation: f64,
}

impl NodeDescriptor {
    /// Create a descriptor with full reputation and no region
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(id),
            address: address.into(),
            region: None,
            reputation: 1.0,
        }
    }

    /// Set the region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Set the directory reputation (clamped to [0, 1])
    pub fn with_reputation(mut self, reputation: f64) -> Self {
        self.reputation = reputation.clamp(0.0, 1.0);
        self
    }

    /// Network the node lives in, used for diversity.
    ///
    /// IPv4 addresses collapse to their /24, IPv6 to their /64; hostnames
    /// are used as-is.
    pub fn network(&self) -> String {
        match self.address.parse::<SocketAddr>() {
            Ok(addr) => match addr.ip() {
                IpAddr::V4(ip) => {
                    let o = ip.octets();
                    format!("{}.{}.{}.0/24", o[0], o[1], o[2])
                }
                IpAddr::V6(ip) => {
                    let s = ip.segments();
                    format!("{:x}:{:x}:{:x}:{:x}::/64", s[0], s[1], s[2], s[3])
                }
            },
            Err(_) => self
                .address
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| self.address.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_ipv4() {
        let a = NodeDescriptor::new("a", "10.1.2.3:7777");
        let b = NodeDescriptor::new("b", "10.1.2.200:7778");
        let c = NodeDescriptor::new("c", "10.1.3.3:7777");
        assert_eq!(a.network(), "10.1.2.0/24");
        assert_eq!(a.network(), b.network());
        assert_ne!(a.network(), c.network());
    }

    #[test]
    fn test_network_hostname() {
        let n = NodeDescriptor::new("n", "node-7.example.net:7777");
        assert_eq!(n.network(), "node-7.example.net");
    }

    #[test]
    fn test_reputation_clamped() {
        let n = NodeDescriptor::new("n", "1.2.3.4:1").with_reputation(3.0);
        assert_eq!(n.reputation, 1.0);
    }
}
