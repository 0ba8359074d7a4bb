//! In-memory node network
//!
//! A set of simulated storage nodes living in the process, with per-node
//! fault injection. Used by tests and local development in place of
//! [`TcpTransport`](crate::TcpTransport).

use crate::transport::PieceTransport;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uplink_core::{NodeDescriptor, NodeId, PieceId, Result, UplinkError};

/// Behaviour injected into a simulated node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFault {
    /// Healthy
    None,
    /// Every request fails with a retryable error
    Offline,
    /// The next `remaining` requests fail with a retryable error
    Flaky { remaining: u32 },
    /// Every request is rejected as unauthorized
    RejectAuth,
    /// Stores normally, but returns flipped bytes on read
    Corrupt,
    /// Delays every request before serving it
    Latency(Duration),
}

struct SimulatedNode {
    descriptor: NodeDescriptor,
    pieces: HashMap<PieceId, Bytes>,
    fault: NodeFault,
}

enum Admission {
    Serve,
    Corrupt,
    Delay(Duration),
    Fail(UplinkError),
}

/// In-process storage nodes
pub struct MemoryNetwork {
    nodes: RwLock<HashMap<NodeId, SimulatedNode>>,
    puts: AtomicU64,
    gets: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryNetwork {
    /// Create an empty network
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            puts: AtomicU64::new(0),
            gets: AtomicU64::new(0),
            deletes: AtomicU64::new(0),
        }
    }

    /// Create a network of `count` healthy nodes named `node-0..`
    pub fn with_nodes(count: usize) -> Self {
        let network = Self::new();
        for i in 0..count {
            network.add_node(format!("node-{}", i));
        }
        network
    }

    /// Add a healthy node with a synthetic address in its own /24
    pub fn add_node(&self, id: impl Into<String>) -> NodeDescriptor {
        let n = self.nodes.read().len();
        let address = format!("10.{}.{}.1:7777", (n / 256) % 256, n % 256);
        let descriptor = NodeDescriptor::new(id, address);
        self.add_descriptor(descriptor.clone());
        descriptor
    }

    /// Add a node with an explicit descriptor
    pub fn add_descriptor(&self, descriptor: NodeDescriptor) {
        self.nodes.write().insert(
            descriptor.id.clone(),
            SimulatedNode {
                descriptor,
                pieces: HashMap::new(),
                fault: NodeFault::None,
            },
        );
    }

    /// Descriptors of every node, in id order
    pub fn descriptors(&self) -> Vec<NodeDescriptor> {
        let mut out: Vec<_> = self
            .nodes
            .read()
            .values()
            .map(|n| n.descriptor.clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Inject a fault into a node
    pub fn set_fault(&self, node: &NodeId, fault: NodeFault) {
        if let Some(n) = self.nodes.write().get_mut(node) {
            n.fault = fault;
        }
    }

    /// Return every node to healthy
    pub fn clear_faults(&self) {
        for node in self.nodes.write().values_mut() {
            node.fault = NodeFault::None;
        }
    }

    /// Drop a stored piece behind the uplink's back
    pub fn remove_piece(&self, node: &NodeId, piece_id: &PieceId) -> bool {
        self.nodes
            .write()
            .get_mut(node)
            .map(|n| n.pieces.remove(piece_id).is_some())
            .unwrap_or(false)
    }

    /// Check whether a node holds a piece
    pub fn has_piece(&self, node: &NodeId, piece_id: &PieceId) -> bool {
        self.nodes
            .read()
            .get(node)
            .map(|n| n.pieces.contains_key(piece_id))
            .unwrap_or(false)
    }

    /// Pieces held by one node
    pub fn piece_count(&self, node: &NodeId) -> usize {
        self.nodes.read().get(node).map(|n| n.pieces.len()).unwrap_or(0)
    }

    /// Pieces held across the network
    pub fn total_pieces(&self) -> usize {
        self.nodes.read().values().map(|n| n.pieces.len()).sum()
    }

    /// Put attempts received, including failed ones
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Get attempts received, including failed ones
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::Relaxed)
    }

    /// Delete attempts received, including failed ones
    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    /// Decide how a request to `node` is treated, consuming one flaky failure
    fn admit(&self, node: &NodeId) -> Admission {
        let mut nodes = self.nodes.write();
        let Some(n) = nodes.get_mut(node) else {
            return Admission::Fail(UplinkError::transfer(node.as_str(), "unknown node", true));
        };

        match &mut n.fault {
            NodeFault::None => Admission::Serve,
            NodeFault::Offline => {
                Admission::Fail(UplinkError::transfer(node.as_str(), "node offline", true))
            }
            NodeFault::Flaky { remaining } if *remaining > 0 => {
                *remaining -= 1;
                Admission::Fail(UplinkError::transfer(node.as_str(), "connection reset", true))
            }
            NodeFault::Flaky { .. } => Admission::Serve,
            NodeFault::RejectAuth => Admission::Fail(UplinkError::transfer(
                node.as_str(),
                "Unauthorized: invalid token",
                false,
            )),
            NodeFault::Corrupt => Admission::Corrupt,
            NodeFault::Latency(d) => Admission::Delay(*d),
        }
    }

    /// Apply the node's fault, sleeping outside the lock when delayed.
    /// Returns whether reads should be corrupted.
    async fn enter(&self, node: &NodeId) -> Result<bool> {
        match self.admit(node) {
            Admission::Serve => Ok(false),
            Admission::Corrupt => Ok(true),
            Admission::Delay(d) => {
                tokio::time::sleep(d).await;
                Ok(false)
            }
            Admission::Fail(e) => Err(e),
        }
    }
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PieceTransport for MemoryNetwork {
    async fn put(&self, node: &NodeDescriptor, piece_id: PieceId, data: Bytes) -> Result<()> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        self.enter(&node.id).await?;

        let mut nodes = self.nodes.write();
        let n = nodes
            .get_mut(&node.id)
            .ok_or_else(|| UplinkError::transfer(node.id.as_str(), "unknown node", true))?;
        n.pieces.insert(piece_id, data);
        Ok(())
    }

    async fn get(&self, node: &NodeDescriptor, piece_id: PieceId) -> Result<Bytes> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let corrupt = self.enter(&node.id).await?;

        let data = {
            let nodes = self.nodes.read();
            let n = nodes
                .get(&node.id)
                .ok_or_else(|| UplinkError::transfer(node.id.as_str(), "unknown node", true))?;
            n.pieces.get(&piece_id).cloned().ok_or_else(|| {
                UplinkError::NotFound(format!("piece {} on node {}", piece_id, node.id))
            })?
        };

        if !corrupt {
            return Ok(data);
        }
        let mut flipped = BytesMut::from(&data[..]);
        match flipped.first_mut() {
            Some(b) => *b ^= 0xFF,
            None => flipped.extend_from_slice(&[0xFF]),
        }
        Ok(flipped.freeze())
    }

    async fn delete(&self, node: &NodeDescriptor, piece_id: PieceId) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        self.enter(&node.id).await?;

        if let Some(n) = self.nodes.write().get_mut(&node.id) {
            n.pieces.remove(&piece_id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_fetch() {
        let network = MemoryNetwork::with_nodes(2);
        let nodes = network.descriptors();
        let piece = PieceId::from_bytes([4u8; 32]);

        network
            .put(&nodes[0], piece, Bytes::from_static(b"data"))
            .await
            .unwrap();
        assert_eq!(&network.get(&nodes[0], piece).await.unwrap()[..], b"data");
        assert!(matches!(
            network.get(&nodes[1], piece).await,
            Err(UplinkError::NotFound(_))
        ));
        assert_eq!(network.total_pieces(), 1);
    }

    #[test]
    fn test_nodes_in_distinct_networks() {
        let network = MemoryNetwork::with_nodes(300);
        let mut networks: Vec<_> = network.descriptors().iter().map(|d| d.network()).collect();
        networks.sort();
        networks.dedup();
        assert_eq!(networks.len(), 300);
    }

    #[tokio::test]
    async fn test_flaky_recovers() {
        let network = MemoryNetwork::new();
        let node = network.add_node("n");
        network.set_fault(&node.id, NodeFault::Flaky { remaining: 1 });
        let piece = PieceId::from_bytes([1u8; 32]);

        assert!(network.put(&node, piece, Bytes::new()).await.is_err());
        assert!(network.put(&node, piece, Bytes::new()).await.is_ok());
        assert_eq!(network.put_count(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_reads() {
        let network = MemoryNetwork::new();
        let node = network.add_node("n");
        let piece = PieceId::from_bytes([1u8; 32]);
        network
            .put(&node, piece, Bytes::from_static(&[1, 2, 3]))
            .await
            .unwrap();

        network.set_fault(&node.id, NodeFault::Corrupt);
        let data = network.get(&node, piece).await.unwrap();
        assert_ne!(&data[..], &[1, 2, 3]);

        network.clear_faults();
        let data = network.get(&node, piece).await.unwrap();
        assert_eq!(&data[..], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unknown_node_is_retryable() {
        let network = MemoryNetwork::new();
        let ghost = NodeDescriptor::new("ghost", "10.9.9.9:1");
        let err = network
            .get(&ghost, PieceId::from_bytes([0u8; 32]))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
