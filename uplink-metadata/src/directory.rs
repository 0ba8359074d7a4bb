//! Node directory
//!
//! Where candidate storage nodes come from. The uplink never mutates
//! directory entries; it only filters and ranks them.

use crate::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashSet;
use uplink_core::{NodeDescriptor, NodeId};

/// Constraints on the nodes a directory returns
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    /// Nodes that must not be returned
    pub exclude: HashSet<NodeId>,
    /// Minimum directory reputation
    pub min_reputation: f64,
    /// Allowed regions; empty means any region
    pub regions: Vec<String>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude additional nodes
    pub fn excluding<'a>(mut self, nodes: impl IntoIterator<Item = &'a NodeId>) -> Self {
        self.exclude.extend(nodes.into_iter().cloned());
        self
    }

    pub fn with_min_reputation(mut self, min: f64) -> Self {
        self.min_reputation = min;
        self
    }

    pub fn in_regions(mut self, regions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    /// Check whether a node passes the filter
    pub fn matches(&self, node: &NodeDescriptor) -> bool {
        if self.exclude.contains(&node.id) || node.reputation < self.min_reputation {
            return false;
        }
        if self.regions.is_empty() {
            return true;
        }
        node.region
            .as_ref()
            .map(|r| self.regions.iter().any(|allowed| allowed == r))
            .unwrap_or(false)
    }
}

/// Source of candidate nodes
#[async_trait]
pub trait NodeDirectory: Send + Sync {
    /// Nodes passing `filter`
    async fn list_candidate_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeDescriptor>>;
}

/// Directory serving a fixed, editable node list
#[derive(Default)]
pub struct StaticNodeDirectory {
    nodes: RwLock<Vec<NodeDescriptor>>,
}

impl StaticNodeDirectory {
    pub fn new(nodes: Vec<NodeDescriptor>) -> Self {
        Self {
            nodes: RwLock::new(nodes),
        }
    }

    /// Add or replace a node
    pub fn upsert(&self, node: NodeDescriptor) {
        let mut nodes = self.nodes.write();
        match nodes.iter_mut().find(|n| n.id == node.id) {
            Some(existing) => *existing = node,
            None => nodes.push(node),
        }
    }

    /// Remove a node, returning whether it was present
    pub fn remove(&self, id: &NodeId) -> bool {
        let mut nodes = self.nodes.write();
        let before = nodes.len();
        nodes.retain(|n| &n.id != id);
        nodes.len() != before
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[async_trait]
impl NodeDirectory for StaticNodeDirectory {
    async fn list_candidate_nodes(&self, filter: &NodeFilter) -> Result<Vec<NodeDescriptor>> {
        Ok(self
            .nodes
            .read()
            .iter()
            .filter(|n| filter.matches(n))
            .cloned()
            .collect())
    }
}
