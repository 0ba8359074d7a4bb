//! Node reputation
//!
//! Transfer outcomes feed back into selection. Scores blend the
//! directory-supplied reputation with the success ratio this uplink has
//! observed. Observations are halved whenever a node's count reaches the
//! window, so old bursts of failures fade as new outcomes arrive.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uplink_core::{NodeDescriptor, NodeId};

/// Scoring service consulted by the node selector
pub trait ReputationService: Send + Sync {
    /// Current score in [0, 1]
    fn score(&self, node: &NodeDescriptor) -> f64;

    /// A piece operation against `node` succeeded
    fn record_success(&self, node: &NodeId);

    /// A piece operation against `node` failed
    fn record_failure(&self, node: &NodeId);
}

const SUCCESS_UNIT: u64 = 1 << 32;
const FAILURE_MASK: u64 = SUCCESS_UNIT - 1;

/// Observations kept per node before older ones are halved
pub const DEFAULT_OBSERVATION_WINDOW: u32 = 64;

/// Outcome counters for one node.
///
/// Successes live in the high 32 bits and failures in the low 32 bits of a
/// single word, so a reader always sees a consistent pair.
#[derive(Default)]
struct Outcomes(AtomicU64);

impl Outcomes {
    fn load(&self) -> (u64, u64) {
        let word = self.0.load(Ordering::Acquire);
        (word >> 32, word & FAILURE_MASK)
    }

    /// Count one outcome; a window of 0 never decays
    fn record(&self, success: bool, window: u64) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                let (mut successes, mut failures) = (word >> 32, word & FAILURE_MASK);
                let counter = if success { &mut successes } else { &mut failures };
                // Saturate instead of carrying into the neighbouring counter
                if *counter == FAILURE_MASK {
                    return None;
                }
                *counter += 1;
                if window > 0 && successes + failures >= window {
                    successes /= 2;
                    failures /= 2;
                }
                Some(successes << 32 | failures)
            });
    }
}

/// Lock-light reputation tracker
pub struct AtomicReputation {
    outcomes: RwLock<HashMap<NodeId, Arc<Outcomes>>>,
    /// How many observations the directory score is worth
    prior_weight: f64,
    window: u64,
}

impl AtomicReputation {
    pub fn new(prior_weight: f64) -> Self {
        Self {
            outcomes: RwLock::new(HashMap::new()),
            prior_weight: prior_weight.max(0.0),
            window: DEFAULT_OBSERVATION_WINDOW as u64,
        }
    }

    /// Halve a node's observations once they reach `window`; 0 keeps them all
    pub fn with_window(mut self, window: u32) -> Self {
        self.window = window as u64;
        self
    }

    /// Observed (successes, failures) for a node
    pub fn observations(&self, node: &NodeId) -> (u64, u64) {
        self.outcomes
            .read()
            .get(node)
            .map(|o| o.load())
            .unwrap_or((0, 0))
    }

    fn entry(&self, node: &NodeId) -> Arc<Outcomes> {
        if let Some(o) = self.outcomes.read().get(node) {
            return o.clone();
        }
        self.outcomes
            .write()
            .entry(node.clone())
            .or_default()
            .clone()
    }
}

impl Default for AtomicReputation {
    fn default() -> Self {
        Self::new(10.0)
    }
}

impl ReputationService for AtomicReputation {
    fn score(&self, node: &NodeDescriptor) -> f64 {
        let (successes, failures) = self.observations(&node.id);
        let observed = (successes + failures) as f64;
        let weight = self.prior_weight + observed;
        if weight == 0.0 {
            return node.reputation;
        }
        ((node.reputation * self.prior_weight + successes as f64) / weight).clamp(0.0, 1.0)
    }

    fn record_success(&self, node: &NodeId) {
        self.entry(node).record(true, self.window);
    }

    fn record_failure(&self, node: &NodeId) {
        self.entry(node).record(false, self.window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unobserved_node_uses_directory_score() {
        let rep = AtomicReputation::default();
        let node = NodeDescriptor::new("n", "10.0.0.1:1").with_reputation(0.8);
        assert!((rep.score(&node) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_failures_lower_score() {
        let rep = AtomicReputation::default();
        let node = NodeDescriptor::new("n", "10.0.0.1:1");
        for _ in 0..10 {
            rep.record_failure(&node.id);
        }
        assert!((rep.score(&node) - 0.5).abs() < 1e-9);
        assert_eq!(rep.observations(&node.id), (0, 10));

        for _ in 0..10 {
            rep.record_success(&node.id);
        }
        assert!((rep.score(&node) - 20.0 / 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_prior_uses_observations_only() {
        let rep = AtomicReputation::new(0.0);
        let node = NodeDescriptor::new("n", "10.0.0.1:1").with_reputation(0.1);
        assert!((rep.score(&node) - 0.1).abs() < 1e-9);
        rep.record_success(&node.id);
        assert!((rep.score(&node) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_old_failures_decay() {
        let rep = AtomicReputation::new(10.0).with_window(20);
        let node = NodeDescriptor::new("n", "10.0.0.1:1");
        for _ in 0..10 {
            rep.record_failure(&node.id);
        }
        assert!(rep.score(&node) <= 0.5);

        for _ in 0..60 {
            rep.record_success(&node.id);
            let (successes, failures) = rep.observations(&node.id);
            assert!(successes + failures < 20);
        }
        // Without decay this would be (10 + 60) / 80
        assert_eq!(rep.observations(&node.id).1, 0);
        assert!(rep.score(&node) > 0.9);
    }

    #[test]
    fn test_zero_window_keeps_every_observation() {
        let rep = AtomicReputation::new(10.0).with_window(0);
        let id = NodeId::from("n");
        for _ in 0..500 {
            rep.record_failure(&id);
        }
        assert_eq!(rep.observations(&id), (0, 500));
    }

    #[test]
    fn test_concurrent_updates() {
        let rep = Arc::new(AtomicReputation::default().with_window(0));
        let id = NodeId::from("shared");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let rep = rep.clone();
                let id = id.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        if i % 2 == 0 {
                            rep.record_success(&id);
                        } else {
                            rep.record_failure(&id);
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(rep.observations(&id), (4000, 4000));
    }
}
