//! Node selection
//!
//! Picks the storage nodes that receive a segment's pieces. Candidates are
//! ranked by reputation; among equally scored nodes the order is random
//! (seeded, so tests are reproducible) and nodes in networks or regions not
//! yet used by the selection go first.

use crate::reputation::ReputationService;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;
use uplink_core::{NodeDescriptor, NodeId, Result, UplinkError};

/// Selection policy
#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Prefer unused networks and regions among equally scored nodes
    pub diversity: bool,
    /// Largest share of a selection that may be unreliable nodes
    pub max_unreliable_fraction: f64,
    /// Score below which a node counts as unreliable
    pub unreliable_below: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            diversity: true,
            max_unreliable_fraction: 0.1,
            unreliable_below: 0.5,
        }
    }
}

/// Chooses target nodes for piece uploads
pub struct NodeSelector {
    config: SelectorConfig,
    reputation: Arc<dyn ReputationService>,
    rng: Mutex<StdRng>,
}

struct Ranked<'a> {
    node: &'a NodeDescriptor,
    tier: i64,
    unreliable: bool,
    network: String,
}

impl NodeSelector {
    /// Create a selector; `seed` fixes the tie-breaking order
    pub fn new(
        config: SelectorConfig,
        reputation: Arc<dyn ReputationService>,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            reputation,
            rng: Mutex::new(rng),
        }
    }

    /// Select `count` distinct nodes from `candidates`, skipping `excluded`.
    ///
    /// Fails with `InsufficientNodes` when fewer than `count` eligible nodes
    /// remain after exclusion and the unreliable-node cap.
    pub fn select(
        &self,
        candidates: &[NodeDescriptor],
        count: usize,
        excluded: &HashSet<NodeId>,
    ) -> Result<Vec<NodeDescriptor>> {
        let mut seen = HashSet::new();
        let mut eligible: Vec<&NodeDescriptor> = candidates
            .iter()
            .filter(|n| !excluded.contains(&n.id) && seen.insert(n.id.clone()))
            .collect();

        if eligible.len() < count {
            return Err(UplinkError::InsufficientNodes {
                available: eligible.len(),
                required: count,
            });
        }

        eligible.shuffle(&mut *self.rng.lock());

        let mut ranked: Vec<Ranked<'_>> = eligible
            .into_iter()
            .map(|node| {
                let score = self.reputation.score(node);
                Ranked {
                    node,
                    tier: (score * 100.0).round() as i64,
                    unreliable: score < self.config.unreliable_below,
                    network: node.network(),
                }
            })
            .collect();
        // Stable: shuffled order survives within a tier
        ranked.sort_by(|a, b| b.tier.cmp(&a.tier));

        let max_unreliable = (self.config.max_unreliable_fraction * count as f64).floor() as usize;
        let mut unreliable_used = 0;
        let mut networks: HashMap<String, usize> = HashMap::new();
        let mut regions: HashMap<String, usize> = HashMap::new();
        let mut selected = Vec::with_capacity(count);

        let mut start = 0;
        while start < ranked.len() && selected.len() < count {
            let tier = ranked[start].tier;
            let end = ranked[start..]
                .iter()
                .position(|r| r.tier != tier)
                .map(|p| start + p)
                .unwrap_or(ranked.len());

            let mut pool: Vec<&Ranked<'_>> = ranked[start..end].iter().collect();
            while !pool.is_empty() && selected.len() < count {
                let pick = if self.config.diversity {
                    least_used(&pool, &networks, &regions)
                } else {
                    0
                };
                let candidate = pool.remove(pick);

                if candidate.unreliable {
                    if unreliable_used >= max_unreliable {
                        continue;
                    }
                    unreliable_used += 1;
                }

                *networks.entry(candidate.network.clone()).or_default() += 1;
                if let Some(region) = &candidate.node.region {
                    *regions.entry(region.clone()).or_default() += 1;
                }
                selected.push(candidate.node.clone());
            }

            start = end;
        }

        if selected.len() < count {
            return Err(UplinkError::InsufficientNodes {
                available: selected.len(),
                required: count,
            });
        }

        debug!(
            count,
            networks = networks.len(),
            unreliable = unreliable_used,
            "Nodes selected"
        );
        Ok(selected)
    }
}

/// Index of the first pool entry whose network, then region, is least used
fn least_used(
    pool: &[&Ranked<'_>],
    networks: &HashMap<String, usize>,
    regions: &HashMap<String, usize>,
) -> usize {
    let usage = |r: &Ranked<'_>| {
        let net = networks.get(&r.network).copied().unwrap_or(0);
        let region = r
            .node
            .region
            .as_ref()
            .and_then(|g| regions.get(g))
            .copied()
            .unwrap_or(0);
        (net, region)
    };

    let mut best = 0;
    let mut best_usage = usage(pool[0]);
    for (i, r) in pool.iter().enumerate().skip(1) {
        if best_usage == (0, 0) {
            break;
        }
        let u = usage(*r);
        if u < best_usage {
            best = i;
            best_usage = u;
        }
    }
    best
}
