// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Leiden Community Detection Algorithm
//!
//! Splits entity components that exceed the network size cap. Leiden improves
//! on Louvain by refining every community into well-connected sub-communities
//! before aggregation.
//!
//! ## Algorithm Overview
//!
//! 1. **Local Moving Phase**: Move nodes between communities to maximize modularity
//! 2. **Refinement Phase**: Merge singletons only with neighbours inside their community
//! 3. **Aggregation Phase**: Collapse refined communities into super-nodes
//! 4. **Repeat**: Until every super-node is its own community
//!
//! ## Modularity
//!
//! Q = (1/2m) * Σij[Aij - γ(ki*kj)/(2m)] * δ(ci, cj)
//!
//! Where:
//! - Aij = edge weight between i and j
//! - ki, kj = weighted degree of nodes i, j
//! - m = total edge weight
//! - γ = resolution
//!
//! Reference: Traag et al., "From Louvain to Leiden: guaranteeing well-connected communities"
//! https://www.nature.com/articles/s41598-019-41695-z

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeMap, HashMap, VecDeque};
use tracing::trace;

const EPSILON: f64 = 1e-12;

/// Leiden clustering configuration
#[derive(Debug, Clone)]
pub struct LeidenConfig {
    /// Resolution parameter (higher = more communities)
    pub resolution: f64,
    /// Maximum move/refine/aggregate rounds
    pub max_iterations: usize,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
}

impl Default for LeidenConfig {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            max_iterations: 100,
            seed: Some(42),
        }
    }
}

/// Undirected weighted graph in adjacency-list form
#[derive(Debug, Clone, Default)]
pub struct WeightedGraph {
    adjacency: Vec<Vec<(usize, f64)>>,
    node_weights: Vec<f64>,
}

impl WeightedGraph {
    /// Build from an edge list; parallel edges are summed, self loops dropped
    pub fn from_edges(
        node_count: usize,
        edges: impl IntoIterator<Item = (usize, usize, f64)>,
    ) -> Self {
        let mut maps: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); node_count];
        for (a, b, w) in edges {
            if a == b {
                continue;
            }
            *maps[a].entry(b).or_default() += w;
            *maps[b].entry(a).or_default() += w;
        }
        Self::from_maps(maps, None)
    }

    fn from_maps(maps: Vec<BTreeMap<usize, f64>>, node_weights: Option<Vec<f64>>) -> Self {
        let adjacency: Vec<Vec<(usize, f64)>> = maps
            .into_iter()
            .map(|m| m.into_iter().collect())
            .collect();
        let node_weights = node_weights.unwrap_or_else(|| {
            adjacency
                .iter()
                .map(|row| row.iter().map(|(_, w)| w).sum())
                .collect()
        });
        Self {
            adjacency,
            node_weights,
        }
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Twice the total edge weight (2m)
    pub fn total_node_weight(&self) -> f64 {
        self.node_weights.iter().sum()
    }

    /// Collapse nodes sharing a group id into one node each
    fn aggregate(&self, groups: &[usize], group_count: usize) -> WeightedGraph {
        let mut maps: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); group_count];
        let mut weights = vec![0.0; group_count];
        for (node, row) in self.adjacency.iter().enumerate() {
            let a = groups[node];
            weights[a] += self.node_weights[node];
            for &(neighbor, w) in row {
                let b = groups[neighbor];
                if a != b {
                    *maps[a].entry(b).or_default() += w;
                }
            }
        }
        Self::from_maps(maps, Some(weights))
    }
}

/// Leiden community detection algorithm
pub struct LeidenClustering {
    config: LeidenConfig,
}

impl Default for LeidenClustering {
    fn default() -> Self {
        Self::new()
    }
}

impl LeidenClustering {
    /// Create new Leiden clustering with default config
    pub fn new() -> Self {
        Self {
            config: LeidenConfig::default(),
        }
    }

    /// Create with custom config
    pub fn with_config(config: LeidenConfig) -> Self {
        Self { config }
    }

    /// Run Leiden on `graph`.
    ///
    /// Returns the community of every node, numbered contiguously from 0 in
    /// order of first appearance.
    pub fn detect_communities(&self, graph: &WeightedGraph) -> Vec<usize> {
        let n = graph.len();
        if n == 0 {
            return Vec::new();
        }

        let two_m = graph.total_node_weight();
        if two_m <= 0.0 {
            // No edges, each node is its own community
            return (0..n).collect();
        }

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut level = graph.clone();
        // original node -> node of the current level
        let mut membership: Vec<usize> = (0..n).collect();
        // node of the current level -> community
        let mut communities: Vec<usize> = (0..n).collect();

        for iteration in 0..self.config.max_iterations {
            // Phase 1: Local moving
            let improved = self.local_moving_phase(&level, &mut communities, two_m, &mut rng);
            let (renumbered, community_count) = renumber_communities(&communities);
            communities = renumbered;
            trace!(
                iteration,
                improved,
                nodes = level.len(),
                community_count,
                "Leiden local moving"
            );

            if community_count == level.len() {
                break;
            }

            // Phase 2: Refinement
            let refined = self.refinement_phase(&level, &communities, two_m, &mut rng);
            let (mut refined, mut refined_count) = renumber_communities(&refined);
            if refined_count == level.len() {
                // Nothing merged; aggregate whole communities so the level shrinks
                refined = communities.clone();
                refined_count = community_count;
            }

            // Phase 3: Aggregation
            let next = level.aggregate(&refined, refined_count);
            let mut next_communities = vec![0; refined_count];
            for (node, &group) in refined.iter().enumerate() {
                next_communities[group] = communities[node];
            }
            for m in membership.iter_mut() {
                *m = refined[*m];
            }
            level = next;
            communities = next_communities;
        }

        let result: Vec<usize> = membership.iter().map(|&m| communities[m]).collect();
        renumber_communities(&result).0
    }

    /// Local moving phase: move nodes to the neighbouring community with the
    /// best modularity gain until no node moves
    fn local_moving_phase<R: Rng>(
        &self,
        graph: &WeightedGraph,
        communities: &mut [usize],
        two_m: f64,
        rng: &mut R,
    ) -> bool {
        let n = graph.len();
        let mut community_weight = vec![0.0; n];
        let mut community_size = vec![0usize; n];
        for (node, &c) in communities.iter().enumerate() {
            community_weight[c] += graph.node_weights[node];
            community_size[c] += 1;
        }
        let mut empty: Vec<usize> = (0..n).filter(|&c| community_size[c] == 0).collect();

        // Random order for visiting nodes
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);
        let mut queue: VecDeque<usize> = order.into();
        let mut queued = vec![true; n];

        let mut improved = false;
        let mut links: BTreeMap<usize, f64> = BTreeMap::new();

        while let Some(node) = queue.pop_front() {
            queued[node] = false;
            let current = communities[node];
            let k = graph.node_weights[node];

            links.clear();
            for &(neighbor, w) in &graph.adjacency[node] {
                *links.entry(communities[neighbor]).or_default() += w;
            }

            community_weight[current] -= k;
            community_size[current] -= 1;
            if community_size[current] == 0 {
                empty.push(current);
            }

            let mut best = current;
            let mut best_gain = self.modularity_gain(
                links.get(&current).copied().unwrap_or(0.0),
                k,
                community_weight[current],
                two_m,
            );
            for (&community, &weight) in &links {
                let gain = self.modularity_gain(weight, k, community_weight[community], two_m);
                if gain > best_gain + EPSILON {
                    best = community;
                    best_gain = gain;
                }
            }
            if best_gain < -EPSILON {
                if let Some(&free) = empty.last() {
                    best = free;
                }
            }

            if community_size[best] == 0 {
                empty.retain(|&c| c != best);
            }
            community_weight[best] += k;
            community_size[best] += 1;

            if best != current {
                communities[node] = best;
                improved = true;
                for &(neighbor, _) in &graph.adjacency[node] {
                    if communities[neighbor] != best && !queued[neighbor] {
                        queued[neighbor] = true;
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        improved
    }

    /// Refinement phase: starting from singletons, merge each still-single
    /// node into a neighbouring sub-community of the same community when that
    /// increases modularity. Sub-communities stay connected.
    fn refinement_phase<R: Rng>(
        &self,
        graph: &WeightedGraph,
        communities: &[usize],
        two_m: f64,
        rng: &mut R,
    ) -> Vec<usize> {
        let n = graph.len();
        let mut refined: Vec<usize> = (0..n).collect();
        let mut weight = graph.node_weights.clone();
        let mut size = vec![1usize; n];

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let mut links: BTreeMap<usize, f64> = BTreeMap::new();
        for node in order {
            let own = refined[node];
            if size[own] != 1 {
                continue;
            }
            let k = graph.node_weights[node];

            links.clear();
            for &(neighbor, w) in &graph.adjacency[node] {
                if communities[neighbor] == communities[node] && refined[neighbor] != own {
                    *links.entry(refined[neighbor]).or_default() += w;
                }
            }

            let mut best = own;
            let mut best_gain = 0.0;
            for (&candidate, &w) in &links {
                let gain = self.modularity_gain(w, k, weight[candidate], two_m);
                if gain > best_gain + EPSILON {
                    best = candidate;
                    best_gain = gain;
                }
            }

            if best != own {
                weight[own] -= k;
                size[own] -= 1;
                weight[best] += k;
                size[best] += 1;
                refined[node] = best;
            }
        }

        refined
    }

    /// Gain of inserting a node of weight `k` into a community of total
    /// weight `community_weight`, given `edge_weight` between them
    fn modularity_gain(&self, edge_weight: f64, k: f64, community_weight: f64, two_m: f64) -> f64 {
        edge_weight - self.config.resolution * k * community_weight / two_m
    }

    /// Compute modularity of a partition of `graph`
    pub fn compute_modularity(&self, graph: &WeightedGraph, communities: &[usize]) -> f64 {
        let two_m = graph.total_node_weight();
        if two_m <= 0.0 {
            return 0.0;
        }

        let mut internal: HashMap<usize, f64> = HashMap::new();
        let mut total: HashMap<usize, f64> = HashMap::new();
        for (node, row) in graph.adjacency.iter().enumerate() {
            let c = communities[node];
            *total.entry(c).or_default() += graph.node_weights[node];
            for &(neighbor, w) in row {
                if communities[neighbor] == c {
                    *internal.entry(c).or_default() += w;
                }
            }
        }

        total
            .iter()
            .map(|(c, &tot)| {
                internal.get(c).copied().unwrap_or(0.0) / two_m
                    - self.config.resolution * (tot / two_m).powi(2)
            })
            .sum()
    }
}

/// Renumber communities to be contiguous, in order of first appearance
fn renumber_communities(communities: &[usize]) -> (Vec<usize>, usize) {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    let mut next_id = 0;

    let renumbered = communities
        .iter()
        .map(|&c| {
            *mapping.entry(c).or_insert_with(|| {
                let id = next_id;
                next_id += 1;
                id
            })
        })
        .collect();

    (renumbered, next_id)
}
