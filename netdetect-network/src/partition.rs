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

//! Network Partitioner
//!
//! Splits the entity projection into size-capped networks. Components that
//! fit under the cap are kept whole; larger ones go through a
//! [`PartitionEngine`], by default [`HierarchicalLeiden`].

use netdetect_core::{EngineError, EngineResult, LabeledGraph, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info, warn};

use crate::leiden::{LeidenClustering, LeidenConfig, WeightedGraph};

/// Default Leiden resolution for hierarchical partitioning
pub const DEFAULT_RESOLUTION: f64 = 1.0;

/// Resolution doublings attempted before falling back to chunking
const MAX_RESOLUTION_DOUBLINGS: u32 = 4;

/// Hierarchical clustering backend.
///
/// Returns the finest-level cluster of every node label; no cluster may hold
/// more than `max_cluster_size` nodes.
pub trait PartitionEngine: Send + Sync {
    fn hierarchical_partition(
        &self,
        graph: &LabeledGraph,
        max_cluster_size: usize,
        resolution: f64,
        seed: u64,
    ) -> EngineResult<BTreeMap<String, usize>>;
}

/// Recursive Leiden: clusters over the cap are re-clustered on their own
/// induced subgraph until every leaf fits.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchicalLeiden;

impl HierarchicalLeiden {
    fn leiden(graph: &LabeledGraph, resolution: f64, seed: u64) -> Vec<usize> {
        let weighted = WeightedGraph::from_edges(
            graph.node_count(),
            graph.edges().map(|(a, b, _)| (a, b, 1.0)),
        );
        LeidenClustering::with_config(LeidenConfig {
            resolution,
            seed: Some(seed),
            ..LeidenConfig::default()
        })
        .detect_communities(&weighted)
    }

    /// Split `graph` into groups of node ids, at increasing resolution when
    /// Leiden keeps everything together
    fn split(graph: &LabeledGraph, resolution: f64, seed: u64) -> Vec<Vec<NodeId>> {
        let mut resolution = resolution;
        for _ in 0..=MAX_RESOLUTION_DOUBLINGS {
            let groups = group_by_cluster(&Self::leiden(graph, resolution, seed));
            if groups.len() > 1 {
                return groups;
            }
            resolution *= 2.0;
        }
        Vec::new()
    }

    fn partition_into(
        graph: &LabeledGraph,
        max_cluster_size: usize,
        resolution: f64,
        seed: u64,
        clusters: &mut BTreeMap<String, usize>,
        next_cluster: &mut usize,
    ) {
        if graph.node_count() <= max_cluster_size {
            for id in graph.node_ids() {
                clusters.insert(graph.label(id).to_string(), *next_cluster);
            }
            *next_cluster += 1;
            return;
        }

        let groups = Self::split(graph, resolution, seed);
        if groups.is_empty() {
            warn!(
                nodes = graph.node_count(),
                max_cluster_size,
                "Leiden could not split cluster, chunking in breadth-first order"
            );
            for chunk in bfs_order(graph).chunks(max_cluster_size) {
                for &id in chunk {
                    clusters.insert(graph.label(id).to_string(), *next_cluster);
                }
                *next_cluster += 1;
            }
            return;
        }

        debug!(nodes = graph.node_count(), parts = groups.len(), "Split oversized cluster");
        for group in groups {
            let sub = graph.induced_subgraph(&group);
            Self::partition_into(&sub, max_cluster_size, resolution, seed, clusters, next_cluster);
        }
    }
}

impl PartitionEngine for HierarchicalLeiden {
    fn hierarchical_partition(
        &self,
        graph: &LabeledGraph,
        max_cluster_size: usize,
        resolution: f64,
        seed: u64,
    ) -> EngineResult<BTreeMap<String, usize>> {
        if max_cluster_size == 0 {
            return Err(EngineError::PartitionFailure(
                "max_cluster_size must be positive".into(),
            ));
        }
        let mut clusters = BTreeMap::new();
        let mut next_cluster = 0;
        Self::partition_into(
            graph,
            max_cluster_size,
            resolution,
            seed,
            &mut clusters,
            &mut next_cluster,
        );
        Ok(clusters)
    }
}

/// Node ids grouped by cluster, clusters in ascending id order
fn group_by_cluster(communities: &[usize]) -> Vec<Vec<NodeId>> {
    let mut groups: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
    for (node, &community) in communities.iter().enumerate() {
        groups.entry(community).or_default().push(node);
    }
    groups.into_values().collect()
}

/// Every node in breadth-first order, restarting at the lowest unseen id
fn bfs_order(graph: &LabeledGraph) -> Vec<NodeId> {
    let mut seen = vec![false; graph.node_count()];
    let mut order = Vec::with_capacity(graph.node_count());
    for start in graph.node_ids() {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            for next in graph.neighbors(node) {
                if !seen[next] {
                    seen[next] = true;
                    queue.push_back(next);
                }
            }
        }
    }
    order
}

/// Networks of the entity projection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPartition {
    /// Sorted entity labels of each network, indexed by network id
    pub networks: Vec<Vec<String>>,
    /// Network id of every entity label
    pub entity_network: BTreeMap<String, usize>,
}

impl NetworkPartition {
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    pub fn network(&self, index: usize) -> Option<&[String]> {
        self.networks.get(index).map(Vec::as_slice)
    }

    pub fn network_of(&self, entity: &str) -> Option<usize> {
        self.entity_network.get(entity).copied()
    }

    fn push(&mut self, mut entities: Vec<String>) {
        entities.sort();
        let index = self.networks.len();
        for entity in &entities {
            self.entity_network.insert(entity.clone(), index);
        }
        self.networks.push(entities);
    }
}

/// Partition the entity projection into networks of at most `max_entities`.
///
/// Components are handled largest first; network ids follow production
/// order. An empty projection yields no networks.
pub fn identify_networks(
    projected: &LabeledGraph,
    max_entities: usize,
    seed: u64,
    engine: &dyn PartitionEngine,
) -> EngineResult<NetworkPartition> {
    if max_entities == 0 {
        return Err(EngineError::PartitionFailure(
            "max_network_entities must be positive".into(),
        ));
    }

    let mut components = projected.connected_components();
    // Stable sort keeps discovery order among equal sizes
    components.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut partition = NetworkPartition::default();
    let mut split_components = 0;
    for component in components {
        let labels = |ids: &[NodeId]| -> Vec<String> {
            ids.iter().map(|&id| projected.label(id).to_string()).collect()
        };
        if component.len() <= max_entities {
            partition.push(labels(&component));
            continue;
        }

        split_components += 1;
        let sub = projected.induced_subgraph(&component);
        let clusters = engine.hierarchical_partition(&sub, max_entities, DEFAULT_RESOLUTION, seed)?;

        let mut grouped: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for id in sub.node_ids() {
            let label = sub.label(id);
            let cluster = clusters.get(label).copied().ok_or_else(|| {
                EngineError::PartitionFailure(format!("{label} was not assigned a cluster"))
            })?;
            grouped.entry(cluster).or_default().push(label.to_string());
        }
        for members in grouped.into_values() {
            if members.len() > max_entities {
                return Err(EngineError::PartitionFailure(format!(
                    "cluster of {} entities exceeds the cap of {max_entities}",
                    members.len()
                )));
            }
            partition.push(members);
        }
    }

    info!(
        networks = partition.len(),
        entities = partition.entity_network.len(),
        split_components,
        max_entities,
        "Identified networks"
    );
    Ok(partition)
}
