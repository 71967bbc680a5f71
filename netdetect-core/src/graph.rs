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

//! Labeled Graph
//!
//! Undirected simple graph used for the main entity/attribute graph, the
//! entity projection and materialized networks. Supports:
//! - Node lookup by qualified label
//! - Typed edges (last write wins on repeated insertion)
//! - Per-node annotations (network index, flag count)
//! - Connected components, all shortest paths and induced subgraphs
//!
//! Nodes live in an arena and are addressed by [`NodeId`]. Nodes are never
//! removed; callers that need deletion build a new graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};

use crate::normalize::ENTITY_LABEL;

/// Index of a node in a [`LabeledGraph`]
pub type NodeId = usize;

/// Per-node data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    /// Qualified label (`TYPE==VALUE`)
    pub label: String,
    /// Node type; `ENTITY` for entities
    pub node_type: String,
    /// Network the node was materialized for
    pub network: Option<usize>,
    /// Summed flag count (entities only)
    pub flags: u64,
}

/// Undirected simple graph with interned labels
#[derive(Debug, Clone, Default)]
pub struct LabeledGraph {
    nodes: Vec<NodeData>,
    index: HashMap<String, NodeId>,
    adjacency: Vec<BTreeMap<NodeId, String>>,
    edge_count: usize,
}

/// Flat node row for export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    pub node: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub network: Option<usize>,
    pub flags: u64,
}

/// Flat edge row for export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub edge_type: String,
}

impl LabeledGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create a node. An existing node keeps its original type.
    pub fn add_node(&mut self, label: &str, node_type: &str) -> NodeId {
        if let Some(&id) = self.index.get(label) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(NodeData {
            label: label.to_string(),
            node_type: node_type.to_string(),
            network: None,
            flags: 0,
        });
        self.adjacency.push(BTreeMap::new());
        self.index.insert(label.to_string(), id);
        id
    }

    /// Copy a node (label, type and annotations) from another graph
    pub fn add_node_from(&mut self, other: &LabeledGraph, id: NodeId) -> NodeId {
        let data = &other.nodes[id];
        let new_id = self.add_node(&data.label, &data.node_type);
        self.nodes[new_id].network = data.network;
        self.nodes[new_id].flags = data.flags;
        new_id
    }

    /// Insert or relabel the undirected edge `a - b`. Self loops are ignored.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId, edge_type: &str) {
        if a == b {
            return;
        }
        if self.adjacency[a].insert(b, edge_type.to_string()).is_none() {
            self.edge_count += 1;
        }
        self.adjacency[b].insert(a, edge_type.to_string());
    }

    pub fn node_id(&self, label: &str) -> Option<NodeId> {
        self.index.get(label).copied()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.index.contains_key(label)
    }

    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes[id]
    }

    pub fn label(&self, id: NodeId) -> &str {
        &self.nodes[id].label
    }

    pub fn node_type(&self, id: NodeId) -> &str {
        &self.nodes[id].node_type
    }

    pub fn is_entity(&self, id: NodeId) -> bool {
        self.nodes[id].node_type == ENTITY_LABEL
    }

    /// Neighbours of a node in ascending id order
    pub fn neighbors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.adjacency[id].keys().copied()
    }

    pub fn degree(&self, id: NodeId) -> usize {
        self.adjacency[id].len()
    }

    pub fn edge_type(&self, a: NodeId, b: NodeId) -> Option<&str> {
        self.adjacency[a].get(&b).map(String::as_str)
    }

    pub fn has_edge(&self, a: NodeId, b: NodeId) -> bool {
        self.adjacency[a].contains_key(&b)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node ids
    pub fn node_ids(&self) -> std::ops::Range<NodeId> {
        0..self.nodes.len()
    }

    /// Ids of entity nodes
    pub fn entity_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.node_ids().filter(|&id| self.is_entity(id))
    }

    /// Every edge once, as `(a, b, type)` with `a < b`
    pub fn edges(&self) -> impl Iterator<Item = (NodeId, NodeId, &str)> + '_ {
        self.adjacency.iter().enumerate().flat_map(|(a, adj)| {
            adj.range(a + 1..).map(move |(&b, t)| (a, b, t.as_str()))
        })
    }

    /// Connected components, each sorted by node id, in discovery order
    pub fn connected_components(&self) -> Vec<Vec<NodeId>> {
        let mut seen = vec![false; self.nodes.len()];
        let mut components = Vec::new();

        for start in self.node_ids() {
            if seen[start] {
                continue;
            }
            seen[start] = true;
            let mut component = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(node) = queue.pop_front() {
                for next in self.neighbors(node) {
                    if !seen[next] {
                        seen[next] = true;
                        component.push(next);
                        queue.push_back(next);
                    }
                }
            }
            component.sort_unstable();
            components.push(component);
        }

        components
    }

    /// Every shortest path from `source` to `target` (inclusive).
    ///
    /// Returns an empty list when `target` is unreachable and `[[source]]`
    /// when both are the same node.
    pub fn all_shortest_paths(&self, source: NodeId, target: NodeId) -> Vec<Vec<NodeId>> {
        let mut distance: Vec<Option<usize>> = vec![None; self.nodes.len()];
        let mut predecessors: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        distance[source] = Some(0);
        let mut queue = VecDeque::from([source]);

        while let Some(node) = queue.pop_front() {
            let d = distance[node].unwrap_or(0);
            if distance[target].is_some_and(|t| d >= t) {
                break;
            }
            for next in self.neighbors(node) {
                match distance[next] {
                    None => {
                        distance[next] = Some(d + 1);
                        predecessors[next].push(node);
                        queue.push_back(next);
                    }
                    Some(dn) if dn == d + 1 => predecessors[next].push(node),
                    Some(_) => {}
                }
            }
        }

        if distance[target].is_none() {
            return Vec::new();
        }

        // Walk predecessor lists back from the target
        let mut paths = Vec::new();
        let mut stack = vec![vec![target]];
        while let Some(partial) = stack.pop() {
            let head = partial[partial.len() - 1];
            if head == source {
                let mut path = partial;
                path.reverse();
                paths.push(path);
                continue;
            }
            for &prev in &predecessors[head] {
                let mut extended = partial.clone();
                extended.push(prev);
                stack.push(extended);
            }
        }
        paths
    }

    /// Subgraph induced by `ids`, preserving edge types and annotations
    pub fn induced_subgraph(&self, ids: &[NodeId]) -> LabeledGraph {
        let mut sub = LabeledGraph::new();
        let mut mapping = HashMap::with_capacity(ids.len());
        for &id in ids {
            mapping.insert(id, sub.add_node_from(self, id));
        }
        for &id in ids {
            for (next, edge_type) in &self.adjacency[id] {
                if let Some(&mapped) = mapping.get(next) {
                    sub.add_edge(mapping[&id], mapped, edge_type);
                }
            }
        }
        sub
    }

    /// Node table sorted by label
    pub fn node_rows(&self) -> Vec<NodeRow> {
        let mut rows: Vec<NodeRow> = self
            .nodes
            .iter()
            .map(|n| NodeRow {
                node: n.label.clone(),
                node_type: n.node_type.clone(),
                network: n.network,
                flags: n.flags,
            })
            .collect();
        rows.sort_by(|a, b| a.node.cmp(&b.node));
        rows
    }

    /// Edge table with `source < target`, sorted
    pub fn edge_rows(&self) -> Vec<EdgeRow> {
        let mut rows: Vec<EdgeRow> = self
            .edges()
            .map(|(a, b, t)| {
                let (source, target) = if self.label(a) <= self.label(b) {
                    (self.label(a), self.label(b))
                } else {
                    (self.label(b), self.label(a))
                };
                EdgeRow {
                    source: source.to_string(),
                    target: target.to_string(),
                    edge_type: t.to_string(),
                }
            })
            .collect();
        rows.sort_by(|a, b| (&a.source, &a.target).cmp(&(&b.source, &b.target)));
        rows
    }

    /// Sorted `(label_a, label_b)` pairs, handy for comparing graphs
    pub fn edge_label_pairs(&self) -> Vec<(String, String)> {
        self.edge_rows()
            .into_iter()
            .map(|row| (row.source, row.target))
            .collect()
    }
}
