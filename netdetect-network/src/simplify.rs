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

//! Network simplification for display and reporting.
//!
//! Dangling attributes are pruned and attributes that carry the same value
//! are coalesced into a single node until nothing changes.

use netdetect_core::normalize::split_label;
use netdetect_core::{LabeledGraph, NodeId};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Prune and merge attribute nodes of `network` until a fixed point.
///
/// Entities are never removed or merged. Labels of merged nodes are their
/// sorted source labels joined by `list_separator`; each token keeps its
/// `TYPE{attribute_separator}VALUE` shape.
pub fn simplify_graph(
    network: &LabeledGraph,
    attribute_separator: &str,
    list_separator: &str,
) -> LabeledGraph {
    let mut current = network.clone();
    let mut rounds = 0;
    loop {
        rounds += 1;
        let before = (current.node_count(), current.edge_count());
        current = prune_dangling(&current);
        current = merge_shared_values(&current, attribute_separator, list_separator);
        if (current.node_count(), current.edge_count()) == before {
            break;
        }
    }
    debug!(
        rounds,
        nodes = current.node_count(),
        edges = current.edge_count(),
        "Simplified network"
    );
    current
}

/// Drop attribute nodes with fewer than two neighbours
fn prune_dangling(graph: &LabeledGraph) -> LabeledGraph {
    let keep: Vec<NodeId> = graph
        .node_ids()
        .filter(|&id| graph.is_entity(id) || graph.degree(id) >= 2)
        .collect();
    if keep.len() == graph.node_count() {
        return graph.clone();
    }
    graph.induced_subgraph(&keep)
}

/// Values carried by a possibly merged attribute label
fn label_values<'a>(
    label: &'a str,
    attribute_separator: &str,
    list_separator: &'a str,
) -> Vec<&'a str> {
    label
        .split(list_separator)
        .map(|token| split_label(token, attribute_separator).1)
        .collect()
}

fn find(parent: &mut [usize], mut node: usize) -> usize {
    while parent[node] != node {
        parent[node] = parent[parent[node]];
        node = parent[node];
    }
    node
}

/// Coalesce attribute nodes sharing a value
fn merge_shared_values(
    graph: &LabeledGraph,
    attribute_separator: &str,
    list_separator: &str,
) -> LabeledGraph {
    let mut parent: Vec<usize> = graph.node_ids().collect();
    let mut owner: HashMap<&str, NodeId> = HashMap::new();
    for id in graph.node_ids().filter(|&id| !graph.is_entity(id)) {
        for value in label_values(graph.label(id), attribute_separator, list_separator) {
            match owner.get(value) {
                Some(&other) => {
                    let (a, b) = (find(&mut parent, id), find(&mut parent, other));
                    if a != b {
                        parent[a.max(b)] = a.min(b);
                    }
                }
                None => {
                    owner.insert(value, id);
                }
            }
        }
    }

    let mut groups: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for id in graph.node_ids() {
        let root = find(&mut parent, id);
        groups.entry(root).or_default().push(id);
    }
    if groups.len() == graph.node_count() {
        return graph.clone();
    }

    let mut merged = LabeledGraph::new();
    let mut mapping: Vec<NodeId> = vec![0; graph.node_count()];
    let mut created: HashMap<NodeId, NodeId> = HashMap::new();
    for id in graph.node_ids() {
        let root = find(&mut parent, id);
        if let Some(&new_id) = created.get(&root) {
            mapping[id] = new_id;
            continue;
        }
        let members = &groups[&root];
        let new_id = if members.len() == 1 {
            merged.add_node_from(graph, id)
        } else {
            let labels: BTreeSet<&str> = members
                .iter()
                .flat_map(|&m| graph.label(m).split(list_separator))
                .collect();
            let mut types: Vec<&str> = members
                .iter()
                .flat_map(|&m| graph.node_type(m).split(list_separator))
                .collect();
            types.sort_unstable();

            let label = labels.into_iter().collect::<Vec<_>>().join(list_separator);
            let new_id = merged.add_node(&label, &types.join(list_separator));
            let data = merged.node_mut(new_id);
            data.flags = members.iter().map(|&m| graph.node(m).flags).max().unwrap_or(0);
            data.network = members.iter().find_map(|&m| graph.node(m).network);
            new_id
        };
        created.insert(root, new_id);
        mapping[id] = new_id;
    }

    for (a, b, edge_type) in graph.edges() {
        merged.add_edge(mapping[a], mapping[b], edge_type);
    }
    merged
}
