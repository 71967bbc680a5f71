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

//! Trimming and entity projection
//!
//! Hub attributes (degree above the cap) are set aside, then the main graph
//! is projected onto its entity nodes. Two entities are linked when they
//! share an attribute, are softly equal, or meet through a two-hop fuzzy
//! bridge of non-supporting attributes.

use netdetect_core::{InferredLinks, LabeledGraph, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Edge type used in the entity projection
pub const PROJECTED_EDGE: &str = "projected";

/// Output of [`trim_nodeset`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrimResult {
    /// Degree of every attribute node trimmed for exceeding the cap
    pub degrees: BTreeMap<String, usize>,
    /// All trimmed labels, including caller exclusions
    pub trimmed: BTreeSet<String>,
}

/// Collect attribute nodes whose degree exceeds `max_degree`, plus `extra`
pub fn trim_nodeset<S: AsRef<str>>(
    graph: &LabeledGraph,
    max_degree: usize,
    extra: &[S],
) -> TrimResult {
    let mut result = TrimResult::default();
    for id in graph.node_ids() {
        if graph.is_entity(id) {
            continue;
        }
        let degree = graph.degree(id);
        if degree > max_degree {
            let label = graph.label(id).to_string();
            result.degrees.insert(label.clone(), degree);
            result.trimmed.insert(label);
        }
    }
    result
        .trimmed
        .extend(extra.iter().map(|label| label.as_ref().to_string()));

    info!(
        over_degree = result.degrees.len(),
        trimmed = result.trimmed.len(),
        max_degree,
        "Trimmed attribute nodes"
    );
    result
}

/// Graph neighbours and soft equals of a label, minus trimmed labels.
///
/// Soft equals that are not nodes of `graph` are ignored.
pub(crate) fn fuzzy_neighbors(
    graph: &LabeledGraph,
    inferred: &InferredLinks,
    trimmed: &BTreeSet<String>,
    id: NodeId,
) -> BTreeSet<NodeId> {
    let hard = graph.neighbors(id);
    let soft = inferred
        .neighbors(graph.label(id))
        .filter_map(|label| graph.node_id(label));
    hard.chain(soft)
        .filter(|&n| n != id && !trimmed.contains(graph.label(n)))
        .collect()
}

/// Whether an attribute may carry a bridge between entities
pub(crate) fn is_bridge(
    graph: &LabeledGraph,
    trimmed: &BTreeSet<String>,
    supporting: &BTreeSet<String>,
    id: NodeId,
) -> bool {
    !graph.is_entity(id)
        && !supporting.contains(graph.node_type(id))
        && !trimmed.contains(graph.label(id))
}

/// Project the main graph onto its entities.
///
/// Every entity of `graph` appears in the result, isolated or not. Edges are
/// typed [`PROJECTED_EDGE`].
pub fn project_entity_graph(
    graph: &LabeledGraph,
    trimmed: &BTreeSet<String>,
    inferred: &InferredLinks,
    supporting: &BTreeSet<String>,
) -> LabeledGraph {
    let mut projected = LabeledGraph::new();
    let mut mapping: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    for id in graph.entity_ids() {
        mapping.insert(id, projected.add_node_from(graph, id));
    }

    for (&entity, &source) in &mapping {
        let link = |other: NodeId, projected: &mut LabeledGraph| {
            if other != entity {
                if let Some(&target) = mapping.get(&other) {
                    projected.add_edge(source, target, PROJECTED_EDGE);
                }
            }
        };

        for n in fuzzy_neighbors(graph, inferred, trimmed, entity) {
            if graph.is_entity(n) {
                link(n, &mut projected);
                continue;
            }
            if !is_bridge(graph, trimmed, supporting, n) {
                continue;
            }
            for m in fuzzy_neighbors(graph, inferred, trimmed, n) {
                if graph.is_entity(m) {
                    link(m, &mut projected);
                } else if is_bridge(graph, trimmed, supporting, m) {
                    for f in fuzzy_neighbors(graph, inferred, trimmed, m) {
                        if graph.is_entity(f) {
                            link(f, &mut projected);
                        }
                    }
                }
            }
        }
    }

    debug!(
        entities = projected.node_count(),
        edges = projected.edge_count(),
        "Projected entity graph"
    );
    projected
}
