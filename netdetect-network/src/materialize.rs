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

//! Network Materializer
//!
//! Rebuilds the attribute context of one network: its entities, their
//! attributes (hard and soft), and the fuzzy bridges between them, annotated
//! with network ids and flag counts.

use netdetect_core::{
    EngineError, EngineResult, IntegratedFlags, InferredLinks, LabeledGraph, NodeId,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

use crate::projection::{fuzzy_neighbors, is_bridge};

/// Edge type for links that exist only through soft equality
pub const INFERRED_EDGE: &str = "inferred";

/// Builds annotated network subgraphs from the main graph
pub struct NetworkMaterializer<'a> {
    graph: &'a LabeledGraph,
    inferred: &'a InferredLinks,
    trimmed: &'a BTreeSet<String>,
    supporting: &'a BTreeSet<String>,
    flags: &'a IntegratedFlags,
    entity_network: &'a BTreeMap<String, usize>,
}

impl<'a> NetworkMaterializer<'a> {
    pub fn new(
        graph: &'a LabeledGraph,
        inferred: &'a InferredLinks,
        trimmed: &'a BTreeSet<String>,
        supporting: &'a BTreeSet<String>,
        flags: &'a IntegratedFlags,
        entity_network: &'a BTreeMap<String, usize>,
    ) -> Self {
        Self {
            graph,
            inferred,
            trimmed,
            supporting,
            flags,
            entity_network,
        }
    }

    /// Materialize network `network` with entity labels `entities`.
    ///
    /// Every edge of the result touches an entity of `entities`. Entities
    /// outside the network appear only as direct neighbours and keep their
    /// own network id.
    pub fn materialize<S: AsRef<str>>(
        &self,
        network: usize,
        entities: &[S],
    ) -> EngineResult<LabeledGraph> {
        let graph = self.graph;
        let selected: BTreeSet<NodeId> = entities
            .iter()
            .map(|label| {
                let label = label.as_ref();
                graph
                    .node_id(label)
                    .filter(|&id| graph.is_entity(id))
                    .ok_or_else(|| EngineError::UnknownNode(label.to_string()))
            })
            .collect::<EngineResult<_>>()?;

        let mut view = ViewBuilder::new(graph);
        for &e in &selected {
            view.node(e);
            for n in self.fuzzy(e) {
                view.edge(e, n);
                if !is_bridge(graph, self.trimmed, self.supporting, n) {
                    continue;
                }
                for m in self.fuzzy(n) {
                    if m == e {
                        continue;
                    }
                    if graph.is_entity(m) {
                        if selected.contains(&m) {
                            view.edge(n, m);
                        }
                        continue;
                    }
                    if !is_bridge(graph, self.trimmed, self.supporting, m) {
                        continue;
                    }
                    let targets: Vec<NodeId> = self
                        .fuzzy(m)
                        .into_iter()
                        .filter(|f| selected.contains(f))
                        .collect();
                    if targets.is_empty() {
                        continue;
                    }
                    // Draw e - n ~ m - f as e - m - f, keeping the n ~ m type
                    view.edge_as(e, m, view.edge_type(n, m));
                    for f in targets {
                        view.edge(m, f);
                    }
                }
            }
        }

        let selected_labels: BTreeSet<&str> =
            selected.iter().map(|&id| graph.label(id)).collect();
        let mut subgraph = view.finish();
        for id in subgraph.node_ids() {
            let is_entity = subgraph.is_entity(id);
            let label = subgraph.label(id).to_string();
            let data = subgraph.node_mut(id);
            if is_entity {
                data.flags = self.flags.entity_flags(&label);
                data.network = if selected_labels.contains(label.as_str()) {
                    Some(network)
                } else {
                    self.entity_network.get(&label).copied()
                };
            } else {
                data.network = Some(network);
            }
        }

        debug!(
            network,
            entities = selected.len(),
            nodes = subgraph.node_count(),
            edges = subgraph.edge_count(),
            "Materialized network"
        );
        Ok(subgraph)
    }

    fn fuzzy(&self, id: NodeId) -> BTreeSet<NodeId> {
        fuzzy_neighbors(self.graph, self.inferred, self.trimmed, id)
    }
}

/// Copies nodes and edges of the main graph into a fresh view
struct ViewBuilder<'g> {
    source: &'g LabeledGraph,
    view: LabeledGraph,
    mapping: HashMap<NodeId, NodeId>,
}

impl<'g> ViewBuilder<'g> {
    fn new(source: &'g LabeledGraph) -> Self {
        Self {
            source,
            view: LabeledGraph::new(),
            mapping: HashMap::new(),
        }
    }

    fn node(&mut self, id: NodeId) -> NodeId {
        if let Some(&mapped) = self.mapping.get(&id) {
            return mapped;
        }
        let mapped = self.view.add_node_from(self.source, id);
        self.mapping.insert(id, mapped);
        mapped
    }

    /// Type of `a - b` in the main graph, or [`INFERRED_EDGE`]
    fn edge_type(&self, a: NodeId, b: NodeId) -> String {
        self.source.edge_type(a, b).unwrap_or(INFERRED_EDGE).to_string()
    }

    fn edge(&mut self, a: NodeId, b: NodeId) {
        let edge_type = self.edge_type(a, b);
        self.edge_as(a, b, edge_type);
    }

    fn edge_as(&mut self, a: NodeId, b: NodeId, edge_type: String) {
        let (a, b) = (self.node(a), self.node(b));
        self.view.add_edge(a, b, &edge_type);
    }

    fn finish(self) -> LabeledGraph {
        self.view
    }
}
