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

//! Model Assembler
//!
//! Accumulates attribute, flag and group links from any number of tables and
//! keeps the main entity/attribute graph in sync with the attribute links.
//!
//! ```text
//!   table ──► normalize ──► AttributeLink ──► ENTITY==id ── type ── type==value
//!                                                                        │
//!                                            other_type==value ── equality
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::graph::{LabeledGraph, NodeId};
use crate::links::{AttributeLink, FlagAggregator, FlagLink, GroupLink};
use crate::normalize::{entity_label, normalize_cell, normalize_text, qualify, ENTITY_LABEL};
use crate::table::Table;

/// Edge type joining attribute nodes that share a value
pub const EQUALITY_EDGE: &str = "equality";

/// Incrementally builds the main graph from attribute links
#[derive(Debug, Clone)]
struct GraphBuilder {
    graph: LabeledGraph,
    separator: String,
    // value -> attribute nodes carrying it
    values: HashMap<String, BTreeSet<NodeId>>,
}

impl GraphBuilder {
    fn new(separator: &str) -> Self {
        Self {
            graph: LabeledGraph::new(),
            separator: separator.to_string(),
            values: HashMap::new(),
        }
    }

    fn entity(&mut self, entity_id: &str) -> NodeId {
        self.graph
            .add_node(&entity_label(entity_id, &self.separator), ENTITY_LABEL)
    }

    fn apply(&mut self, link: &AttributeLink) {
        let entity = self.entity(&link.entity_id);
        let attribute = self.graph.add_node(
            &qualify(&link.attribute_type, &link.attribute_value, &self.separator),
            &link.attribute_type,
        );
        self.graph.add_edge(entity, attribute, &link.attribute_type);

        let same_value = self.values.entry(link.attribute_value.clone()).or_default();
        if same_value.insert(attribute) {
            for &other in same_value.iter().filter(|&&other| other != attribute) {
                self.graph.add_edge(attribute, other, EQUALITY_EDGE);
            }
        }
    }
}

/// Counts describing the current data model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub entities: usize,
    pub attribute_nodes: usize,
    pub attribute_types: usize,
    pub attribute_links: usize,
    pub flag_links: usize,
    pub group_links: usize,
    pub edges: usize,
}

/// Accumulates links and the main graph
#[derive(Debug, Clone)]
pub struct ModelAssembler {
    separator: String,
    attribute_links: Vec<AttributeLink>,
    flag_links: Vec<FlagLink>,
    group_links: Vec<GroupLink>,
    node_types: BTreeSet<String>,
    // entity ids in first-seen order, keyed by the link count at that point
    entities: Vec<(usize, String)>,
    builder: GraphBuilder,
}

impl Default for ModelAssembler {
    fn default() -> Self {
        Self::new(crate::normalize::DEFAULT_ATTRIBUTE_SEPARATOR)
    }
}

impl ModelAssembler {
    /// Create an empty model using `separator` between type and value
    pub fn new(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
            attribute_links: Vec::new(),
            flag_links: Vec::new(),
            group_links: Vec::new(),
            node_types: BTreeSet::new(),
            entities: Vec::new(),
            builder: GraphBuilder::new(separator),
        }
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Emit one attribute link per value column and row with a non-empty
    /// entity and value, and extend the main graph with them. Every row with
    /// a non-empty entity adds its entity node, even when all values are null.
    ///
    /// Returns the number of links added.
    pub fn add_attribute_links(
        &mut self,
        table: &Table,
        entity_column: &str,
        value_columns: &[String],
    ) -> EngineResult<usize> {
        let entity_idx = table.column_index(entity_column)?;
        let value_idx = table.column_indices(value_columns)?;
        let attribute_types = value_columns
            .iter()
            .map(|column| {
                let attribute_type = normalize_text(column);
                if attribute_type.is_empty() || attribute_type == ENTITY_LABEL {
                    return Err(EngineError::Config(format!(
                        "invalid attribute column name: {column:?}"
                    )));
                }
                Ok(attribute_type)
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let offset = self.attribute_links.len();
        for row in table.rows() {
            let Some(entity_id) = normalize_cell(&row[entity_idx]) else {
                continue;
            };
            let known = self.builder.graph.node_count();
            self.builder.entity(&entity_id);
            if self.builder.graph.node_count() > known {
                self.entities.push((offset, entity_id));
            }
        }

        let mut added = 0;
        for (attribute_type, &idx) in attribute_types.into_iter().zip(&value_idx) {
            for row in table.rows() {
                let (Some(entity_id), Some(attribute_value)) =
                    (normalize_cell(&row[entity_idx]), normalize_cell(&row[idx]))
                else {
                    continue;
                };
                let link = AttributeLink {
                    entity_id,
                    attribute_type: attribute_type.clone(),
                    attribute_value,
                };
                self.builder.apply(&link);
                self.attribute_links.push(link);
                added += 1;
            }
            self.node_types.insert(attribute_type);
        }

        info!(
            rows = table.len(),
            links = added,
            nodes = self.builder.graph.node_count(),
            edges = self.builder.graph.edge_count(),
            "Ingested attribute links"
        );
        Ok(added)
    }

    /// Emit flag links from `flag_columns` using the given aggregator.
    ///
    /// Instance: one link per non-empty cell with count 1 and the cell as
    /// value. Count: cells are summed per entity and the column name becomes
    /// the flag value.
    pub fn add_flag_links(
        &mut self,
        table: &Table,
        entity_column: &str,
        flag_columns: &[String],
        aggregator: FlagAggregator,
    ) -> EngineResult<usize> {
        let entity_idx = table.column_index(entity_column)?;
        let flag_idx = table.column_indices(flag_columns)?;

        let mut links = Vec::new();
        for (column, &idx) in flag_columns.iter().zip(&flag_idx) {
            let flag_type = normalize_text(column);
            match aggregator {
                FlagAggregator::Instance => {
                    for row in table.rows() {
                        let (Some(entity_id), Some(flag_value)) =
                            (normalize_cell(&row[entity_idx]), normalize_cell(&row[idx]))
                        else {
                            continue;
                        };
                        links.push(FlagLink {
                            entity_id,
                            flag_type: flag_type.clone(),
                            flag_value,
                            count: 1,
                        });
                    }
                }
                FlagAggregator::Count => {
                    let mut sums: BTreeMap<String, u64> = BTreeMap::new();
                    for row in table.rows() {
                        let Some(entity_id) = normalize_cell(&row[entity_idx]) else {
                            continue;
                        };
                        let cell = &row[idx];
                        if cell.is_null() {
                            continue;
                        }
                        let count = cell
                            .as_number()
                            .filter(|n| *n >= 0.0 && n.is_finite())
                            .ok_or_else(|| EngineError::InvalidFlagCount {
                                column: column.clone(),
                                value: cell.as_text().unwrap_or_default(),
                            })?;
                        *sums.entry(entity_id).or_default() += count.round() as u64;
                    }
                    links.extend(sums.into_iter().map(|(entity_id, count)| FlagLink {
                        entity_id,
                        flag_type: flag_type.clone(),
                        flag_value: flag_type.clone(),
                        count,
                    }));
                }
            }
        }

        let added = links.len();
        self.flag_links.extend(links);
        info!(rows = table.len(), links = added, ?aggregator, "Ingested flag links");
        Ok(added)
    }

    /// Emit one group link per non-null group cell. Groups never add edges.
    pub fn add_group_links(
        &mut self,
        table: &Table,
        entity_column: &str,
        group_columns: &[String],
    ) -> EngineResult<usize> {
        let entity_idx = table.column_index(entity_column)?;
        let group_idx = table.column_indices(group_columns)?;

        let mut added = 0;
        for (column, &idx) in group_columns.iter().zip(&group_idx) {
            let group_attribute = normalize_text(column);
            for row in table.rows() {
                let (Some(entity_id), Some(group_value)) =
                    (normalize_cell(&row[entity_idx]), normalize_cell(&row[idx]))
                else {
                    continue;
                };
                self.group_links.push(GroupLink {
                    entity_id,
                    group_attribute: group_attribute.clone(),
                    group_value,
                });
                added += 1;
            }
        }
        debug!(links = added, "Ingested group links");
        Ok(added)
    }

    /// Rebuild the main graph from the recorded entities and attribute links.
    ///
    /// Replays ingestion in order, so the result equals [`Self::graph`].
    pub fn build_main_graph(&self) -> LabeledGraph {
        let mut builder = GraphBuilder::new(&self.separator);
        let mut entities = self.entities.iter().peekable();
        for (position, link) in self.attribute_links.iter().enumerate() {
            while let Some((_, entity_id)) = entities.next_if(|(at, _)| *at <= position) {
                builder.entity(entity_id);
            }
            builder.apply(link);
        }
        for (_, entity_id) in entities {
            builder.entity(entity_id);
        }
        builder.graph
    }

    /// The main graph kept in sync with ingestion
    pub fn graph(&self) -> &LabeledGraph {
        &self.builder.graph
    }

    pub fn attribute_links(&self) -> &[AttributeLink] {
        &self.attribute_links
    }

    pub fn flag_links(&self) -> &[FlagLink] {
        &self.flag_links
    }

    pub fn group_links(&self) -> &[GroupLink] {
        &self.group_links
    }

    /// Attribute types seen so far, sorted
    pub fn node_types(&self) -> &BTreeSet<String> {
        &self.node_types
    }

    /// Reset links, entities, graph and node types
    pub fn clear(&mut self) {
        self.attribute_links.clear();
        self.entities.clear();
        self.flag_links.clear();
        self.group_links.clear();
        self.node_types.clear();
        self.builder = GraphBuilder::new(&self.separator);
        info!("Cleared data model");
    }

    pub fn summary(&self) -> ModelSummary {
        let graph = self.graph();
        let entities = graph.entity_ids().count();
        ModelSummary {
            entities,
            attribute_nodes: graph.node_count() - entities,
            attribute_types: self.node_types.len(),
            attribute_links: self.attribute_links.len(),
            flag_links: self.flag_links.len(),
            group_links: self.group_links.len(),
            edges: graph.edge_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Cell;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn contacts() -> Table {
        Table::new(["id", "phone", "email"])
            .with_row(["A", "555-1", "a@x.com"])
            .with_row(["B", "555-1", "b@x.com"])
            .with_row(["C", "", "5551"])
    }

    #[test]
    fn test_attribute_links_build_bipartite_graph() {
        let mut model = ModelAssembler::default();
        let added = model
            .add_attribute_links(&contacts(), "id", &cols(&["phone", "email"]))
            .unwrap();
        assert_eq!(added, 5);

        let g = model.graph();
        let a = g.node_id("ENTITY==A").unwrap();
        let phone = g.node_id("phone==5551").unwrap();
        assert_eq!(g.edge_type(a, phone), Some("phone"));
        assert_eq!(g.degree(phone), 3); // A, B and the equality edge
    }

    #[test]
    fn test_equality_edges_join_shared_values() {
        let mut model = ModelAssembler::default();
        model
            .add_attribute_links(&contacts(), "id", &cols(&["phone", "email"]))
            .unwrap();
        let g = model.graph();
        let phone = g.node_id("phone==5551").unwrap();
        let email = g.node_id("email==5551").unwrap();
        assert_eq!(g.edge_type(phone, email), Some(EQUALITY_EDGE));
    }

    #[test]
    fn test_adding_same_table_twice_keeps_graph_simple() {
        let mut model = ModelAssembler::default();
        let columns = cols(&["phone", "email"]);
        model.add_attribute_links(&contacts(), "id", &columns).unwrap();
        let once = model.graph().edge_label_pairs();
        model.add_attribute_links(&contacts(), "id", &columns).unwrap();

        assert_eq!(model.graph().edge_label_pairs(), once);
        assert_eq!(model.attribute_links().len(), 10);
        assert_eq!(model.build_main_graph().edge_label_pairs(), once);
    }

    #[test]
    fn test_missing_column() {
        let mut model = ModelAssembler::default();
        let err = model
            .add_attribute_links(&contacts(), "id", &cols(&["fax"]))
            .unwrap_err();
        assert!(matches!(err, EngineError::MissingColumn(c) if c == "fax"));
    }

    #[test]
    fn test_instance_flags() {
        let mut model = ModelAssembler::default();
        let table = Table::new(["id", "sanction"])
            .with_row(["A", "OFAC"])
            .with_row(["A", "EU"])
            .with_row(["B", ""]);
        let added = model
            .add_flag_links(&table, "id", &cols(&["sanction"]), FlagAggregator::Instance)
            .unwrap();
        assert_eq!(added, 2);
        assert!(model.flag_links().iter().all(|l| l.count == 1));
        assert_eq!(model.flag_links()[1].flag_value, "EU");
    }

    #[test]
    fn test_count_flags_sum_per_entity() {
        let mut model = ModelAssembler::default();
        let mut table = Table::new(["id", "risk"]);
        table.push_row(vec![Cell::from("A"), Cell::Int(3)]);
        table.push_row(vec![Cell::from("A"), Cell::Float(5.0)]);
        table.push_row(vec![Cell::from("B"), Cell::Null]);
        model
            .add_flag_links(&table, "id", &cols(&["risk"]), FlagAggregator::Count)
            .unwrap();
        assert_eq!(
            model.flag_links(),
            &[FlagLink {
                entity_id: "A".into(),
                flag_type: "risk".into(),
                flag_value: "risk".into(),
                count: 8,
            }]
        );
    }

    #[test]
    fn test_negative_count_is_rejected() {
        let mut model = ModelAssembler::default();
        let mut table = Table::new(["id", "risk"]);
        table.push_row(vec![Cell::from("A"), Cell::Int(-1)]);
        let err = model
            .add_flag_links(&table, "id", &cols(&["risk"]), FlagAggregator::Count)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidFlagCount { .. }));
    }

    #[test]
    fn test_group_links_and_clear() {
        let mut model = ModelAssembler::default();
        let table = Table::new(["id", "country"])
            .with_row(["A", "UK"])
            .with_row(["B", ""]);
        model.add_group_links(&table, "id", &cols(&["country"])).unwrap();
        assert_eq!(model.group_links().len(), 1);
        assert_eq!(model.graph().node_count(), 0);

        model
            .add_attribute_links(&contacts(), "id", &cols(&["phone"]))
            .unwrap();
        model.clear();
        assert_eq!(model.summary(), ModelSummary::default());
    }

    #[test]
    fn test_entity_without_values_is_kept() {
        let mut model = ModelAssembler::default();
        let mut table = Table::new(["id", "phone"]);
        table.push_row(vec![Cell::from("A"), Cell::Null]);
        table.push_row(vec![Cell::Null, Cell::from("555")]);
        table.push_row(vec![Cell::from("B"), Cell::from("555")]);

        let added = model.add_attribute_links(&table, "id", &cols(&["phone"])).unwrap();
        assert_eq!(added, 1);

        let g = model.graph();
        let a = g.node_id("ENTITY==A").unwrap();
        assert_eq!(g.degree(a), 0);
        assert_eq!(model.summary().entities, 2);

        let rebuilt = model.build_main_graph();
        assert_eq!(rebuilt.node_rows(), g.node_rows());
        assert_eq!(rebuilt.edge_label_pairs(), g.edge_label_pairs());
    }

    #[test]
    fn test_empty_table_gives_empty_graph() {
        let mut model = ModelAssembler::default();
        let table = Table::new(["id", "phone"]);
        assert_eq!(model.add_attribute_links(&table, "id", &cols(&["phone"])).unwrap(), 0);
        assert!(model.graph().is_empty());
    }
}
