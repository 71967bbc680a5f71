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

//! Network workflow
//!
//! [`NetworkWorkflow`] owns the whole detection state: the data model,
//! inferred links, the entity projection, the current partition and the
//! integrated flags. It is passed around explicitly; nothing here is global.
//!
//! ```text
//! add_*_links ──► [index_nodes ──► infer_links] ──► identify_networks
//!                                                        │
//!       entity_exposure / build_report ◄── materialize_network
//! ```

use netdetect_core::normalize::{normalize_text, split_label, to_entity_label};
use netdetect_core::{
    EngineError, EngineResult, FlagAggregator, FlagSummary, InferredLinks, IntegratedFlags,
    LabeledGraph, ModelAssembler, ModelSummary, NetworkConfig, Table,
};
use netdetect_index::{infer_links, EmbeddingIndexer, IndexControl, IndexOutput};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::exposure::{analyze_exposure, ExposureReport};
use crate::materialize::NetworkMaterializer;
use crate::partition::{identify_networks, HierarchicalLeiden, NetworkPartition, PartitionEngine};
use crate::projection::{project_entity_graph, trim_nodeset, TrimResult};
use crate::report::ReportInput;
use crate::simplify::simplify_graph;

/// One row of the network overview
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub index: usize,
    /// Sorted bare entity ids
    pub entities: Vec<String>,
    pub size: usize,
    #[serde(flatten)]
    pub flags: FlagSummary,
}

/// Sort key for [`sort_network_summaries`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkOrder {
    /// Most community flags first
    Flags,
    /// Largest network first
    Size,
}

/// Sort overview rows, descending, ties broken by network index
pub fn sort_network_summaries(rows: &mut [NetworkSummary], order: NetworkOrder) {
    match order {
        NetworkOrder::Flags => rows.sort_by(|a, b| {
            b.flags
                .community_flags
                .cmp(&a.flags.community_flags)
                .then(a.index.cmp(&b.index))
        }),
        NetworkOrder::Size => rows.sort_by(|a, b| b.size.cmp(&a.size).then(a.index.cmp(&b.index))),
    }
}

/// `(entity, network, flags)` row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRow {
    pub entity: String,
    pub network: usize,
    pub flags: u64,
}

/// Detection state for one analysis session
pub struct NetworkWorkflow {
    config: NetworkConfig,
    assembler: ModelAssembler,
    inferred: InferredLinks,
    index_output: Option<IndexOutput>,
    trim: TrimResult,
    projected: LabeledGraph,
    partition: NetworkPartition,
    flags: IntegratedFlags,
    engine: Box<dyn PartitionEngine>,
}

impl NetworkWorkflow {
    /// Validate `config` and start an empty workflow
    pub fn new(config: NetworkConfig) -> EngineResult<Self> {
        config.validate()?;
        let assembler = ModelAssembler::new(&config.detection.attribute_value_separator);
        Ok(Self {
            config,
            assembler,
            inferred: InferredLinks::new(),
            index_output: None,
            trim: TrimResult::default(),
            projected: LabeledGraph::new(),
            partition: NetworkPartition::default(),
            flags: IntegratedFlags::new(),
            engine: Box::new(HierarchicalLeiden),
        })
    }

    /// Replace the partition backend
    pub fn with_partition_engine(mut self, engine: Box<dyn PartitionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    fn separator(&self) -> &str {
        &self.config.detection.attribute_value_separator
    }

    // ------------------------------------------------------------------
    // Data model
    // ------------------------------------------------------------------

    pub fn add_attribute_links(
        &mut self,
        table: &Table,
        entity_column: &str,
        value_columns: &[String],
    ) -> EngineResult<usize> {
        self.assembler.add_attribute_links(table, entity_column, value_columns)
    }

    /// Add flag links and fold them into the integrated flags
    pub fn add_flag_links(
        &mut self,
        table: &Table,
        entity_column: &str,
        flag_columns: &[String],
        aggregator: FlagAggregator,
    ) -> EngineResult<usize> {
        let added = self
            .assembler
            .add_flag_links(table, entity_column, flag_columns, aggregator)?;
        self.flags = IntegratedFlags::from_links(self.assembler.flag_links(), self.separator());
        Ok(added)
    }

    pub fn add_group_links(
        &mut self,
        table: &Table,
        entity_column: &str,
        group_columns: &[String],
    ) -> EngineResult<usize> {
        self.assembler.add_group_links(table, entity_column, group_columns)
    }

    /// Reset links, graph, flags, inferred links and derived results
    pub fn clear_data_model(&mut self) {
        self.assembler.clear();
        self.inferred.clear();
        self.index_output = None;
        self.trim = TrimResult::default();
        self.projected = LabeledGraph::new();
        self.partition = NetworkPartition::default();
        self.flags = IntegratedFlags::new();
    }

    pub fn clear_inferred_links(&mut self) {
        self.inferred.clear();
        info!("Cleared inferred links");
    }

    pub fn main_graph(&self) -> &LabeledGraph {
        self.assembler.graph()
    }

    pub fn model_summary(&self) -> ModelSummary {
        self.assembler.summary()
    }

    /// Attribute types available for indexing
    pub fn node_types(&self) -> &BTreeSet<String> {
        self.assembler.node_types()
    }

    // ------------------------------------------------------------------
    // Embedding and inference
    // ------------------------------------------------------------------

    /// Embed every node of `node_types` and keep the neighbour table.
    ///
    /// Returns the number of indexed texts.
    pub async fn index_nodes(
        &mut self,
        indexer: &mut EmbeddingIndexer,
        node_types: &[String],
        control: &IndexControl,
    ) -> EngineResult<usize> {
        let output = indexer
            .index_nodes_with(self.assembler.graph(), node_types, control)
            .await?;
        let indexed = output.texts.len();
        self.index_output = Some(output);
        Ok(indexed)
    }

    /// Replace the inferred links using the last index and `threshold`
    /// (the configured threshold when `None`). Returns the number of pairs.
    pub fn infer_links(&mut self, threshold: Option<f64>) -> EngineResult<usize> {
        let output = self
            .index_output
            .as_ref()
            .ok_or_else(|| EngineError::EmptyInput("no embedding index has been built".into()))?;
        let threshold = threshold.unwrap_or(self.config.detection.similarity_threshold);
        self.inferred = infer_links(output, threshold)?;
        Ok(self.inferred.pair_count())
    }

    pub fn inferred_links(&self) -> &InferredLinks {
        &self.inferred
    }

    /// Sorted `(text, similar_text)` pairs
    pub fn inferred_links_table(&self) -> Vec<(String, String)> {
        self.inferred.pairs()
    }

    // ------------------------------------------------------------------
    // Networks
    // ------------------------------------------------------------------

    fn supporting_types(&self) -> BTreeSet<String> {
        self.config
            .detection
            .supporting_attribute_types
            .iter()
            .map(|t| normalize_text(t))
            .collect()
    }

    /// Trim, project and partition. `excluded` labels are trimmed on top of
    /// the over-degree attributes.
    pub fn identify_networks<S: AsRef<str>>(
        &mut self,
        excluded: &[S],
    ) -> EngineResult<&NetworkPartition> {
        let detection = &self.config.detection;
        let graph = self.assembler.graph();
        let trim = trim_nodeset(graph, detection.max_attribute_degree, excluded);
        let projected =
            project_entity_graph(graph, &trim.trimmed, &self.inferred, &self.supporting_types());
        let partition = identify_networks(
            &projected,
            detection.max_network_entities,
            detection.partition_seed,
            self.engine.as_ref(),
        )?;

        self.trim = trim;
        self.projected = projected;
        self.partition = partition;
        Ok(&self.partition)
    }

    pub fn partition(&self) -> &NetworkPartition {
        &self.partition
    }

    pub fn projected_graph(&self) -> &LabeledGraph {
        &self.projected
    }

    pub fn trim_result(&self) -> &TrimResult {
        &self.trim
    }

    fn network(&self, index: usize) -> EngineResult<&[String]> {
        self.partition
            .network(index)
            .ok_or_else(|| EngineError::UnknownNode(format!("network {index}")))
    }

    fn bare_id<'a>(&self, label: &'a str) -> &'a str {
        split_label(label, self.separator()).1
    }

    // ------------------------------------------------------------------
    // Flags and review tables
    // ------------------------------------------------------------------

    pub fn integrated_flags(&self) -> &IntegratedFlags {
        &self.flags
    }

    /// One overview row per network, in network order
    pub fn network_summaries(&self) -> Vec<NetworkSummary> {
        self.partition
            .networks
            .iter()
            .enumerate()
            .map(|(index, entities)| NetworkSummary {
                index,
                entities: entities.iter().map(|e| self.bare_id(e).to_string()).collect(),
                size: entities.len(),
                flags: self.flags.network_summary(entities),
            })
            .collect()
    }

    /// Every partitioned entity with its network and flag total
    pub fn entity_table(&self) -> Vec<EntityRow> {
        self.partition
            .entity_network
            .iter()
            .map(|(entity, &network)| EntityRow {
                entity: self.bare_id(entity).to_string(),
                network,
                flags: self.flags.entity_flags(entity),
            })
            .collect()
    }

    /// Group attributes and values carried by `entity`
    pub fn group_values_for(&self, entity: &str) -> BTreeMap<String, BTreeSet<String>> {
        let label = to_entity_label(entity, self.separator());
        let id = self.bare_id(&label);
        let mut values: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for link in self.assembler.group_links().iter().filter(|l| l.entity_id == id) {
            values
                .entry(link.group_attribute.clone())
                .or_default()
                .insert(link.group_value.clone());
        }
        values
    }

    /// Networks holding an entity that carries any of the
    /// `(group_attribute, group_value)` pairs
    pub fn networks_with_groups(&self, groups: &[(String, String)]) -> Vec<usize> {
        let wanted: BTreeSet<(String, String)> = groups
            .iter()
            .map(|(attribute, value)| (normalize_text(attribute), normalize_text(value)))
            .collect();
        let sep = self.separator();
        let selected: BTreeSet<usize> = self
            .assembler
            .group_links()
            .iter()
            .filter(|l| wanted.contains(&(l.group_attribute.clone(), l.group_value.clone())))
            .filter_map(|l| {
                self.partition
                    .network_of(&to_entity_label(&l.entity_id, sep))
            })
            .collect();
        selected.into_iter().collect()
    }

    /// Networks with an entity id containing `query`, ignoring case
    pub fn search_networks(&self, query: &str) -> Vec<usize> {
        let query = query.to_lowercase();
        self.partition
            .networks
            .iter()
            .enumerate()
            .filter(|(_, entities)| {
                entities
                    .iter()
                    .any(|e| self.bare_id(e).to_lowercase().contains(&query))
            })
            .map(|(index, _)| index)
            .collect()
    }

    // ------------------------------------------------------------------
    // Materialization, exposure and reports
    // ------------------------------------------------------------------

    /// Annotated attribute context of network `index`
    pub fn materialize_network(&self, index: usize) -> EngineResult<LabeledGraph> {
        let entities = self.network(index)?;
        let supporting = self.supporting_types();
        NetworkMaterializer::new(
            self.assembler.graph(),
            &self.inferred,
            &self.trim.trimmed,
            &supporting,
            &self.flags,
            &self.partition.entity_network,
        )
        .materialize(index, entities)
    }

    fn locate(&self, entity: &str) -> EngineResult<(String, usize)> {
        let label = to_entity_label(entity, self.separator());
        let network = self
            .partition
            .network_of(&label)
            .ok_or_else(|| EngineError::UnknownNode(label.clone()))?;
        Ok((label, network))
    }

    /// Exposure of `entity` (bare id or qualified label) within its network
    pub fn entity_exposure(&self, entity: &str) -> EngineResult<ExposureReport> {
        let (label, network) = self.locate(entity)?;
        let subgraph = self.materialize_network(network)?;
        analyze_exposure(&self.flags, &subgraph, &label, self.network(network)?)
    }

    /// Report payload for `entity`, with the simplified network subgraph
    pub fn build_report(&self, entity: &str) -> EngineResult<ReportInput> {
        let (label, network) = self.locate(entity)?;
        let subgraph = self.materialize_network(network)?;
        let exposure = analyze_exposure(&self.flags, &subgraph, &label, self.network(network)?)?;
        let detection = &self.config.detection;
        let simplified = simplify_graph(
            &subgraph,
            &detection.attribute_value_separator,
            &detection.list_separator,
        );
        Ok(ReportInput::new(
            self.bare_id(&label),
            network,
            self.flags.max_entity_flags(),
            self.flags.mean_flagged_flags(),
            &exposure,
            &simplified,
        ))
    }
}
