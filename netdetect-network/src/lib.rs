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

//! Netdetect Network
//!
//! From the main graph to reviewable networks:
//! - **Projection**: hub trimming and the entity-only graph
//! - **Partitioning**: connected components split by hierarchical Leiden under
//!   a size cap
//! - **Materialization**: annotated attribute context of one network
//! - **Exposure**: flag exposure and evidence paths for a selected entity
//! - **Simplification & Reports**: compact network views and the payload for
//!   downstream text generation
//!
//! [`NetworkWorkflow`] ties these together with the core data model and the
//! embedding index.
//!
//! # Example
//!
//! ```rust,ignore
//! use netdetect_core::{NetworkConfig, Table};
//! use netdetect_network::NetworkWorkflow;
//!
//! let mut workflow = NetworkWorkflow::new(NetworkConfig::default())?;
//! workflow.add_attribute_links(&contacts, "id", &["phone".to_string()])?;
//! let partition = workflow.identify_networks(&Vec::<String>::new())?;
//! let report = workflow.entity_exposure("A")?;
//! println!("{}", report.render());
//! ```

pub mod exposure;
pub mod leiden;
pub mod materialize;
pub mod partition;
pub mod projection;
pub mod report;
pub mod simplify;
pub mod workflow;

pub use exposure::{analyze_exposure, ExposureReport, NodeAnnotation, PathGroup, PathNode};
pub use leiden::{LeidenClustering, LeidenConfig, WeightedGraph};
pub use materialize::{NetworkMaterializer, INFERRED_EDGE};
pub use partition::{identify_networks, HierarchicalLeiden, NetworkPartition, PartitionEngine};
pub use projection::{project_entity_graph, trim_nodeset, TrimResult, PROJECTED_EDGE};
pub use report::ReportInput;
pub use simplify::simplify_graph;
pub use workflow::{
    sort_network_summaries, EntityRow, NetworkOrder, NetworkSummary, NetworkWorkflow,
};
