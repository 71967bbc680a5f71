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

//! Netdetect Core
//!
//! Data model for entity-network detection:
//! - **Normalizer**: punctuation and whitespace cleanup, qualified `TYPE==VALUE` labels
//! - **Model Assembler**: attribute, flag and group links accumulated from tables
//! - **Labeled Graph**: the bipartite entity/attribute graph and its projections
//! - **Flag Integrator**: per-entity and per-network flag statistics
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌─────────────────┐
//! │  Table   │───►│ Normalizer │───►│ ModelAssembler  │
//! └──────────┘    └────────────┘    └───────┬─────────┘
//!                                           │
//!                    ┌──────────────────────┼─────────────────────┐
//!                    ▼                      ▼                     ▼
//!             ┌─────────────┐      ┌─────────────────┐    ┌──────────────┐
//!             │ LabeledGraph│      │ IntegratedFlags │    │  GroupLinks  │
//!             │   (main G)  │      │       (F)       │    │  (filters)   │
//!             └─────────────┘      └─────────────────┘    └──────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use netdetect_core::{ModelAssembler, Table};
//!
//! let table = Table::new(["id", "phone"])
//!     .with_row(["A", "555-1"])
//!     .with_row(["B", "555-1"]);
//!
//! let mut model = ModelAssembler::default();
//! model.add_attribute_links(&table, "id", &["phone".to_string()])?;
//! assert_eq!(model.graph().edge_count(), 2);
//! ```

pub mod config;
pub mod error;
pub mod flags;
pub mod graph;
pub mod links;
pub mod model;
pub mod normalize;
pub mod table;
pub mod telemetry;

pub use config::{DetectionConfig, EmbeddingConfig, NetworkConfig};
pub use error::{EngineError, EngineResult};
pub use flags::{FlagRow, FlagSummary, IntegratedFlags};
pub use graph::{EdgeRow, LabeledGraph, NodeData, NodeId, NodeRow};
pub use links::{AttributeLink, FlagAggregator, FlagLink, GroupLink, InferredLinks};
pub use model::{ModelAssembler, ModelSummary, EQUALITY_EDGE};
pub use normalize::{normalize_text, ENTITY_LABEL};
pub use table::{Cell, Table};
