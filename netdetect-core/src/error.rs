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

//! Error types shared by every netdetect crate

use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur while building, indexing, partitioning or
/// reporting on entity networks
#[derive(Debug, Error)]
pub enum EngineError {
    /// An operation received nothing to work on
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// Indexing was requested with an empty list of node types
    #[error("No node types selected for indexing")]
    EmptyIndexSet,

    /// Similarity threshold outside the accepted band
    #[error("Similarity threshold {0} is outside [0.001, 1.0]")]
    ThresholdOutOfRange(f64),

    /// A referenced table column does not exist
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A referenced node label is not part of the graph
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Embedder call failed but may succeed on retry
    #[error("Transient embedder error: {0}")]
    EmbedderTransient(String),

    /// Embedder call failed permanently or retries were exhausted
    #[error("Embedder error: {0}")]
    EmbedderFatal(String),

    /// Embedder could not be constructed (model load, credentials)
    #[error("Embedder initialization failed: {0}")]
    EmbedderInit(String),

    /// The partition engine could not honour the size cap
    #[error("Partition failure: {0}")]
    PartitionFailure(String),

    /// Count aggregation received a negative or non-numeric cell
    #[error("Invalid flag count in column {column}: {value}")]
    InvalidFlagCount { column: String, value: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation cancelled through its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(e: toml::de::Error) -> Self {
        EngineError::Config(e.to_string())
    }
}

impl EngineError {
    /// Whether retrying the failed operation could succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::EmbedderTransient(_))
    }
}
