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

//! Netdetect Index
//!
//! Embedding-based soft equality between attribute values:
//! - **Embedders**: pluggable [`Embedder`] trait with a remote OpenAI-compatible
//!   client, an optional local ONNX encoder and a deterministic mock
//! - **Embedding Cache**: SHA-256 keyed vectors persisted atomically
//! - **Indexer**: batched, bounded-concurrency embedding with retry and a
//!   brute-force cosine k-NN table
//! - **Inference**: symmetric soft-equality links under a distance threshold
//!
//! # Example
//!
//! ```rust,ignore
//! use netdetect_index::{infer_links, EmbeddingIndexer, IndexerOptions, MockEmbedder};
//! use std::sync::Arc;
//!
//! let embedder = Arc::new(MockEmbedder::new());
//! let mut indexer = EmbeddingIndexer::new(embedder, IndexerOptions::default());
//! let output = indexer.index_nodes(model.graph(), &["name".to_string()]).await?;
//! let links = infer_links(&output, 0.1)?;
//! ```

pub mod cache;
pub mod embedder;
pub mod error;
pub mod indexer;
pub mod inference;
pub mod knn;
#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod remote;
pub mod resilience;

pub use cache::{content_hash, CacheStats, EmbeddingCache};
pub use embedder::{Embedder, MockEmbedder};
pub use error::EmbedError;
pub use indexer::{
    EmbeddingIndexer, EmbeddingProgress, IndexControl, IndexOutput, IndexerOptions,
    ProgressCallback,
};
pub use inference::infer_links;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;
pub use remote::{EmbedderAuth, OpenAiEmbedder, RemoteEmbedderConfig, TokenProvider};
pub use resilience::RetryPolicy;
