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

//! Embedding Indexer
//!
//! Embeds the labels of selected node types and builds a cosine k-NN table
//! over them.
//!
//! ```text
//!  labels ──► cache lookup ──► misses in batches of `batch_size`
//!                                   │
//!                     ┌─────────────┴─────────────┐
//!                     │ semaphore(`concurrency`)  │──► embedder (retry + timeout)
//!                     └─────────────┬─────────────┘
//!                                   ▼
//!                  unit vectors ──► knn(k) ──► IndexOutput
//! ```

use futures::stream::{FuturesUnordered, StreamExt};
use netdetect_core::{EmbeddingConfig, EngineError, EngineResult, LabeledGraph};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{content_hash, CacheStats, EmbeddingCache};
use crate::embedder::Embedder;
use crate::error::EmbedError;
use crate::knn::{knn, normalize_in_place};
use crate::resilience::RetryPolicy;

/// Progress of an embedding run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingProgress {
    pub completed: usize,
    pub total: usize,
}

/// Callback receiving progress updates
pub type ProgressCallback = Box<dyn Fn(EmbeddingProgress) + Send + Sync>;

/// Tuning for an indexing run
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub batch_size: usize,
    pub concurrency: usize,
    /// Character budget per text
    pub max_tokens: usize,
    pub timeout: Duration,
    pub knn_neighbors: usize,
    pub retry: RetryPolicy,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self::from(&EmbeddingConfig::default())
    }
}

impl From<&EmbeddingConfig> for IndexerOptions {
    fn from(config: &EmbeddingConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            concurrency: config.concurrency.max(1),
            max_tokens: config.max_tokens,
            timeout: config.timeout(),
            knn_neighbors: config.knn_neighbors.max(1),
            retry: RetryPolicy::exponential(config.max_attempts),
        }
    }
}

/// Progress reporting and cancellation for one run
#[derive(Default)]
pub struct IndexControl {
    pub progress: Option<ProgressCallback>,
    pub cancel: CancellationToken,
}

impl IndexControl {
    pub fn with_progress(progress: impl Fn(EmbeddingProgress) + Send + Sync + 'static) -> Self {
        Self {
            progress: Some(Box::new(progress)),
            cancel: CancellationToken::new(),
        }
    }

    fn report(&self, completed: usize, total: usize) {
        if let Some(progress) = &self.progress {
            progress(EmbeddingProgress { completed, total });
        }
    }
}

/// Sorted texts with their k-NN table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexOutput {
    pub texts: Vec<String>,
    pub distances: Vec<Vec<f64>>,
    pub indices: Vec<Vec<usize>>,
}

/// Embeds node labels and builds the neighbour table
pub struct EmbeddingIndexer {
    embedder: Arc<dyn Embedder>,
    cache: EmbeddingCache,
    options: IndexerOptions,
}

impl EmbeddingIndexer {
    /// Indexer with an in-memory cache
    pub fn new(embedder: Arc<dyn Embedder>, options: IndexerOptions) -> Self {
        Self {
            embedder,
            cache: EmbeddingCache::in_memory(),
            options,
        }
    }

    /// Indexer configured from [`EmbeddingConfig`], opening the on-disk
    /// cache when a path is set
    pub fn from_config(
        embedder: Arc<dyn Embedder>,
        config: &EmbeddingConfig,
    ) -> EngineResult<Self> {
        let cache = match &config.cache_path {
            Some(path) => EmbeddingCache::open(path)?,
            None => EmbeddingCache::in_memory(),
        };
        Ok(Self {
            embedder,
            cache,
            options: IndexerOptions::from(config),
        })
    }

    pub fn with_cache(mut self, cache: EmbeddingCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn options(&self) -> &IndexerOptions {
        &self.options
    }

    /// Embed and index every node whose type is in `node_types`
    pub async fn index_nodes(
        &mut self,
        graph: &LabeledGraph,
        node_types: &[String],
    ) -> EngineResult<IndexOutput> {
        self.index_nodes_with(graph, node_types, &IndexControl::default())
            .await
    }

    /// [`Self::index_nodes`] with progress reporting and cancellation
    pub async fn index_nodes_with(
        &mut self,
        graph: &LabeledGraph,
        node_types: &[String],
        control: &IndexControl,
    ) -> EngineResult<IndexOutput> {
        if node_types.is_empty() {
            return Err(EngineError::EmptyIndexSet);
        }
        if graph.is_empty() {
            return Err(EngineError::EmptyInput("graph has no nodes to index".into()));
        }

        let wanted: BTreeSet<&str> = node_types.iter().map(String::as_str).collect();
        let texts: Vec<String> = graph
            .node_ids()
            .filter(|&id| wanted.contains(graph.node_type(id)))
            .map(|id| graph.label(id).to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if texts.is_empty() {
            return Err(EngineError::EmptyInput(format!(
                "no nodes of types {node_types:?}"
            )));
        }

        let vectors = self.embed_texts(&texts, control).await?;
        let table = knn(&vectors, self.options.knn_neighbors);
        info!(
            texts = texts.len(),
            k = self.options.knn_neighbors.min(texts.len()),
            embedder = self.embedder.name(),
            "Built embedding index"
        );

        Ok(IndexOutput {
            texts,
            distances: table.distances,
            indices: table.indices,
        })
    }

    /// Unit-norm embeddings for `texts`, in order, using the cache
    pub async fn embed_texts(
        &mut self,
        texts: &[String],
        control: &IndexControl,
    ) -> EngineResult<Vec<Vec<f64>>> {
        let total = texts.len();
        let mut vectors: Vec<Option<Vec<f64>>> = vec![None; total];
        let mut pending: Vec<usize> = Vec::new();

        for (i, text) in texts.iter().enumerate() {
            match self.cache.get(&content_hash(text)) {
                Some(vector) => vectors[i] = Some(vector.to_vec()),
                None => pending.push(i),
            }
        }

        let mut completed = total - pending.len();
        debug!(cached = completed, to_embed = pending.len(), "Embedding cache lookup");
        control.report(completed, total);

        let semaphore = Arc::new(Semaphore::new(self.options.concurrency));
        let retry = &self.options.retry;
        let timeout = self.options.timeout;

        for batch in pending.chunks(self.options.batch_size) {
            if control.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let mut tasks = FuturesUnordered::new();
            for &i in batch {
                let semaphore = Arc::clone(&semaphore);
                let embedder = Arc::clone(&self.embedder);
                let input = truncate_text(
                    &texts[i],
                    self.options.max_tokens,
                    embedder.checks_token_count(),
                );
                tasks.push(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| EngineError::Cancelled)?;
                    let vector = retry
                        .run(timeout, || embedder.embed(&input))
                        .await
                        .map_err(exhausted)?;
                    Ok::<_, EngineError>((i, vector))
                });
            }

            loop {
                tokio::select! {
                    _ = control.cancel.cancelled() => return Err(EngineError::Cancelled),
                    next = tasks.next() => match next {
                        Some(result) => {
                            let (i, mut vector) = result?;
                            normalize_in_place(&mut vector);
                            self.cache.insert(&texts[i], vector.clone());
                            vectors[i] = Some(vector);
                            completed += 1;
                            control.report(completed, total);
                        }
                        None => break,
                    }
                }
            }
            debug!(completed, total, "Embedding batch finished");
        }

        self.cache.persist()?;
        let stats = self.cache.stats();
        info!(hits = stats.hits, misses = stats.misses, entries = stats.entries, "Embedding cache");

        let vectors: Vec<Vec<f64>> = vectors
            .into_iter()
            .collect::<Option<_>>()
            .ok_or_else(|| EngineError::EmbedderFatal("missing embedding".into()))?;
        if let Some(first) = vectors.first() {
            if vectors.iter().any(|v| v.len() != first.len()) {
                return Err(EngineError::EmbedderFatal(
                    "embedder returned vectors of different dimensions".into(),
                ));
            }
        }
        Ok(vectors)
    }
}

/// Cut `text` to `max_chars` characters when the embedder needs it
fn truncate_text(text: &str, max_chars: usize, enforce: bool) -> String {
    if !enforce || text.chars().count() <= max_chars {
        return text.to_string();
    }
    warn!(chars = text.chars().count(), max_chars, "Truncating text before embedding");
    text.chars().take(max_chars).collect()
}

fn exhausted(e: EmbedError) -> EngineError {
    match e {
        EmbedError::Init(msg) => EngineError::EmbedderInit(msg),
        e => EngineError::EmbedderFatal(e.to_string()),
    }
}
