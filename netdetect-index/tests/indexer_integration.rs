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

//! Integration tests for embedding, caching and inference

use async_trait::async_trait;
use netdetect_core::{EngineError, ModelAssembler, Table};
use netdetect_index::{
    infer_links, EmbedError, Embedder, EmbeddingCache, EmbeddingIndexer, IndexControl,
    IndexerOptions, MockEmbedder, RetryPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn names_model() -> ModelAssembler {
    let table = Table::new(["id", "name", "phone"])
        .with_row(["A", "PlusOne", "1"])
        .with_row(["B", "Plus One", "2"])
        .with_row(["C", "Zed Corp", "3"]);
    let mut model = ModelAssembler::default();
    model
        .add_attribute_links(&table, "id", &["name".to_string(), "phone".to_string()])
        .unwrap();
    model
}

fn fast_options() -> IndexerOptions {
    IndexerOptions {
        retry: RetryPolicy::immediate(5),
        ..IndexerOptions::default()
    }
}

fn fuzzy_embedder() -> MockEmbedder {
    MockEmbedder::new()
        .with_vector("name==PlusOne", vec![1.0, 0.0, 0.0])
        .with_vector("name==Plus One", vec![0.99, 0.05, 0.0])
        .with_vector("name==Zed Corp", vec![0.0, 0.0, 1.0])
}

struct BrokenEmbedder;

#[async_trait]
impl Embedder for BrokenEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f64>, EmbedError> {
        Err(EmbedError::InvalidResponse("garbage".into()))
    }

    fn name(&self) -> &str {
        "broken"
    }
}

/// Texts are sorted and every row starts with itself at distance zero
#[tokio::test]
async fn test_index_output_shape() {
    let model = names_model();
    let mut indexer = EmbeddingIndexer::new(Arc::new(fuzzy_embedder()), fast_options());
    let output = indexer
        .index_nodes(model.graph(), &["name".to_string()])
        .await
        .unwrap();

    assert_eq!(
        output.texts,
        vec!["name==Plus One", "name==PlusOne", "name==Zed Corp"]
    );
    for i in 0..output.texts.len() {
        assert_eq!(output.indices[i][0], i);
        assert_eq!(output.distances[i][0], 0.0);
        assert_eq!(output.indices[i].len(), 3);
    }
}

/// Near-duplicate names become a symmetric soft link
#[tokio::test]
async fn test_fuzzy_names_are_linked() {
    let model = names_model();
    let mut indexer = EmbeddingIndexer::new(Arc::new(fuzzy_embedder()), fast_options());
    let output = indexer
        .index_nodes(model.graph(), &["name".to_string()])
        .await
        .unwrap();
    let links = infer_links(&output, 0.1).unwrap();

    assert!(links.contains("name==Plus One", "name==PlusOne"));
    assert!(links.contains("name==PlusOne", "name==Plus One"));
    assert_eq!(links.pair_count(), 1);
}

/// Cached texts are not sent to the embedder again
#[tokio::test]
async fn test_cache_avoids_repeat_calls() {
    let model = names_model();
    let mock = Arc::new(fuzzy_embedder());
    let mut indexer = EmbeddingIndexer::new(mock.clone(), fast_options());
    let types = vec!["name".to_string()];

    indexer.index_nodes(model.graph(), &types).await.unwrap();
    assert_eq!(mock.calls(), 3);
    indexer.index_nodes(model.graph(), &types).await.unwrap();
    assert_eq!(mock.calls(), 3);

    let stats = indexer.cache_stats();
    assert_eq!(stats.hits, 3);
    assert_eq!(stats.misses, 3);
    assert_eq!(stats.entries, 3);
}

/// The on-disk cache survives across indexers
#[tokio::test]
async fn test_persistent_cache_reused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("embeddings.json");
    let model = names_model();
    let types = vec!["name".to_string(), "phone".to_string()];

    let first = Arc::new(MockEmbedder::new());
    let mut indexer = EmbeddingIndexer::new(first.clone(), fast_options())
        .with_cache(EmbeddingCache::open(&path).unwrap());
    let expected = indexer.index_nodes(model.graph(), &types).await.unwrap();
    assert_eq!(first.calls(), 6);

    let second = Arc::new(MockEmbedder::new());
    let mut indexer = EmbeddingIndexer::new(second.clone(), fast_options())
        .with_cache(EmbeddingCache::open(&path).unwrap());
    let output = indexer.index_nodes(model.graph(), &types).await.unwrap();
    assert_eq!(second.calls(), 0);
    assert_eq!(output.texts, expected.texts);
    for (row, expected_row) in output.distances.iter().zip(&expected.distances) {
        for (d, e) in row.iter().zip(expected_row) {
            assert!((d - e).abs() < 1e-9);
        }
    }
}

/// Progress ends at (total, total)
#[tokio::test]
async fn test_progress_reported() {
    let model = names_model();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let control = IndexControl::with_progress(move |p| sink.lock().unwrap().push(p));

    let options = IndexerOptions {
        batch_size: 2,
        concurrency: 1,
        ..fast_options()
    };
    let mut indexer = EmbeddingIndexer::new(Arc::new(MockEmbedder::new()), options);
    indexer
        .index_nodes_with(model.graph(), &["name".to_string()], &control)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    let last = seen.last().unwrap();
    assert_eq!((last.completed, last.total), (3, 3));
    assert!(seen.windows(2).all(|w| w[0].completed <= w[1].completed));
}

/// Transient failures are retried transparently
#[tokio::test]
async fn test_transient_failures_are_retried() {
    let model = names_model();
    let mock = Arc::new(MockEmbedder::new().with_transient_failures(4));
    let mut indexer = EmbeddingIndexer::new(mock.clone(), fast_options());
    let output = indexer
        .index_nodes(model.graph(), &["phone".to_string()])
        .await
        .unwrap();
    assert_eq!(output.texts.len(), 3);
    assert_eq!(mock.calls(), 7);
}

/// Permanent failures surface as fatal embedder errors
#[tokio::test]
async fn test_permanent_failure_surfaces() {
    let model = names_model();
    let mut indexer = EmbeddingIndexer::new(Arc::new(BrokenEmbedder), fast_options());
    let err = indexer
        .index_nodes(model.graph(), &["name".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmbedderFatal(_)));
}

/// Input shape errors
#[tokio::test]
async fn test_empty_inputs() {
    let model = names_model();
    let mut indexer = EmbeddingIndexer::new(Arc::new(MockEmbedder::new()), fast_options());

    let err = indexer.index_nodes(model.graph(), &[]).await.unwrap_err();
    assert!(matches!(err, EngineError::EmptyIndexSet));

    let err = indexer
        .index_nodes(model.graph(), &["email".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyInput(_)));

    let empty = ModelAssembler::default();
    let err = indexer
        .index_nodes(empty.graph(), &["name".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyInput(_)));
}

/// A cancelled token stops the run before any embedding
#[tokio::test]
async fn test_cancelled_run() {
    let model = names_model();
    let mock = Arc::new(MockEmbedder::new());
    let mut indexer = EmbeddingIndexer::new(mock.clone(), fast_options());
    let control = IndexControl::default();
    control.cancel.cancel();

    let err = indexer
        .index_nodes_with(model.graph(), &["name".to_string()], &control)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert_eq!(mock.calls(), 0);
}

/// Truncation applies only to embedders that ask for it
#[tokio::test]
async fn test_long_texts_truncated() {
    struct Recording(AtomicUsize);

    #[async_trait]
    impl Embedder for Recording {
        async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
            self.0.fetch_max(text.chars().count(), Ordering::SeqCst);
            Ok(vec![1.0])
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    let model = names_model();
    let recorder = Arc::new(Recording(AtomicUsize::new(0)));
    let options = IndexerOptions {
        max_tokens: 5,
        ..fast_options()
    };
    let mut indexer = EmbeddingIndexer::new(recorder.clone(), options);
    indexer
        .index_nodes(model.graph(), &["name".to_string()])
        .await
        .unwrap();
    assert_eq!(recorder.0.load(Ordering::SeqCst), 5);
}

/// No more than `concurrency` embed calls run at once
#[tokio::test]
async fn test_concurrency_bounds_in_flight_calls() {
    #[derive(Default)]
    struct Overlapping {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for Overlapping {
        async fn embed(&self, _text: &str) -> Result<Vec<f64>, EmbedError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![1.0, 0.0])
        }

        fn name(&self) -> &str {
            "overlapping"
        }
    }

    let embedder = Arc::new(Overlapping::default());
    let options = IndexerOptions {
        concurrency: 2,
        batch_size: 4,
        ..fast_options()
    };
    let mut indexer = EmbeddingIndexer::new(embedder.clone(), options);
    let texts: Vec<String> = (0..12).map(|i| format!("name==Company {i}")).collect();
    let vectors = indexer
        .embed_texts(&texts, &IndexControl::default())
        .await
        .unwrap();

    assert_eq!(vectors.len(), 12);
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 12);
    let peak = embedder.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "peak in-flight calls {peak} exceeded the bound");
    assert!(peak > 1, "calls never overlapped");
}
