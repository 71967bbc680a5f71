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

//! Embedder abstraction and an in-process mock

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::error::EmbedError;

/// Turns text into a dense vector
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError>;

    /// Embed a batch of texts, preserving order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }

    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether texts must be truncated to the character budget first
    fn checks_token_count(&self) -> bool {
        true
    }
}

/// Deterministic embedder for tests and offline runs.
///
/// Texts registered with [`MockEmbedder::with_vector`] get that vector; any
/// other text gets a pseudo-random vector derived from its SHA-256 digest.
#[derive(Debug, Default)]
pub struct MockEmbedder {
    vectors: HashMap<String, Vec<f64>>,
    calls: AtomicUsize,
    transient_failures: AtomicU32,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the vector returned for `text`
    pub fn with_vector(mut self, text: &str, vector: Vec<f64>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// Fail the next `count` calls with a retryable error
    pub fn with_transient_failures(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Number of `embed` calls served so far (including failures)
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hashed_vector(text: &str) -> Vec<f64> {
        Sha256::digest(text.as_bytes())
            .iter()
            .take(16)
            .map(|&b| f64::from(b) - 127.5)
            .collect()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EmbedError::RateLimitExceeded);
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| Self::hashed_vector(text)))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_pinned_and_hashed_vectors() {
        let embedder = MockEmbedder::new().with_vector("a", vec![1.0, 0.0]);
        assert_eq!(embedder.embed("a").await.unwrap(), vec![1.0, 0.0]);

        let first = embedder.embed("b").await.unwrap();
        let second = embedder.embed("b").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 16);
        assert_eq!(embedder.calls(), 3);
    }

    #[tokio::test]
    async fn test_mock_transient_failures() {
        let embedder = MockEmbedder::new().with_transient_failures(2);
        assert!(embedder.embed("x").await.is_err());
        assert!(embedder.embed("x").await.is_err());
        assert!(embedder.embed("x").await.is_ok());
    }

    #[tokio::test]
    async fn test_default_batch_preserves_order() {
        let embedder = MockEmbedder::new()
            .with_vector("a", vec![1.0])
            .with_vector("b", vec![2.0]);
        let vectors = embedder
            .embed_batch(&["b".to_string(), "a".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![2.0], vec![1.0]]);
    }
}
