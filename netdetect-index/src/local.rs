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

//! Local sentence encoder (feature `local-embeddings`)

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::embedder::Embedder;
use crate::error::EmbedError;

/// ONNX sentence encoder loaded from a local model directory.
///
/// The model truncates input itself, so no character budget is applied.
pub struct LocalEmbedder {
    model: Arc<TextEmbedding>,
}

impl LocalEmbedder {
    /// Load `all-MiniLM-L6-v2` from (or download into) `model_dir`
    pub fn load(model_dir: impl Into<PathBuf>) -> Result<Self, EmbedError> {
        let model_dir = model_dir.into();
        let options = InitOptions::new(EmbeddingModel::AllMiniLML6V2)
            .with_cache_dir(model_dir.clone())
            .with_show_download_progress(false);
        let model = TextEmbedding::try_new(options).map_err(|e| EmbedError::Init(e.to_string()))?;
        info!(dir = %model_dir.display(), "Loaded local embedding model");
        Ok(Self {
            model: Arc::new(model),
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        let vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::InvalidResponse("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || model.embed(texts, None))
            .await
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))?;
        Ok(vectors
            .into_iter()
            .map(|v| v.into_iter().map(f64::from).collect())
            .collect())
    }

    fn name(&self) -> &str {
        "all-MiniLM-L6-v2"
    }

    fn checks_token_count(&self) -> bool {
        false
    }
}
