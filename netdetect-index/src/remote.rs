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

//! OpenAI-compatible remote embedder

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::embedder::Embedder;
use crate::error::EmbedError;

/// Supplies short-lived bearer tokens (for identity-based auth)
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<String, EmbedError>;
}

/// How requests are authenticated
#[derive(Clone)]
pub enum EmbedderAuth {
    /// Static key sent as a bearer token
    ApiKey(String),
    /// Token fetched before every request
    TokenProvider(Arc<dyn TokenProvider>),
}

impl fmt::Debug for EmbedderAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmbedderAuth::ApiKey(_) => f.write_str("ApiKey(***)"),
            EmbedderAuth::TokenProvider(_) => f.write_str("TokenProvider"),
        }
    }
}

/// Remote embedder settings
#[derive(Debug, Clone)]
pub struct RemoteEmbedderConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub endpoint: String,
    pub model: String,
    pub auth: EmbedderAuth,
    /// Sent as the `api-version` query parameter when set
    pub api_version: Option<String>,
    pub timeout: Duration,
}

impl RemoteEmbedderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            auth: EmbedderAuth::ApiKey(api_key.into()),
            api_version: None,
            timeout: Duration::from_secs(90),
        }
    }
}

/// Embedder backed by an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbedder {
    config: RemoteEmbedderConfig,
    client: reqwest::Client,
}

impl OpenAiEmbedder {
    pub fn new(config: RemoteEmbedderConfig) -> Result<Self, EmbedError> {
        if config.endpoint.trim().is_empty() {
            return Err(EmbedError::Init("embedding endpoint is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EmbedError::Init(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn url(&self) -> String {
        let base = self.config.endpoint.trim_end_matches('/');
        match &self.config.api_version {
            Some(version) => format!("{base}/embeddings?api-version={version}"),
            None => format!("{base}/embeddings"),
        }
    }

    async fn bearer(&self) -> Result<String, EmbedError> {
        match &self.config.auth {
            EmbedderAuth::ApiKey(key) => Ok(key.clone()),
            EmbedderAuth::TokenProvider(provider) => provider.token().await,
        }
    }
}

/// Extract `data[].embedding` in response order
pub(crate) fn parse_embeddings(
    body: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f64>>, EmbedError> {
    let data = body["data"]
        .as_array()
        .ok_or_else(|| EmbedError::InvalidResponse("missing data array".to_string()))?;

    let mut rows: Vec<(usize, Vec<f64>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let vector = item["embedding"]
            .as_array()
            .ok_or_else(|| EmbedError::InvalidResponse("missing embedding".to_string()))?
            .iter()
            .map(|v| {
                v.as_f64()
                    .ok_or_else(|| EmbedError::InvalidResponse("non-numeric component".to_string()))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        let index = item["index"].as_u64().map_or(position, |i| i as usize);
        rows.push((index, vector));
    }
    rows.sort_by_key(|(index, _)| *index);

    if rows.len() != expected {
        return Err(EmbedError::InvalidResponse(format!(
            "expected {expected} embeddings, got {}",
            rows.len()
        )));
    }
    Ok(rows.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::InvalidResponse("no embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        let request = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.url())
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbedError::Timeout(self.config.timeout)
                } else {
                    EmbedError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(EmbedError::RateLimitExceeded);
            }
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: serde_json::Value = response.json().await?;
        debug!(count = texts.len(), model = %self.config.model, "Embedded batch");
        parse_embeddings(&body, texts.len())
    }

    fn name(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_embeddings_orders_by_index() {
        let body = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_embeddings(&body, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_embeddings_count_mismatch() {
        let body = json!({"data": [{"embedding": [1.0]}]});
        assert!(matches!(
            parse_embeddings(&body, 2),
            Err(EmbedError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_url_with_api_version() {
        let mut config = RemoteEmbedderConfig::openai("key");
        config.endpoint = "https://example.test/openai/".to_string();
        config.api_version = Some("2024-02-01".to_string());
        let embedder = OpenAiEmbedder::new(config).unwrap();
        assert_eq!(
            embedder.url(),
            "https://example.test/openai/embeddings?api-version=2024-02-01"
        );
    }

    #[test]
    fn test_empty_endpoint_is_init_error() {
        let mut config = RemoteEmbedderConfig::openai("key");
        config.endpoint = " ".to_string();
        assert!(matches!(OpenAiEmbedder::new(config), Err(EmbedError::Init(_))));
    }

    #[test]
    fn test_auth_debug_hides_key() {
        let auth = EmbedderAuth::ApiKey("secret".into());
        assert_eq!(format!("{auth:?}"), "ApiKey(***)");
    }
}
