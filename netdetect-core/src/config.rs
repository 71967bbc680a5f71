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

//! Network detection configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{EngineError, EngineResult};
use crate::normalize::{is_valid_separator, DEFAULT_ATTRIBUTE_SEPARATOR, DEFAULT_LIST_SEPARATOR};

/// Lowest accepted similarity threshold
pub const MIN_SIMILARITY_THRESHOLD: f64 = 0.001;

/// Highest accepted similarity threshold
pub const MAX_SIMILARITY_THRESHOLD: f64 = 1.0;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// Maximum cosine distance for two texts to be inferred equal
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Attribute nodes linked to more entities than this are trimmed
    #[serde(default = "default_max_attribute_degree")]
    pub max_attribute_degree: usize,

    /// Upper bound on entities per network
    #[serde(default = "default_max_network_entities")]
    pub max_network_entities: usize,

    /// Attribute types shown for context but never used to link entities
    #[serde(default)]
    pub supporting_attribute_types: Vec<String>,

    /// Seed for community detection
    #[serde(default = "default_partition_seed")]
    pub partition_seed: u64,

    #[serde(default = "default_attribute_separator")]
    pub attribute_value_separator: String,

    #[serde(default = "default_list_separator")]
    pub list_separator: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Maximum outstanding embedder requests
    #[serde(default = "default_embedding_concurrency")]
    pub concurrency: usize,

    /// Texts per batch
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Character budget per text before truncation
    #[serde(default = "default_embedding_max_tokens")]
    pub max_tokens: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Attempts per call, including the first
    #[serde(default = "default_embedding_max_attempts")]
    pub max_attempts: u32,

    /// Neighbours kept per text in the k-NN index
    #[serde(default = "default_knn_neighbors")]
    pub knn_neighbors: usize,

    /// On-disk embedding cache (disabled when unset)
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            max_attribute_degree: default_max_attribute_degree(),
            max_network_entities: default_max_network_entities(),
            supporting_attribute_types: Vec::new(),
            partition_seed: default_partition_seed(),
            attribute_value_separator: default_attribute_separator(),
            list_separator: default_list_separator(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            concurrency: default_embedding_concurrency(),
            batch_size: default_embedding_batch_size(),
            max_tokens: default_embedding_max_tokens(),
            timeout_secs: default_embedding_timeout(),
            max_attempts: default_embedding_max_attempts(),
            knn_neighbors: default_knn_neighbors(),
            cache_path: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_similarity_threshold() -> f64 {
    0.001
}

fn default_max_attribute_degree() -> usize {
    10
}

fn default_max_network_entities() -> usize {
    20
}

fn default_partition_seed() -> u64 {
    42
}

fn default_attribute_separator() -> String {
    DEFAULT_ATTRIBUTE_SEPARATOR.to_string()
}

fn default_list_separator() -> String {
    DEFAULT_LIST_SEPARATOR.to_string()
}

fn default_embedding_concurrency() -> usize {
    50
}

fn default_embedding_batch_size() -> usize {
    500
}

fn default_embedding_max_tokens() -> usize {
    4000
}

fn default_embedding_timeout() -> u64 {
    90
}

fn default_embedding_max_attempts() -> u32 {
    5
}

fn default_knn_neighbors() -> usize {
    20
}

impl NetworkConfig {
    /// Parse a TOML document
    pub fn from_toml_str(contents: &str) -> EngineResult<Self> {
        let config: NetworkConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Override fields from `NETDETECT_*` environment variables
    pub fn with_env_overrides(self) -> EngineResult<Self> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Override fields from a variable lookup
    pub fn apply_overrides<F>(mut self, lookup: F) -> EngineResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = &mut self.detection;
        override_parsed(&lookup, "NETDETECT_SIMILARITY_THRESHOLD", &mut d.similarity_threshold)?;
        override_parsed(&lookup, "NETDETECT_MAX_ATTRIBUTE_DEGREE", &mut d.max_attribute_degree)?;
        override_parsed(&lookup, "NETDETECT_MAX_NETWORK_ENTITIES", &mut d.max_network_entities)?;
        override_parsed(&lookup, "NETDETECT_PARTITION_SEED", &mut d.partition_seed)?;
        if let Some(types) = lookup("NETDETECT_SUPPORTING_ATTRIBUTE_TYPES") {
            d.supporting_attribute_types = types
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        let embedding = &mut self.embedding;
        override_parsed(&lookup, "NETDETECT_EMBEDDING_CONCURRENCY", &mut embedding.concurrency)?;
        override_parsed(&lookup, "NETDETECT_EMBEDDING_BATCH_SIZE", &mut embedding.batch_size)?;
        override_parsed(&lookup, "NETDETECT_EMBEDDING_MAX_TOKENS", &mut embedding.max_tokens)?;
        override_parsed(&lookup, "NETDETECT_EMBEDDING_TIMEOUT_SECS", &mut embedding.timeout_secs)?;
        if let Some(path) = lookup("NETDETECT_EMBEDDING_CACHE") {
            embedding.cache_path = Some(PathBuf::from(path));
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        let d = &self.detection;
        let threshold_range = MIN_SIMILARITY_THRESHOLD..=MAX_SIMILARITY_THRESHOLD;
        if !threshold_range.contains(&d.similarity_threshold) {
            return Err(EngineError::Config(format!(
                "similarity_threshold must be within [{MIN_SIMILARITY_THRESHOLD}, \
                 {MAX_SIMILARITY_THRESHOLD}], got {}",
                d.similarity_threshold
            )));
        }
        if d.max_network_entities == 0 {
            return Err(EngineError::Config("max_network_entities must be > 0".into()));
        }
        for (name, separator) in [
            ("attribute_value_separator", &d.attribute_value_separator),
            ("list_separator", &d.list_separator),
        ] {
            if !is_valid_separator(separator) {
                return Err(EngineError::Config(format!(
                    "{name} {separator:?} must be non-empty and use only characters \
                     stripped by normalization (not word characters, whitespace, &, @ or +)"
                )));
            }
        }
        if d.attribute_value_separator == d.list_separator {
            return Err(EngineError::Config(
                "attribute_value_separator and list_separator must differ".into(),
            ));
        }

        let e = &self.embedding;
        if e.concurrency == 0 || e.batch_size == 0 {
            return Err(EngineError::Config(
                "embedding concurrency and batch_size must be > 0".into(),
            ));
        }
        if e.max_attempts == 0 {
            return Err(EngineError::Config("embedding max_attempts must be > 0".into()));
        }
        if e.knn_neighbors == 0 {
            return Err(EngineError::Config("knn_neighbors must be > 0".into()));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> EngineResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| EngineError::Config(format!("invalid value for {key}: {raw:?}")))?;
    }
    Ok(())
}
