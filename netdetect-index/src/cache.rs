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

//! Embedding Cache
//!
//! Persists embedding vectors keyed by the SHA-256 of their text so repeated
//! indexing runs only pay for new texts.
//!
//! ## Cache Key Generation
//!
//! ```text
//! key = hex(SHA256(text with '\n' replaced by ' '))
//! ```
//!
//! ## File Format
//!
//! A JSON array of `{hash, text, vector}` records, rewritten atomically
//! (temp file then rename) on [`EmbeddingCache::persist`].

use netdetect_core::EngineResult;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Cache key for a text
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.replace('\n', " ").as_bytes());
    hex::encode(hasher.finalize())
}

/// Persisted cache record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub text: String,
    pub vector: Vec<f64>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Hash-keyed embedding store, optionally backed by a file
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: HashMap<String, CacheEntry>,
    path: Option<PathBuf>,
    dirty: bool,
    hits: u64,
    misses: u64,
}

impl EmbeddingCache {
    /// Cache that lives only for this process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the cache at `path`, loading existing entries if the file exists
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut cache = Self {
            path: Some(path.clone()),
            ..Self::default()
        };

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let records: Vec<CacheEntry> = serde_json::from_reader(reader)?;
            cache.entries = records
                .into_iter()
                .map(|entry| (entry.hash.clone(), entry))
                .collect();
            info!(path = %path.display(), entries = cache.entries.len(), "Loaded embedding cache");
        }
        Ok(cache)
    }

    /// Vector cached under `hash`, counting the hit or miss
    pub fn get(&mut self, hash: &str) -> Option<&[f64]> {
        match self.entries.get(hash) {
            Some(entry) => {
                self.hits += 1;
                Some(entry.vector.as_slice())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, text: &str, vector: Vec<f64>) {
        let hash = content_hash(text);
        self.entries.insert(
            hash.clone(),
            CacheEntry {
                hash,
                text: text.to_string(),
                vector,
            },
        );
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries: self.entries.len(),
        }
    }

    /// Write the cache to its file if anything changed
    pub fn persist(&mut self) -> EngineResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut records: Vec<&CacheEntry> = self.entries.values().collect();
        records.sort_by(|a, b| a.hash.cmp(&b.hash));

        // Write to temp file first, then rename
        let temp_path = path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&temp_path)?);
            serde_json::to_writer(&mut writer, &records)?;
            writer.flush()?;
        }
        std::fs::rename(&temp_path, path)?;

        self.dirty = false;
        debug!(path = %path.display(), entries = records.len(), "Persisted embedding cache");
        Ok(())
    }
}
