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

//! Embedder error types

use netdetect_core::EngineError;
use thiserror::Error;

/// Errors from embedding clients
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed response: {0}")]
    InvalidResponse(String),

    #[error("Embedder initialization failed: {0}")]
    Init(String),
}

impl EmbedError {
    /// Transport failures, timeouts, throttling and server errors are retried
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbedError::RateLimitExceeded | EmbedError::Timeout(_) => true,
            EmbedError::Http(e) => !e.is_builder() && !e.is_decode(),
            EmbedError::ApiError { status, .. } => *status >= 500,
            EmbedError::Json(_) | EmbedError::InvalidResponse(_) | EmbedError::Init(_) => false,
        }
    }
}

impl From<EmbedError> for EngineError {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::Init(msg) => EngineError::EmbedderInit(msg),
            e if e.is_retryable() => EngineError::EmbedderTransient(e.to_string()),
            e => EngineError::EmbedderFatal(e.to_string()),
        }
    }
}
