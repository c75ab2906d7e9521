//! HTTP retrieval adapter.
//!
//! Talks to a search service exposing `POST {base}/search` and
//! `POST {base}/expand`. Request bodies are the camelCase tool arguments; the
//! response is either a bare JSON array of chunks or `{"results": [...]}`.

use super::Retriever;
use crate::types::{Chunk, ExpandArgs, SearchArgs};
use feedmind_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChunkResponse {
    Bare(Vec<Chunk>),
    Wrapped { results: Vec<Chunk> },
}

impl ChunkResponse {
    fn into_chunks(self) -> Vec<Chunk> {
        match self {
            ChunkResponse::Bare(chunks) => chunks,
            ChunkResponse::Wrapped { results } => results,
        }
    }
}

/// Retrieval client for a hosted search service.
pub struct HttpRetriever {
    base_url: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
    client: reqwest::Client,
}

impl HttpRetriever {
    /// Create a client for the service rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: None,
            client: reqwest::Client::new(),
        }
    }

    /// Send `Authorization: Bearer <key>` with every request.
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Per-request timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> AppResult<Vec<Chunk>> {
        let url = self.endpoint(path);
        tracing::debug!("POST {}", url);

        let mut builder = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to reach {}: {}", url, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Retrieval(format!(
                "Retrieval API error ({}): {}",
                status, error_text
            )));
        }

        let parsed: ChunkResponse = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to parse {} response: {}", path, e)))?;

        Ok(parsed.into_chunks())
    }
}

#[async_trait::async_trait]
impl Retriever for HttpRetriever {
    fn name(&self) -> &str {
        "http"
    }

    async fn search(&self, args: &SearchArgs) -> AppResult<Vec<Chunk>> {
        self.post("search", args).await
    }

    async fn expand(&self, args: &ExpandArgs) -> AppResult<Vec<Chunk>> {
        self.post("expand", args).await
    }
}
