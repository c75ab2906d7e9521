//! Retrieval port and its adapters.
//!
//! The orchestrator only sees the [`Retriever`] trait. Two adapters ship with
//! the crate: an HTTP client for the hosted search service and an in-memory
//! lexical retriever for offline runs.

pub mod http;
pub mod memory;

use crate::types::{Chunk, ExpandArgs, SearchArgs};
use feedmind_core::AppResult;

pub use http::HttpRetriever;
pub use memory::InMemoryRetriever;

/// Trait for retrieval backends.
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Get the backend name (e.g., "http", "memory").
    fn name(&self) -> &str;

    /// Similarity search for `query`.
    async fn search(&self, args: &SearchArgs) -> AppResult<Vec<Chunk>>;

    /// Neighbourhood expansion around `seed_ids`, guided by `seed_query`.
    async fn expand(&self, args: &ExpandArgs) -> AppResult<Vec<Chunk>>;
}
