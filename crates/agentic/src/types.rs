//! Agentic retrieval type definitions.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A retrievable content unit (article or repository excerpt).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Embedding row id
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: Option<String>,

    /// Owning article, for article excerpts
    #[serde(default, deserialize_with = "string_or_number")]
    pub article_id: Option<String>,

    /// Owning repository, for repository excerpts
    #[serde(default, deserialize_with = "string_or_number")]
    pub repository_id: Option<String>,

    /// Position of the excerpt inside its article/repository
    #[serde(default)]
    pub chunk_index: u32,

    #[serde(default)]
    pub content: String,

    /// Similarity score reported by the retriever
    #[serde(default)]
    pub score: f32,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub url: String,

    /// "article" or "repo"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
}

/// Backends disagree on whether ids are strings or integers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) if !s.is_empty() => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Deterministic identity of a chunk, used for deduplication and citation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKey {
    Article { id: String, chunk_index: u32 },
    Repo { id: String, chunk_index: u32 },
    Embedding { id: String },
}

impl SourceKey {
    /// Compute the key for a chunk: business id + chunk index when available,
    /// embedding id otherwise. `None` means the chunk cannot be cited.
    pub fn for_chunk(chunk: &Chunk) -> Option<Self> {
        let prefers_repo = chunk.source_type.as_deref() == Some("repo");
        let article = chunk.article_id.clone().map(|id| SourceKey::Article {
            id,
            chunk_index: chunk.chunk_index,
        });
        let repo = chunk.repository_id.clone().map(|id| SourceKey::Repo {
            id,
            chunk_index: chunk.chunk_index,
        });

        let business = if prefers_repo {
            repo.or(article)
        } else {
            article.or(repo)
        };

        business.or_else(|| chunk.id.clone().map(|id| SourceKey::Embedding { id }))
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Article { id, chunk_index } => write!(f, "article:{}:{}", id, chunk_index),
            SourceKey::Repo { id, chunk_index } => write!(f, "repo:{}:{}", id, chunk_index),
            SourceKey::Embedding { id } => write!(f, "embedding:{}", id),
        }
    }
}

/// A deduplicated chunk with its run-stable citation index attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedSource {
    /// 1-based citation index, rendered as `[ref:N]`
    pub index: usize,
    pub key: SourceKey,
    pub chunk: Chunk,
}

/// Compact, user-facing view of a source carried in events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSample {
    pub index: usize,
    pub title: String,
    pub url: String,
    pub score: f32,
}

impl From<&IndexedSource> for SourceSample {
    fn from(source: &IndexedSource) -> Self {
        Self {
            index: source.index,
            title: source.chunk.title.clone(),
            url: source.chunk.url.clone(),
            score: source.chunk.score,
        }
    }
}

/// Finalized answer for one sub-question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
    pub sources: Vec<IndexedSource>,
}

/// Retrieval operations the reasoning step can choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    Search,
    Expand,
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolName::Search => write!(f, "search"),
            ToolName::Expand => write!(f, "expand"),
        }
    }
}

/// Arguments of a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchArgs {
    pub query: String,
    pub top_k: usize,
    pub min_score: f32,
}

/// Arguments of a neighbourhood expansion around already-found sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpandArgs {
    pub seed_ids: Vec<String>,
    pub seed_query: String,
    pub window: u32,
    pub top_k: usize,
    pub min_score: f32,
}

/// A concrete tool invocation chosen by the reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolCall {
    Search(SearchArgs),
    Expand(ExpandArgs),
}

impl ToolCall {
    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::Search(_) => ToolName::Search,
            ToolCall::Expand(_) => ToolName::Expand,
        }
    }
}
