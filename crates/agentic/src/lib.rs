//! Agentic retrieval-augmented answering for FeedMind.
//!
//! Answers a question over the user's RSS library in bounded, observable
//! steps:
//! - Rewrite the question into sub-questions (or ask for clarification)
//! - Research each sub-question with a small search/expand tool loop
//! - Deduplicate evidence and number it for stable `[ref:N]` citations
//! - Stream a final answer from the generation model, with a recall summary
//!   when the model fails to use the evidence
//!
//! Every step is traced as an [`AgentEvent`]; consumers receive the
//! normalized [`ExternalEvent`] stream.
//!
//! # Example
//! ```no_run
//! use feedmind_agentic::{InMemoryRetriever, Orchestrator, RunConfig};
//! use feedmind_llm::{ChatMessage, OllamaClient};
//! use futures::StreamExt;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let retriever = Arc::new(InMemoryRetriever::from_jsonl(std::path::Path::new("chunks.jsonl"))?);
//! let orchestrator = Orchestrator::new(retriever, Arc::new(OllamaClient::new()))?;
//!
//! let mut events = orchestrator.run(vec![ChatMessage::user("What is RxJS?")], RunConfig::default())?;
//! while let Some(event) = events.next().await {
//!     print!("{}", event.to_sse());
//! }
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod executor;
pub mod judge;
pub mod orchestrator;
pub mod reasoning;
pub mod registry;
pub mod retrieval;
pub mod rewrite;
pub mod state;
pub mod synth;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export main types
pub use config::{load_run_config, RunConfig};
pub use events::{normalize, normalize_all, AgentEvent, EventBus, ExternalEvent};
pub use orchestrator::{EventStream, Orchestrator, Step};
pub use registry::SourceRegistry;
pub use retrieval::{HttpRetriever, InMemoryRetriever, Retriever};
pub use state::{QuestionState, RunContext};
pub use types::{Chunk, ExpandArgs, QuestionAnswer, SearchArgs, SourceKey, ToolCall, ToolName};
