//! Tool execution with bounded, immediate retries.
//!
//! The executor never fails a run: a call that keeps failing degrades to an
//! empty result carrying the last error.

use crate::config::RunConfig;
use crate::events::AgentEvent;
use crate::orchestrator::Step;
use crate::retrieval::Retriever;
use crate::state::RunContext;
use crate::types::{Chunk, SourceSample, ToolCall, ToolName};
use feedmind_core::{AppError, AppResult};
use std::time::Duration;

/// Sources included in a `tool_result` event.
const RESULT_SAMPLE_SIZE: usize = 3;

/// Outcome of one tool call after retries.
#[derive(Debug, Clone, Default)]
pub struct ToolOutcome {
    pub chunks: Vec<Chunk>,
    pub retry_count: u32,
    pub error: Option<String>,
}

async fn attempt(retriever: &dyn Retriever, call: &ToolCall, timeout_secs: u64) -> AppResult<Vec<Chunk>> {
    let fut = async {
        match call {
            ToolCall::Search(args) => retriever.search(args).await,
            ToolCall::Expand(args) => retriever.expand(args).await,
        }
    };

    if timeout_secs == 0 {
        return fut.await;
    }

    tokio::time::timeout(Duration::from_secs(timeout_secs), fut)
        .await
        .map_err(|_| {
            AppError::Retrieval(format!("{} timed out after {}s", call.name(), timeout_secs))
        })?
}

/// Invoke `call`, retrying immediately while the policy allows.
///
/// Each retry is reported through `on_retry(attempt, error)`.
pub async fn call_with_retry<F>(
    retriever: &dyn Retriever,
    call: &ToolCall,
    config: &RunConfig,
    mut on_retry: F,
) -> ToolOutcome
where
    F: FnMut(u32, &AppError),
{
    let mut retries = 0;

    loop {
        match attempt(retriever, call, config.tool_timeout_secs).await {
            Ok(chunks) => {
                return ToolOutcome {
                    chunks,
                    retry_count: retries,
                    error: None,
                }
            }
            Err(e) => {
                if config.retry_tool_on_failure && retries < config.max_tool_retry {
                    retries += 1;
                    tracing::warn!("{} failed, retrying ({}/{}): {}", call.name(), retries, config.max_tool_retry, e);
                    on_retry(retries, &e);
                    continue;
                }

                tracing::warn!("{} failed after {} retries: {}", call.name(), retries, e);
                return ToolOutcome {
                    chunks: Vec::new(),
                    retry_count: retries,
                    error: Some(e.to_string()),
                };
            }
        }
    }
}

pub async fn execute(ctx: &mut RunContext, retriever: &dyn Retriever, call: ToolCall) -> Step {
    let tool = call.name();

    if tool == ToolName::Expand {
        if ctx.question.expand_calls >= ctx.config().max_expand_calls_per_question {
            tracing::debug!("Expansion limit reached, skipping");
            ctx.question.tool_retry_count = 0;
            ctx.events.emit(AgentEvent::ToolResult {
                tool,
                retry_count: 0,
                error: None,
                result_count: 0,
                skipped: true,
                sources: Vec::new(),
            });
            return Step::Judge;
        }
        ctx.question.expand_calls += 1;
    }

    let config = ctx.config().clone();
    let events = &mut ctx.events;
    let outcome = call_with_retry(retriever, &call, &config, |attempt, error| {
        events.emit(AgentEvent::ToolRetry {
            tool,
            attempt,
            error: error.to_string(),
        });
    })
    .await;

    ctx.question.tool_retry_count = outcome.retry_count;
    absorb(ctx, tool, outcome);
    Step::Judge
}

/// Register retrieved chunks and record them against the active sub-question.
fn absorb(ctx: &mut RunContext, tool: ToolName, outcome: ToolOutcome) {
    let registered = ctx.registry.register(&outcome.chunks);

    for source in &registered {
        if let Some(id) = &source.chunk.id {
            if !ctx.question.seed_source_ids.contains(id) {
                ctx.question.seed_source_ids.push(id.clone());
            }
        }
    }

    tracing::debug!(
        "{} returned {} chunk(s), {} citable",
        tool,
        outcome.chunks.len(),
        registered.len()
    );

    let sources = registered
        .iter()
        .take(RESULT_SAMPLE_SIZE)
        .map(SourceSample::from)
        .collect();
    ctx.question.current_sources.extend(registered);

    ctx.events.emit(AgentEvent::ToolResult {
        tool,
        retry_count: outcome.retry_count,
        error: outcome.error,
        result_count: outcome.chunks.len(),
        skipped: false,
        sources,
    });
}
