//! Query rewriting and the clarification gate.

use crate::events::AgentEvent;
use crate::orchestrator::Step;
use crate::state::RunContext;

/// Queries shorter than this (in characters, after trimming) are too vague to research.
const MIN_QUERY_CHARS: usize = 2;

pub const CLARIFICATION_MESSAGE: &str =
    "Your question is too short to research. Could you describe what you would like to know in a bit more detail?";

/// Done message of a run stopped by the clarification gate.
pub const CLARIFICATION_DONE: &str = "clarification_required";

/// Fold full-width question marks and trim.
pub fn normalize_query(query: &str) -> String {
    query.replace('？', "?").trim().to_string()
}

/// Split a query into at most `max_split` sub-questions.
///
/// Segments are delimited by `?`, trimmed, and empty ones dropped. A query
/// with no usable segment is kept whole.
pub fn split_query(query: &str, max_split: usize) -> Vec<String> {
    let normalized = normalize_query(query);

    let mut parts: Vec<String> = normalized
        .split('?')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    parts.truncate(max_split);

    if parts.is_empty() && !normalized.is_empty() {
        parts.push(normalized);
    }
    parts
}

/// Decompose the original query and queue the sub-questions.
pub fn rewrite(ctx: &mut RunContext) -> Step {
    let queries = split_query(&ctx.original_query, ctx.config().max_split_questions);
    tracing::info!("Rewrote query into {} sub-question(s)", queries.len());

    ctx.events.emit(AgentEvent::Rewrite {
        original_query: ctx.original_query.clone(),
        queries: queries.clone(),
        count: queries.len(),
    });

    ctx.pending_questions = queries.iter().cloned().collect();
    ctx.rewritten_queries = queries;
    Step::Clarify
}

/// Stop the run when the query is too short to act on.
pub fn clarify(ctx: &mut RunContext) -> Step {
    if ctx.original_query.chars().count() >= MIN_QUERY_CHARS {
        return Step::Dispatch;
    }

    tracing::info!("Query {:?} needs clarification", ctx.original_query);
    ctx.clarification_required = true;
    ctx.clarification_message = Some(CLARIFICATION_MESSAGE.to_string());
    ctx.pending_questions.clear();

    ctx.events.emit(AgentEvent::ClarificationRequired {
        message: CLARIFICATION_MESSAGE.to_string(),
    });
    ctx.events.emit(AgentEvent::Done {
        message: CLARIFICATION_DONE.to_string(),
        answer: String::new(),
        sources: Vec::new(),
    });
    Step::Done
}
