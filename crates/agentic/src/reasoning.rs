//! Deterministic tool selection for the active sub-question.
//!
//! Round 0 searches with the configured parameters. Every later round
//! expands around the evidence found so far with a wider net: half the
//! result budget (never below 2) and a minimum score relaxed by 0.05.

use crate::config::RunConfig;
use crate::events::AgentEvent;
use crate::orchestrator::Step;
use crate::state::RunContext;
use crate::types::{ExpandArgs, SearchArgs, ToolCall};

const EXPAND_MIN_TOP_K: usize = 2;
const EXPAND_SCORE_RELAXATION: f32 = 0.05;

/// Choose the call for `round`.
pub fn plan_call(config: &RunConfig, question: &str, round: u32, seed_ids: Vec<String>) -> ToolCall {
    if round == 0 {
        return ToolCall::Search(SearchArgs {
            query: question.to_string(),
            top_k: config.top_k,
            min_score: config.min_score,
        });
    }

    ToolCall::Expand(ExpandArgs {
        seed_ids,
        seed_query: question.to_string(),
        window: config.expand_window,
        top_k: (config.top_k / 2).max(EXPAND_MIN_TOP_K),
        min_score: (config.min_score - EXPAND_SCORE_RELAXATION).max(0.0),
    })
}

pub fn reason(ctx: &mut RunContext) -> Step {
    let max_rounds = ctx.config().max_tool_rounds_per_question;
    let question_index = ctx.current_question_index.unwrap_or_default();

    if ctx.question.tool_round >= max_rounds {
        tracing::debug!(
            "Loop guard for sub-question {} after {} round(s)",
            question_index + 1,
            ctx.question.tool_round
        );
        ctx.events.emit(AgentEvent::LoopGuard {
            question_index,
            tool_round: ctx.question.tool_round,
            max_tool_rounds: max_rounds,
        });
        return Step::Finalize;
    }

    let round = ctx.question.tool_round;
    let seed_ids = if ctx.question.seed_source_ids.is_empty() {
        ctx.registry.recent_ids(ctx.config().top_k)
    } else {
        ctx.question.seed_source_ids.clone()
    };
    let question = ctx.current_question_text().to_string();
    let call = plan_call(ctx.config(), &question, round, seed_ids);

    tracing::debug!("Round {} for {:?}: {}", round, question, call.name());
    ctx.question.tool_round += 1;
    ctx.events.emit(AgentEvent::ToolCall {
        question_index,
        question,
        round,
        call: call.clone(),
    });
    ctx.question.tool_call = Some(call.clone());

    Step::Execute(call)
}
