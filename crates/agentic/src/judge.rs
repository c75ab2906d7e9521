//! Convergence check for the active sub-question.

use crate::config::RunConfig;
use crate::orchestrator::Step;
use crate::state::{QuestionState, RunContext};

/// Whether a sub-question has gathered enough to be answered.
///
/// Any evidence at all is enough; otherwise the question is done once its
/// round or expansion budget is spent.
pub fn is_converged(question: &QuestionState, config: &RunConfig) -> bool {
    !question.current_sources.is_empty()
        || question.tool_round >= config.max_tool_rounds_per_question
        || question.expand_calls >= config.max_expand_calls_per_question
}

pub fn judge(ctx: &mut RunContext) -> Step {
    let enough = is_converged(&ctx.question, ctx.config());
    ctx.question.enough_for_finalize = enough;

    if enough {
        Step::Finalize
    } else {
        tracing::debug!("Not enough evidence after round {}, reasoning again", ctx.question.tool_round);
        Step::Reason
    }
}
