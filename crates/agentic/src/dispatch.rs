//! FIFO scheduling of sub-questions.

use crate::events::AgentEvent;
use crate::orchestrator::Step;
use crate::state::RunContext;

/// Activate the next pending sub-question, or move on to aggregation.
pub fn dispatch(ctx: &mut RunContext) -> Step {
    let Some(question) = ctx.pending_questions.pop_front() else {
        tracing::debug!("No pending sub-questions left");
        return Step::Aggregate;
    };

    let index = ctx.current_question_index.map_or(0, |i| i + 1);
    ctx.current_question_index = Some(index);
    ctx.reset_question();

    tracing::info!("Dispatching sub-question {}: {}", index + 1, question);
    ctx.events.emit(AgentEvent::Progress {
        stage: "dispatch".to_string(),
        message: format!(
            "Researching sub-question {}/{}: {}",
            index + 1,
            ctx.rewritten_queries.len(),
            question
        ),
    });

    ctx.current_question = Some(question);
    Step::Reason
}
