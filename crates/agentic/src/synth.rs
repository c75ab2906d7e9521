//! Templated per-sub-question answers.

use crate::events::AgentEvent;
use crate::orchestrator::Step;
use crate::state::RunContext;
use crate::types::{IndexedSource, QuestionAnswer};
use std::collections::BTreeMap;

/// Render the answer for `question` from its evidence.
///
/// Cites every distinct source once, in ascending index order.
pub fn synthesize_answer(question: &str, sources: &[IndexedSource]) -> String {
    if sources.is_empty() {
        return format!("No relevant information was found in the library for \"{}\".", question);
    }

    let by_index: BTreeMap<usize, &str> = sources
        .iter()
        .map(|s| (s.index, s.chunk.title.as_str()))
        .collect();

    let cited: Vec<String> = by_index
        .iter()
        .map(|(index, title)| {
            if title.is_empty() {
                format!("[ref:{}]", index)
            } else {
                format!("[ref:{}] {}", index, title)
            }
        })
        .collect();

    format!(
        "For \"{}\", the library contains relevant material: {}.",
        question,
        cited.join("; ")
    )
}

/// Citation indices of `sources`, distinct and ascending.
pub fn citations(sources: &[IndexedSource]) -> Vec<usize> {
    let mut indices: Vec<usize> = sources.iter().map(|s| s.index).collect();
    indices.sort_unstable();
    indices.dedup();
    indices
}

/// Record the answer for the active sub-question and clear its state.
pub fn finalize(ctx: &mut RunContext) -> Step {
    let question = ctx.current_question.take().unwrap_or_default();
    let sources = std::mem::take(&mut ctx.question.current_sources);
    let answer = synthesize_answer(&question, &sources);

    ctx.events.emit(AgentEvent::QuestionAnswered {
        question_index: ctx.current_question_index.unwrap_or_default(),
        question: question.clone(),
        citations: citations(&sources),
    });
    tracing::debug!("Answered {:?} with {} source(s)", question, sources.len());

    ctx.question_answers.push(QuestionAnswer {
        question,
        answer,
        sources,
    });
    ctx.reset_question();
    Step::Dispatch
}
