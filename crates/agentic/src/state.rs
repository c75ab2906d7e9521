//! Request-scoped run context.

use crate::config::RunConfig;
use crate::events::EventBus;
use crate::registry::SourceRegistry;
use crate::types::{IndexedSource, QuestionAnswer, ToolCall};
use feedmind_llm::ChatMessage;
use std::collections::VecDeque;

/// Working state of the sub-question being researched.
///
/// Reset to `Default` at every dispatch and after every finalized answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuestionState {
    /// Tool calls issued for this sub-question
    pub tool_round: u32,

    /// Expansions attempted (including skipped ones)
    pub expand_calls: u32,

    /// Call chosen by the reasoning step, consumed by the executor
    pub tool_call: Option<ToolCall>,

    /// Retries spent on the last tool call
    pub tool_retry_count: u32,

    /// Embedding ids retrieved so far, used to seed expansions
    pub seed_source_ids: Vec<String>,

    /// Evidence gathered for this sub-question, with citation indices
    pub current_sources: Vec<IndexedSource>,

    pub enough_for_finalize: bool,
}

/// Everything one run reads and writes. Created per request, never shared.
#[derive(Debug)]
pub struct RunContext {
    config: RunConfig,
    pub run_id: String,
    pub messages: Vec<ChatMessage>,
    pub original_query: String,
    pub rewritten_queries: Vec<String>,
    pub pending_questions: VecDeque<String>,
    pub current_question: Option<String>,

    /// `None` until the first dispatch
    pub current_question_index: Option<usize>,

    pub clarification_required: bool,
    pub clarification_message: Option<String>,
    pub question: QuestionState,
    pub question_answers: Vec<QuestionAnswer>,
    pub registry: SourceRegistry,
    pub final_answer: String,
    pub events: EventBus,
}

impl RunContext {
    pub fn new(
        run_id: impl Into<String>,
        messages: Vec<ChatMessage>,
        original_query: impl Into<String>,
        config: RunConfig,
    ) -> Self {
        Self {
            config,
            run_id: run_id.into(),
            messages,
            original_query: original_query.into(),
            rewritten_queries: Vec::new(),
            pending_questions: VecDeque::new(),
            current_question: None,
            current_question_index: None,
            clarification_required: false,
            clarification_message: None,
            question: QuestionState::default(),
            question_answers: Vec::new(),
            registry: SourceRegistry::new(),
            final_answer: String::new(),
            events: EventBus::new(),
        }
    }

    /// Configuration the run was started with.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Sub-question being researched, or an empty string between questions.
    pub fn current_question_text(&self) -> &str {
        self.current_question.as_deref().unwrap_or_default()
    }

    /// Clear every per-question field.
    pub fn reset_question(&mut self) {
        self.question = QuestionState::default();
    }
}
