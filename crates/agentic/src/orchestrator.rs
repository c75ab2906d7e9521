//! Run driver: a plain state machine over [`RunContext`].
//!
//! Each [`Step`] is a named transition that mutates the context and returns
//! the next step. After every transition the event bus publishes whatever the
//! step emitted, so a consumer sees progress as it happens and a dropped
//! consumer stops the run at the next publish.

use crate::config::RunConfig;
use crate::events::{AgentEvent, Disconnected, EventBus, ExternalEvent};
use crate::retrieval::Retriever;
use crate::rewrite::normalize_query;
use crate::state::RunContext;
use crate::types::{SourceSample, ToolCall};
use crate::{aggregate, dispatch, executor, judge, reasoning, rewrite, synth};
use feedmind_core::{AppError, AppResult};
use feedmind_llm::{ChatMessage, ChatRole, LlmClient};
use feedmind_prompt::{builtin_prompt, PromptDefinition};
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::Instrument;

/// Built-in prompt used for the final answer.
pub const AGGREGATE_PROMPT_ID: &str = "agentic.aggregate";

/// Done message of a run that produced an answer.
pub const DONE_MESSAGE: &str = "completed";

/// One slot: each event is taken by the consumer before the next is produced.
const RUN_CHANNEL_CAPACITY: usize = 1;

/// External events of one run, in order. Ends after `done` or `error`.
pub type EventStream = Pin<Box<dyn Stream<Item = ExternalEvent> + Send>>;

/// Transitions of the run state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Rewrite,
    Clarify,
    Dispatch,
    Reason,
    Execute(ToolCall),
    Judge,
    Finalize,
    Aggregate,
    Done,
}

/// Why a run stopped before reaching [`Step::Done`].
#[derive(Debug)]
pub enum Interrupt {
    /// The consumer went away
    Disconnected,
    Failed(AppError),
}

impl From<Disconnected> for Interrupt {
    fn from(_: Disconnected) -> Self {
        Interrupt::Disconnected
    }
}

impl From<AppError> for Interrupt {
    fn from(err: AppError) -> Self {
        Interrupt::Failed(err)
    }
}

/// Answers questions over a retrieval backend and a generation model.
///
/// Cheap to clone; every run gets its own [`RunContext`].
#[derive(Clone)]
pub struct Orchestrator {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LlmClient>,
    prompt: PromptDefinition,
}

impl Orchestrator {
    /// Create an orchestrator using the built-in aggregation prompt.
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn LlmClient>) -> AppResult<Self> {
        Ok(Self {
            retriever,
            llm,
            prompt: builtin_prompt(AGGREGATE_PROMPT_ID)?,
        })
    }

    /// Use a different aggregation prompt (e.g. a workspace override).
    pub fn with_prompt(mut self, prompt: PromptDefinition) -> Self {
        self.prompt = prompt;
        self
    }

    /// Validate the request and build a fresh run context.
    ///
    /// Fails with [`AppError::InvalidInput`] on an empty conversation, a
    /// conversation without a user message, or an invalid configuration.
    pub fn prepare(&self, messages: Vec<ChatMessage>, config: RunConfig) -> AppResult<RunContext> {
        if messages.is_empty() {
            return Err(AppError::InvalidInput("messages must not be empty".to_string()));
        }

        let query = messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| normalize_query(&m.content))
            .ok_or_else(|| AppError::InvalidInput("messages contain no user message".to_string()))?;

        config.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        Ok(RunContext::new(run_id, messages, query, config))
    }

    /// Run to completion without a consumer and return the finished context.
    pub async fn execute(&self, messages: Vec<ChatMessage>, config: RunConfig) -> AppResult<RunContext> {
        let mut ctx = self.prepare(messages, config)?;
        let span = tracing::info_span!("agentic_run", run_id = %ctx.run_id);
        self.drive(&mut ctx).instrument(span).await;
        Ok(ctx)
    }

    /// Start a run in the background and stream its external events.
    ///
    /// Dropping the returned stream cancels the run at its next publish. A
    /// run task that panics still ends the stream with an `error` event.
    pub fn run(&self, messages: Vec<ChatMessage>, config: RunConfig) -> AppResult<EventStream> {
        let mut ctx = self.prepare(messages, config)?;
        let (tx, rx) = mpsc::channel(RUN_CHANNEL_CAPACITY);
        ctx.events = EventBus::with_sink(tx.clone());

        let span = tracing::info_span!("agentic_run", run_id = %ctx.run_id);
        let this = self.clone();
        let run = tokio::spawn(
            async move {
                this.drive(&mut ctx).await;
            }
            .instrument(span.clone()),
        );
        tokio::spawn(supervise(run, tx).instrument(span));

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn drive(&self, ctx: &mut RunContext) {
        tracing::info!("Starting run for {:?}", ctx.original_query);

        match self.step_through(ctx).await {
            Ok(()) => tracing::info!(
                "Run finished: {} sub-question(s), {} source(s)",
                ctx.question_answers.len(),
                ctx.registry.len()
            ),
            Err(Interrupt::Disconnected) => {
                tracing::warn!("Consumer disconnected, abandoning run");
            }
            Err(Interrupt::Failed(e)) => {
                tracing::error!("Run failed: {}", e);
                ctx.events.emit(AgentEvent::Error {
                    message: e.to_string(),
                });
                if ctx.events.flush().await.is_err() {
                    tracing::debug!("Consumer gone before the error could be delivered");
                }
            }
        }
    }

    async fn step_through(&self, ctx: &mut RunContext) -> Result<(), Interrupt> {
        let mut step = Step::Rewrite;

        loop {
            step = match step {
                Step::Rewrite => rewrite::rewrite(ctx),
                Step::Clarify => rewrite::clarify(ctx),
                Step::Dispatch => dispatch::dispatch(ctx),
                Step::Reason => reasoning::reason(ctx),
                Step::Execute(call) => executor::execute(ctx, self.retriever.as_ref(), call).await,
                Step::Judge => judge::judge(ctx),
                Step::Finalize => synth::finalize(ctx),
                Step::Aggregate => {
                    let next = aggregate::aggregate(ctx, self.llm.as_ref(), &self.prompt).await?;
                    finish(ctx);
                    next
                }
                Step::Done => return Ok(()),
            };
            ctx.events.flush().await?;
        }
    }
}

/// Turn a run task that died without a terminal event into an `error`.
async fn supervise(run: JoinHandle<()>, sink: mpsc::Sender<ExternalEvent>) {
    let Err(e) = run.await else {
        return;
    };

    tracing::error!("Run task aborted: {}", e);
    let event = AgentEvent::Error {
        message: format!("run aborted unexpectedly: {}", e),
    };
    if let Some(external) = event.to_external() {
        if sink.send(external).await.is_err() {
            tracing::debug!("Consumer gone before the error could be delivered");
        }
    }
}

fn finish(ctx: &mut RunContext) {
    let sources = ctx
        .registry
        .all_sources()
        .iter()
        .map(SourceSample::from)
        .collect();

    ctx.events.emit(AgentEvent::Done {
        message: DONE_MESSAGE.to_string(),
        answer: ctx.final_answer.clone(),
        sources,
    });
}
