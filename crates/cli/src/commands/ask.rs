//! Ask command handler.
//!
//! Runs the agentic orchestrator for one question and renders its event
//! stream as text, SSE frames or JSON lines.

use clap::Args;
use feedmind_agentic::orchestrator::AGGREGATE_PROMPT_ID;
use feedmind_agentic::{
    load_run_config, ExternalEvent, HttpRetriever, InMemoryRetriever, Orchestrator, Retriever,
    RunConfig,
};
use feedmind_core::{config::AppConfig, AppError, AppResult};
use feedmind_llm::{create_client, ChatMessage};
use feedmind_prompt::load_prompt;
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Ask a question about your library
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Prior conversation, as a JSON array of {"role", "content"} messages
    #[arg(long)]
    pub history_file: Option<PathBuf>,

    /// Answer from a local JSONL chunk corpus instead of the retrieval service
    #[arg(long)]
    pub corpus: Option<PathBuf>,

    /// Print Server-Sent Events frames
    #[arg(long, conflicts_with = "json")]
    pub sse: bool,

    /// Print one JSON object per event
    #[arg(long)]
    pub json: bool,

    /// Results per search
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Minimum similarity score (0.0-1.0)
    #[arg(long)]
    pub min_score: Option<f32>,

    /// Maximum number of sub-questions
    #[arg(long)]
    pub max_split: Option<usize>,

    /// Maximum tool calls per sub-question
    #[arg(long)]
    pub max_rounds: Option<u32>,

    /// Do not retry failed retrieval calls
    #[arg(long)]
    pub no_retry: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        // 1. Conversation
        let question = self
            .get_question()?
            .ok_or_else(|| AppError::InvalidInput("No question provided".to_string()))?;
        let mut messages = match self.history_file {
            Some(ref path) => load_history(path)?,
            None => Vec::new(),
        };
        messages.push(ChatMessage::user(question));

        // 2. Run configuration
        let run_config = self.run_config(config)?;
        tracing::debug!("Run config: {:?}", run_config);

        // 3. Collaborators
        let retriever = self.build_retriever(config)?;
        tracing::info!("Using {} retriever", retriever.name());

        let provider_config = config.get_provider_config(&config.provider);
        let llm = create_client(
            &config.provider,
            provider_config.and_then(|pc| pc.endpoint.as_deref()),
            provider_config.and_then(|pc| pc.timeout),
        )?;

        let prompt = load_prompt(&config.workspace, AGGREGATE_PROMPT_ID)?;
        let orchestrator = Orchestrator::new(retriever, llm)?.with_prompt(prompt);

        // 4. Run and render
        let mut events = orchestrator.run(messages, run_config)?;
        let mut failure = None;
        let mut stdout = std::io::stdout();

        while let Some(event) = events.next().await {
            if event.event == "error" {
                failure = event.data["message"].as_str().map(str::to_string);
            }

            if self.sse {
                write!(stdout, "{}", event.to_sse())?;
            } else if self.json {
                writeln!(stdout, "{}", serde_json::to_string(&event)?)?;
            } else {
                render_text(&mut stdout, &event)?;
            }
            stdout.flush()?;
        }

        match failure {
            Some(message) => Err(AppError::Agent(message)),
            None => Ok(()),
        }
    }

    /// Workspace run config with command-line overrides applied.
    fn run_config(&self, config: &AppConfig) -> AppResult<RunConfig> {
        let mut run_config = load_run_config(&config.workspace, config.agentic.as_ref())?;
        run_config.model = config.model.clone();

        if let Some(top_k) = self.top_k {
            run_config.top_k = top_k;
        }
        if let Some(min_score) = self.min_score {
            run_config.min_score = min_score;
        }
        if let Some(max_split) = self.max_split {
            run_config.max_split_questions = max_split;
        }
        if let Some(max_rounds) = self.max_rounds {
            run_config.max_tool_rounds_per_question = max_rounds;
        }
        if self.no_retry {
            run_config.retry_tool_on_failure = false;
        }

        run_config.validate()?;
        Ok(run_config)
    }

    fn build_retriever(&self, config: &AppConfig) -> AppResult<Arc<dyn Retriever>> {
        if let Some(ref corpus) = self.corpus {
            let retriever = InMemoryRetriever::from_jsonl(corpus)?;
            tracing::info!("Loaded {} chunks from {:?}", retriever.len(), corpus);
            return Ok(Arc::new(retriever));
        }

        let retrieval = config.retrieval.as_ref().ok_or_else(|| {
            AppError::Config(
                "No retrieval source: pass --corpus or set retrieval.endpoint in .feedmind/config.yaml"
                    .to_string(),
            )
        })?;

        let mut retriever = HttpRetriever::new(&retrieval.endpoint);
        if let Some(key) = config.resolve_retrieval_key() {
            retriever = retriever.with_api_key(key);
        }
        if let Some(timeout) = retrieval.timeout {
            retriever = retriever.with_timeout(timeout);
        }
        Ok(Arc::new(retriever))
    }

    fn get_question(&self) -> AppResult<Option<String>> {
        if let Some(ref question) = self.question {
            return Ok(Some(question.clone()));
        }

        match self.file {
            Some(ref path) => Ok(Some(std::fs::read_to_string(path)?.trim().to_string())),
            None => Ok(None),
        }
    }
}

/// Read a conversation history file.
fn load_history(path: &Path) -> AppResult<Vec<ChatMessage>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Failed to read history file {:?}: {}", path, e))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        AppError::InvalidInput(format!("Invalid history file {:?}: {}", path, e))
    })
}

/// Answer text goes to stdout; everything else is logged to stderr.
fn render_text(out: &mut impl Write, event: &ExternalEvent) -> AppResult<()> {
    let text = event.display_text().unwrap_or_default();

    match event.event.as_str() {
        "content" => write!(out, "{}", text)?,
        "clarification_required" => writeln!(out, "{}", text)?,
        "done" => {
            if event.data["message"] != "clarification_required" {
                writeln!(out)?;
            }
        }
        "error" => tracing::error!("{}", text),
        _ => tracing::info!("{}", text),
    }

    Ok(())
}
