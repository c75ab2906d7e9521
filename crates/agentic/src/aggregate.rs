//! Final answer generation.
//!
//! Streams the model's answer over the per-question findings, forwarding
//! every token as it arrives. When streaming breaks, falls back to a
//! one-shot completion and then to the templated findings. A degenerate
//! answer ("nothing in the knowledge base") is followed by a deterministic
//! summary of the best sources so retrieved evidence is never lost.

use crate::events::AgentEvent;
use crate::orchestrator::{Interrupt, Step};
use crate::registry::SourceRegistry;
use crate::state::RunContext;
use crate::types::IndexedSource;
use feedmind_llm::{ChatMessage, ChatRole, LlmClient, LlmRequest};
use feedmind_prompt::{build_prompt, PromptDefinition};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};

/// Evidence snippet length in the final prompt.
const EVIDENCE_CHARS: usize = 600;

/// Snippet length in the recall summary.
const SUMMARY_SNIPPET_CHARS: usize = 160;

/// Non-answers, compared after [`fold`].
const CANONICAL_NON_ANSWERS: &[&str] = &[
    "no information in knowledge base",
    "no relevant information in the knowledge base",
    "there is no relevant information in the knowledge base",
    "the knowledge base does not contain this information",
    "i don't know",
    "i do not know",
    "知识库中没有相关信息",
    "知识库中没有相关内容",
    "没有找到相关信息",
];

/// Giveaways of a non-answer when no citation is present.
const NON_ANSWER_KEYWORDS: &[&str] = &[
    "knowledge base",
    "no information",
    "no relevant information",
    "could not find",
    "couldn't find",
    "unable to find",
    "知识库",
    "没有相关",
    "未找到",
    "无法回答",
];

const SUMMARY_HEADER: &str = "Here are the most relevant sources from your library:";

/// Lowercase and drop everything that is not a letter or digit.
fn fold(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Whether `answer` is a non-answer that should be backed by a recall summary.
pub fn is_degenerate(answer: &str) -> bool {
    let folded = fold(answer);
    if folded.is_empty() {
        return true;
    }

    if CANONICAL_NON_ANSWERS.iter().any(|phrase| fold(phrase) == folded) {
        return true;
    }

    !answer.contains("[ref:") && NON_ANSWER_KEYWORDS.iter().any(|k| folded.contains(&fold(k)))
}

/// Trim `text` to at most `max_chars` characters, cutting at a word boundary.
pub fn truncate_snippet(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let cut = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}…", cut.trim_end())
}

/// Bulleted list of the best registered sources, highest score first.
///
/// Ties keep registration order. Returns `None` when nothing was retrieved.
pub fn recall_summary(registry: &SourceRegistry, limit: usize) -> Option<String> {
    let mut ranked: Vec<&IndexedSource> = registry.all_sources().iter().collect();
    ranked.sort_by(|a, b| b.chunk.score.total_cmp(&a.chunk.score));

    let mut seen = HashSet::new();
    let lines: Vec<String> = ranked
        .into_iter()
        .filter(|s| seen.insert(s.key.clone()))
        .take(limit)
        .map(|s| {
            let title = if s.chunk.title.is_empty() {
                s.key.to_string()
            } else {
                s.chunk.title.clone()
            };
            let url = if s.chunk.url.is_empty() {
                String::new()
            } else {
                format!(" ({})", s.chunk.url)
            };
            let snippet = truncate_snippet(
                &s.chunk.content.split_whitespace().collect::<Vec<_>>().join(" "),
                SUMMARY_SNIPPET_CHARS,
            );
            if snippet.is_empty() {
                format!("- [ref:{}] {}{}", s.index, title, url)
            } else {
                format!("- [ref:{}] {}{}: {}", s.index, title, url, snippet)
            }
        })
        .collect();

    if lines.is_empty() {
        return None;
    }
    Some(format!("\n\n{}\n{}", SUMMARY_HEADER, lines.join("\n")))
}

/// Template variables for the aggregation prompt.
fn prompt_variables(ctx: &RunContext) -> Value {
    let answers: Vec<Value> = ctx
        .question_answers
        .iter()
        .map(|qa| json!({ "question": qa.question, "answer": qa.answer }))
        .collect();

    let evidence: BTreeMap<usize, &IndexedSource> = ctx
        .question_answers
        .iter()
        .flat_map(|qa| qa.sources.iter())
        .map(|s| (s.index, s))
        .collect();

    let evidence: Vec<Value> = evidence
        .values()
        .map(|s| {
            json!({
                "index": s.index,
                "title": s.chunk.title,
                "url": s.chunk.url,
                "content": truncate_snippet(&s.chunk.content, EVIDENCE_CHARS),
            })
        })
        .collect();

    json!({
        "query": ctx.original_query,
        "answers": answers,
        "evidence": evidence,
    })
}

/// Conversation sent to the model: recent history, then the final prompt.
fn build_messages(ctx: &RunContext, user: String) -> Vec<ChatMessage> {
    let last_user = ctx
        .messages
        .iter()
        .rposition(|m| m.role == ChatRole::User)
        .unwrap_or(ctx.messages.len());

    let prior: Vec<&ChatMessage> = ctx.messages[..last_user]
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .collect();
    let skip = prior.len().saturating_sub(ctx.config().history_turns);

    let mut messages = Vec::with_capacity(prior.len() - skip + 1);
    messages.extend(prior.into_iter().skip(skip).cloned());
    messages.push(ChatMessage::user(user));
    messages
}

async fn emit_content(ctx: &mut RunContext, delta: String) -> Result<(), Interrupt> {
    ctx.events.emit(AgentEvent::Content { delta });
    ctx.events.flush().await?;
    Ok(())
}

pub async fn aggregate(
    ctx: &mut RunContext,
    llm: &dyn LlmClient,
    prompt: &PromptDefinition,
) -> Result<Step, Interrupt> {
    tracing::info!(
        "Aggregating {} finding(s) over {} source(s)",
        ctx.question_answers.len(),
        ctx.registry.len()
    );
    ctx.events.emit(AgentEvent::Aggregation {
        question_count: ctx.question_answers.len(),
        source_count: ctx.registry.len(),
    });
    ctx.events.flush().await?;

    let built = build_prompt(prompt, &prompt_variables(ctx))?;
    let messages = build_messages(ctx, built.user);
    let config = ctx.config();
    let mut request = LlmRequest::new(messages, config.model.clone())
        .with_temperature(config.aggregation_temperature)
        .with_max_tokens(config.aggregation_max_tokens);
    if let Some(system) = built.system {
        request = request.with_system(system);
    }

    let mut answer = String::new();
    let failure = match llm.stream(&request.clone().with_streaming()).await {
        Ok(mut stream) => {
            let mut failure = None;
            loop {
                // A stalled model must not outlive its consumer.
                let item = tokio::select! {
                    item = stream.next() => item,
                    _ = ctx.events.closed() => return Err(Interrupt::Disconnected),
                };
                let Some(item) = item else {
                    break;
                };

                match item {
                    Ok(chunk) => {
                        if !chunk.content.is_empty() {
                            answer.push_str(&chunk.content);
                            emit_content(ctx, chunk.content).await?;
                        }
                        if chunk.done {
                            break;
                        }
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            failure
        }
        Err(e) => Some(e),
    };

    if let Some(e) = failure {
        tracing::warn!("Answer stream failed after {} chars: {}", answer.len(), e);

        if answer.is_empty() {
            let fallback = match llm.complete(&request).await {
                Ok(response) => response.content,
                Err(e) => {
                    tracing::warn!("Completion fallback failed, using findings: {}", e);
                    ctx.question_answers
                        .iter()
                        .map(|qa| qa.answer.as_str())
                        .collect::<Vec<_>>()
                        .join("\n\n")
                }
            };
            if !fallback.is_empty() {
                answer.push_str(&fallback);
                emit_content(ctx, fallback).await?;
            }
        }
    }

    if is_degenerate(&answer) {
        if let Some(summary) = recall_summary(&ctx.registry, ctx.config().recall_summary_limit) {
            tracing::info!("Model gave a non-answer, appending recall summary");
            answer.push_str(&summary);
            emit_content(ctx, summary).await?;
        }
    }

    ctx.final_answer = answer;
    Ok(Step::Done)
}
