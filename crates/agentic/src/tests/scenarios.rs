//! Full runs through the state machine.

use super::doubles::{chunk, ScriptedLlm, ScriptedRetriever, StalledRetriever};
use crate::events::{normalize_all, AgentEvent};
use crate::orchestrator::{Orchestrator, Step};
use crate::state::{QuestionState, RunContext};
use crate::types::{Chunk, ExpandArgs, SearchArgs, SourceSample, ToolCall, ToolName};
use crate::{dispatch, executor, reasoning, rewrite, synth, RunConfig};
use feedmind_core::{AppError, AppResult};
use feedmind_llm::{ChatMessage, ChatRole};
use feedmind_prompt::{PromptDefinition, PromptOutputSpec};
use futures::StreamExt;
use std::sync::Arc;

fn orchestrator(retriever: &Arc<ScriptedRetriever>, llm: &Arc<ScriptedLlm>) -> Orchestrator {
    Orchestrator::new(retriever.clone(), llm.clone()).unwrap()
}

fn ask(question: &str) -> Vec<ChatMessage> {
    vec![ChatMessage::user(question)]
}

fn rxjs_retriever() -> ScriptedRetriever {
    ScriptedRetriever::new(|args: &SearchArgs| {
        if args.query.contains("RxJS") {
            Ok(vec![chunk("e1", "a1", 0, "Intro to RxJS", 0.82)])
        } else {
            Ok(vec![chunk("e2", "a2", 0, "Promises vs Observables", 0.74)])
        }
    })
}

fn tool_results(ctx: &RunContext) -> Vec<&AgentEvent> {
    ctx.events
        .log()
        .iter()
        .filter(|e| matches!(e, AgentEvent::ToolResult { .. }))
        .collect()
}

fn done_message(ctx: &RunContext) -> Option<&str> {
    match ctx.events.last() {
        Some(AgentEvent::Done { message, .. }) => Some(message.as_str()),
        _ => None,
    }
}

#[tokio::test]
async fn test_compound_question_is_split_and_answered() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&[
        "RxJS is a reactive library [ref:1]",
        " and differs from Promises [ref:2].",
    ]));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS? How does it compare to Promises?"), RunConfig::default())
        .await
        .unwrap();

    let rewrite = ctx.events.log().iter().find_map(|e| match e {
        AgentEvent::Rewrite { queries, count, .. } => Some((queries.clone(), *count)),
        _ => None,
    });
    assert_eq!(
        rewrite,
        Some((
            vec!["What is RxJS".to_string(), "How does it compare to Promises".to_string()],
            2
        ))
    );

    assert_eq!(ctx.events.count("tool_call"), 2);
    assert_eq!(ctx.question_answers.len(), 2);
    assert!(ctx.question_answers[0].answer.contains("[ref:1] Intro to RxJS"));
    assert!(ctx.question_answers[1].answer.contains("[ref:2] Promises vs Observables"));
    assert_eq!(
        ctx.final_answer,
        "RxJS is a reactive library [ref:1] and differs from Promises [ref:2]."
    );
    assert_eq!(ctx.events.count("content"), 2);
    assert_eq!(ctx.events.count("done"), 1);
    assert_eq!(done_message(&ctx), Some("completed"));

    let kinds: Vec<String> = ctx.events.external().into_iter().map(|e| e.event).collect();
    assert_eq!(kinds.first().map(String::as_str), Some("rewrite"));
    assert_eq!(kinds.last().map(String::as_str), Some("done"));
    assert!(kinds.iter().any(|k| k == "aggregation"));

    let request = llm.last_request().unwrap();
    assert_eq!(request.messages[0].role, ChatRole::System);
    let prompt = &request.messages.last().unwrap().content;
    assert!(prompt.contains("What is RxJS? How does it compare to Promises?"));
    assert!(prompt.contains("[ref:2] Promises vs Observables"));
    assert_eq!(request.temperature, Some(0.3));
}

#[tokio::test]
async fn test_short_query_asks_for_clarification() {
    let retriever = Arc::new(ScriptedRetriever::empty());
    let llm = Arc::new(ScriptedLlm::tokens(&["unused"]));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("a"), RunConfig::default())
        .await
        .unwrap();

    assert!(ctx.clarification_required);
    assert!(ctx.clarification_message.is_some());
    assert_eq!(ctx.events.count("tool_call"), 0);
    assert_eq!(ctx.events.count("clarification_required"), 1);
    assert_eq!(done_message(&ctx), Some("clarification_required"));
    assert_eq!(retriever.searches(), 0);
    assert!(llm.last_request().is_none());
    assert!(ctx.pending_questions.is_empty());
}

#[tokio::test]
async fn test_failing_search_is_retried_then_degrades() {
    let retriever = Arc::new(ScriptedRetriever::failing("index offline"));
    let llm = Arc::new(ScriptedLlm::tokens(&["Sorry, nothing to go on."]));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS"), RunConfig::default())
        .await
        .unwrap();

    assert_eq!(ctx.events.count("tool_retry"), 2);
    assert_eq!(retriever.searches(), 3);

    let attempts: Vec<u32> = ctx
        .events
        .log()
        .iter()
        .filter_map(|e| match e {
            AgentEvent::ToolRetry { attempt, .. } => Some(*attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![1, 2]);

    let failed: Vec<_> = tool_results(&ctx)
        .into_iter()
        .filter(|e| matches!(e, AgentEvent::ToolResult { error: Some(_), .. }))
        .collect();
    assert_eq!(failed.len(), 1);
    match failed[0] {
        AgentEvent::ToolResult {
            tool,
            retry_count,
            error,
            result_count,
            ..
        } => {
            assert_eq!(*tool, ToolName::Search);
            assert_eq!(*retry_count, 2);
            assert_eq!(*result_count, 0);
            assert!(error.as_deref().unwrap_or_default().contains("index offline"));
        }
        other => panic!("unexpected event {:?}", other),
    }

    // The run still completes
    assert_eq!(done_message(&ctx), Some("completed"));
    assert!(ctx.question_answers[0].answer.starts_with("No relevant information"));
}

#[tokio::test]
async fn test_shared_chunk_gets_one_citation_index() {
    let retriever = Arc::new(ScriptedRetriever::returning(vec![chunk(
        "e7", "a3", 2, "Reactive patterns", 0.9,
    )]));
    let llm = Arc::new(ScriptedLlm::tokens(&["Both rely on streams [ref:1]."]));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS? Why use RxJS?"), RunConfig::default())
        .await
        .unwrap();

    assert_eq!(ctx.registry.len(), 1);
    assert_eq!(ctx.question_answers.len(), 2);
    for answer in &ctx.question_answers {
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].index, 1);
        assert!(answer.answer.contains("[ref:1]"));
    }

    match ctx.events.last() {
        Some(AgentEvent::Done { sources, .. }) => assert_eq!(sources.len(), 1),
        other => panic!("expected done, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_answer_gets_recall_summary() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&["No information in knowledge base"]));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS"), RunConfig::default())
        .await
        .unwrap();

    assert!(ctx.final_answer.starts_with("No information in knowledge base"));
    assert!(ctx.final_answer.contains("- [ref:1] Intro to RxJS (https://blog.example.com/a1)"));
    assert_eq!(ctx.events.count("content"), 2);
}

#[tokio::test]
async fn test_non_answer_without_sources_is_left_alone() {
    let retriever = Arc::new(ScriptedRetriever::empty());
    let llm = Arc::new(ScriptedLlm::tokens(&["No information in knowledge base"]));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS"), RunConfig::default())
        .await
        .unwrap();

    assert_eq!(ctx.final_answer, "No information in knowledge base");
    assert_eq!(ctx.events.count("content"), 1);
}

#[tokio::test]
async fn test_citation_indices_are_gap_free() {
    let retriever = Arc::new(ScriptedRetriever::new(|args: &SearchArgs| {
        let slug = args.query.to_lowercase().replace(' ', "-");
        Ok(vec![
            chunk(&format!("e-{}", slug), &slug, 0, &args.query, 0.6),
            chunk("shared", "common", 0, "Common ground", 0.5),
        ])
    }));
    let llm = Arc::new(ScriptedLlm::tokens(&["Answer [ref:1]."]));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("alpha things? beta things? gamma things?"), RunConfig::default())
        .await
        .unwrap();

    let indices: Vec<usize> = ctx.registry.all_sources().iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);

    let keys: std::collections::HashSet<_> =
        ctx.registry.all_sources().iter().map(|s| s.key.clone()).collect();
    assert_eq!(keys.len(), 4);
}

#[tokio::test]
async fn test_dispatch_and_finalize_reset_question_state() {
    let retriever = Arc::new(ScriptedRetriever::empty());
    let llm = Arc::new(ScriptedLlm::default());
    let orchestrator = orchestrator(&retriever, &llm);

    let mut ctx = orchestrator
        .prepare(ask("first? second?"), RunConfig::default())
        .unwrap();
    assert_eq!(rewrite::rewrite(&mut ctx), Step::Clarify);

    ctx.question = QuestionState {
        tool_round: 2,
        expand_calls: 1,
        tool_retry_count: 2,
        seed_source_ids: vec!["e1".to_string()],
        enough_for_finalize: true,
        ..QuestionState::default()
    };
    assert_eq!(dispatch::dispatch(&mut ctx), Step::Reason);
    assert_eq!(ctx.question, QuestionState::default());
    assert_eq!(ctx.current_question_index, Some(0));
    assert_eq!(ctx.current_question.as_deref(), Some("first"));

    ctx.question.tool_round = 1;
    assert_eq!(synth::finalize(&mut ctx), Step::Dispatch);
    assert_eq!(ctx.question, QuestionState::default());
    assert!(ctx.current_question.is_none());

    assert_eq!(dispatch::dispatch(&mut ctx), Step::Reason);
    assert_eq!(ctx.current_question_index, Some(1));
    synth::finalize(&mut ctx);
    assert_eq!(dispatch::dispatch(&mut ctx), Step::Aggregate);
    assert_eq!(ctx.current_question_index, Some(1));
}

#[tokio::test]
async fn test_tool_calls_bounded_by_round_limit() {
    let retriever = Arc::new(ScriptedRetriever::empty());
    let llm = Arc::new(ScriptedLlm::tokens(&["Nothing found."]));
    let config = RunConfig {
        max_tool_rounds_per_question: 3,
        max_expand_calls_per_question: 5,
        ..RunConfig::default()
    };

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("first question? second question?"), config)
        .await
        .unwrap();

    for question_index in 0..2 {
        let calls = ctx
            .events
            .log()
            .iter()
            .filter(|e| matches!(e, AgentEvent::ToolCall { question_index: q, .. } if *q == question_index))
            .count();
        assert_eq!(calls, 3);
    }
    assert_eq!(retriever.searches(), 2);
    assert_eq!(retriever.expansions(), 4);
}

#[tokio::test]
async fn test_expansion_uses_relaxed_bounds_and_seeds() {
    let retriever = Arc::new(
        ScriptedRetriever::new(|args: &SearchArgs| {
            if args.query.contains("first") {
                Ok(vec![chunk("seed-1", "a1", 0, "Seed", 0.8)])
            } else {
                Ok(Vec::new())
            }
        })
        .with_expand(|args: &ExpandArgs| {
            assert_eq!(args.seed_ids, vec!["seed-1".to_string()]);
            assert_eq!(args.top_k, 3);
            assert!((args.min_score - 0.25).abs() < 1e-6);
            Ok(vec![chunk("seed-2", "a1", 1, "Seed", 0.7)])
        }),
    );
    let llm = Arc::new(ScriptedLlm::tokens(&["ok [ref:1]"]));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("first topic? second topic?"), RunConfig::default())
        .await
        .unwrap();

    assert_eq!(retriever.expansions(), 1);
    assert_eq!(ctx.question_answers[1].sources[0].index, 2);
}

#[tokio::test]
async fn test_loop_guard_short_circuits() {
    let retriever = Arc::new(ScriptedRetriever::empty());
    let llm = Arc::new(ScriptedLlm::default());
    let mut ctx = orchestrator(&retriever, &llm)
        .prepare(ask("What is RxJS"), RunConfig::default())
        .unwrap();
    ctx.current_question = Some("What is RxJS".to_string());
    ctx.current_question_index = Some(0);
    ctx.question.tool_round = ctx.config().max_tool_rounds_per_question;

    assert_eq!(reasoning::reason(&mut ctx), Step::Finalize);
    assert_eq!(ctx.events.count("loop_guard"), 1);
    assert_eq!(ctx.events.count("tool_call"), 0);
    assert_eq!(ctx.question.tool_round, 2);
    assert!(ctx.events.external().is_empty());
}

#[tokio::test]
async fn test_no_retries_when_disabled() {
    let retriever = Arc::new(ScriptedRetriever::failing("boom"));
    let llm = Arc::new(ScriptedLlm::tokens(&["-"]));
    let config = RunConfig {
        retry_tool_on_failure: false,
        ..RunConfig::default()
    };

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS"), config)
        .await
        .unwrap();

    assert_eq!(ctx.events.count("tool_retry"), 0);
    assert_eq!(retriever.searches(), 1);
    assert!(matches!(
        tool_results(&ctx)[0],
        AgentEvent::ToolResult { result_count: 0, error: Some(_), retry_count: 0, .. }
    ));
}

#[tokio::test]
async fn test_exhausted_expansion_is_skipped() {
    let retriever = Arc::new(ScriptedRetriever::empty());
    let llm = Arc::new(ScriptedLlm::default());
    let mut ctx = orchestrator(&retriever, &llm)
        .prepare(ask("What is RxJS"), RunConfig::default())
        .unwrap();
    ctx.current_question = Some("What is RxJS".to_string());
    ctx.question.expand_calls = ctx.config().max_expand_calls_per_question;

    let call = ToolCall::Expand(ExpandArgs {
        seed_ids: vec!["e1".to_string()],
        seed_query: "What is RxJS".to_string(),
        window: 1,
        top_k: 3,
        min_score: 0.25,
    });
    let next = executor::execute(&mut ctx, retriever.as_ref(), call).await;

    assert_eq!(next, Step::Judge);
    assert_eq!(retriever.expansions(), 0);
    assert!(matches!(
        ctx.events.last(),
        Some(AgentEvent::ToolResult { skipped: true, tool: ToolName::Expand, .. })
    ));
    let external = ctx.events.external();
    assert_eq!(external[0].display_text(), Some("Skipped expansion: limit reached"));
}

#[tokio::test]
async fn test_tool_result_samples_at_most_three_sources() {
    let chunks: Vec<Chunk> = (0..5)
        .map(|i| chunk(&format!("e{}", i), &format!("a{}", i), 0, "RxJS operators", 0.9 - i as f32 * 0.1))
        .collect();
    let retriever = Arc::new(ScriptedRetriever::returning(chunks));
    let llm = Arc::new(ScriptedLlm::default());
    let mut ctx = orchestrator(&retriever, &llm)
        .prepare(ask("What is RxJS"), RunConfig::default())
        .unwrap();
    ctx.current_question = Some("What is RxJS".to_string());

    let call = ToolCall::Search(SearchArgs {
        query: "What is RxJS".to_string(),
        top_k: 6,
        min_score: 0.3,
    });
    executor::execute(&mut ctx, retriever.as_ref(), call).await;

    match ctx.events.last() {
        Some(AgentEvent::ToolResult { result_count, sources, .. }) => {
            assert_eq!(*result_count, 5);
            let ids: Vec<usize> = sources.iter().map(|s: &SourceSample| s.index).collect();
            assert_eq!(ids, vec![1, 2, 3]);
        }
        other => panic!("expected tool result, got {:?}", other),
    }
    assert_eq!(ctx.registry.len(), 5);
    assert_eq!(ctx.events.external()[0].data["sources"].as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_tool_attempt_times_out() {
    let llm = Arc::new(ScriptedLlm::default());
    let orchestrator = Orchestrator::new(Arc::new(StalledRetriever), llm).unwrap();
    let config = RunConfig {
        tool_timeout_secs: 1,
        retry_tool_on_failure: false,
        ..RunConfig::default()
    };
    let mut ctx = orchestrator.prepare(ask("What is RxJS"), config).unwrap();
    ctx.current_question = Some("What is RxJS".to_string());

    let call = ToolCall::Search(SearchArgs {
        query: "What is RxJS".to_string(),
        top_k: 6,
        min_score: 0.3,
    });
    executor::execute(&mut ctx, &StalledRetriever, call).await;

    match ctx.events.last() {
        Some(AgentEvent::ToolResult { error: Some(error), .. }) => {
            assert!(error.contains("timed out"))
        }
        other => panic!("expected failed tool result, got {:?}", other),
    }
}

#[tokio::test]
async fn test_renormalizing_run_events_is_idempotent() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&["RxJS [ref:1]"]));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS? How does it compare to Promises?"), RunConfig::default())
        .await
        .unwrap();

    let external = ctx.events.external();
    assert!(external.iter().all(|e| e.display_text().is_some()));
    let again = normalize_all(external.iter().map(|e| (e.event.as_str(), &e.data)));
    assert_eq!(external, again);
}

#[tokio::test]
async fn test_stream_failure_falls_back_to_completion() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(
        ScriptedLlm::tokens(&[])
            .failing_to_open()
            .completing("RxJS models streams [ref:1]."),
    );

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS"), RunConfig::default())
        .await
        .unwrap();

    assert_eq!(ctx.final_answer, "RxJS models streams [ref:1].");
    assert_eq!(ctx.events.count("content"), 1);
    assert_eq!(llm.requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_total_generation_failure_uses_findings() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&[]).failing_to_open());

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS"), RunConfig::default())
        .await
        .unwrap();

    assert!(ctx.final_answer.starts_with("For \"What is RxJS\""));
    assert!(ctx.final_answer.contains("[ref:1]"));
    assert_eq!(done_message(&ctx), Some("completed"));
}

#[tokio::test]
async fn test_partial_stream_is_kept() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&["RxJS is ", "reactive"]).failing_after(1));

    let ctx = orchestrator(&retriever, &llm)
        .execute(ask("What is RxJS"), RunConfig::default())
        .await
        .unwrap();

    assert_eq!(ctx.final_answer, "RxJS is ");
    assert_eq!(llm.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_history_is_forwarded_to_aggregation() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&["ok [ref:1]"]));
    let messages = vec![
        ChatMessage::system("client system prompt"),
        ChatMessage::user("Tell me about Angular"),
        ChatMessage::assistant("Angular is a framework."),
        ChatMessage::user("What is RxJS"),
    ];
    let config = RunConfig {
        history_turns: 1,
        ..RunConfig::default()
    };

    orchestrator(&retriever, &llm)
        .execute(messages, config)
        .await
        .unwrap();

    let request = llm.last_request().unwrap();
    assert_eq!(request.messages.len(), 3);
    assert_eq!(request.messages[0].role, ChatRole::System);
    assert_eq!(request.messages[1], ChatMessage::assistant("Angular is a framework."));
    assert!(request
        .messages
        .iter()
        .all(|m| m.content != "client system prompt"));
}

#[tokio::test]
async fn test_invalid_requests_fail_fast() {
    let retriever = Arc::new(ScriptedRetriever::empty());
    let llm = Arc::new(ScriptedLlm::default());
    let orchestrator = orchestrator(&retriever, &llm);

    assert!(matches!(
        orchestrator.prepare(Vec::new(), RunConfig::default()),
        Err(AppError::InvalidInput(_))
    ));
    assert!(matches!(
        orchestrator.prepare(vec![ChatMessage::assistant("hi")], RunConfig::default()),
        Err(AppError::InvalidInput(_))
    ));
    let bad = RunConfig {
        top_k: 0,
        ..RunConfig::default()
    };
    assert!(orchestrator.run(ask("What is RxJS"), bad).is_err());
    assert_eq!(retriever.searches(), 0);
}

#[tokio::test]
async fn test_unexpected_failure_ends_with_error_event() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&["unused"]));
    let broken = PromptDefinition {
        id: "agentic.aggregate".to_string(),
        title: "Broken".to_string(),
        api_version: "1.0".to_string(),
        created_by: String::new(),
        system: None,
        template: "{{#each answers}} unterminated".to_string(),
        output: PromptOutputSpec {
            format: "text".to_string(),
        },
    };

    let ctx = orchestrator(&retriever, &llm)
        .with_prompt(broken)
        .execute(ask("What is RxJS"), RunConfig::default())
        .await
        .unwrap();

    assert!(matches!(ctx.events.last(), Some(AgentEvent::Error { .. })));
    assert_eq!(ctx.events.count("done"), 0);
    assert!(llm.last_request().is_none());
}

#[tokio::test]
async fn test_run_streams_external_events() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&["RxJS ", "is ", "reactive [ref:1]."]));

    let events: Vec<_> = orchestrator(&retriever, &llm)
        .run(ask("What is RxJS"), RunConfig::default())
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.first().map(|e| e.event.as_str()), Some("rewrite"));
    assert_eq!(events.last().map(|e| e.event.as_str()), Some("done"));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.iter().all(|e| e.display_text().is_some()));
    assert!(events.iter().all(|e| e.event != "tool_retry" && e.event != "loop_guard"));

    let streamed: String = events
        .iter()
        .filter(|e| e.event == "content")
        .filter_map(|e| e.data["delta"].as_str())
        .collect();
    assert_eq!(streamed, "RxJS is reactive [ref:1].");
    assert_eq!(events.last().unwrap().data["answer"], "RxJS is reactive [ref:1].");
}

#[tokio::test]
async fn test_dropped_consumer_stops_the_run() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&["unused"]));

    let mut events = orchestrator(&retriever, &llm)
        .run(ask("What is RxJS"), RunConfig::default())
        .unwrap();
    let first = events.next().await.unwrap();
    assert_eq!(first.event, "rewrite");
    drop(events);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(retriever.searches(), 0);
    assert!(llm.last_request().is_none());
}

#[tokio::test]
async fn test_consumer_dropped_mid_answer_abandons_generation() {
    let retriever = Arc::new(rxjs_retriever());
    let llm = Arc::new(ScriptedLlm::tokens(&["RxJS ", "is "]).stalling_after(1));

    let mut events = orchestrator(&retriever, &llm)
        .run(ask("What is RxJS"), RunConfig::default())
        .unwrap();
    loop {
        let event = events.next().await.unwrap();
        if event.event == "content" {
            assert_eq!(event.data["delta"], "RxJS ");
            break;
        }
    }
    assert!(!llm.stream_dropped());
    drop(events);

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(llm.stream_dropped());
}

#[tokio::test]
async fn test_panicking_retriever_still_ends_with_error() {
    let retriever = Arc::new(ScriptedRetriever::new(|_: &SearchArgs| -> AppResult<Vec<Chunk>> {
        panic!("index corrupted")
    }));
    let llm = Arc::new(ScriptedLlm::tokens(&["unused"]));

    let events: Vec<_> = orchestrator(&retriever, &llm)
        .run(ask("What is RxJS"), RunConfig::default())
        .unwrap()
        .collect()
        .await;

    let kinds: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(kinds.first(), Some(&"rewrite"));
    assert_eq!(kinds.last(), Some(&"error"));
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    let message = events.last().unwrap().data["message"].as_str().unwrap_or_default();
    assert!(message.starts_with("run aborted unexpectedly"));
    assert!(llm.last_request().is_none());
}
