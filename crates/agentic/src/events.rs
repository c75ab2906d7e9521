//! Run trace and the external event protocol.
//!
//! Every step appends an [`AgentEvent`] to an append-only internal trace.
//! A fixed allow-list of kinds is normalized into [`ExternalEvent`]s that
//! carry a human-readable `display_text`; the remaining kinds (loop guards,
//! retries, per-question bookkeeping) stay internal.

use crate::types::{SourceSample, ToolCall, ToolName};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// Kinds that are forwarded to consumers.
pub const EXTERNAL_KINDS: &[&str] = &[
    "progress",
    "rewrite",
    "clarification_required",
    "tool_call",
    "tool_result",
    "aggregation",
    "content",
    "done",
    "error",
];

/// Internal trace entry, serialized as `{"kind": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "kind",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum AgentEvent {
    Progress {
        stage: String,
        message: String,
    },
    Rewrite {
        original_query: String,
        queries: Vec<String>,
        count: usize,
    },
    ClarificationRequired {
        message: String,
    },
    ToolCall {
        question_index: usize,
        question: String,
        round: u32,
        call: ToolCall,
    },
    ToolRetry {
        tool: ToolName,
        attempt: u32,
        error: String,
    },
    ToolResult {
        tool: ToolName,
        retry_count: u32,
        error: Option<String>,
        result_count: usize,
        skipped: bool,
        sources: Vec<SourceSample>,
    },
    LoopGuard {
        question_index: usize,
        tool_round: u32,
        max_tool_rounds: u32,
    },
    QuestionAnswered {
        question_index: usize,
        question: String,
        citations: Vec<usize>,
    },
    Aggregation {
        question_count: usize,
        source_count: usize,
    },
    Content {
        delta: String,
    },
    Done {
        message: String,
        answer: String,
        sources: Vec<SourceSample>,
    },
    Error {
        message: String,
    },
}

impl AgentEvent {
    /// Wire name of this event's kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentEvent::Progress { .. } => "progress",
            AgentEvent::Rewrite { .. } => "rewrite",
            AgentEvent::ClarificationRequired { .. } => "clarification_required",
            AgentEvent::ToolCall { .. } => "tool_call",
            AgentEvent::ToolRetry { .. } => "tool_retry",
            AgentEvent::ToolResult { .. } => "tool_result",
            AgentEvent::LoopGuard { .. } => "loop_guard",
            AgentEvent::QuestionAnswered { .. } => "question_answered",
            AgentEvent::Aggregation { .. } => "aggregation",
            AgentEvent::Content { .. } => "content",
            AgentEvent::Done { .. } => "done",
            AgentEvent::Error { .. } => "error",
        }
    }

    /// Payload as JSON (the `data` half of the serialized event).
    pub fn data(&self) -> Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("data").map(Value::take))
            .unwrap_or(Value::Null)
    }

    /// Normalize into the external shape; `None` for internal-only kinds.
    pub fn to_external(&self) -> Option<ExternalEvent> {
        normalize(self.kind(), &self.data())
    }
}

/// Event as seen by consumers of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalEvent {
    pub event: String,
    pub data: Value,
}

impl ExternalEvent {
    /// `data.display_text`, if present.
    pub fn display_text(&self) -> Option<&str> {
        self.data.get("display_text").and_then(Value::as_str)
    }

    pub fn is_terminal(&self) -> bool {
        self.event == "done" || self.event == "error"
    }

    /// Render as one Server-Sent Events frame.
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event, self.data)
    }
}

/// Map one `(kind, data)` pair to the external protocol.
///
/// Kinds outside [`EXTERNAL_KINDS`] yield `None`. An existing string
/// `display_text` is preserved, so normalizing twice changes nothing.
pub fn normalize(kind: &str, data: &Value) -> Option<ExternalEvent> {
    if !EXTERNAL_KINDS.contains(&kind) {
        return None;
    }

    let mut payload = match data {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };

    if !matches!(payload.get("display_text"), Some(Value::String(_))) {
        let text = display_text(kind, &payload);
        payload.insert("display_text".to_string(), Value::String(text));
    }

    Some(ExternalEvent {
        event: kind.to_string(),
        data: Value::Object(payload),
    })
}

/// Normalize a sequence of `(kind, data)` pairs, dropping internal kinds.
pub fn normalize_all<'a, I>(events: I) -> Vec<ExternalEvent>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    events
        .into_iter()
        .filter_map(|(kind, data)| normalize(kind, data))
        .collect()
}

fn str_field<'a>(data: &'a Map<String, Value>, key: &str) -> &'a str {
    data.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn count_field(data: &Map<String, Value>, key: &str) -> u64 {
    data.get(key).and_then(Value::as_u64).unwrap_or(0)
}

fn plural(n: u64, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

fn display_text(kind: &str, data: &Map<String, Value>) -> String {
    match kind {
        "progress" => str_field(data, "message").to_string(),
        "rewrite" => format!(
            "Split your question into {}",
            plural(count_field(data, "count"), "sub-question")
        ),
        "clarification_required" => str_field(data, "message").to_string(),
        "tool_call" => {
            let call = data.get("call");
            let tool = call.and_then(|c| c.get("tool")).and_then(Value::as_str);
            let args = call.and_then(|c| c.get("args"));
            match tool {
                Some("expand") => {
                    let seeds = args
                        .and_then(|a| a.get("seedIds"))
                        .and_then(Value::as_array)
                        .map_or(0, |ids| ids.len() as u64);
                    format!("Looking around {}", plural(seeds, "related source"))
                }
                _ => {
                    let query = args
                        .and_then(|a| a.get("query"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    format!("Searching your library: {}", query)
                }
            }
        }
        "tool_result" => {
            let count = count_field(data, "resultCount");
            if data.get("skipped").and_then(Value::as_bool).unwrap_or(false) {
                "Skipped expansion: limit reached".to_string()
            } else if count == 0 && !str_field(data, "error").is_empty() {
                format!("Retrieval failed: {}", str_field(data, "error"))
            } else {
                format!("Found {}", plural(count, "source"))
            }
        }
        "aggregation" => format!(
            "Composing the final answer from {}",
            plural(count_field(data, "questionCount"), "finding")
        ),
        "content" => str_field(data, "delta").to_string(),
        "done" => {
            if str_field(data, "message") == "clarification_required" {
                "Waiting for more detail".to_string()
            } else {
                "Done".to_string()
            }
        }
        "error" => format!("Something went wrong: {}", str_field(data, "message")),
        _ => String::new(),
    }
}

/// The consumer dropped its end of the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Disconnected;

/// Append-only run trace with an optional live consumer.
///
/// `emit` only appends. `flush` forwards every not-yet-published external
/// event to the consumer, waiting for channel capacity between events.
#[derive(Debug, Default)]
pub struct EventBus {
    log: Vec<AgentEvent>,
    published: usize,
    sink: Option<mpsc::Sender<ExternalEvent>>,
}

impl EventBus {
    /// A bus that only records.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus that also forwards external events to `sink`.
    pub fn with_sink(sink: mpsc::Sender<ExternalEvent>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::default()
        }
    }

    pub fn emit(&mut self, event: AgentEvent) {
        tracing::trace!(kind = event.kind(), "event");
        self.log.push(event);
    }

    /// Forward pending external events to the consumer, if any.
    pub async fn flush(&mut self) -> Result<(), Disconnected> {
        while self.published < self.log.len() {
            let event = &self.log[self.published];
            self.published += 1;

            let (Some(sink), Some(external)) = (self.sink.as_ref(), event.to_external()) else {
                continue;
            };
            sink.send(external).await.map_err(|_| Disconnected)?;
        }
        Ok(())
    }

    /// Resolves once the consumer has dropped its end of the stream.
    ///
    /// Never resolves for a bus without a consumer.
    pub async fn closed(&self) {
        match &self.sink {
            Some(sink) => sink.closed().await,
            None => std::future::pending().await,
        }
    }

    /// The full internal trace.
    pub fn log(&self) -> &[AgentEvent] {
        &self.log
    }

    /// Number of events of `kind` in the trace.
    pub fn count(&self, kind: &str) -> usize {
        self.log.iter().filter(|e| e.kind() == kind).count()
    }

    /// The trace normalized to the external protocol.
    pub fn external(&self) -> Vec<ExternalEvent> {
        self.log.iter().filter_map(AgentEvent::to_external).collect()
    }

    pub fn last(&self) -> Option<&AgentEvent> {
        self.log.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchArgs;

    fn sample_events() -> Vec<AgentEvent> {
        vec![
            AgentEvent::Rewrite {
                original_query: "a? b?".to_string(),
                queries: vec!["a".to_string(), "b".to_string()],
                count: 2,
            },
            AgentEvent::ToolCall {
                question_index: 0,
                question: "a".to_string(),
                round: 0,
                call: ToolCall::Search(SearchArgs {
                    query: "a".to_string(),
                    top_k: 3,
                    min_score: 0.3,
                }),
            },
            AgentEvent::LoopGuard {
                question_index: 0,
                tool_round: 2,
                max_tool_rounds: 2,
            },
            AgentEvent::ToolResult {
                tool: ToolName::Search,
                retry_count: 2,
                error: Some("boom".to_string()),
                result_count: 0,
                skipped: false,
                sources: vec![],
            },
            AgentEvent::Content {
                delta: "Hello".to_string(),
            },
            AgentEvent::Done {
                message: "completed".to_string(),
                answer: "Hello".to_string(),
                sources: vec![],
            },
        ]
    }

    #[test]
    fn test_wire_shape_uses_camel_case() {
        let event = &sample_events()[3];
        let value = serde_json::to_value(event).unwrap();
        assert_eq!(value["kind"], "tool_result");
        assert_eq!(value["data"]["resultCount"], 0);
        assert_eq!(value["data"]["retryCount"], 2);
        assert_eq!(event.data()["error"], "boom");
    }

    #[test]
    fn test_internal_kinds_are_not_external() {
        let mut bus = EventBus::new();
        for event in sample_events() {
            bus.emit(event);
        }

        let external = bus.external();
        assert_eq!(external.len(), 5);
        assert!(external.iter().all(|e| e.event != "loop_guard"));
        assert_eq!(bus.count("loop_guard"), 1);
        assert_eq!(bus.log().len(), 6);
    }

    #[test]
    fn test_display_texts() {
        let external: Vec<_> = sample_events().iter().filter_map(|e| e.to_external()).collect();
        assert_eq!(external[0].display_text(), Some("Split your question into 2 sub-questions"));
        assert_eq!(external[1].display_text(), Some("Searching your library: a"));
        assert_eq!(external[2].display_text(), Some("Retrieval failed: boom"));
        assert_eq!(external[3].display_text(), Some("Hello"));
        assert_eq!(external[4].display_text(), Some("Done"));
        assert!(external[4].is_terminal());
    }

    #[test]
    fn test_renormalizing_is_idempotent() {
        let once: Vec<_> = sample_events().iter().filter_map(|e| e.to_external()).collect();
        let twice = normalize_all(once.iter().map(|e| (e.event.as_str(), &e.data)));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_wraps_scalar_payload() {
        let event = normalize("progress", &Value::String("x".to_string())).unwrap();
        assert_eq!(event.data["value"], "x");
        assert!(normalize("tool_retry", &Value::Null).is_none());
    }

    #[test]
    fn test_sse_frame() {
        let event = normalize("content", &serde_json::json!({"delta": "hi"})).unwrap();
        let frame = event.to_sse();
        assert!(frame.starts_with("event: content\ndata: {"));
        assert!(frame.ends_with("\n\n"));
    }

    #[tokio::test]
    async fn test_flush_forwards_only_external_in_order() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut bus = EventBus::with_sink(tx);
        for event in sample_events() {
            bus.emit(event);
        }
        bus.flush().await.unwrap();
        // Nothing new, nothing re-sent
        bus.flush().await.unwrap();
        drop(bus);

        let mut kinds = Vec::new();
        while let Some(event) = rx.recv().await {
            kinds.push(event.event);
        }
        assert_eq!(kinds, vec!["rewrite", "tool_call", "tool_result", "content", "done"]);
    }

    #[tokio::test]
    async fn test_flush_reports_disconnect() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut bus = EventBus::with_sink(tx);
        bus.emit(AgentEvent::Content {
            delta: "x".to_string(),
        });
        assert_eq!(bus.flush().await, Err(Disconnected));
    }
}
