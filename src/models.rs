//! Core data models for the research orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

//
// ================= Messages =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A tool invocation proposed by the model (chat-completion wire shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "default_tool_call_type")]
    pub call_type: String,
    pub function: FunctionCall,
}

fn default_tool_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON-encoded argument string, exactly as the model produced it.
    pub arguments: String,
}

/// One entry in an analyst's memory.
///
/// `tool_call_results` is populated by the runner after executing the calls
/// the model proposed, so downstream consumers can recover the most recent
/// structured tool output without re-parsing the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_call_results: Vec<ToolResult>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A tool observation answering the given tool call.
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, content)
        }
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_call_results: Vec::new(),
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Convert to the chat-completion wire object. Local bookkeeping fields
    /// (`tool_call_results`) are not part of the wire shape.
    pub fn to_wire(&self) -> Value {
        let mut wire = json!({
            "role": self.role.as_str(),
            "content": self.content,
        });
        if !self.tool_calls.is_empty() {
            wire["tool_calls"] = json!(self.tool_calls);
        }
        if let Some(id) = &self.tool_call_id {
            wire["tool_call_id"] = json!(id);
        }
        wire
    }
}

//
// ================= Memory =================
//

/// Ordered conversation history owned by exactly one analyst run.
/// Append-only while the run is in progress.
#[derive(Debug, Clone, Default)]
pub struct Memory {
    messages: Vec<Message>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Most recent structured tool output retained in memory, if any.
    pub fn last_tool_output(&self) -> Option<Value> {
        self.messages
            .iter()
            .rev()
            .flat_map(|msg| msg.tool_call_results.iter())
            .find_map(|result| result.output.clone())
    }
}

//
// ================= Agent State =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AgentState {
    Idle,
    Running,
    Finished,
    Error,
}

//
// ================= Tool I/O =================
//

/// Outcome of one tool execution. Exactly one of `output`/`error` is
/// meaningfully set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolResult {
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(output: Value) -> Self {
        Self {
            output: Some(output),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(message.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

//
// ================= Research Results =================
//

/// One category's result: the extracted analysis, the full transcript it
/// came from, and the most recent structured tool output (if any).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResult {
    pub agent_output: String,
    pub raw_output: String,
    pub tool_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CategoryOutcome {
    Report(RawResult),
    Failed { message: String },
}

/// Reserved category key carrying the shared subject context.
pub const BASIC_INFO_KEY: &str = "basic_info";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchReport {
    pub subject: String,
    pub categories: BTreeMap<String, CategoryOutcome>,
    pub subject_context: Option<Value>,
    pub generated_at: DateTime<Utc>,
}

impl ResearchReport {
    /// Number of categories that produced a real report.
    pub fn succeeded(&self) -> usize {
        self.categories
            .values()
            .filter(|outcome| matches!(outcome, CategoryOutcome::Report(_)))
            .count()
    }
}

//
// ================= Progress Events =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Started,
    Completed,
    Error,
}

/// Transient notification consumed by an external sink; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub category: String,
    pub status: ProgressStatus,
    pub message: String,
    /// Cumulative progress over the whole run, 0–100.
    pub progress: u8,
}

impl ProgressEvent {
    pub fn new(
        category: impl Into<String>,
        status: ProgressStatus,
        message: impl Into<String>,
        progress: u8,
    ) -> Self {
        Self {
            event_type: "agent_progress".to_string(),
            category: category.into(),
            status,
            message: message.into(),
            progress: progress.min(100),
        }
    }
}

impl fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProgressStatus::Started => "started",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_wire_shape() {
        let msg = Message::assistant("done").with_tool_calls(vec![ToolCall {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: "stock_sentiment".to_string(),
                arguments: r#"{"stock_code":"600519"}"#.to_string(),
            },
        }]);

        let wire = msg.to_wire();
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "stock_sentiment");
        assert!(wire.get("tool_call_results").is_none());
    }

    #[test]
    fn memory_recovers_last_tool_output() {
        let mut memory = Memory::new();
        memory.add_message(Message::user("analyze 600519"));

        let mut first = Message::tool("{}", "call_1");
        first.tool_call_results = vec![ToolResult::ok(json!({"round": 1}))];
        memory.add_message(first);

        let mut second = Message::tool("{}", "call_2");
        second.tool_call_results = vec![ToolResult::ok(json!({"round": 2}))];
        memory.add_message(second);

        let mut failed = Message::tool("Error", "call_3");
        failed.tool_call_results = vec![ToolResult::err("timeout")];
        memory.add_message(failed);

        assert_eq!(memory.last_tool_output(), Some(json!({"round": 2})));
    }

    #[test]
    fn tool_result_invariant() {
        let ok = ToolResult::ok(json!({"price": 1835.0}));
        assert!(ok.output.is_some() && ok.error.is_none());

        let err = ToolResult::err("connection refused");
        assert!(err.output.is_none() && err.is_error());
    }

    #[test]
    fn progress_is_clamped() {
        let event = ProgressEvent::new("sentiment", ProgressStatus::Completed, "done", 140);
        assert_eq!(event.progress, 100);
    }
}
