//! Scripted transport shared by unit tests across modules.

use crate::error::{ResearchError, Result};
use crate::llm::transport::{ChatRequest, ChatResponse, ChatTransport, Choice, Usage, WireMessage};
use crate::models::{FunctionCall, ToolCall};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A canned completion carrying plain text.
pub fn text_response(text: &str) -> ChatResponse {
    ChatResponse {
        choices: vec![Choice {
            message: WireMessage {
                content: Some(text.to_string()),
                tool_calls: None,
            },
        }],
        usage: Some(Usage { prompt_tokens: 10 }),
    }
}

/// A canned completion proposing one tool call.
pub fn tool_call_response(id: &str, name: &str, arguments: &str) -> ChatResponse {
    ChatResponse {
        choices: vec![Choice {
            message: WireMessage {
                content: None,
                tool_calls: Some(vec![ToolCall {
                    id: id.to_string(),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: name.to_string(),
                        arguments: arguments.to_string(),
                    },
                }]),
            },
        }],
        usage: Some(Usage { prompt_tokens: 10 }),
    }
}

/// Pops one scripted outcome per dispatch, in order. Exhaustion is a
/// non-retryable validation error so a mis-scripted test fails fast.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ChatResponse>>>,
    pub attempts: Arc<AtomicU32>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<ChatResponse>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            attempts: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn execute(
        &self,
        _request: &ChatRequest,
        _timeout: Option<Duration>,
    ) -> Result<ChatResponse> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ResearchError::Validation("script exhausted".to_string())))
    }

    async fn execute_stream(&self, request: &ChatRequest) -> Result<String> {
        self.execute(request, None).await.map(|response| {
            response
                .choices
                .first()
                .and_then(|choice| choice.message.content.clone())
                .unwrap_or_default()
        })
    }
}
