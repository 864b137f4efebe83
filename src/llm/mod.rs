//! Resilient chat-completion gateway.
//!
//! Wraps a remote chat-completion endpoint with input validation,
//! token-budget enforcement, provider-parameter adaptation and randomized
//! exponential backoff. Budget and validation failures surface immediately
//! and are never retried; transient provider errors re-enter the backoff
//! loop up to the configured attempt ceiling.

pub mod profile;
pub mod registry;
#[cfg(test)]
pub mod testing;
pub mod tokens;
pub mod transport;

pub use profile::{ApiFamily, ModelProfile, TokenLimitField};
pub use registry::GatewayRegistry;
pub use tokens::{TokenBudget, TokenCounter, IMAGE_TOKENS};
pub use transport::{ChatRequest, ChatResponse, ChatTransport, HttpTransport};

use crate::error::{ResearchError, Result};
use crate::models::{Message, Role, ToolCall};
use rand::Rng;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::io::Write;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, warn};

//
// ================= Settings =================
//

/// Retry policy for transient provider errors. The defaults match a
/// six-attempt, 1–60s randomized exponential schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Randomized exponential delay before the next attempt.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_secs_f64();
        let cap = (base * 2f64.powi(attempt.saturating_sub(1) as i32))
            .min(self.max_delay.as_secs_f64());
        let low = base.min(cap);
        let secs = rand::thread_rng().gen_range(low..=cap);
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
    /// Output token ceiling per request.
    pub max_tokens: u32,
    /// Cumulative input token ceiling for this gateway; unlimited when unset.
    pub max_input_tokens: Option<u64>,
    pub temperature: f32,
    /// Explicit API family; inferred from the endpoint host when unset.
    pub api_family: Option<ApiFamily>,
    /// Default request timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl LlmSettings {
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            max_tokens: 4096,
            max_input_tokens: None,
            temperature: 1.0,
            api_family: None,
            timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
        }
    }

    /// Settings from `LLM_*` environment variables. `None` when the
    /// required variables are missing.
    pub fn from_env() -> Option<Self> {
        let model = std::env::var("LLM_MODEL").ok()?;
        let base_url = std::env::var("LLM_BASE_URL").ok()?;
        let api_key = std::env::var("LLM_API_KEY").unwrap_or_default();

        let mut settings = Self::new(model, base_url, api_key);
        if let Ok(Ok(max_tokens)) = std::env::var("LLM_MAX_TOKENS").map(|v| v.parse()) {
            settings.max_tokens = max_tokens;
        }
        if let Ok(Ok(max_input)) = std::env::var("LLM_MAX_INPUT_TOKENS").map(|v| v.parse()) {
            settings.max_input_tokens = Some(max_input);
        }
        if let Ok(Ok(temperature)) = std::env::var("LLM_TEMPERATURE").map(|v| v.parse()) {
            settings.temperature = temperature;
        }
        Some(settings)
    }
}

//
// ================= Tool Choice =================
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    None,
    Auto,
    Required,
}

impl ToolChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolChoice::None => "none",
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
        }
    }
}

/// The model's raw proposed action: free text, tool invocations, or both.
#[derive(Debug, Clone)]
pub struct AssistantAction {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

//
// ================= Gateway =================
//

pub struct LlmGateway {
    settings: LlmSettings,
    profile: ModelProfile,
    counter: TokenCounter,
    budget: Mutex<TokenBudget>,
    transport: Box<dyn ChatTransport>,
}

impl LlmGateway {
    pub fn new(settings: LlmSettings) -> Self {
        let transport = Box::new(HttpTransport::new(
            &settings.base_url,
            settings.api_key.clone(),
            settings.timeout,
        ));
        Self::with_transport(settings, transport)
    }

    /// Construct with an explicit transport (tests, alternate providers).
    pub fn with_transport(settings: LlmSettings, transport: Box<dyn ChatTransport>) -> Self {
        let profile = ModelProfile::detect(
            &settings.model,
            &settings.base_url,
            settings.api_family,
        );
        info!(
            model = %settings.model,
            api_family = ?profile.api_family,
            "Gateway initialized"
        );
        Self {
            budget: Mutex::new(TokenBudget::new(settings.max_input_tokens)),
            counter: TokenCounter::new(),
            profile,
            settings,
            transport,
        }
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    pub async fn cumulative_input_tokens(&self) -> u64 {
        self.budget.lock().await.cumulative()
    }

    /// Send a prompt and return the generated text.
    ///
    /// System messages, when given, are prepended. The projected input
    /// token count is checked against the budget before any dispatch;
    /// exceeding it fails fast and is never retried. Streaming responses
    /// are reassembled fragment by fragment; the budget is then charged
    /// with the pre-computed estimate since usage is unavailable
    /// mid-stream.
    pub async fn ask(
        &self,
        messages: &[Message],
        system_msgs: Option<&[Message]>,
        stream: bool,
        temperature: Option<f32>,
    ) -> Result<String> {
        let combined = format_messages(system_msgs, messages)?;
        let projected = self.counter.count_messages(combined.iter());
        self.budget.lock().await.check(projected)?;

        let wire = combined.iter().map(|m| m.to_wire()).collect();
        let request = self.base_request(wire, temperature, stream);
        debug!(
            fingerprint = %request_fingerprint(&combined),
            projected,
            "Dispatching chat request"
        );

        self.dispatch_text(request, stream, projected).await
    }

    /// As [`ask`](Self::ask), with one or more images attached to the final
    /// message. The final message must be from the user.
    pub async fn ask_with_images(
        &self,
        messages: &[Message],
        images: &[String],
        system_msgs: Option<&[Message]>,
        stream: bool,
        temperature: Option<f32>,
    ) -> Result<String> {
        if images.is_empty() {
            return Err(ResearchError::Validation(
                "At least one image is required".to_string(),
            ));
        }

        let combined = format_messages(system_msgs, messages)?;
        let last_is_user = combined
            .last()
            .map(|msg| msg.role == Role::User)
            .unwrap_or(false);
        if !last_is_user {
            return Err(ResearchError::Validation(
                "The last message must be from the user to attach images".to_string(),
            ));
        }

        let projected = self.counter.count_messages(combined.iter())
            + images.len() as u64 * IMAGE_TOKENS;
        self.budget.lock().await.check(projected)?;

        let mut wire: Vec<Value> = combined.iter().map(|m| m.to_wire()).collect();
        let last = wire.last_mut().expect("non-empty after validation");
        let text = last["content"].as_str().unwrap_or_default().to_string();
        let mut parts = vec![json!({"type": "text", "text": text})];
        for image in images {
            parts.push(json!({"type": "image_url", "image_url": {"url": image}}));
        }
        last["content"] = Value::Array(parts);

        let request = self.base_request(wire, temperature, stream);
        self.dispatch_text(request, stream, projected).await
    }

    /// Ask with tool schemas and return the model's raw proposed action.
    ///
    /// Tool schemas are serialized into the token estimate and each must
    /// carry a `type` discriminator. Providers known not to support the
    /// automatic tool-choice mode have the requested choice silently
    /// downgraded to `none`.
    pub async fn ask_tool(
        &self,
        messages: &[Message],
        system_msgs: Option<&[Message]>,
        tools: Option<&[Value]>,
        tool_choice: ToolChoice,
        timeout: Duration,
    ) -> Result<AssistantAction> {
        if let Some(tools) = tools {
            for tool in tools {
                if !tool.is_object() || tool.get("type").is_none() {
                    return Err(ResearchError::Validation(
                        "Each tool must be an object with a 'type' field".to_string(),
                    ));
                }
            }
        }

        let combined = format_messages(system_msgs, messages)?;
        let mut projected = self.counter.count_messages(combined.iter());
        if let Some(tools) = tools {
            projected += self.counter.count_tools(tools);
        }
        self.budget.lock().await.check(projected)?;

        let tool_choice = if tool_choice == ToolChoice::Auto
            && !self.profile.supports_auto_tool_choice
        {
            info!("Endpoint does not support tool_choice=auto, downgrading to none");
            ToolChoice::None
        } else {
            tool_choice
        };

        let wire = combined.iter().map(|m| m.to_wire()).collect();
        let mut request = self.base_request(wire, None, false);
        request.tools = tools.map(|t| t.to_vec());
        request.tool_choice = Some(tool_choice.as_str().to_string());

        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = match self.transport.execute(&request, Some(timeout)).await {
                Ok(response) => action_from_response(response),
                Err(e) => Err(e),
            };

            match outcome {
                Ok((action, usage)) => {
                    self.budget.lock().await.record(usage.unwrap_or(projected));
                    return Ok(action);
                }
                Err(e) if e.is_retryable() && attempt < self.settings.retry.max_attempts => {
                    self.back_off(attempt, &e).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // =============================
    // Internals
    // =============================

    fn base_request(
        &self,
        messages: Vec<Value>,
        temperature: Option<f32>,
        stream: bool,
    ) -> ChatRequest {
        let (max_tokens, max_completion_tokens) = match self.profile.token_limit_field {
            TokenLimitField::MaxTokens => (Some(self.settings.max_tokens), None),
            TokenLimitField::MaxCompletionTokens => (None, Some(self.settings.max_tokens)),
        };

        let temperature = if self.profile.sends_temperature {
            Some(temperature.unwrap_or(self.settings.temperature))
        } else {
            None
        };

        ChatRequest {
            model: self.settings.model.clone(),
            messages,
            max_tokens,
            max_completion_tokens,
            temperature,
            tools: None,
            tool_choice: None,
            stream,
        }
    }

    async fn dispatch_text(
        &self,
        request: ChatRequest,
        stream: bool,
        projected: u64,
    ) -> Result<String> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = if stream {
                self.transport
                    .execute_stream(&request)
                    .await
                    .map(|text| (text, None))
            } else {
                match self.transport.execute(&request, None).await {
                    Ok(response) => text_from_response(response),
                    Err(e) => Err(e),
                }
            };

            match outcome {
                Ok((text, usage)) => {
                    self.budget.lock().await.record(usage.unwrap_or(projected));
                    return Ok(text);
                }
                Err(e) if e.is_retryable() && attempt < self.settings.retry.max_attempts => {
                    self.back_off(attempt, &e).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn back_off(&self, attempt: u32, error: &ResearchError) {
        let delay = self.settings.retry.backoff_delay(attempt);
        warn!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Transient LLM error, backing off"
        );
        sleep(delay).await;
    }
}

/// Prepend system messages and validate the combined list. Messages with
/// neither content nor tool calls are dropped.
fn format_messages(
    system_msgs: Option<&[Message]>,
    messages: &[Message],
) -> Result<Vec<Message>> {
    let combined: Vec<Message> = system_msgs
        .unwrap_or_default()
        .iter()
        .chain(messages.iter())
        .filter(|msg| !msg.content.is_empty() || !msg.tool_calls.is_empty())
        .cloned()
        .collect();

    if combined.is_empty() {
        return Err(ResearchError::Validation(
            "Messages must not be empty".to_string(),
        ));
    }

    Ok(combined)
}

fn text_from_response(response: ChatResponse) -> Result<(String, Option<u64>)> {
    let usage = response.usage.as_ref().map(|u| u.prompt_tokens);
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(ResearchError::EmptyResponse);
    }
    Ok((content, usage))
}

fn action_from_response(response: ChatResponse) -> Result<(AssistantAction, Option<u64>)> {
    let usage = response.usage.as_ref().map(|u| u.prompt_tokens);
    let message = response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or(ResearchError::EmptyResponse)?;

    Ok((
        AssistantAction {
            content: message.content,
            tool_calls: message.tool_calls.unwrap_or_default(),
        },
        usage,
    ))
}

/// SHA256 fingerprint of the wire messages, for correlating retries of the
/// same request in logs.
pub fn request_fingerprint(messages: &[Message]) -> String {
    let wire: Vec<Value> = messages.iter().map(|m| m.to_wire()).collect();
    let mut hasher = Sha256::new();
    if serde_json::to_writer(&mut HashWriter(&mut hasher), &wire).is_err() {
        return String::new();
    }
    hex::encode(hasher.finalize())
}

/// Adapter to allow writing into Sha256 via std::io::Write
struct HashWriter<'a, H: Digest>(&'a mut H);

impl<'a, H: Digest> Write for HashWriter<'a, H> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
