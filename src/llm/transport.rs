//! Chat-completion wire types and HTTP transport.
//!
//! The transport trait is the seam the gateway's retry loop drives; the
//! production implementation posts to an OpenAI-compatible endpoint over a
//! long-lived pooled client. Tests substitute scripted transports.

use crate::error::{ResearchError, Result};
use crate::models::ToolCall;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

//
// ================= Wire Types =================
//

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: WireMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
}

//
// ================= Transport =================
//

/// One dispatch to the model endpoint. Implementations do not retry;
/// retry policy lives in the gateway.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Non-streaming request returning the parsed completion.
    async fn execute(&self, request: &ChatRequest, timeout: Option<Duration>)
        -> Result<ChatResponse>;

    /// Streaming request returning the reassembled text, fragments
    /// concatenated in arrival order until end-of-stream.
    async fn execute_stream(&self, request: &ChatRequest) -> Result<String>;
}

/// Production transport over a connection-pooled reqwest client.
pub struct HttpTransport {
    client: Client,
    completions_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            completions_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key,
        }
    }

    async fn post(
        &self,
        request: &ChatRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(&self.completions_url)
            .bearer_auth(&self.api_key)
            .json(request);

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, "Model endpoint returned error response");
            return Err(ResearchError::Llm(format!("HTTP {}: {}", status, body)));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn execute(
        &self,
        request: &ChatRequest,
        timeout: Option<Duration>,
    ) -> Result<ChatResponse> {
        let response = self.post(request, timeout).await?;
        let parsed = response
            .json::<ChatResponse>()
            .await
            .map_err(|e| ResearchError::Llm(format!("Failed to parse completion: {}", e)))?;
        Ok(parsed)
    }

    async fn execute_stream(&self, request: &ChatRequest) -> Result<String> {
        let mut response = self.post(request, None).await?;

        let mut collected = String::new();
        let mut line_buffer = String::new();

        while let Some(chunk) = response.chunk().await? {
            line_buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Drain complete SSE lines; a partial line stays buffered
            // until the next chunk arrives.
            while let Some(newline) = line_buffer.find('\n') {
                let line: String = line_buffer.drain(..=newline).collect();
                if let Some(fragment) = parse_stream_line(line.trim_end()) {
                    collected.push_str(&fragment);
                }
            }
        }
        if let Some(fragment) = parse_stream_line(line_buffer.trim_end()) {
            collected.push_str(&fragment);
        }

        let full = collected.trim().to_string();
        if full.is_empty() {
            return Err(ResearchError::EmptyResponse);
        }

        debug!(chars = full.len(), "Streaming response reassembled");
        Ok(full)
    }
}

/// Extract the content fragment from one SSE line, if it carries one.
pub fn parse_stream_line(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    let chunk: Value = serde_json::from_str(data).ok()?;
    chunk["choices"][0]["delta"]["content"]
        .as_str()
        .map(|s| s.to_string())
}
