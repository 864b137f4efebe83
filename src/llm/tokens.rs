//! Input token estimation and budget accounting.
//!
//! Uses character-based heuristics calibrated for chat-completion
//! tokenizers: English prose ~3.2 chars/token, JSON ~2.8 (denser due to
//! punctuation and short keys), Han text near one token per character.
//! Overestimation is the safe direction for a budget ceiling.

use crate::error::{ResearchError, Result};
use crate::models::Message;
use serde_json::Value;
use tracing::info;

/// Average characters per token for English prose.
const CHARS_PER_TOKEN: f64 = 3.2;

/// Average characters per token for JSON/structured content.
const JSON_CHARS_PER_TOKEN: f64 = 2.8;

/// Per-message overhead (role label, formatting tokens).
const BASE_MESSAGE_TOKENS: u64 = 4;

/// Per-request overhead.
const FORMAT_TOKENS: u64 = 2;

/// Overhead for the tool call JSON structure (per call).
const TOOL_CALL_OVERHEAD_TOKENS: u64 = 10;

/// Flat estimate per attached image (medium detail).
pub const IMAGE_TOKENS: u64 = 1024;

fn is_han(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Truncate a string to at most `max_bytes` bytes on a valid UTF-8 char
/// boundary.
pub fn truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Character-heuristic token counter for projected input sizes.
#[derive(Debug, Clone, Default)]
pub struct TokenCounter;

impl TokenCounter {
    pub fn new() -> Self {
        Self
    }

    /// Estimate tokens for natural-language text. Han characters cost one
    /// token each; everything else is byte-ratio prose.
    pub fn count_text(&self, text: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        let mut han_chars = 0u64;
        let mut other_bytes = 0usize;
        for c in text.chars() {
            if is_han(c) {
                han_chars += 1;
            } else {
                other_bytes += c.len_utf8();
            }
        }
        han_chars + (other_bytes as f64 / CHARS_PER_TOKEN).ceil() as u64
    }

    /// Estimate tokens for JSON/structured content (tool arguments, schemas).
    pub fn count_json(&self, json_text: &str) -> u64 {
        if json_text.is_empty() {
            return 0;
        }
        (json_text.len() as f64 / JSON_CHARS_PER_TOKEN).ceil() as u64
    }

    pub fn count_message(&self, message: &Message) -> u64 {
        let mut total = BASE_MESSAGE_TOKENS;
        total += self.count_text(message.role.as_str());
        total += self.count_text(&message.content);

        for call in &message.tool_calls {
            total += TOOL_CALL_OVERHEAD_TOKENS;
            total += self.count_text(&call.function.name);
            total += self.count_json(&call.function.arguments);
        }

        if let Some(id) = &message.tool_call_id {
            total += self.count_text(id);
        }

        total
    }

    pub fn count_messages<'a, I>(&self, messages: I) -> u64
    where
        I: IntoIterator<Item = &'a Message>,
    {
        FORMAT_TOKENS
            + messages
                .into_iter()
                .map(|msg| self.count_message(msg))
                .sum::<u64>()
    }

    /// Tool schemas are serialized into the request alongside the messages.
    pub fn count_tools(&self, tools: &[Value]) -> u64 {
        tools
            .iter()
            .map(|tool| self.count_json(&tool.to_string()))
            .sum()
    }
}

/// Cumulative input-token accounting for one gateway instance. Unlimited
/// when `max_input_tokens` is unset.
#[derive(Debug, Clone)]
pub struct TokenBudget {
    cumulative_input_tokens: u64,
    max_input_tokens: Option<u64>,
}

impl TokenBudget {
    pub fn new(max_input_tokens: Option<u64>) -> Self {
        Self {
            cumulative_input_tokens: 0,
            max_input_tokens,
        }
    }

    /// Fail fast when the projected request would push the cumulative count
    /// over the ceiling. Never retried by callers.
    pub fn check(&self, input_tokens: u64) -> Result<()> {
        if let Some(max) = self.max_input_tokens {
            if self.cumulative_input_tokens + input_tokens > max {
                return Err(ResearchError::TokenLimitExceeded {
                    current: self.cumulative_input_tokens,
                    needed: input_tokens,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Record consumption after a successful dispatch.
    pub fn record(&mut self, input_tokens: u64) {
        self.cumulative_input_tokens += input_tokens;
        info!(
            input_tokens,
            cumulative_input_tokens = self.cumulative_input_tokens,
            "Token usage updated"
        );
    }

    pub fn cumulative(&self) -> u64 {
        self.cumulative_input_tokens
    }
}
