//! Provider capability profiles.
//!
//! All provider-family branching happens here, once, at gateway
//! construction. The rest of the gateway consults the resulting value
//! object instead of re-matching on model or host names per request.

use serde::{Deserialize, Serialize};

/// Model families that use `max_completion_tokens` instead of `max_tokens`
/// and reject sampling temperature.
const REASONING_PATTERNS: &[&str] = &[
    "o1",
    "o3",
    "deepseek-r1",
    "deepseek-reasoner",
    "qwen-r1",
    "reasoning",
    "think",
    "cot",
];

/// Proxy hosts known to reject `tool_choice: "auto"`.
const NO_AUTO_TOOL_CHOICE_HOSTS: &[&str] = &["openrouter", "infini"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApiFamily {
    OpenAi,
    DeepSeek,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLimitField {
    MaxTokens,
    MaxCompletionTokens,
}

/// Capability profile selected once per gateway.
#[derive(Debug, Clone)]
pub struct ModelProfile {
    pub api_family: ApiFamily,
    pub token_limit_field: TokenLimitField,
    pub supports_auto_tool_choice: bool,
    pub sends_temperature: bool,
}

impl ModelProfile {
    /// Detect the profile from the model name and endpoint. An explicitly
    /// configured family wins over host inference.
    pub fn detect(model: &str, base_url: &str, explicit_family: Option<ApiFamily>) -> Self {
        let api_family = explicit_family.unwrap_or_else(|| detect_api_family(base_url));

        // DeepSeek endpoints take the standard parameter shape even for
        // their reasoner models.
        let (token_limit_field, sends_temperature) =
            if api_family != ApiFamily::DeepSeek && is_reasoning_model(model) {
                (TokenLimitField::MaxCompletionTokens, false)
            } else {
                (TokenLimitField::MaxTokens, true)
            };

        let host = base_url.to_lowercase();
        let supports_auto_tool_choice = !NO_AUTO_TOOL_CHOICE_HOSTS
            .iter()
            .any(|needle| host.contains(needle));

        Self {
            api_family,
            token_limit_field,
            supports_auto_tool_choice,
            sends_temperature,
        }
    }
}

fn detect_api_family(base_url: &str) -> ApiFamily {
    if base_url.to_lowercase().contains("deepseek.com") {
        ApiFamily::DeepSeek
    } else {
        ApiFamily::OpenAi
    }
}

fn is_reasoning_model(model: &str) -> bool {
    if model.is_empty() {
        return false;
    }
    let model_lower = model.to_lowercase();
    REASONING_PATTERNS
        .iter()
        .any(|pattern| model_lower.contains(pattern))
}
