//! Error types for the stock research orchestrator

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, ResearchError>;

#[derive(Error, Debug)]
pub enum ResearchError {

    // =============================
    // Core Pipeline Errors
    // =============================

    #[error("Request may exceed input token limit (Current: {current}, Needed: {needed}, Max: {max})")]
    TokenLimitExceeded {
        current: u64,
        needed: u64,
        max: u64,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Empty response from LLM")]
    EmptyResponse,

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("No specialist agents completed successfully for {subject}")]
    ResearchFailed { subject: String },

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ResearchError {
    /// Classify whether the gateway's backoff loop may retry this error.
    /// Budget and validation failures are configuration conditions and must
    /// surface immediately; only transient provider conditions re-enter the
    /// loop.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ResearchError::Llm(_) | ResearchError::Http(_) | ResearchError::EmptyResponse
        )
    }
}
