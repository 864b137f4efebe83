//! Stock Research Orchestrator
//!
//! A multi-analyst research engine for market instruments:
//! - Runs a fixed roster of specialist analysts strictly sequentially
//! - Drives each analyst through a bounded think/act/observe loop
//! - Wraps the model endpoint with token budgeting and retry/backoff
//! - Separates generated analysis from tool-call narration
//! - Isolates per-analyst failures and emits progress events
//!
//! RESEARCH LOOP:
//! SUBJECT → CONTEXT → (THINK → ACT → OBSERVE)* → EXTRACT → AGGREGATE

pub mod agent;
pub mod error;
pub mod extract;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod tools;

pub use error::{ResearchError, Result};

// Re-export common types
pub use agent::{Analyst, AnalystConfig};
pub use llm::{GatewayRegistry, LlmGateway, LlmSettings};
pub use models::*;
pub use orchestrator::ResearchOrchestrator;
