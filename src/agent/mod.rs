//! Analyst runner - the bounded think/act/observe loop
//!
//! One parametrized analyst type drives every roster entry; per-category
//! behavior lives entirely in the configuration record (tools, system
//! prompt, rubric sections). A runner owns its memory for exactly one run
//! and is discarded afterwards.

pub mod fallback;
pub mod prompts;
pub mod roster;

use crate::error::{ResearchError, Result};
use crate::extract::ExtractionProfile;
use crate::llm::tokens::truncate_utf8;
use crate::llm::{LlmGateway, ToolChoice};
use crate::models::{AgentState, Memory, Message};
use crate::tools::{ToolCollection, TERMINATE_TOOL};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Maximum bytes of a single tool observation retained in memory.
const MAX_OBSERVE_BYTES: usize = 10_000;

/// Advisory per-step model call timeout.
const STEP_TIMEOUT: Duration = Duration::from_secs(300);

pub const DEFAULT_MAX_STEPS: u32 = 3;

/// Everything that distinguishes one analyst from another.
#[derive(Clone)]
pub struct AnalystConfig {
    pub name: String,
    /// Stable category key the orchestrator files results under.
    pub category: String,
    pub system_prompt: String,
    pub next_step_prompt: String,
    /// Enumerated report sections for the forced-summary fallback.
    pub summary_rubric: Vec<String>,
    pub tools: ToolCollection,
    pub max_steps: u32,
    pub extraction: ExtractionProfile,
}

impl AnalystConfig {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        system_prompt: impl Into<String>,
        summary_rubric: Vec<String>,
    ) -> Self {
        let mut tools = ToolCollection::new();
        tools.register(Arc::new(crate::tools::TerminateTool));
        Self {
            name: name.into(),
            category: category.into(),
            system_prompt: system_prompt.into(),
            next_step_prompt: prompts::NEXT_STEP_PROMPT.to_string(),
            summary_rubric,
            tools,
            max_steps: DEFAULT_MAX_STEPS,
            extraction: ExtractionProfile::han(),
        }
    }

    /// Register a domain tool for this analyst.
    pub fn with_tool(mut self, tool: Arc<dyn crate::tools::Tool>) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_extraction(mut self, extraction: ExtractionProfile) -> Self {
        self.extraction = extraction;
        self
    }
}

/// One analyst run: IDLE → RUNNING → {FINISHED, ERROR}.
pub struct Analyst {
    config: AnalystConfig,
    gateway: Arc<LlmGateway>,
    memory: Memory,
    state: AgentState,
    run_id: Uuid,
}

impl Analyst {
    pub fn new(config: AnalystConfig, gateway: Arc<LlmGateway>) -> Self {
        Self {
            config,
            gateway,
            memory: Memory::new(),
            state: AgentState::Idle,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn config(&self) -> &AnalystConfig {
        &self.config
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Inject shared context before the run begins.
    pub fn seed_context(&mut self, content: impl Into<String>) {
        self.memory.add_message(Message::system(content));
    }

    /// Drive the think/act/observe loop to completion or step-budget
    /// exhaustion and return the raw transcript.
    pub async fn run(&mut self, request: &str) -> Result<String> {
        if self.state != AgentState::Idle {
            return Err(ResearchError::Agent(format!(
                "Cannot run {} from state {:?}",
                self.config.name, self.state
            )));
        }
        self.state = AgentState::Running;
        self.memory.add_message(Message::user(request));

        info!(
            agent = %self.config.name,
            run_id = %self.run_id,
            max_steps = self.config.max_steps,
            "Analyst run started"
        );

        let system_msgs = [Message::system(self.config.system_prompt.clone())];
        let schemas = self.config.tools.to_schemas();
        let mut trace: Vec<String> = Vec::new();

        let outcome = self
            .step_loop(&system_msgs, &schemas, &mut trace)
            .await;

        let mut transcript = trace.join("\n");

        match outcome {
            Ok(()) => {
                if fallback::needs_forced_summary(&transcript, &self.config.extraction) {
                    info!(
                        agent = %self.config.name,
                        "Run finished without analysis, forcing summary generation"
                    );
                    match self.force_summary(&system_msgs).await {
                        Ok(summary) => {
                            transcript.push_str("\n\n");
                            transcript.push_str(&summary);
                        }
                        Err(e) => {
                            self.state = AgentState::Error;
                            return Err(e);
                        }
                    }
                }
                self.state = AgentState::Finished;
                info!(agent = %self.config.name, run_id = %self.run_id, "Analyst run finished");
                Ok(transcript)
            }
            Err(e) => {
                self.state = AgentState::Error;
                Err(e)
            }
        }
    }

    async fn step_loop(
        &mut self,
        system_msgs: &[Message],
        schemas: &[Value],
        trace: &mut Vec<String>,
    ) -> Result<()> {
        let mut step = 0;
        loop {
            if step >= self.config.max_steps {
                info!(agent = %self.config.name, "Step budget exhausted");
                return Ok(());
            }
            step += 1;

            self.memory
                .add_message(Message::user(self.config.next_step_prompt.clone()));

            let action = self
                .gateway
                .ask_tool(
                    self.memory.messages(),
                    Some(system_msgs),
                    Some(schemas),
                    ToolChoice::Auto,
                    STEP_TIMEOUT,
                )
                .await?;

            let content = action.content.clone().unwrap_or_default();
            self.memory.add_message(
                Message::assistant(content.clone()).with_tool_calls(action.tool_calls.clone()),
            );

            if action.tool_calls.is_empty() {
                if !content.trim().is_empty() {
                    trace.push(format!("Step {}: {}", step, content));
                }
                continue;
            }

            let mut terminated = false;
            for call in &action.tool_calls {
                let tool_name = &call.function.name;
                let arguments: Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| json!({}));

                debug!(agent = %self.config.name, tool = %tool_name, "Executing tool");
                let result = self.config.tools.execute(tool_name, &arguments).await;
                if let Some(error) = &result.error {
                    warn!(agent = %self.config.name, tool = %tool_name, %error, "Tool execution failed");
                }

                let observed = match (&result.output, &result.error) {
                    (_, Some(error)) => format!("Error: {}", error),
                    (Some(output), None) => output.to_string(),
                    _ => String::new(),
                };
                let observed = truncate_utf8(&observed, MAX_OBSERVE_BYTES).to_string();

                trace.push(format!(
                    "Step {}: Observed output of cmd `{}` executed:\n{}",
                    step, tool_name, observed
                ));

                let mut observation = Message::tool(observed, call.id.clone());
                observation.tool_call_results = vec![result];
                self.memory.add_message(observation);

                if tool_name == TERMINATE_TOOL {
                    terminated = true;
                }
            }

            if terminated {
                info!(agent = %self.config.name, step, "Terminate tool invoked");
                return Ok(());
            }
        }
    }

    /// Exactly one remedial non-tool call; cannot re-enter the step loop.
    async fn force_summary(&mut self, system_msgs: &[Message]) -> Result<String> {
        let prompt = fallback::build_summary_prompt(&self.config.summary_rubric);
        self.memory.add_message(Message::user(prompt));

        let summary = self
            .gateway
            .ask(self.memory.messages(), Some(system_msgs), false, None)
            .await?;

        self.memory.add_message(Message::assistant(summary.clone()));
        Ok(summary)
    }
}
