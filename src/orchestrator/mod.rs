//! Research orchestrator
//!
//! Runs the analyst roster in a fixed order against one subject, injecting
//! shared context, isolating per-analyst failures and emitting progress
//! events. Analysts run strictly sequentially; the inter-analyst delay is
//! rate-limit courtesy toward the shared model endpoint.

use crate::agent::{Analyst, AnalystConfig};
use crate::error::{ResearchError, Result};
use crate::extract::extract_analysis;
use crate::llm::LlmGateway;
use crate::models::{
    CategoryOutcome, ProgressEvent, ProgressStatus, RawResult, ResearchReport, BASIC_INFO_KEY,
};
use crate::tools::Tool;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Research phase share of overall progress; report generation downstream
/// owns the remaining 30%.
const RESEARCH_PHASE_SPAN: usize = 70;

const DEFAULT_INTER_ANALYST_DELAY: Duration = Duration::from_secs(3);

pub struct ResearchOrchestrator {
    roster: Vec<AnalystConfig>,
    gateway: Arc<LlmGateway>,
    subject_info: Option<Arc<dyn Tool>>,
    progress: Option<mpsc::Sender<ProgressEvent>>,
    inter_analyst_delay: Duration,
}

impl ResearchOrchestrator {
    pub fn new(roster: Vec<AnalystConfig>, gateway: Arc<LlmGateway>) -> Self {
        Self {
            roster,
            gateway,
            subject_info: None,
            progress: None,
            inter_analyst_delay: DEFAULT_INTER_ANALYST_DELAY,
        }
    }

    /// Collaborator that fetches shared subject context before the run.
    pub fn with_subject_info(mut self, tool: Arc<dyn Tool>) -> Self {
        self.subject_info = Some(tool);
        self
    }

    /// Optional progress sink. Its absence (or a full channel) suppresses
    /// notifications but never changes orchestration outcomes.
    pub fn with_progress_sink(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn with_inter_analyst_delay(mut self, delay: Duration) -> Self {
        self.inter_analyst_delay = delay;
        self
    }

    /// Run every roster analyst against the subject and return the
    /// per-category results. A single analyst's failure never aborts the
    /// run; zero successes does.
    pub async fn run(&self, subject: &str) -> Result<ResearchReport> {
        info!(subject, analysts = self.roster.len(), "Running research");

        let subject_context = self.fetch_subject_context(subject).await;
        let context_message = subject_context
            .as_ref()
            .map(|context| build_context_message(subject, context));

        let total = self.roster.len();
        let request = format!("请分析股票 {}。", subject);
        let mut categories = BTreeMap::new();
        let mut succeeded = 0usize;

        for (index, config) in self.roster.iter().enumerate() {
            let category = config.category.clone();
            let position = index + 1;

            info!(
                agent = %config.name,
                position,
                total,
                "Starting analysis"
            );
            self.emit(ProgressEvent::new(
                &category,
                ProgressStatus::Started,
                format!("{} 分析中...", category),
                phase_progress(index, total),
            ));

            let mut analyst = Analyst::new(config.clone(), self.gateway.clone());
            if let Some(context) = &context_message {
                analyst.seed_context(context.clone());
                debug!(agent = %config.name, "Seeded shared subject context");
            }

            match analyst.run(&request).await {
                Ok(raw_output) => {
                    let tool_data = analyst.memory().last_tool_output();
                    let agent_output = extract_analysis(&raw_output, &config.extraction);

                    categories.insert(
                        category.clone(),
                        CategoryOutcome::Report(RawResult {
                            agent_output,
                            raw_output,
                            tool_data,
                        }),
                    );
                    succeeded += 1;

                    info!(agent = %config.name, "Completed analysis");
                    self.emit(ProgressEvent::new(
                        &category,
                        ProgressStatus::Completed,
                        format!("{} 分析完成", category),
                        phase_progress(position, total),
                    ));
                }
                Err(e) => {
                    error!(agent = %config.name, error = %e, "Analyst failed");
                    categories.insert(
                        category.clone(),
                        CategoryOutcome::Failed {
                            message: format!("Error: {}", e),
                        },
                    );
                    self.emit(ProgressEvent::new(
                        &category,
                        ProgressStatus::Error,
                        format!("{} 分析錯誤: {}", category, e),
                        phase_progress(position, total),
                    ));
                }
            }

            if position < total {
                debug!(
                    delay_ms = self.inter_analyst_delay.as_millis() as u64,
                    "Waiting before next analyst"
                );
                sleep(self.inter_analyst_delay).await;
            }
        }

        if succeeded == 0 {
            return Err(ResearchError::ResearchFailed {
                subject: subject.to_string(),
            });
        }

        Ok(ResearchReport {
            subject: subject.to_string(),
            categories,
            subject_context,
            generated_at: Utc::now(),
        })
    }

    /// Shared context fetch is best-effort; a failure is logged and the
    /// run proceeds without it.
    async fn fetch_subject_context(&self, subject: &str) -> Option<Value> {
        let tool = self.subject_info.as_ref()?;
        match tool.execute(&json!({ "stock_code": subject })).await {
            Ok(result) => {
                if let Some(error) = &result.error {
                    warn!(%error, "Failed to fetch subject context, proceeding without it");
                    None
                } else {
                    result.output
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch subject context, proceeding without it");
                None
            }
        }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            if let Err(e) = sender.try_send(event) {
                warn!(error = %e, "Failed to send progress event");
            }
        }
    }
}

/// Cumulative progress within the research phase.
fn phase_progress(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (done * RESEARCH_PHASE_SPAN / total) as u8
}

fn build_context_message(subject: &str, context: &Value) -> String {
    let trading_day = context
        .get("current_trading_day")
        .and_then(Value::as_str)
        .unwrap_or("未知");
    let basic_info = context
        .get("basic_info")
        .map(|v| v.to_string())
        .unwrap_or_else(|| "{}".to_string());

    format!(
        "股票代碼: {}\n當前交易日: {}\n基本資訊: {}",
        subject, trading_day, basic_info
    )
}

impl ResearchReport {
    /// Final map shape handed to external consumers: one entry per
    /// category (error strings for failed analysts), the shared subject
    /// context merged under the reserved key, and the subject itself.
    pub fn to_value(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (category, outcome) in &self.categories {
            let value = match outcome {
                CategoryOutcome::Report(result) => json!(result),
                CategoryOutcome::Failed { message } => json!(message),
            };
            map.insert(category.clone(), value);
        }
        if let Some(context) = &self.subject_context {
            map.insert(BASIC_INFO_KEY.to_string(), context.clone());
        }
        map.insert("stock_code".to_string(), json!(self.subject));
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::prompts;
    use crate::llm::testing::{text_response, ScriptedTransport};
    use crate::llm::{ChatResponse, LlmSettings, RetryPolicy};
    use crate::models::ToolResult;
    use std::time::Instant;

    const ANALYSIS_A: &str =
        "## 舆情分析\n市场情绪整体偏多，新闻面以利好为主，短期关注量能变化与板块轮动。";
    const ANALYSIS_B: &str =
        "## 技术分析\n均线呈多头排列，量价配合良好，上方压力位关注前高区域。";

    fn fast_settings() -> LlmSettings {
        let mut settings = LlmSettings::new("gpt-4o", "https://api.openai.com/v1", "sk-test");
        settings.retry = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        settings
    }

    fn gateway_with(script: Vec<crate::Result<ChatResponse>>) -> Arc<LlmGateway> {
        Arc::new(LlmGateway::with_transport(
            fast_settings(),
            Box::new(ScriptedTransport::new(script)),
        ))
    }

    /// Two single-step analysts; each consumes exactly one script entry.
    fn two_analyst_roster() -> Vec<AnalystConfig> {
        vec![
            AnalystConfig::new(
                "sentiment_agent",
                "sentiment",
                prompts::SENTIMENT_SYSTEM_PROMPT,
                vec!["市場情緒分析".to_string()],
            )
            .with_max_steps(1),
            AnalystConfig::new(
                "technical_analysis_agent",
                "technical",
                prompts::TECHNICAL_SYSTEM_PROMPT,
                vec!["趨勢判斷".to_string()],
            )
            .with_max_steps(1),
        ]
    }

    struct StockInfoTool;

    #[async_trait::async_trait]
    impl Tool for StockInfoTool {
        fn name(&self) -> &'static str {
            "stock_info"
        }

        fn description(&self) -> &'static str {
            "Fetch basic stock information"
        }

        async fn execute(&self, _arguments: &Value) -> crate::Result<ToolResult> {
            Ok(ToolResult::ok(json!({
                "current_trading_day": "2024-06-28",
                "basic_info": {"name": "贵州茅台", "industry": "白酒"}
            })))
        }
    }

    struct FailingInfoTool;

    #[async_trait::async_trait]
    impl Tool for FailingInfoTool {
        fn name(&self) -> &'static str {
            "stock_info"
        }

        fn description(&self) -> &'static str {
            "Always fails"
        }

        async fn execute(&self, _arguments: &Value) -> crate::Result<ToolResult> {
            Ok(ToolResult::err("data provider offline"))
        }
    }

    #[tokio::test]
    async fn all_analysts_succeed() {
        let gateway = gateway_with(vec![
            Ok(text_response(ANALYSIS_A)),
            Ok(text_response(ANALYSIS_B)),
        ]);
        let orchestrator = ResearchOrchestrator::new(two_analyst_roster(), gateway)
            .with_inter_analyst_delay(Duration::from_millis(5));

        let report = orchestrator.run("600519").await.unwrap();

        assert_eq!(report.categories.len(), 2);
        assert_eq!(report.succeeded(), 2);
        match &report.categories["sentiment"] {
            CategoryOutcome::Report(result) => {
                assert!(result.agent_output.contains("市场情绪整体偏多"));
                assert!(result.raw_output.contains("Step 1:"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn one_failure_is_isolated() {
        let gateway = gateway_with(vec![
            // Validation errors are not retried, so one entry fails the
            // first analyst outright.
            Err(ResearchError::Validation("malformed schema".to_string())),
            Ok(text_response(ANALYSIS_B)),
        ]);
        let orchestrator = ResearchOrchestrator::new(two_analyst_roster(), gateway)
            .with_inter_analyst_delay(Duration::from_millis(5));

        let report = orchestrator.run("600519").await.unwrap();

        match &report.categories["sentiment"] {
            CategoryOutcome::Failed { message } => {
                assert!(message.starts_with("Error:"));
                assert!(message.contains("malformed schema"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(matches!(
            report.categories["technical"],
            CategoryOutcome::Report(_)
        ));
    }

    #[tokio::test]
    async fn total_failure_returns_an_error_not_an_empty_map() {
        let gateway = gateway_with(vec![
            Err(ResearchError::Validation("bad".to_string())),
            Err(ResearchError::Validation("bad".to_string())),
        ]);
        let orchestrator = ResearchOrchestrator::new(two_analyst_roster(), gateway)
            .with_inter_analyst_delay(Duration::from_millis(5));

        let err = orchestrator.run("600519").await.unwrap_err();
        assert!(matches!(err, ResearchError::ResearchFailed { .. }));
    }

    #[tokio::test]
    async fn progress_events_are_ordered_per_category() {
        let gateway = gateway_with(vec![
            Ok(text_response(ANALYSIS_A)),
            Err(ResearchError::Validation("bad".to_string())),
        ]);
        let (tx, mut rx) = mpsc::channel(32);
        let orchestrator = ResearchOrchestrator::new(two_analyst_roster(), gateway)
            .with_progress_sink(tx)
            .with_inter_analyst_delay(Duration::from_millis(5));

        orchestrator.run("600519").await.unwrap();

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }

        let summary: Vec<(String, ProgressStatus)> = events
            .iter()
            .map(|e| (e.category.clone(), e.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("sentiment".to_string(), ProgressStatus::Started),
                ("sentiment".to_string(), ProgressStatus::Completed),
                ("technical".to_string(), ProgressStatus::Started),
                ("technical".to_string(), ProgressStatus::Error),
            ]
        );

        // Research phase spans 0-70%.
        assert_eq!(events[0].progress, 0);
        assert_eq!(events[1].progress, 35);
        assert_eq!(events[3].progress, 70);
    }

    #[tokio::test]
    async fn missing_sink_does_not_change_outcomes() {
        let gateway = gateway_with(vec![
            Ok(text_response(ANALYSIS_A)),
            Ok(text_response(ANALYSIS_B)),
        ]);
        let orchestrator = ResearchOrchestrator::new(two_analyst_roster(), gateway)
            .with_inter_analyst_delay(Duration::from_millis(1));

        let report = orchestrator.run("600519").await.unwrap();
        assert_eq!(report.succeeded(), 2);
    }

    #[tokio::test]
    async fn inter_analyst_delay_is_respected() {
        let gateway = gateway_with(vec![
            Ok(text_response(ANALYSIS_A)),
            Ok(text_response(ANALYSIS_B)),
        ]);
        let delay = Duration::from_millis(50);
        let orchestrator =
            ResearchOrchestrator::new(two_analyst_roster(), gateway).with_inter_analyst_delay(delay);

        let start = Instant::now();
        orchestrator.run("600519").await.unwrap();

        // N analysts with inter-delay d take at least d * (N - 1).
        assert!(start.elapsed() >= delay);
    }

    #[tokio::test]
    async fn subject_context_is_fetched_and_merged() {
        let gateway = gateway_with(vec![
            Ok(text_response(ANALYSIS_A)),
            Ok(text_response(ANALYSIS_B)),
        ]);
        let orchestrator = ResearchOrchestrator::new(two_analyst_roster(), gateway)
            .with_subject_info(Arc::new(StockInfoTool))
            .with_inter_analyst_delay(Duration::from_millis(1));

        let report = orchestrator.run("600519").await.unwrap();

        assert!(report.subject_context.is_some());
        let value = report.to_value();
        assert_eq!(value[BASIC_INFO_KEY]["current_trading_day"], "2024-06-28");
        assert_eq!(value["stock_code"], "600519");
        assert!(value["sentiment"]["agent_output"].is_string());
    }

    #[tokio::test]
    async fn context_fetch_failure_is_not_fatal() {
        let gateway = gateway_with(vec![
            Ok(text_response(ANALYSIS_A)),
            Ok(text_response(ANALYSIS_B)),
        ]);
        let orchestrator = ResearchOrchestrator::new(two_analyst_roster(), gateway)
            .with_subject_info(Arc::new(FailingInfoTool))
            .with_inter_analyst_delay(Duration::from_millis(1));

        let report = orchestrator.run("600519").await.unwrap();
        assert!(report.subject_context.is_none());
        assert_eq!(report.succeeded(), 2);
        assert!(report.to_value().get(BASIC_INFO_KEY).is_none());
    }

    #[tokio::test]
    async fn failed_categories_serialize_as_error_strings() {
        let gateway = gateway_with(vec![
            Err(ResearchError::Validation("bad".to_string())),
            Ok(text_response(ANALYSIS_B)),
        ]);
        let orchestrator = ResearchOrchestrator::new(two_analyst_roster(), gateway)
            .with_inter_analyst_delay(Duration::from_millis(1));

        let report = orchestrator.run("600519").await.unwrap();
        let value = report.to_value();
        assert!(value["sentiment"].as_str().unwrap().starts_with("Error:"));
    }
}
