use stock_research_orchestrator::{
    agent::roster::default_roster,
    models::CategoryOutcome,
    GatewayRegistry, LlmSettings, ResearchOrchestrator,
};
use tokio::sync::mpsc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let subject = std::env::args()
        .nth(1)
        .ok_or("Usage: research <stock-code>")?;

    let settings = LlmSettings::from_env()
        .ok_or("LLM_MODEL and LLM_BASE_URL must be set")?;
    let registry = GatewayRegistry::new(settings);
    let gateway = registry.get_or_create("default").await?;

    info!(subject = %subject, "Stock research orchestrator starting");

    let (progress_tx, mut progress_rx) =
        mpsc::channel::<stock_research_orchestrator::models::ProgressEvent>(64);
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            println!(
                "[{:>3}%] {} {} - {}",
                event.progress, event.category, event.status, event.message
            );
        }
    });

    let orchestrator = ResearchOrchestrator::new(default_roster(), gateway)
        .with_progress_sink(progress_tx);

    match orchestrator.run(&subject).await {
        Ok(report) => {
            drop(orchestrator);
            let _ = progress_task.await;

            println!("\n=== RESEARCH REPORT: {} ===", report.subject);
            for (category, outcome) in &report.categories {
                println!("\n--- {} ---", category);
                match outcome {
                    CategoryOutcome::Report(result) => println!("{}", result.agent_output),
                    CategoryOutcome::Failed { message } => println!("{}", message),
                }
            }
            println!(
                "\n{}",
                serde_json::to_string_pretty(&report.to_value())?
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("Research failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
