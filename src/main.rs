use anyhow::Result;
use repair_scan::config::AppConfig;
use repair_scan::errors::error_logging;
use repair_scan::localization::LocalizationManager;
use repair_scan::observability;
use repair_scan::orchestrator::ExtractionOrchestrator;
use repair_scan::providers::ReqwestTransport;
use repair_scan::server::{self, AppState};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    // Initialize tracing and the metrics recorder before anything can fail loudly
    let metrics_handle = observability::init_observability(&config.observability)?;

    if let Err(e) = config.validate() {
        error_logging::log_config_error(&e, "startup", "validate_configuration");
        return Err(anyhow::anyhow!(
            "Configuration validation failed: {}. Please check your environment variables.",
            e
        ));
    }
    info!("{}", config.summary());

    // Per-attempt timeouts are enforced by the orchestrator; the client only bounds connecting
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    let transport = Arc::new(ReqwestTransport::with_client(client));
    let orchestrator = ExtractionOrchestrator::new(config.scan.clone(), transport);

    let localization = LocalizationManager::new()?;

    let state = Arc::new(
        AppState::new(orchestrator, localization, &config.server).with_metrics(metrics_handle),
    );

    tokio::select! {
        result = server::serve(&config.server, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received, stopping scan server"),
    }

    Ok(())
}
