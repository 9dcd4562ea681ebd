//! Observability module for centralized tracing and metrics setup.
//!
//! This module provides:
//! - Structured logging with configurable levels and formats
//! - Prometheus metrics collection (rendered by the server's `/metrics`)
//! - Span constructors for scans and individual provider attempts

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::prelude::*;

use crate::config::ObservabilityConfig;

/// Initialize tracing and the metrics recorder; returns the handle used to render metrics
pub fn init_observability(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    init_tracing(config)?;
    let handle = init_metrics()?;

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        "Observability stack initialized successfully"
    );
    Ok(handle)
}

/// Initialize structured logging
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("repair_scan={}", config.log_level.to_lowercase()).parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if config.use_pretty_logs() {
        // Pretty formatting for development
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    } else {
        // JSON formatting for production (default)
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    Ok(())
}

/// Install the global Prometheus recorder
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("Metrics collection initialized");
    Ok(handle)
}

/// Create a span covering one whole scan
pub fn scan_span(attempt_count: usize, image_size: usize) -> tracing::Span {
    tracing::info_span!(
        "vehicle_scan",
        component = "orchestrator",
        attempts = attempt_count,
        image_size_bytes = image_size
    )
}

/// Create a span for one provider attempt
pub fn attempt_span(index: usize, model: &str) -> tracing::Span {
    tracing::info_span!("provider_attempt", attempt = index, model = %model)
}

/// Create a span for one inbound HTTP request
pub fn request_span(method: &str, path: &str) -> tracing::Span {
    tracing::info_span!("http_request", method = %method, path = %path, component = "server")
}

/// Record the outcome of a single attempt (`success` or a failure kind)
pub fn record_attempt(model: &str, result: &str) {
    metrics::counter!(
        "scan_attempts_total",
        "model" => model.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record the outcome of a whole scan
pub fn record_scan_metrics(success: bool, duration: std::time::Duration, image_size: usize) {
    metrics::counter!("scan_invocations_total", "result" => if success { "success" } else { "failure" })
        .increment(1);
    metrics::histogram!("scan_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("scan_image_size_bytes").record(image_size as f64);
}

/// Record an HTTP request served by the proxy
pub fn record_request_metrics(method: &str, status: u16, duration: std::time::Duration) {
    metrics::counter!(
        "requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("request_duration_seconds").record(duration.as_secs_f64());
}
