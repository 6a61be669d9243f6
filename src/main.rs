//! Bank Deposit Predictor - Main Entry Point
//!
//! Serves deposit-acceptance predictions over HTTP, links each prediction to a
//! known client and records it for the campaign dashboard.

use anyhow::{Context, Result};
use bank_deposit_predictor::{
    api::{build_router, AppState},
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, PipelineMetrics},
    models::InferenceEngine,
    store,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(config: &LoggingConfig) -> Result<()> {
    // RUST_LOG wins over the configured level
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .with_context(|| format!("Invalid log level '{}'", config.level))?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    init_logging(&config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Bank Deposit Predictor");
    info!(
        bind = %config.server.bind,
        artifacts = %config.artifacts.dir.display(),
        store = ?config.store.backend,
        "Configuration loaded successfully"
    );

    // Initialize metrics
    let metrics = Arc::new(PipelineMetrics::new());

    // Connect the client/prediction store
    let store = store::connect(&config.store).await?;
    info!(backend = store.backend(), "Prediction store ready");

    // Missing artifacts disable predictions but not the dashboard
    let engine = Arc::new(InferenceEngine::from_config(
        &config.artifacts,
        store.clone(),
        metrics.clone(),
    ));
    if !engine.is_available() {
        warn!("Serving without a model: /api/predict will answer 503");
    }

    // Start metrics reporter
    let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
    tokio::spawn(reporter.start());

    let app = build_router(AppState::new(engine, store), &config.server.cors_origins);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(addr = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}
