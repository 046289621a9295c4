//! hostwatch - host metric anomaly detection agent
//!
//! Samples host metrics on a fixed interval, scores them against online
//! EWMA baselines and surfaces debounced anomalies over HTTP.

use anyhow::Result;
use hostwatch_agent::{
    api::{self, AppState},
    config::{AgentConfig, ConfigSummary},
};
use hostwatch_lib::{
    anomaly::{Detector, Timeline},
    collector::{create_sampler, SamplingLoopBuilder},
    health::{components, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting hostwatch");

    // Load configuration
    let config = AgentConfig::load()?;
    let detector_config = config.detector.to_detector_config()?;
    info!(
        node_name = %config.node_name,
        interval_ms = config.sample_interval_ms,
        warmup_samples = config.warmup_samples,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SAMPLER).await;
    health_registry.register(components::DETECTOR).await;
    health_registry.register(components::API).await;
    health_registry.set_warmup(0, config.warmup_samples).await;

    let metrics = AgentMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let sampler = create_sampler(&config.proc_root);
    logger.log_startup(AGENT_VERSION, sampler.platform_name());

    let detector = Detector::for_host_metrics(detector_config.clone())?;
    let timeline = Timeline::shared(config.timeline_capacity);

    let (sampling_loop, reports) = SamplingLoopBuilder::new()
        .sampler(sampler)
        .detector(detector)
        .interval(config.sample_interval())
        .warmup_samples(config.warmup_samples)
        .timeline(timeline.clone())
        .health_registry(health_registry.clone())
        .node_name(&config.node_name)
        .build()?;

    let (shutdown_tx, _) = broadcast::channel(1);

    let loop_handle = tokio::spawn(sampling_loop.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(AppState::new(
        health_registry.clone(),
        metrics,
        reports,
        timeline.clone(),
        ConfigSummary::new(&config, &detector_config),
    ));
    let api_handle = tokio::spawn(api::serve(
        config.api_port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    let reason = shutdown_signal().await;
    info!(reason = reason, "Shutting down");
    let _ = shutdown_tx.send(());

    if let Err(e) = loop_handle.await {
        warn!(error = %e, "Sampling loop task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    let stats = timeline.read().await.stats();
    logger.log_shutdown(reason, &stats);

    Ok(())
}

/// Resolve on SIGINT or SIGTERM, returning which one arrived
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    }
}
