//! HTTP API for health checks, Prometheus metrics and detector status

use crate::config::ConfigSummary;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use hostwatch_lib::{
    anomaly::{AnomalyEvent, SharedTimeline},
    health::{ComponentStatus, HealthRegistry},
    models::TickReport,
    observability::AgentMetrics,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    pub reports: watch::Receiver<TickReport>,
    pub timeline: SharedTimeline,
    pub config: Arc<ConfigSummary>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: AgentMetrics,
        reports: watch::Receiver<TickReport>,
        timeline: SharedTimeline,
        config: ConfigSummary,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            reports,
            timeline,
            config: Arc::new(config),
        }
    }
}

/// Query parameters for the timeline endpoint
#[derive(Debug, Default, Deserialize)]
pub struct TimelineQuery {
    pub limit: Option<usize>,
}

/// Timeline listing, most recent event first
#[derive(Debug, Serialize, Deserialize)]
pub struct TimelineResponse {
    /// Events currently retained, before `limit` is applied
    pub total: usize,
    pub events: Vec<AnomalyEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 503 until the baseline has warmed up
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Latest tick report published by the sampling loop
async fn snapshot(State(state): State<Arc<AppState>>) -> Json<TickReport> {
    let report = state.reports.borrow().clone();
    Json(report)
}

async fn timeline(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TimelineQuery>,
) -> Json<TimelineResponse> {
    let timeline = state.timeline.read().await;
    let total = timeline.len();
    let events = timeline.recent(query.limit.unwrap_or(total));

    Json(TimelineResponse { total, events })
}

async fn clear_timeline(State(state): State<Arc<AppState>>) -> Json<ClearResponse> {
    let mut timeline = state.timeline.write().await;
    let cleared = timeline.len();
    timeline.clear();
    info!(cleared = cleared, "Timeline cleared");

    Json(ClearResponse { cleared })
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.timeline.read().await.stats())
}

async fn config_summary(State(state): State<Arc<AppState>>) -> Json<ConfigSummary> {
    Json(state.config.as_ref().clone())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/snapshot", get(snapshot))
        .route("/api/v1/timeline", get(timeline).delete(clear_timeline))
        .route("/api/v1/stats", get(stats))
        .route("/api/v1/config", get(config_summary))
        .with_state(state)
}

/// Start the API server, stopping when `shutdown` fires
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
