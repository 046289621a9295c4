//! Observability infrastructure for the hostwatch agent
//!
//! Provides:
//! - Prometheus metrics (sampling latency, per-metric z-scores and alert state)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, GaugeVec, Histogram, IntCounter, IntCounterVec,
    IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use crate::anomaly::{DetectorSnapshot, TimelineStats};
use crate::models::Metric;

/// Histogram buckets for per-tick latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AgentMetricsInner> = OnceLock::new();

struct AgentMetricsInner {
    tick_latency_seconds: Histogram,
    samples_total: IntCounter,
    z_score: GaugeVec,
    anomaly_active: IntGaugeVec,
    anomalies_opened: IntCounterVec,
    sampler_errors: IntCounterVec,
    warming_up: IntGauge,
}

impl AgentMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "hostwatch_tick_latency_seconds",
                "Time spent sampling and scoring one tick",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            samples_total: register_int_counter!(
                "hostwatch_samples_total",
                "Total number of sample vectors fed to the detector"
            )
            .expect("Failed to register samples_total"),

            z_score: register_gauge_vec!(
                "hostwatch_z_score",
                "Latest z-score per metric",
                &["metric"]
            )
            .expect("Failed to register z_score"),

            anomaly_active: register_int_gauge_vec!(
                "hostwatch_anomaly_active",
                "Whether an anomaly is currently open per metric (1 = active)",
                &["metric"]
            )
            .expect("Failed to register anomaly_active"),

            anomalies_opened: register_int_counter_vec!(
                "hostwatch_anomalies_opened_total",
                "Total number of surfaced anomalies per metric",
                &["metric"]
            )
            .expect("Failed to register anomalies_opened"),

            sampler_errors: register_int_counter_vec!(
                "hostwatch_sampler_errors_total",
                "Metric reads that degraded to a neutral value",
                &["metric"]
            )
            .expect("Failed to register sampler_errors"),

            warming_up: register_int_gauge!(
                "hostwatch_warming_up",
                "1 while the baseline is still warming up"
            )
            .expect("Failed to register warming_up"),
        }
    }
}

/// Agent metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct AgentMetrics {
    _private: (),
}

impl Default for AgentMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AgentMetricsInner {
        GLOBAL_METRICS.get_or_init(AgentMetricsInner::new)
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    /// Publish the per-metric gauges for one detector snapshot
    pub fn observe_snapshot(&self, snapshot: &DetectorSnapshot) {
        let inner = self.inner();
        inner.samples_total.inc();

        for (index, (z, active)) in snapshot
            .z_scores
            .iter()
            .zip(&snapshot.per_metric_active)
            .enumerate()
        {
            let Some(metric) = Metric::from_index(index) else {
                continue;
            };
            inner.z_score.with_label_values(&[metric.label()]).set(*z);
            inner
                .anomaly_active
                .with_label_values(&[metric.label()])
                .set(i64::from(*active));
        }
    }

    pub fn inc_anomalies_opened(&self, metric: Metric) {
        self.inner()
            .anomalies_opened
            .with_label_values(&[metric.label()])
            .inc();
    }

    pub fn inc_sampler_errors(&self, metric: Metric) {
        self.inner()
            .sampler_errors
            .with_label_values(&[metric.label()])
            .inc();
    }

    pub fn set_warming_up(&self, warming_up: bool) {
        self.inner().warming_up.set(i64::from(warming_up));
    }
}

/// Structured logger for agent events
///
/// Provides consistent JSON-formatted logging for anomaly transitions
/// and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log an anomaly opening on a metric
    pub fn log_anomaly_opened(&self, metric: Metric, value: f64, z_score: f64, enter_threshold: f64) {
        warn!(
            event = "anomaly_opened",
            node = %self.node_name,
            metric = %metric,
            value = value,
            unit = metric.unit(),
            z_score = z_score,
            threshold = enter_threshold,
            "Anomaly detected on {}",
            metric.display_name()
        );
    }

    /// Log an anomaly clearing after its hysteresis run
    pub fn log_anomaly_cleared(&self, metric: Metric, value: f64, z_score: f64) {
        info!(
            event = "anomaly_cleared",
            node = %self.node_name,
            metric = %metric,
            value = value,
            z_score = z_score,
            "Anomaly cleared on {}",
            metric.display_name()
        );
    }

    /// Log a metric read that fell back to a neutral value
    pub fn log_sampler_degraded(&self, metric: Metric, platform: &str) {
        debug!(
            event = "sampler_degraded",
            node = %self.node_name,
            metric = %metric,
            platform = %platform,
            "Metric read failed, using neutral value"
        );
    }

    pub fn log_warmup_complete(&self, samples: u64) {
        info!(
            event = "warmup_complete",
            node = %self.node_name,
            samples = samples,
            "Baseline warm-up complete, surfacing anomalies"
        );
    }

    /// Log agent startup
    pub fn log_startup(&self, version: &str, platform: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            platform = %platform,
            "hostwatch agent started"
        );
    }

    /// Log agent shutdown with a summary of the session's anomalies
    pub fn log_shutdown(&self, reason: &str, stats: &TimelineStats) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            anomalies_opened = stats.anomalies_opened,
            anomalies_cleared = stats.anomalies_cleared,
            max_abs_z_score = stats.max_abs_z_score,
            most_anomalous_metric = ?stats.most_anomalous_metric,
            "hostwatch agent shutting down"
        );
    }
}
