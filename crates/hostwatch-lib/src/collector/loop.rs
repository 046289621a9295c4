//! Sampling loop
//!
//! Periodically samples the host, feeds the detector, and publishes the
//! latest tick through a watch channel. The detector is owned by the loop
//! and never shared.

use super::HostSampler;
use crate::anomaly::{
    AnomalyEvent, Detector, DetectorSnapshot, GateTransition, SharedTimeline, Timeline,
    DEFAULT_TIMELINE_CAPACITY,
};
use crate::health::{components, HealthRegistry};
use crate::models::{Metric, TickReport, METRIC_COUNT};
use crate::observability::{AgentMetrics, StructuredLogger};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Configuration for the sampling loop
#[derive(Debug, Clone)]
pub struct SamplingConfig {
    /// Time between samples (default: 500 ms)
    pub interval: Duration,
    /// Samples during which surfaced alerts are suppressed (default: 30)
    pub warmup_samples: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            warmup_samples: 30,
        }
    }
}

/// Drives sampler and detector once per tick
pub struct SamplingLoop {
    sampler: Box<dyn HostSampler>,
    detector: Detector,
    config: SamplingConfig,
    timeline: SharedTimeline,
    report_tx: watch::Sender<TickReport>,
    health: HealthRegistry,
    metrics: AgentMetrics,
    logger: StructuredLogger,
    values: Vec<f64>,
    /// Per metric: an opened anomaly has been surfaced and not yet cleared
    surfaced: Vec<bool>,
    sample_count: u64,
}

impl SamplingLoop {
    /// Start the loop until a shutdown signal arrives
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.interval.as_millis() as u64,
            warmup_samples = self.config.warmup_samples,
            platform = self.sampler.platform_name(),
            "Starting sampling loop"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "Sampling tick failed");
                        self.health
                            .set_unhealthy(components::DETECTOR, e.to_string())
                            .await;
                    }
                }
                _ = shutdown.recv() => {
                    info!(samples = self.sample_count, "Shutting down sampling loop");
                    break;
                }
            }
        }
    }

    /// Sample once, score the sample vector, and publish the result
    pub async fn tick(&mut self) -> Result<TickReport> {
        let start = Instant::now();

        let outcome = match self.sampler.sample(&mut self.values).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Sampler failed, feeding neutral values");
                self.values.fill(0.0);
                super::SampleOutcome {
                    degraded: Metric::ALL.to_vec(),
                }
            }
        };

        if outcome.degraded.is_empty() {
            self.health.set_healthy(components::SAMPLER).await;
        } else {
            for metric in &outcome.degraded {
                self.metrics.inc_sampler_errors(*metric);
                self.logger
                    .log_sampler_degraded(*metric, self.sampler.platform_name());
            }
            self.health
                .set_degraded(
                    components::SAMPLER,
                    format!("{} metric(s) degraded", outcome.degraded.len()),
                )
                .await;
        }

        let snapshot = self
            .detector
            .feed(&self.values)
            .context("Detector rejected sample vector")?;
        self.health.set_healthy(components::DETECTOR).await;
        self.sample_count += 1;

        let warmup = self.config.warmup_samples;
        let warming_up = self.sample_count <= warmup;
        if self.sample_count == warmup + 1 {
            self.logger.log_warmup_complete(self.sample_count);
        }
        self.health.set_warmup(self.sample_count, warmup).await;
        self.metrics.set_warming_up(warming_up);

        if !warming_up {
            self.surface_transitions(&snapshot, self.sample_count == warmup + 1)
                .await;
        }

        self.metrics.observe_snapshot(&snapshot);
        self.metrics
            .observe_tick_latency(start.elapsed().as_secs_f64());

        let report = TickReport {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            sample_count: self.sample_count,
            warming_up,
            values: self.values.clone(),
            z_scores: snapshot.z_scores,
            per_metric_active: snapshot.per_metric_active,
            any_active: snapshot.any_active,
        };

        debug!(
            sample = self.sample_count,
            any_active = report.any_active,
            "Tick complete"
        );

        self.report_tx.send_replace(report.clone());
        Ok(report)
    }

    /// Log, count and record the transitions of the last feed
    ///
    /// Anomalies still open when warm-up ends are surfaced once as opened.
    /// A clear is only recorded for an anomaly whose opening was surfaced.
    async fn surface_transitions(&mut self, snapshot: &DetectorSnapshot, warmup_ended: bool) {
        let mut pending: Vec<(usize, GateTransition, f64)> = Vec::new();

        if warmup_ended {
            for (index, &active) in snapshot.per_metric_active.iter().enumerate() {
                let changed_now = self
                    .detector
                    .transitions()
                    .iter()
                    .any(|transition| transition.index == index);
                if active && !changed_now && !self.surfaced[index] {
                    pending.push((index, GateTransition::Opened, snapshot.z_scores[index]));
                }
            }
        }

        pending.extend(
            self.detector
                .transitions()
                .iter()
                .map(|transition| (transition.index, transition.transition, transition.z_score)),
        );

        if pending.is_empty() {
            return;
        }

        let mut timeline = self.timeline.write().await;
        for (index, kind, z_score) in pending {
            let Some(metric) = Metric::from_index(index) else {
                continue;
            };
            let value = self.values[index];

            match kind {
                GateTransition::Opened => {
                    let threshold = self.detector.entry_threshold(index).unwrap_or_default();
                    self.logger
                        .log_anomaly_opened(metric, value, z_score, threshold);
                    self.metrics.inc_anomalies_opened(metric);
                    self.surfaced[index] = true;
                }
                GateTransition::Cleared => {
                    if !self.surfaced[index] {
                        debug!(metric = %metric, "Dropping clear of an anomaly opened during warm-up");
                        continue;
                    }
                    self.logger.log_anomaly_cleared(metric, value, z_score);
                    self.surfaced[index] = false;
                }
            }

            timeline.record(AnomalyEvent::new(metric, value, z_score, kind));
        }
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }
}

/// Builder for creating the sampling loop
pub struct SamplingLoopBuilder {
    sampler: Option<Box<dyn HostSampler>>,
    detector: Option<Detector>,
    config: SamplingConfig,
    timeline: Option<SharedTimeline>,
    health: Option<HealthRegistry>,
    node_name: String,
}

impl SamplingLoopBuilder {
    pub fn new() -> Self {
        Self {
            sampler: None,
            detector: None,
            config: SamplingConfig::default(),
            timeline: None,
            health: None,
            node_name: "unknown".to_string(),
        }
    }

    pub fn sampler(mut self, sampler: Box<dyn HostSampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn detector(mut self, detector: Detector) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    pub fn warmup_samples(mut self, samples: u64) -> Self {
        self.config.warmup_samples = samples;
        self
    }

    /// Share an existing timeline (e.g. with the HTTP API)
    pub fn timeline(mut self, timeline: SharedTimeline) -> Self {
        self.timeline = Some(timeline);
        self
    }

    pub fn health_registry(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Build the loop and the receiving end of its tick channel
    pub fn build(self) -> Result<(SamplingLoop, watch::Receiver<TickReport>)> {
        let sampler = self
            .sampler
            .ok_or_else(|| anyhow::anyhow!("Sampler is required"))?;
        let detector = self
            .detector
            .ok_or_else(|| anyhow::anyhow!("Detector is required"))?;

        if detector.metric_count() != METRIC_COUNT {
            anyhow::bail!(
                "Detector tracks {} metrics, sampler produces {}",
                detector.metric_count(),
                METRIC_COUNT
            );
        }

        let (report_tx, report_rx) = watch::channel(TickReport::default());

        let sampling_loop = SamplingLoop {
            sampler,
            detector,
            config: self.config,
            timeline: self
                .timeline
                .unwrap_or_else(|| Timeline::shared(DEFAULT_TIMELINE_CAPACITY)),
            report_tx,
            health: self.health.unwrap_or_default(),
            metrics: AgentMetrics::new(),
            logger: StructuredLogger::new(self.node_name),
            values: vec![0.0; METRIC_COUNT],
            surfaced: vec![false; METRIC_COUNT],
            sample_count: 0,
        };

        Ok((sampling_loop, report_rx))
    }
}

impl Default for SamplingLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::{DetectorConfig, ThresholdPair, ThresholdPolicy};
    use crate::collector::{NullSampler, SampleOutcome};
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Sampler replaying scripted CPU values; other metrics stay flat
    struct ScriptedSampler {
        cpu: VecDeque<f64>,
    }

    impl ScriptedSampler {
        fn new(cpu: impl IntoIterator<Item = f64>) -> Self {
            Self {
                cpu: cpu.into_iter().collect(),
            }
        }
    }

    #[async_trait]
    impl HostSampler for ScriptedSampler {
        async fn sample(&mut self, out: &mut [f64]) -> Result<SampleOutcome> {
            out.copy_from_slice(&[0.0, 50.0, 0.0, 1024.0, 0.0]);
            out[Metric::CpuUtil.index()] = self.cpu.pop_front().unwrap_or(10.0);
            Ok(SampleOutcome::default())
        }

        fn platform_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn test_detector() -> Detector {
        Detector::for_host_metrics(DetectorConfig {
            alpha: 0.05,
            min_quiet: Duration::ZERO,
            hysteresis_samples: 3,
            thresholds: ThresholdPolicy::uniform(ThresholdPair::new(3.0, 2.0)),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_sampling_config_default() {
        let config = SamplingConfig::default();
        assert_eq!(config.interval, Duration::from_millis(500));
        assert_eq!(config.warmup_samples, 30);
    }

    #[test]
    fn test_builder_requires_sampler() {
        let result = SamplingLoopBuilder::new().detector(test_detector()).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_mismatched_detector() {
        let detector = Detector::new(2, DetectorConfig::default()).unwrap();
        let result = SamplingLoopBuilder::new()
            .sampler(Box::new(NullSampler))
            .detector(detector)
            .build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_tick_publishes_report() {
        let (mut sampling_loop, rx) = SamplingLoopBuilder::new()
            .sampler(Box::new(ScriptedSampler::new([12.0])))
            .detector(test_detector())
            .warmup_samples(1)
            .build()
            .unwrap();

        let report = sampling_loop.tick().await.unwrap();
        assert_eq!(report.sample_count, 1);
        assert!(report.warming_up);
        assert_eq!(report.values[Metric::CpuUtil.index()], 12.0);
        assert_eq!(report.z_scores, vec![0.0; METRIC_COUNT]);

        let published = rx.borrow().clone();
        assert_eq!(published.sample_count, 1);
        assert_eq!(published.values, report.values);
    }

    #[tokio::test]
    async fn test_transitions_recorded_after_warmup() {
        let timeline = Timeline::shared(16);
        let cpu = [10.0, 10.0, 10.0, 10.0, 100.0, 10.0, 10.0, 10.0];
        let (mut sampling_loop, _rx) = SamplingLoopBuilder::new()
            .sampler(Box::new(ScriptedSampler::new(cpu)))
            .detector(test_detector())
            .timeline(timeline.clone())
            .warmup_samples(2)
            .build()
            .unwrap();

        for _ in 0..4 {
            sampling_loop.tick().await.unwrap();
        }
        let spike = sampling_loop.tick().await.unwrap();
        assert!(spike.any_active);
        assert!(!spike.warming_up);

        for _ in 0..3 {
            sampling_loop.tick().await.unwrap();
        }

        let timeline = timeline.read().await;
        let kinds: Vec<GateTransition> = timeline.events().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![GateTransition::Opened, GateTransition::Cleared]);
        assert_eq!(timeline.recent(1)[0].metric, Metric::CpuUtil);
    }

    #[tokio::test]
    async fn test_transitions_suppressed_during_warmup() {
        let timeline = Timeline::shared(16);
        let (mut sampling_loop, _rx) = SamplingLoopBuilder::new()
            .sampler(Box::new(ScriptedSampler::new([10.0, 10.0, 100.0])))
            .detector(test_detector())
            .timeline(timeline.clone())
            .warmup_samples(10)
            .build()
            .unwrap();

        for _ in 0..3 {
            sampling_loop.tick().await.unwrap();
        }

        // The detector still tracks the anomaly, it is just not surfaced
        assert!(sampling_loop.detector().is_active(0).unwrap());
        assert!(timeline.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_anomaly_open_at_warmup_end_is_surfaced() {
        let timeline = Timeline::shared(16);
        let cpu = [10.0, 10.0, 100.0, 10.0, 10.0, 10.0, 10.0];
        let (mut sampling_loop, _rx) = SamplingLoopBuilder::new()
            .sampler(Box::new(ScriptedSampler::new(cpu)))
            .detector(test_detector())
            .timeline(timeline.clone())
            .warmup_samples(4)
            .build()
            .unwrap();

        for _ in 0..4 {
            assert!(sampling_loop.tick().await.unwrap().warming_up);
        }
        assert!(timeline.read().await.is_empty());

        let first = sampling_loop.tick().await.unwrap();
        assert!(!first.warming_up);
        assert!(first.per_metric_active[Metric::CpuUtil.index()]);
        {
            let timeline = timeline.read().await;
            let opened = timeline.recent(1);
            assert_eq!(opened.len(), 1);
            assert_eq!(opened[0].kind, GateTransition::Opened);
            assert_eq!(opened[0].metric, Metric::CpuUtil);
            assert_eq!(opened[0].z_score, first.z_scores[Metric::CpuUtil.index()]);
        }

        for _ in 0..2 {
            sampling_loop.tick().await.unwrap();
        }

        let timeline = timeline.read().await;
        let kinds: Vec<GateTransition> = timeline.events().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![GateTransition::Opened, GateTransition::Cleared]);
        let stats = timeline.stats();
        assert_eq!(stats.anomalies_opened, 1);
        assert_eq!(stats.anomalies_cleared, 1);
    }

    #[tokio::test]
    async fn test_clear_of_unsurfaced_anomaly_is_dropped() {
        let timeline = Timeline::shared(16);
        let cpu = [10.0, 10.0, 100.0, 10.0, 10.0, 10.0, 10.0];
        let (mut sampling_loop, _rx) = SamplingLoopBuilder::new()
            .sampler(Box::new(ScriptedSampler::new(cpu)))
            .detector(test_detector())
            .timeline(timeline.clone())
            .warmup_samples(5)
            .build()
            .unwrap();

        for _ in 0..5 {
            sampling_loop.tick().await.unwrap();
        }

        // Third consecutive normal sample clears the gate on the first live tick
        let first = sampling_loop.tick().await.unwrap();
        assert!(!first.warming_up);
        assert!(!first.any_active);
        assert_eq!(
            sampling_loop.detector().transitions()[0].transition,
            GateTransition::Cleared
        );

        sampling_loop.tick().await.unwrap();
        assert!(timeline.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (sampling_loop, mut rx) = SamplingLoopBuilder::new()
            .sampler(Box::new(ScriptedSampler::new(std::iter::empty())))
            .detector(test_detector())
            .interval(Duration::from_millis(5))
            .build()
            .unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(sampling_loop.run(shutdown_rx));

        rx.changed().await.unwrap();
        assert!(rx.borrow().sample_count >= 1);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
