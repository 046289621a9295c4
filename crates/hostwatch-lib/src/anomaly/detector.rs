//! Multi-metric online anomaly detector
//!
//! Owns one [`HysteresisGate`] per tracked metric and evaluates a full
//! sample vector per tick.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::estimator::{EwmaEstimator, DEFAULT_ALPHA, DEFAULT_EPSILON};
use super::hysteresis::{GateSettings, GateTransition, HysteresisGate};
use super::thresholds::ThresholdPolicy;
use crate::error::{DetectorError, DetectorResult};
use crate::models::METRIC_COUNT;

/// Default minimum time between two alerts on the same metric
pub const DEFAULT_MIN_QUIET: Duration = Duration::from_secs(5);

/// Default run of normal samples needed to clear an alert
pub const DEFAULT_HYSTERESIS_SAMPLES: u32 = 10;

/// Immutable detector configuration
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// EWMA smoothing factor, in (0, 1)
    pub alpha: f64,
    /// Variance guard for z-score computation
    pub epsilon: f64,
    pub min_quiet: Duration,
    pub hysteresis_samples: u32,
    pub thresholds: ThresholdPolicy,
}

impl DetectorConfig {
    pub fn validate(&self) -> DetectorResult<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(DetectorError::InvalidConfig(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        if !(self.epsilon > 0.0 && self.epsilon.is_finite()) {
            return Err(DetectorError::InvalidConfig(format!(
                "epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.hysteresis_samples == 0 {
            return Err(DetectorError::InvalidConfig(
                "hysteresis_samples must be at least 1".to_string(),
            ));
        }
        self.thresholds.validate()
    }

    fn gate_settings(&self) -> GateSettings {
        GateSettings {
            min_quiet: self.min_quiet,
            hysteresis_samples: self.hysteresis_samples,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
            epsilon: DEFAULT_EPSILON,
            min_quiet: DEFAULT_MIN_QUIET,
            hysteresis_samples: DEFAULT_HYSTERESIS_SAMPLES,
            thresholds: ThresholdPolicy::host_defaults(),
        }
    }
}

/// Per-tick detector output, index-aligned with the input samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorSnapshot {
    pub z_scores: Vec<f64>,
    pub per_metric_active: Vec<bool>,
    pub any_active: bool,
}

/// A gate transition observed during the most recent feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricTransition {
    pub index: usize,
    pub transition: GateTransition,
    pub z_score: f64,
}

/// Online anomaly detector over a fixed set of metric streams
#[derive(Debug, Clone)]
pub struct Detector {
    gates: Vec<HysteresisGate>,
    config: DetectorConfig,
    transitions: Vec<MetricTransition>,
}

impl Detector {
    /// Create a detector tracking `metric_count` streams
    pub fn new(metric_count: usize, config: DetectorConfig) -> DetectorResult<Self> {
        if metric_count == 0 {
            return Err(DetectorError::InvalidConfig(
                "detector must track at least one metric".to_string(),
            ));
        }
        config.validate()?;

        let settings = config.gate_settings();
        let gates = (0..metric_count)
            .map(|index| {
                HysteresisGate::new(
                    EwmaEstimator::new(config.alpha, config.epsilon),
                    config.thresholds.thresholds_for(index),
                    settings,
                )
            })
            .collect();

        Ok(Self {
            gates,
            config,
            transitions: Vec::new(),
        })
    }

    /// Create a detector for the five host metrics
    pub fn for_host_metrics(config: DetectorConfig) -> DetectorResult<Self> {
        Self::new(METRIC_COUNT, config)
    }

    pub fn metric_count(&self) -> usize {
        self.gates.len()
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Feed one sample per metric, stamped with the current instant
    pub fn feed(&mut self, samples: &[f64]) -> DetectorResult<DetectorSnapshot> {
        self.feed_at(samples, Instant::now())
    }

    /// Feed one sample per metric at an explicit monotonic instant
    ///
    /// A length mismatch or a non-finite value is rejected before any
    /// state is touched.
    pub fn feed_at(&mut self, samples: &[f64], now: Instant) -> DetectorResult<DetectorSnapshot> {
        if samples.len() != self.gates.len() {
            return Err(DetectorError::SampleLengthMismatch {
                expected: self.gates.len(),
                actual: samples.len(),
            });
        }
        if let Some((index, &value)) = samples.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(DetectorError::NonFiniteSample { index, value });
        }

        self.transitions.clear();
        let mut z_scores = Vec::with_capacity(samples.len());
        let mut per_metric_active = Vec::with_capacity(samples.len());

        for (index, (gate, &sample)) in self.gates.iter_mut().zip(samples).enumerate() {
            let outcome = gate.observe(sample, now);
            if let Some(transition) = outcome.transition {
                self.transitions.push(MetricTransition {
                    index,
                    transition,
                    z_score: outcome.z_score,
                });
            }
            z_scores.push(outcome.z_score);
            per_metric_active.push(outcome.active);
        }

        let any_active = per_metric_active.iter().any(|&active| active);
        Ok(DetectorSnapshot {
            z_scores,
            per_metric_active,
            any_active,
        })
    }

    /// Transitions produced by the most recent feed, in index order
    pub fn transitions(&self) -> &[MetricTransition] {
        &self.transitions
    }

    pub fn is_active(&self, index: usize) -> DetectorResult<bool> {
        self.gate(index).map(HysteresisGate::is_active)
    }

    /// Entry threshold in effect for a metric
    pub fn entry_threshold(&self, index: usize) -> DetectorResult<f64> {
        self.gate(index).map(|gate| gate.thresholds().enter)
    }

    pub fn clear_threshold(&self, index: usize) -> DetectorResult<f64> {
        self.gate(index).map(|gate| gate.thresholds().clear)
    }

    pub fn gate(&self, index: usize) -> DetectorResult<&HysteresisGate> {
        self.gates.get(index).ok_or(DetectorError::UnknownMetric {
            index,
            metric_count: self.gates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::thresholds::ThresholdPair;

    fn single_metric_config(alpha: f64, hysteresis_samples: u32, min_quiet: Duration) -> DetectorConfig {
        DetectorConfig {
            alpha,
            epsilon: DEFAULT_EPSILON,
            min_quiet,
            hysteresis_samples,
            thresholds: ThresholdPolicy::uniform(ThresholdPair::new(3.0, 2.0)),
        }
    }

    #[test]
    fn test_cold_start_yields_zero_scores() {
        let mut detector = Detector::for_host_metrics(DetectorConfig::default()).unwrap();
        let snapshot = detector.feed(&[55.0, 40.0, 1e6, 3e8, 12_345.0]).unwrap();

        assert_eq!(snapshot.z_scores, vec![0.0; METRIC_COUNT]);
        assert_eq!(snapshot.per_metric_active, vec![false; METRIC_COUNT]);
        assert!(!snapshot.any_active);
    }

    #[test]
    fn test_constant_input_stays_normal() {
        let mut detector = Detector::new(2, single_metric_config(0.05, 3, Duration::ZERO)).unwrap();
        for _ in 0..500 {
            let snapshot = detector.feed(&[7.0, 0.0]).unwrap();
            assert_eq!(snapshot.z_scores, vec![0.0, 0.0]);
            assert!(!snapshot.any_active);
        }
    }

    #[test]
    fn test_round_trip_open_and_clear() {
        let mut detector = Detector::new(1, single_metric_config(0.05, 3, Duration::ZERO)).unwrap();
        let now = Instant::now();

        for _ in 0..4 {
            let snapshot = detector.feed_at(&[10.0], now).unwrap();
            assert!(snapshot.z_scores[0].abs() < 1e-9);
            assert!(!snapshot.any_active);
        }

        let spike = detector.feed_at(&[100.0], now).unwrap();
        assert!(spike.z_scores[0] > 3.0);
        assert!(spike.any_active);
        assert_eq!(detector.transitions().len(), 1);
        assert_eq!(detector.transitions()[0].transition, GateTransition::Opened);

        let first = detector.feed_at(&[10.0], now).unwrap();
        let second = detector.feed_at(&[10.0], now).unwrap();
        assert!(first.any_active);
        assert!(second.any_active);

        let third = detector.feed_at(&[10.0], now).unwrap();
        assert!(!third.any_active);
        assert_eq!(detector.transitions()[0].transition, GateTransition::Cleared);
    }

    #[test]
    fn test_step_from_flat_baseline_is_bounded_by_alpha() {
        // Post-update z of a step from a flat baseline is (1 - alpha) / sqrt(alpha)
        let mut detector = Detector::new(1, single_metric_config(0.1, 3, Duration::ZERO)).unwrap();
        for _ in 0..4 {
            detector.feed(&[10.0]).unwrap();
        }

        let snapshot = detector.feed(&[100.0]).unwrap();
        let ceiling = 0.9 / 0.1f64.sqrt();
        assert!((snapshot.z_scores[0] - ceiling).abs() < 1e-6);
        assert!(!snapshot.any_active);
    }

    #[test]
    fn test_step_change_reacts_within_one_tick() {
        let mut detector = Detector::new(1, single_metric_config(0.05, 5, Duration::ZERO)).unwrap();
        // The first deviation from a flat start scores (1 - alpha) / sqrt(alpha),
        // so only check the baseline once it has settled.
        for i in 0..200 {
            let value = if i % 2 == 0 { 10.0 } else { 12.0 };
            let snapshot = detector.feed(&[value]).unwrap();
            if i >= 100 {
                assert!(!snapshot.any_active, "baseline flagged at sample {i}");
            }
        }

        let snapshot = detector.feed(&[30.0]).unwrap();
        assert!(snapshot.per_metric_active[0]);
        assert!(detector.is_active(0).unwrap());
    }

    #[test]
    fn test_reopen_debounced_within_quiet_period() {
        let mut detector =
            Detector::new(1, single_metric_config(0.05, 1, Duration::from_secs(60))).unwrap();
        let start = Instant::now();
        for _ in 0..4 {
            detector.feed_at(&[10.0], start).unwrap();
        }

        assert!(detector.feed_at(&[100.0], start).unwrap().any_active);
        let opened_at = detector.gate(0).unwrap().last_alert();

        // One normal sample clears (hysteresis_samples = 1)
        assert!(!detector.feed_at(&[14.0], start + Duration::from_secs(1)).unwrap().any_active);

        // A second, larger spike inside the quiet period is ignored
        let snapshot = detector
            .feed_at(&[10_000.0], start + Duration::from_secs(2))
            .unwrap();
        assert!(snapshot.z_scores[0] > 3.0);
        assert!(!snapshot.any_active);
        assert!(detector.transitions().is_empty());
        assert_eq!(detector.gate(0).unwrap().last_alert(), opened_at);
    }

    #[test]
    fn test_wrong_length_is_contract_error() {
        let mut detector = Detector::for_host_metrics(DetectorConfig::default()).unwrap();
        let err = detector.feed(&[1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            DetectorError::SampleLengthMismatch {
                expected: METRIC_COUNT,
                actual: 2
            }
        );

        // Rejected input must not seed the estimators
        assert!(!detector.gate(0).unwrap().estimator().is_initialized());
    }

    #[test]
    fn test_non_finite_sample_is_rejected_without_side_effects() {
        let mut detector = Detector::new(2, single_metric_config(0.05, 3, Duration::ZERO)).unwrap();
        let t0 = Instant::now();
        detector.feed_at(&[10.0, 10.0], t0).unwrap();

        let err = detector.feed_at(&[12.0, f64::NAN], t0).unwrap_err();
        assert!(matches!(err, DetectorError::NonFiniteSample { index: 1, .. }));
        assert!(detector.feed_at(&[f64::INFINITY, 1.0], t0).is_err());

        // Neither estimator moved, including the finite value in the rejected vector
        for index in 0..2 {
            let estimator = detector.gate(index).unwrap().estimator();
            assert_eq!(estimator.mean(), 10.0);
            assert_eq!(estimator.variance(), 0.0);
        }

        // The metric can still open afterwards
        for _ in 0..20 {
            detector.feed_at(&[10.0, 10.0], t0).unwrap();
        }
        let snapshot = detector.feed_at(&[10.0, 1000.0], t0).unwrap();
        assert!(snapshot.per_metric_active[1]);
    }

    #[test]
    fn test_accessors_reject_unknown_index() {
        let detector = Detector::for_host_metrics(DetectorConfig::default()).unwrap();
        assert!(matches!(
            detector.is_active(METRIC_COUNT),
            Err(DetectorError::UnknownMetric { .. })
        ));
        assert!(detector.entry_threshold(42).is_err());
        assert_eq!(detector.entry_threshold(2).unwrap(), 4.0);
        assert_eq!(detector.clear_threshold(2).unwrap(), 2.5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = DetectorConfig::default();
        config.alpha = 1.0;
        assert!(Detector::for_host_metrics(config).is_err());

        let mut config = DetectorConfig::default();
        config.hysteresis_samples = 0;
        assert!(Detector::for_host_metrics(config).is_err());

        let mut config = DetectorConfig::default();
        config.epsilon = 0.0;
        assert!(Detector::for_host_metrics(config).is_err());

        assert!(Detector::new(0, DetectorConfig::default()).is_err());
    }
}
