//! Hysteresis gate
//!
//! Turns a noisy stream of z-scores into a stable per-metric
//! "anomaly active" flag:
//! - opening requires |z| > enter and a minimum quiet period since the
//!   previous alert
//! - clearing requires an unbroken run of samples with |z| < clear

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::estimator::EwmaEstimator;
use super::thresholds::ThresholdPair;

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    Normal,
    Anomalous,
}

/// State change produced by a single evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateTransition {
    Opened,
    Cleared,
}

/// Result of feeding one sample through a gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateOutcome {
    pub z_score: f64,
    pub active: bool,
    pub transition: Option<GateTransition>,
}

/// Debounce parameters shared by every gate of a detector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateSettings {
    /// Minimum time between two transitions into the anomalous state
    pub min_quiet: Duration,
    /// Consecutive normal samples required to clear
    pub hysteresis_samples: u32,
}

/// Per-metric alert state machine
#[derive(Debug, Clone)]
pub struct HysteresisGate {
    estimator: EwmaEstimator,
    thresholds: ThresholdPair,
    settings: GateSettings,
    active: bool,
    consecutive_normal: u32,
    /// None until the first alert, so the first alert is never debounced
    last_alert: Option<Instant>,
}

impl HysteresisGate {
    pub fn new(estimator: EwmaEstimator, thresholds: ThresholdPair, settings: GateSettings) -> Self {
        Self {
            estimator,
            thresholds,
            settings,
            active: false,
            consecutive_normal: 0,
            last_alert: None,
        }
    }

    /// Update the baseline with `x`, score it and evaluate a transition
    pub fn observe(&mut self, x: f64, now: Instant) -> GateOutcome {
        self.estimator.update(x);
        let z_score = self.estimator.z_score(x);
        let transition = self.evaluate(z_score, now);

        GateOutcome {
            z_score,
            active: self.active,
            transition,
        }
    }

    /// Advance the state machine with an already computed z-score
    pub fn evaluate(&mut self, z_score: f64, now: Instant) -> Option<GateTransition> {
        let magnitude = z_score.abs();

        if self.active {
            if magnitude < self.thresholds.clear {
                self.consecutive_normal += 1;
                if self.consecutive_normal >= self.settings.hysteresis_samples {
                    self.active = false;
                    self.consecutive_normal = 0;
                    return Some(GateTransition::Cleared);
                }
            } else {
                self.consecutive_normal = 0;
            }
            return None;
        }

        if magnitude > self.thresholds.enter && self.quiet_period_elapsed(now) {
            self.active = true;
            self.consecutive_normal = 0;
            self.last_alert = Some(now);
            return Some(GateTransition::Opened);
        }

        None
    }

    fn quiet_period_elapsed(&self, now: Instant) -> bool {
        match self.last_alert {
            Some(last) => now.saturating_duration_since(last) >= self.settings.min_quiet,
            None => true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> GateState {
        if self.active {
            GateState::Anomalous
        } else {
            GateState::Normal
        }
    }

    pub fn thresholds(&self) -> ThresholdPair {
        self.thresholds
    }

    pub fn consecutive_normal_samples(&self) -> u32 {
        self.consecutive_normal
    }

    pub fn last_alert(&self) -> Option<Instant> {
        self.last_alert
    }

    pub fn estimator(&self) -> &EwmaEstimator {
        &self.estimator
    }
}
