//! Online anomaly detection for host metrics
//!
//! This module provides:
//! - EWMA baseline estimation with z-scores
//! - Per-metric entry/clear thresholds
//! - Hysteresis gating to debounce alerts
//! - A bounded timeline of surfaced anomalies

mod detector;
mod estimator;
mod hysteresis;
mod thresholds;
mod timeline;

pub use detector::{
    Detector, DetectorConfig, DetectorSnapshot, MetricTransition, DEFAULT_HYSTERESIS_SAMPLES,
    DEFAULT_MIN_QUIET,
};
pub use estimator::{EwmaEstimator, DEFAULT_ALPHA, DEFAULT_EPSILON};
pub use hysteresis::{GateOutcome, GateSettings, GateState, GateTransition, HysteresisGate};
pub use thresholds::{
    ThresholdPair, ThresholdPolicy, DEFAULT_CLEAR_THRESHOLD, DEFAULT_ENTER_THRESHOLD,
};
pub use timeline::{
    AnomalyEvent, SharedTimeline, Timeline, TimelineStats, DEFAULT_TIMELINE_CAPACITY,
};
