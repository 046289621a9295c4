//! Error types for the anomaly detection core

use thiserror::Error;

/// Contract errors raised by the detector and its configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    /// Sample vector does not carry exactly one value per tracked metric
    #[error("sample vector has {actual} values, expected {expected}")]
    SampleLengthMismatch { expected: usize, actual: usize },

    /// Sample value is NaN or infinite
    #[error("sample for metric {index} is not finite ({value})")]
    NonFiniteSample { index: usize, value: f64 },

    /// Metric index outside the tracked range
    #[error("unknown metric index {index} (tracking {metric_count} metrics)")]
    UnknownMetric { index: usize, metric_count: usize },

    /// Configuration rejected at construction
    #[error("invalid detector configuration: {0}")]
    InvalidConfig(String),
}

pub type DetectorResult<T> = std::result::Result<T, DetectorError>;
