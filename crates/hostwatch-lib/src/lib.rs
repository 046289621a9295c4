//! Host metric anomaly detection library
//!
//! This crate provides the core functionality for:
//! - Sampling host metrics from procfs
//! - Online EWMA baselines with hysteresis-gated anomaly detection
//! - A bounded timeline of surfaced anomalies
//! - Health checks and observability

pub mod anomaly;
pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;

pub use anomaly::{Detector, DetectorConfig, DetectorSnapshot, ThresholdPair, ThresholdPolicy};
pub use error::{DetectorError, DetectorResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
    WarmupProgress,
};
pub use models::*;
pub use observability::{AgentMetrics, StructuredLogger};
