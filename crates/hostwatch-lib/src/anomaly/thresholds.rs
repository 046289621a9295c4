//! Per-metric z-score thresholds
//!
//! Each metric index maps to an entry/clear pair. Indices without an
//! explicit entry fall back to the global default pair.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, DetectorResult};
use crate::models::Metric;

/// Default |z| above which an anomaly opens
pub const DEFAULT_ENTER_THRESHOLD: f64 = 3.0;

/// Default |z| below which a sample counts toward clearing
pub const DEFAULT_CLEAR_THRESHOLD: f64 = 2.0;

/// Entry and clear thresholds for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub enter: f64,
    pub clear: f64,
}

impl ThresholdPair {
    pub const fn new(enter: f64, clear: f64) -> Self {
        Self { enter, clear }
    }

    /// Reject pairs where clearing would need more deviation than entering
    pub fn validate(&self) -> DetectorResult<()> {
        if !(self.enter.is_finite() && self.clear.is_finite()) {
            return Err(DetectorError::InvalidConfig(format!(
                "thresholds must be finite (enter={}, clear={})",
                self.enter, self.clear
            )));
        }
        if self.clear < 0.0 || self.enter < self.clear {
            return Err(DetectorError::InvalidConfig(format!(
                "thresholds must satisfy enter >= clear >= 0 (enter={}, clear={})",
                self.enter, self.clear
            )));
        }
        Ok(())
    }
}

impl Default for ThresholdPair {
    fn default() -> Self {
        Self::new(DEFAULT_ENTER_THRESHOLD, DEFAULT_CLEAR_THRESHOLD)
    }
}

/// Lookup table from metric index to threshold pair
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThresholdPolicy {
    default: ThresholdPair,
    overrides: BTreeMap<usize, ThresholdPair>,
}

impl ThresholdPolicy {
    /// Policy with a single default pair and no per-metric entries
    pub fn uniform(default: ThresholdPair) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    /// Tuned table for the five host metrics
    ///
    /// Bursty metrics (disk I/O, heap) need a wider entry band than
    /// steady ones.
    pub fn host_defaults() -> Self {
        Self::uniform(ThresholdPair::default())
            .with_metric(Metric::CpuUtil, ThresholdPair::new(3.0, 2.0))
            .with_metric(Metric::RamUsed, ThresholdPair::new(3.0, 2.0))
            .with_metric(Metric::DiskIoRate, ThresholdPair::new(4.0, 2.5))
            .with_metric(Metric::HeapFree, ThresholdPair::new(4.0, 2.5))
            .with_metric(Metric::UptimeMs, ThresholdPair::new(3.5, 2.0))
    }

    /// Set the pair for a raw metric index
    pub fn with_index(mut self, index: usize, pair: ThresholdPair) -> Self {
        self.overrides.insert(index, pair);
        self
    }

    /// Set the pair for a host metric
    pub fn with_metric(self, metric: Metric, pair: ThresholdPair) -> Self {
        self.with_index(metric.index(), pair)
    }

    /// Thresholds for `index`, or the default pair if none is configured
    pub fn thresholds_for(&self, index: usize) -> ThresholdPair {
        self.overrides.get(&index).copied().unwrap_or(self.default)
    }

    pub fn default_pair(&self) -> ThresholdPair {
        self.default
    }

    pub fn validate(&self) -> DetectorResult<()> {
        self.default.validate()?;
        for pair in self.overrides.values() {
            pair.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_index_falls_back_to_default() {
        let policy = ThresholdPolicy::host_defaults();
        assert_eq!(policy.thresholds_for(99), ThresholdPair::default());
        assert_eq!(policy.thresholds_for(usize::MAX), policy.default_pair());
    }

    #[test]
    fn test_host_defaults_widen_bursty_metrics() {
        let policy = ThresholdPolicy::host_defaults();
        let cpu = policy.thresholds_for(Metric::CpuUtil.index());
        let disk = policy.thresholds_for(Metric::DiskIoRate.index());

        assert!(disk.enter > cpu.enter);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_override_replaces_default() {
        let policy = ThresholdPolicy::uniform(ThresholdPair::new(3.0, 2.0))
            .with_index(1, ThresholdPair::new(6.0, 1.0));

        assert_eq!(policy.thresholds_for(0), ThresholdPair::new(3.0, 2.0));
        assert_eq!(policy.thresholds_for(1), ThresholdPair::new(6.0, 1.0));
    }

    #[test]
    fn test_validate_rejects_inverted_pair() {
        let pair = ThresholdPair::new(1.5, 2.0);
        assert!(matches!(pair.validate(), Err(DetectorError::InvalidConfig(_))));

        let policy = ThresholdPolicy::uniform(ThresholdPair::default()).with_index(0, pair);
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_clear() {
        assert!(ThresholdPair::new(1.0, -0.5).validate().is_err());
        assert!(ThresholdPair::new(f64::NAN, 1.0).validate().is_err());
        assert!(ThresholdPair::new(2.0, 2.0).validate().is_ok());
        assert!(ThresholdPair::new(0.0, 0.0).validate().is_ok());
    }
}
