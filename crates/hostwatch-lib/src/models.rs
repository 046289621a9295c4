//! Core data models for hostwatch

use serde::{Deserialize, Serialize};

/// Number of host metrics tracked by the agent
pub const METRIC_COUNT: usize = 5;

/// Host metrics in canonical sample order
///
/// The discriminant is the metric's index in every sample vector,
/// z-score vector and active-flag vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    CpuUtil = 0,
    RamUsed = 1,
    DiskIoRate = 2,
    HeapFree = 3,
    UptimeMs = 4,
}

impl Metric {
    /// All metrics, index-ordered
    pub const ALL: [Metric; METRIC_COUNT] = [
        Metric::CpuUtil,
        Metric::RamUsed,
        Metric::DiskIoRate,
        Metric::HeapFree,
        Metric::UptimeMs,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Human-readable name for display
    pub fn display_name(self) -> &'static str {
        match self {
            Metric::CpuUtil => "CPU Utilization",
            Metric::RamUsed => "RAM Usage",
            Metric::DiskIoRate => "Disk I/O Rate",
            Metric::HeapFree => "Heap Free",
            Metric::UptimeMs => "Uptime",
        }
    }

    /// Unit of the raw sample value
    pub fn unit(self) -> &'static str {
        match self {
            Metric::CpuUtil | Metric::RamUsed => "%",
            Metric::DiskIoRate => "B/s",
            Metric::HeapFree => "B",
            Metric::UptimeMs => "ms",
        }
    }

    /// Label used for Prometheus series and config keys
    pub fn label(self) -> &'static str {
        match self {
            Metric::CpuUtil => "cpu_util",
            Metric::RamUsed => "ram_used",
            Metric::DiskIoRate => "disk_io_rate",
            Metric::HeapFree => "heap_free",
            Metric::UptimeMs => "uptime_ms",
        }
    }

    /// Look up a metric by its label, ignoring ASCII case
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|metric| metric.label().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// One tick's worth of raw samples plus the detector's verdict
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    /// Unix timestamp (milliseconds) at which the tick completed
    pub timestamp_ms: i64,
    /// Number of samples fed to the detector so far
    pub sample_count: u64,
    /// True while surfaced alerts are suppressed for baseline learning
    pub warming_up: bool,
    /// Raw sample values, index-aligned with [`Metric::ALL`]
    pub values: Vec<f64>,
    pub z_scores: Vec<f64>,
    pub per_metric_active: Vec<bool>,
    pub any_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_index_round_trip() {
        for (i, metric) in Metric::ALL.iter().enumerate() {
            assert_eq!(metric.index(), i);
            assert_eq!(Metric::from_index(i), Some(*metric));
        }
        assert_eq!(Metric::from_index(METRIC_COUNT), None);
    }

    #[test]
    fn test_metric_serde_uses_labels() {
        let json = serde_json::to_string(&Metric::DiskIoRate).unwrap();
        assert_eq!(json, "\"disk_io_rate\"");

        let parsed: Metric = serde_json::from_str("\"heap_free\"").unwrap();
        assert_eq!(parsed, Metric::HeapFree);
    }

    #[test]
    fn test_metric_from_label() {
        assert_eq!(Metric::from_label("cpu_util"), Some(Metric::CpuUtil));
        assert_eq!(Metric::from_label("UPTIME_MS"), Some(Metric::UptimeMs));
        assert_eq!(Metric::from_label("swap"), None);
    }
}
