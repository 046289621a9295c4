//! Agent configuration

use anyhow::{Context, Result};
use hostwatch_lib::anomaly::{
    DetectorConfig, ThresholdPair, ThresholdPolicy, DEFAULT_ALPHA, DEFAULT_EPSILON,
    DEFAULT_HYSTERESIS_SAMPLES, DEFAULT_MIN_QUIET, DEFAULT_TIMELINE_CAPACITY,
};
use hostwatch_lib::models::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the optional config file
pub const CONFIG_PATH_ENV: &str = "HOSTWATCH_CONFIG";

/// Config file read when `HOSTWATCH_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "hostwatch.toml";

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Name reported in logs, defaults to the host name
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Sampling interval in milliseconds
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Samples fed before alerts are surfaced
    #[serde(default = "default_warmup_samples")]
    pub warmup_samples: u64,

    /// Maximum number of anomaly events kept in memory
    #[serde(default = "default_timeline_capacity")]
    pub timeline_capacity: usize,

    /// Root of the proc filesystem
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,

    #[serde(default)]
    pub detector: DetectorSettings,
}

/// Detector tuning as read from configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorSettings {
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Minimum time between two alerts on the same metric
    #[serde(default = "default_min_quiet_ms")]
    pub min_quiet_ms: u64,

    #[serde(default = "default_hysteresis_samples")]
    pub hysteresis_samples: u32,

    /// Pair used for metrics without an entry in `thresholds`
    #[serde(default)]
    pub default_thresholds: ThresholdPair,

    /// Per-metric pairs keyed by metric label (e.g. `disk_io_rate`)
    #[serde(default = "default_thresholds")]
    pub thresholds: BTreeMap<String, ThresholdPair>,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME")
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_sample_interval_ms() -> u64 {
    500
}

fn default_warmup_samples() -> u64 {
    30
}

fn default_timeline_capacity() -> usize {
    DEFAULT_TIMELINE_CAPACITY
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_min_quiet_ms() -> u64 {
    DEFAULT_MIN_QUIET.as_millis() as u64
}

fn default_hysteresis_samples() -> u32 {
    DEFAULT_HYSTERESIS_SAMPLES
}

fn default_thresholds() -> BTreeMap<String, ThresholdPair> {
    let policy = ThresholdPolicy::host_defaults();
    Metric::ALL
        .iter()
        .map(|metric| (metric.label().to_string(), policy.thresholds_for(metric.index())))
        .collect()
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            epsilon: default_epsilon(),
            min_quiet_ms: default_min_quiet_ms(),
            hysteresis_samples: default_hysteresis_samples(),
            default_thresholds: ThresholdPair::default(),
            thresholds: default_thresholds(),
        }
    }
}

impl DetectorSettings {
    /// Resolve into a validated detector configuration
    pub fn to_detector_config(&self) -> Result<DetectorConfig> {
        let mut thresholds = ThresholdPolicy::uniform(self.default_thresholds);
        for (label, pair) in &self.thresholds {
            let metric = Metric::from_label(label)
                .with_context(|| format!("Unknown metric '{}' in detector.thresholds", label))?;
            thresholds = thresholds.with_metric(metric, *pair);
        }

        let config = DetectorConfig {
            alpha: self.alpha,
            epsilon: self.epsilon,
            min_quiet: Duration::from_millis(self.min_quiet_ms),
            hysteresis_samples: self.hysteresis_samples,
            thresholds,
        };
        config.validate()?;

        Ok(config)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            sample_interval_ms: default_sample_interval_ms(),
            warmup_samples: default_warmup_samples(),
            timeline_capacity: default_timeline_capacity(),
            proc_root: default_proc_root(),
            detector: DetectorSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(path)
    }

    /// Load configuration with `path` as the (optional) file layer
    ///
    /// Environment variables override the file, e.g. `HOSTWATCH_API_PORT`
    /// or `HOSTWATCH_DETECTOR__ALPHA`.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("HOSTWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let agent: AgentConfig = config
            .try_deserialize()
            .context("Failed to parse configuration")?;
        agent.validate()?;

        Ok(agent)
    }

    /// Reject values the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_ms == 0 {
            anyhow::bail!("sample_interval_ms must be greater than zero");
        }
        if self.timeline_capacity == 0 {
            anyhow::bail!("timeline_capacity must be greater than zero");
        }
        self.detector.to_detector_config()?;
        Ok(())
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Effective thresholds for one metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub metric: Metric,
    pub enter: f64,
    pub clear: f64,
}

/// Configuration as served by `/api/v1/config`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub node_name: String,
    pub sample_interval_ms: u64,
    pub warmup_samples: u64,
    pub timeline_capacity: usize,
    pub alpha: f64,
    pub epsilon: f64,
    pub min_quiet_ms: u64,
    pub hysteresis_samples: u32,
    pub thresholds: Vec<MetricThresholds>,
}

impl ConfigSummary {
    pub fn new(config: &AgentConfig, detector: &DetectorConfig) -> Self {
        let thresholds = Metric::ALL
            .iter()
            .map(|metric| {
                let pair = detector.thresholds.thresholds_for(metric.index());
                MetricThresholds {
                    metric: *metric,
                    enter: pair.enter,
                    clear: pair.clear,
                }
            })
            .collect();

        Self {
            node_name: config.node_name.clone(),
            sample_interval_ms: config.sample_interval_ms,
            warmup_samples: config.warmup_samples,
            timeline_capacity: config.timeline_capacity,
            alpha: detector.alpha,
            epsilon: detector.epsilon,
            min_quiet_ms: detector.min_quiet.as_millis() as u64,
            hysteresis_samples: detector.hysteresis_samples,
            thresholds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn toml_file(content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        let config = AgentConfig::load_from("/nonexistent/hostwatch.toml").unwrap();

        assert_eq!(config.sample_interval_ms, 500);
        assert_eq!(config.warmup_samples, 30);
        assert_eq!(config.timeline_capacity, 1000);
        assert_eq!(config.proc_root, PathBuf::from("/proc"));
        assert_eq!(config.detector.alpha, 0.01);
        assert_eq!(config.detector.min_quiet_ms, 5000);
        assert_eq!(config.detector.hysteresis_samples, 10);
    }

    #[test]
    fn test_default_detector_matches_library_defaults() {
        let detector = DetectorSettings::default().to_detector_config().unwrap();
        assert_eq!(detector, DetectorConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let file = toml_file(
            r#"
node_name = "bench-01"
sample_interval_ms = 250
warmup_samples = 5

[detector]
alpha = 0.05
min_quiet_ms = 1000

[detector.thresholds]
cpu_util = { enter = 5.0, clear = 1.0 }
"#,
        );

        let config = AgentConfig::load_from(file.path()).unwrap();
        assert_eq!(config.node_name, "bench-01");
        assert_eq!(config.sample_interval(), Duration::from_millis(250));
        assert_eq!(config.warmup_samples, 5);

        let detector = config.detector.to_detector_config().unwrap();
        assert_eq!(detector.alpha, 0.05);
        assert_eq!(detector.min_quiet, Duration::from_secs(1));
        assert_eq!(
            detector.thresholds.thresholds_for(Metric::CpuUtil.index()),
            ThresholdPair::new(5.0, 1.0)
        );
        // A replaced table falls back to the default pair
        assert_eq!(
            detector.thresholds.thresholds_for(Metric::DiskIoRate.index()),
            ThresholdPair::default()
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let file = toml_file("[detector]\nalpha = 1.5\n");
        assert!(AgentConfig::load_from(file.path()).is_err());

        let file = toml_file("sample_interval_ms = 0\n");
        assert!(AgentConfig::load_from(file.path()).is_err());
    }

    #[test]
    fn test_unknown_threshold_metric_is_rejected() {
        let mut settings = DetectorSettings::default();
        settings
            .thresholds
            .insert("swap_used".to_string(), ThresholdPair::new(3.0, 2.0));

        let err = settings.to_detector_config().unwrap_err();
        assert!(err.to_string().contains("swap_used"));
    }

    #[test]
    fn test_inverted_thresholds_are_rejected() {
        let mut settings = DetectorSettings::default();
        settings.default_thresholds = ThresholdPair::new(1.0, 2.0);
        assert!(settings.to_detector_config().is_err());
    }

    #[test]
    fn test_config_summary_lists_every_metric() {
        let config = AgentConfig::default();
        let detector = config.detector.to_detector_config().unwrap();
        let summary = ConfigSummary::new(&config, &detector);

        assert_eq!(summary.thresholds.len(), Metric::ALL.len());
        let disk = &summary.thresholds[Metric::DiskIoRate.index()];
        assert_eq!(disk.metric, Metric::DiskIoRate);
        assert_eq!((disk.enter, disk.clear), (4.0, 2.5));
    }
}
