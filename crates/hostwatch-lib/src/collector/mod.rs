//! Host metric sampling
//!
//! This module provides the platform sampler capability, a procfs-backed
//! implementation for Linux, a `sysinfo`-backed one for macOS and Windows,
//! and the periodic loop that feeds samples to
//! the anomaly detector.

mod r#loop;
mod procfs;
mod system;


pub use procfs::{CpuTimes, ProcfsSampler};
pub use r#loop::{SamplingConfig, SamplingLoop, SamplingLoopBuilder};
pub use system::SystemSampler;

use crate::models::{Metric, METRIC_COUNT};
use anyhow::Result;
use std::path::Path;

pub use async_trait::async_trait;

/// Share of resident memory reported as free heap
pub(crate) const HEAP_FREE_RSS_FRACTION: f64 = 0.3;

/// Result of one sampling pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleOutcome {
    /// Metrics whose read failed and were set to 0.0
    pub degraded: Vec<Metric>,
}

/// Capability for reading one value per host metric
///
/// Implementations fill `out` in [`Metric::ALL`] order. A metric that
/// cannot be read is set to 0.0 and listed in [`SampleOutcome::degraded`];
/// the tick is never skipped.
#[async_trait]
pub trait HostSampler: Send {
    async fn sample(&mut self, out: &mut [f64]) -> Result<SampleOutcome>;

    /// Platform name for display
    fn platform_name(&self) -> &'static str;
}

/// Sampler for platforms without a native implementation
#[derive(Debug, Default)]
pub struct NullSampler;

#[async_trait]
impl HostSampler for NullSampler {
    async fn sample(&mut self, out: &mut [f64]) -> Result<SampleOutcome> {
        ensure_buffer_len(out)?;
        out.fill(0.0);
        Ok(SampleOutcome {
            degraded: Metric::ALL.to_vec(),
        })
    }

    fn platform_name(&self) -> &'static str {
        "unsupported"
    }
}

pub(crate) fn ensure_buffer_len(out: &[f64]) -> Result<()> {
    if out.len() != METRIC_COUNT {
        anyhow::bail!(
            "sample buffer has {} slots, expected {}",
            out.len(),
            METRIC_COUNT
        );
    }
    Ok(())
}

/// Create the sampler for the current platform
pub fn create_sampler(proc_root: &Path) -> Box<dyn HostSampler> {
    if cfg!(target_os = "linux") {
        tracing::info!(proc_root = %proc_root.display(), "Using procfs sampler");
        Box::new(ProcfsSampler::new(proc_root))
    } else if cfg!(any(target_os = "macos", target_os = "windows")) {
        tracing::info!("Using sysinfo sampler");
        Box::new(SystemSampler::new())
    } else {
        tracing::warn!("No native sampler for this platform, reporting neutral values");
        Box::new(NullSampler)
    }
}
