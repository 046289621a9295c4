//! Portable host sampling for macOS and Windows
//!
//! Reads the same metrics as the procfs sampler through `sysinfo`.
//! CPU usage and the I/O rate are deltas, so the first sample reports 0.

use super::{ensure_buffer_len, HostSampler, SampleOutcome, HEAP_FREE_RSS_FRACTION};
use crate::models::Metric;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Instant;
use sysinfo::{Pid, System};
use tracing::debug;

/// Sampler backed by the `sysinfo` crate
pub struct SystemSampler {
    system: System,
    pid: Option<Pid>,
    prev_io: Option<(u64, Instant)>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!(error = e, "Cannot resolve own pid, process metrics degrade");
                None
            }
        };

        Self {
            system: System::new(),
            pid,
            prev_io: None,
        }
    }

    fn sample_cpu(&mut self) -> Result<f64> {
        self.system.refresh_cpu();
        Ok(self.system.global_cpu_info().cpu_usage() as f64)
    }

    fn sample_ram(&mut self) -> Result<f64> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            anyhow::bail!("Total memory reported as 0");
        }
        Ok(100.0 * self.system.used_memory() as f64 / total as f64)
    }

    /// Refresh this process and return (disk bytes total, resident bytes)
    fn refresh_process(&mut self) -> Result<(u64, u64)> {
        let pid = self.pid.context("Own pid unavailable")?;
        if !self.system.refresh_process(pid) {
            anyhow::bail!("Process {} not found", pid);
        }
        let process = self.system.process(pid).context("Process vanished")?;
        let usage = process.disk_usage();
        Ok((
            usage.total_read_bytes + usage.total_written_bytes,
            process.memory(),
        ))
    }

    fn disk_io_rate(&mut self, bytes: u64) -> f64 {
        let now = Instant::now();
        let rate = match self.prev_io {
            Some((prev_bytes, prev_at)) => {
                let elapsed = now.saturating_duration_since(prev_at).as_secs_f64();
                if elapsed > 0.0 {
                    bytes.saturating_sub(prev_bytes) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        self.prev_io = Some((bytes, now));
        rate
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostSampler for SystemSampler {
    async fn sample(&mut self, out: &mut [f64]) -> Result<SampleOutcome> {
        ensure_buffer_len(out)?;

        let process = self.refresh_process();
        let (disk_io, heap_free) = match process {
            Ok((io_bytes, rss_bytes)) => (
                Ok(self.disk_io_rate(io_bytes)),
                Ok(rss_bytes as f64 * HEAP_FREE_RSS_FRACTION),
            ),
            Err(e) => {
                let message = e.to_string();
                (Err(e), Err(anyhow::anyhow!(message)))
            }
        };

        let readings = [
            (Metric::CpuUtil, self.sample_cpu()),
            (Metric::RamUsed, self.sample_ram()),
            (Metric::DiskIoRate, disk_io),
            (Metric::HeapFree, heap_free),
            (Metric::UptimeMs, Ok(System::uptime() as f64 * 1000.0)),
        ];

        let mut outcome = SampleOutcome::default();
        for (metric, reading) in readings {
            out[metric.index()] = match reading {
                Ok(value) if value.is_finite() => value,
                Ok(value) => {
                    debug!(metric = %metric, value = value, "Non-finite reading");
                    outcome.degraded.push(metric);
                    0.0
                }
                Err(e) => {
                    debug!(metric = %metric, error = %e, "Failed to read metric");
                    outcome.degraded.push(metric);
                    0.0
                }
            };
        }

        Ok(outcome)
    }

    fn platform_name(&self) -> &'static str {
        if cfg!(target_os = "macos") {
            "macos"
        } else if cfg!(target_os = "windows") {
            "windows"
        } else {
            "sysinfo"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::METRIC_COUNT;

    #[tokio::test]
    async fn test_sample_fills_every_slot() {
        let mut sampler = SystemSampler::new();
        let mut out = vec![-1.0; METRIC_COUNT];

        let outcome = sampler.sample(&mut out).await.unwrap();

        assert!(!outcome.degraded.contains(&Metric::RamUsed));
        let ram = out[Metric::RamUsed.index()];
        assert!((0.0..=100.0).contains(&ram));
        // First reading has no previous I/O counter to diff against
        assert_eq!(out[Metric::DiskIoRate.index()], 0.0);
        assert!(out.iter().all(|value| value.is_finite() && *value >= 0.0));
    }

    #[tokio::test]
    async fn test_sample_rejects_wrong_buffer() {
        let mut sampler = SystemSampler::new();
        let mut out = vec![0.0; 2];
        assert!(sampler.sample(&mut out).await.is_err());
    }

    #[test]
    fn test_disk_io_rate_ignores_counter_reset() {
        let mut sampler = SystemSampler::new();
        sampler.prev_io = Some((10_000, Instant::now() - std::time::Duration::from_secs(1)));

        assert_eq!(sampler.disk_io_rate(500), 0.0);
        assert_eq!(sampler.prev_io.map(|(bytes, _)| bytes), Some(500));
    }
}
