//! procfs host sampling
//!
//! Reads host metrics from the Linux proc filesystem:
//! - stat for aggregate CPU time
//! - meminfo for physical memory usage
//! - self/io for this process's block I/O
//! - self/status for resident set size
//! - uptime for system uptime

use super::{ensure_buffer_len, HostSampler, SampleOutcome, HEAP_FREE_RSS_FRACTION};
use crate::models::Metric;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tracing::debug;

/// Aggregate CPU jiffies from the first line of /proc/stat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub total: u64,
    /// idle + iowait
    pub idle: u64,
}

impl CpuTimes {
    /// Busy percentage between two readings; 0 when no time has passed
    pub fn utilization_since(&self, previous: &CpuTimes) -> f64 {
        let d_total = self.total.saturating_sub(previous.total);
        let d_idle = self.idle.saturating_sub(previous.idle);
        if d_total == 0 {
            return 0.0;
        }
        100.0 * (1.0 - d_idle.min(d_total) as f64 / d_total as f64)
    }
}

/// Sampler backed by a proc filesystem
pub struct ProcfsSampler {
    proc_root: PathBuf,
    prev_cpu: Option<CpuTimes>,
    prev_io: Option<(u64, Instant)>,
}

impl ProcfsSampler {
    /// Create a sampler reading from `proc_root` (normally `/proc`)
    pub fn new(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            prev_cpu: None,
            prev_io: None,
        }
    }

    /// Parse the aggregate `cpu` line of /proc/stat
    pub fn parse_cpu_times(content: &str) -> Result<CpuTimes> {
        let line = content
            .lines()
            .find(|line| line.starts_with("cpu "))
            .context("No aggregate cpu line in stat")?;

        // user nice system idle iowait irq softirq steal; guest time is
        // already included in user/nice
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(8)
            .map(|field| field.parse::<u64>())
            .collect::<std::result::Result<_, _>>()
            .context("Malformed cpu line in stat")?;

        if fields.len() < 4 {
            anyhow::bail!("cpu line has {} fields, expected at least 4", fields.len());
        }

        let iowait = fields.get(4).copied().unwrap_or(0);
        Ok(CpuTimes {
            total: fields.iter().sum(),
            idle: fields[3] + iowait,
        })
    }

    /// Parse /proc/meminfo into a map of field name to kB value
    pub fn parse_meminfo(content: &str) -> HashMap<String, u64> {
        let mut fields = HashMap::new();

        for line in content.lines() {
            let Some((name, rest)) = line.split_once(':') else {
                continue;
            };
            if let Some(value) = rest.split_whitespace().next().and_then(|v| v.parse().ok()) {
                fields.insert(name.trim().to_string(), value);
            }
        }

        fields
    }

    /// Used physical memory percentage from parsed meminfo
    pub fn ram_used_percent(meminfo: &HashMap<String, u64>) -> Option<f64> {
        let total = *meminfo.get("MemTotal")?;
        if total == 0 {
            return None;
        }
        let available = meminfo
            .get("MemAvailable")
            .or_else(|| meminfo.get("MemFree"))
            .copied()?;
        let used = total.saturating_sub(available);
        Some(100.0 * used as f64 / total as f64)
    }

    /// Total bytes read from and written to storage by the process
    pub fn parse_io_bytes(content: &str) -> Result<u64> {
        let mut read_bytes = None;
        let mut write_bytes = None;

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                match parts[0] {
                    "read_bytes:" => read_bytes = parts[1].parse::<u64>().ok(),
                    "write_bytes:" => write_bytes = parts[1].parse::<u64>().ok(),
                    _ => {}
                }
            }
        }

        match (read_bytes, write_bytes) {
            (Some(read), Some(write)) => Ok(read + write),
            _ => anyhow::bail!("read_bytes/write_bytes missing from io"),
        }
    }

    /// Resident set size in kB from /proc/self/status
    pub fn parse_vm_rss_kb(content: &str) -> Option<u64> {
        content
            .lines()
            .find_map(|line| line.strip_prefix("VmRSS:"))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|value| value.parse().ok())
    }

    /// Uptime in milliseconds from /proc/uptime
    pub fn parse_uptime_ms(content: &str) -> Result<f64> {
        let secs: f64 = content
            .split_whitespace()
            .next()
            .context("Empty uptime")?
            .parse()
            .context("Failed to parse uptime")?;
        Ok(secs * 1000.0)
    }

    async fn read_proc(&self, relative: &str) -> Result<String> {
        let path = self.proc_root.join(relative);
        fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))
    }

    async fn sample_cpu(&mut self) -> Result<f64> {
        let times = Self::parse_cpu_times(&self.read_proc("stat").await?)?;
        let utilization = self
            .prev_cpu
            .map(|previous| times.utilization_since(&previous))
            .unwrap_or(0.0);
        self.prev_cpu = Some(times);
        Ok(utilization)
    }

    async fn sample_ram(&self) -> Result<f64> {
        let meminfo = Self::parse_meminfo(&self.read_proc("meminfo").await?);
        Self::ram_used_percent(&meminfo).context("MemTotal/MemAvailable missing from meminfo")
    }

    async fn sample_disk_io(&mut self) -> Result<f64> {
        let bytes = Self::parse_io_bytes(&self.read_proc("self/io").await?)?;
        let now = Instant::now();

        let rate = match self.prev_io {
            Some((prev_bytes, prev_at)) => {
                let elapsed = now.saturating_duration_since(prev_at).as_secs_f64();
                if elapsed > 0.0 {
                    // Counter going backwards reads as no activity
                    bytes.saturating_sub(prev_bytes) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        self.prev_io = Some((bytes, now));
        Ok(rate)
    }

    async fn sample_heap_free(&self) -> Result<f64> {
        let rss_kb = Self::parse_vm_rss_kb(&self.read_proc("self/status").await?)
            .context("VmRSS missing from status")?;
        Ok(rss_kb as f64 * 1024.0 * HEAP_FREE_RSS_FRACTION)
    }

    async fn sample_uptime(&self) -> Result<f64> {
        Self::parse_uptime_ms(&self.read_proc("uptime").await?)
    }
}

#[async_trait]
impl HostSampler for ProcfsSampler {
    async fn sample(&mut self, out: &mut [f64]) -> Result<SampleOutcome> {
        ensure_buffer_len(out)?;

        let readings = [
            (Metric::CpuUtil, self.sample_cpu().await),
            (Metric::RamUsed, self.sample_ram().await),
            (Metric::DiskIoRate, self.sample_disk_io().await),
            (Metric::HeapFree, self.sample_heap_free().await),
            (Metric::UptimeMs, self.sample_uptime().await),
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
        "linux"
    }
}
