//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table, or a notice when there are none
pub fn print_table<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    if bytes >= GB {
        format!("{:.2}G", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2}M", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2}K", bytes / KB)
    } else {
        format!("{:.0}B", bytes)
    }
}

/// Format uptime milliseconds as hours
pub fn format_uptime(ms: f64) -> String {
    format!("{:.1}h", ms / 3_600_000.0)
}

/// Format a raw sample according to the metric it belongs to
pub fn format_metric_value(metric: &str, value: f64) -> String {
    match metric {
        "cpu_util" | "ram_used" => format!("{:.1}%", value),
        "disk_io_rate" => format!("{}/s", format_bytes(value)),
        "heap_free" => format_bytes(value),
        "uptime_ms" => format_uptime(value),
        _ => format!("{:.2}", value),
    }
}

/// Whether a metric's raw value is a percentage
pub fn is_percent_metric(metric: &str) -> bool {
    matches!(metric, "cpu_util" | "ram_used")
}

/// Human-readable name for a metric label
pub fn metric_display_name(metric: &str) -> &str {
    match metric {
        "cpu_util" => "CPU Utilization",
        "ram_used" => "RAM Usage",
        "disk_io_rate" => "Disk I/O Rate",
        "heap_free" => "Heap Free",
        "uptime_ms" => "Uptime",
        other => other,
    }
}

/// Display state of one metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStatus {
    Anomaly,
    Warning,
    Normal,
}

impl MetricStatus {
    /// An open alert is an anomaly; a score at or past the clear threshold
    /// is a warning
    pub fn classify(active: bool, z_score: f64, clear: f64) -> Self {
        if active {
            MetricStatus::Anomaly
        } else if z_score.abs() >= clear {
            MetricStatus::Warning
        } else {
            MetricStatus::Normal
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MetricStatus::Anomaly => "ANOMALY",
            MetricStatus::Warning => "WARNING",
            MetricStatus::Normal => "NORMAL",
        }
    }

    pub fn colored(self) -> String {
        match self {
            MetricStatus::Anomaly => self.label().red().bold().to_string(),
            MetricStatus::Warning => self.label().yellow().to_string(),
            MetricStatus::Normal => self.label().green().to_string(),
        }
    }
}

/// Text progress bar for a percentage in [0, 100]
pub fn progress_bar(percent: f64, width: usize) -> String {
    let clamped = if percent.is_finite() {
        percent.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let filled = ((clamped / 100.0) * width as f64).round() as usize;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Color a z-score by how far it sits from the thresholds
pub fn color_z_score(z_score: f64, enter: f64, clear: f64) -> String {
    let formatted = format!("{:+.2}", z_score);
    let magnitude = z_score.abs();
    if magnitude > enter {
        formatted.red().to_string()
    } else if magnitude >= clear {
        formatted.yellow().to_string()
    } else {
        formatted.normal().to_string()
    }
}

/// Color an anomaly event kind
pub fn color_kind(kind: &str) -> String {
    match kind {
        "opened" => kind.red().to_string(),
        "cleared" => kind.green().to_string(),
        _ => kind.to_string(),
    }
}

/// Format an RFC 3339 timestamp for display
pub fn format_timestamp(ts: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(ts) {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        ts.to_string()
    }
}

/// Format a unix millisecond timestamp for display
pub fn format_timestamp_ms(ms: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(ms) {
        Some(dt) if ms > 0 => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "-".to_string(),
    }
}
