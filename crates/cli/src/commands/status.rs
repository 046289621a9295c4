//! Live detector status and agent configuration commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ConfigSummary, TickReport};
use crate::output::{
    color_z_score, format_metric_value, format_timestamp_ms, is_percent_metric,
    metric_display_name, print_info, print_json, print_table, print_warning, progress_bar,
    MetricStatus, OutputFormat,
};

const BAR_WIDTH: usize = 20;

/// Row for the live status table
#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Usage")]
    usage: String,
    #[tabled(rename = "Z-Score")]
    z_score: String,
    #[tabled(rename = "Enter/Clear")]
    thresholds: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Row for the thresholds table
#[derive(Tabled)]
struct ThresholdRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Enter")]
    enter: String,
    #[tabled(rename = "Clear")]
    clear: String,
}

/// Per-metric status, pairing the report with the configured thresholds
fn metric_statuses(report: &TickReport, config: &ConfigSummary) -> Vec<(String, f64, f64, MetricStatus)> {
    config
        .thresholds
        .iter()
        .enumerate()
        .map(|(i, thresholds)| {
            let value = report.values.get(i).copied().unwrap_or(0.0);
            let z_score = report.z_scores.get(i).copied().unwrap_or(0.0);
            let active = report.per_metric_active.get(i).copied().unwrap_or(false);
            let status = MetricStatus::classify(active, z_score, thresholds.clear);
            (thresholds.metric.clone(), value, z_score, status)
        })
        .collect()
}

/// Show the latest detector verdict per metric
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (report, config) = tokio::try_join!(client.snapshot(), client.config())?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "hostwatch Status".bold());
            println!("{}", "=".repeat(60));
            println!("Node:          {}", config.node_name.cyan());
            println!("Last Tick:     {}", format_timestamp_ms(report.timestamp_ms));
            println!("Samples:       {}", report.sample_count);
            println!();

            if report.sample_count == 0 {
                print_warning("No samples collected yet");
                return Ok(());
            }

            let rows: Vec<StatusRow> = metric_statuses(&report, &config)
                .into_iter()
                .zip(config.thresholds.iter())
                .map(|((metric, value, z_score, status), thresholds)| StatusRow {
                    metric: metric_display_name(&metric).to_string(),
                    value: format_metric_value(&metric, value),
                    usage: if is_percent_metric(&metric) {
                        progress_bar(value, BAR_WIDTH)
                    } else {
                        String::new()
                    },
                    z_score: color_z_score(z_score, thresholds.enter, thresholds.clear),
                    thresholds: format!("{:.1}/{:.1}", thresholds.enter, thresholds.clear),
                    status: status.colored(),
                })
                .collect();

            print_table(rows, "Agent reported no metrics");

            println!();
            if report.warming_up {
                print_info(&format!(
                    "Baseline warming up ({}/{} samples), alerts are suppressed",
                    report.sample_count, config.warmup_samples
                ));
            } else if report.any_active {
                println!("{}", "Anomaly active".red().bold());
            } else {
                println!("{}", "All metrics within baseline".green());
            }
        }
    }

    Ok(())
}

/// Show the agent's effective configuration
pub async fn show_config(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let config = client.config().await?;

    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Table => {
            println!("{}", "Agent Configuration".bold());
            println!("{}", "=".repeat(50));
            println!("Node:                {}", config.node_name.cyan());
            println!("Sample Interval:     {}ms", config.sample_interval_ms);
            println!("Warm-up Samples:     {}", config.warmup_samples);
            println!("Timeline Capacity:   {}", config.timeline_capacity);
            println!();
            println!("{}", "Detector".bold());
            println!("{}", "-".repeat(50));
            println!("Alpha:               {}", config.alpha);
            println!("Epsilon:             {:e}", config.epsilon);
            println!("Min Quiet:           {}ms", config.min_quiet_ms);
            println!("Hysteresis Samples:  {}", config.hysteresis_samples);
            println!();

            let rows: Vec<ThresholdRow> = config
                .thresholds
                .iter()
                .map(|t| ThresholdRow {
                    metric: metric_display_name(&t.metric).to_string(),
                    enter: format!("{:.2}", t.enter),
                    clear: format!("{:.2}", t.clear),
                })
                .collect();
            print_table(rows, "No thresholds configured");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MetricThresholds;

    fn config() -> ConfigSummary {
        ConfigSummary {
            node_name: "test".to_string(),
            sample_interval_ms: 500,
            warmup_samples: 30,
            timeline_capacity: 1000,
            alpha: 0.01,
            epsilon: 1e-6,
            min_quiet_ms: 5000,
            hysteresis_samples: 10,
            thresholds: vec![
                MetricThresholds {
                    metric: "cpu_util".to_string(),
                    enter: 3.0,
                    clear: 2.0,
                },
                MetricThresholds {
                    metric: "ram_used".to_string(),
                    enter: 3.0,
                    clear: 2.0,
                },
                MetricThresholds {
                    metric: "disk_io_rate".to_string(),
                    enter: 4.0,
                    clear: 2.5,
                },
            ],
        }
    }

    #[test]
    fn test_metric_statuses_follow_thresholds() {
        let report = TickReport {
            sample_count: 100,
            values: vec![95.0, 40.0, 1.0e6],
            z_scores: vec![1.0, -2.2, 0.5],
            per_metric_active: vec![true, false, false],
            any_active: true,
            ..Default::default()
        };

        let statuses = metric_statuses(&report, &config());

        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0].0, "cpu_util");
        assert_eq!(statuses[0].3, MetricStatus::Anomaly);
        assert_eq!(statuses[1].3, MetricStatus::Warning);
        assert_eq!(statuses[2].3, MetricStatus::Normal);
    }

    #[test]
    fn test_metric_statuses_tolerate_short_report() {
        let statuses = metric_statuses(&TickReport::default(), &config());

        assert!(statuses
            .iter()
            .all(|(_, value, _, status)| *value == 0.0 && *status == MetricStatus::Normal));
    }
}
