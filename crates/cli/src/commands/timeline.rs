//! Anomaly timeline commands

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;

use crate::client::{AnomalyEvent, ApiClient};
use crate::output::{
    color_kind, format_metric_value, format_timestamp, metric_display_name, print_info,
    print_json, print_success, print_table, print_warning, OutputFormat,
};

/// Row for the timeline table
#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Timestamp")]
    timestamp: String,
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Event")]
    kind: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Z-Score")]
    z_score: String,
}

/// Row for opened-per-metric counts
#[derive(Tabled)]
struct MetricCountRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Anomalies")]
    count: usize,
}

/// Show recent anomaly events, most recent first
pub async fn show_timeline(
    client: &ApiClient,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let result = client.timeline(limit).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            println!("{}", "Anomaly Timeline".bold());
            println!("{}", "=".repeat(60));

            let rows: Vec<EventRow> = result
                .events
                .iter()
                .map(|e| EventRow {
                    timestamp: format_timestamp(&e.timestamp),
                    metric: metric_display_name(&e.metric).to_string(),
                    kind: color_kind(&e.kind),
                    value: format_metric_value(&e.metric, e.value),
                    z_score: format!("{:+.2}", e.z_score),
                })
                .collect();

            print_table(rows, "No anomalies recorded");
            println!(
                "\nShowing {} of {} events",
                result.events.len(),
                result.total
            );
        }
    }

    Ok(())
}

/// Show summary statistics over the timeline
pub async fn show_stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let stats = client.stats().await?;

    match format {
        OutputFormat::Json => print_json(&stats)?,
        OutputFormat::Table => {
            println!("{}", "Anomaly Statistics".bold());
            println!("{}", "=".repeat(50));
            println!("Total Events:        {}", stats.total_events);
            println!(
                "Anomalies Opened:    {}",
                stats.anomalies_opened.to_string().red()
            );
            println!(
                "Anomalies Cleared:   {}",
                stats.anomalies_cleared.to_string().green()
            );
            if stats.evicted_events > 0 {
                println!("Evicted Events:      {}", stats.evicted_events);
            }
            println!("Max |Z|:             {:.2}", stats.max_abs_z_score);
            println!("Mean |Z|:            {:.2}", stats.mean_abs_z_score);
            if let Some(metric) = &stats.most_anomalous_metric {
                println!(
                    "Most Anomalous:      {}",
                    metric_display_name(metric).yellow()
                );
            }
            println!();

            let rows: Vec<MetricCountRow> = stats
                .opened_per_metric
                .iter()
                .map(|(metric, count)| MetricCountRow {
                    metric: metric_display_name(metric).to_string(),
                    count: *count,
                })
                .collect();
            print_table(rows, "No anomalies opened");
        }
    }

    Ok(())
}

/// Drop every event from the agent's timeline
pub async fn clear_timeline(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let response = client.clear_timeline().await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!("Cleared {} timeline events", response.cleared))
        }
    }

    Ok(())
}

/// Write the full timeline to a file as JSON or CSV
pub async fn export_timeline(client: &ApiClient, output: &Path, csv: bool) -> Result<()> {
    let result = client.timeline(None).await?;

    if result.events.is_empty() {
        print_warning("Timeline is empty, exporting no events");
    }

    let content = if csv {
        events_to_csv(&result.events)?
    } else {
        serde_json::to_string_pretty(&result.events)?
    };

    std::fs::write(output, content)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    print_success(&format!("Timeline exported to {}", output.display()));
    print_info(&format!("Exported {} events", result.events.len()));

    Ok(())
}

/// Render events as CSV with a header row
fn events_to_csv(events: &[AnomalyEvent]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["timestamp", "metric", "kind", "value", "z_score"])?;
    for event in events {
        let value = event.value.to_string();
        let z_score = event.z_score.to_string();
        writer.write_record([
            event.timestamp.as_str(),
            event.metric.as_str(),
            event.kind.as_str(),
            value.as_str(),
            z_score.as_str(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))?;
    Ok(String::from_utf8(bytes)?)
}
