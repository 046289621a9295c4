//! API client for communicating with the hostwatch agent

use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the hostwatch agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path).await
    }

    /// Make a DELETE request
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::DELETE, path).await
    }

    async fn request<T: DeserializeOwned>(&self, method: Method, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn snapshot(&self) -> Result<TickReport> {
        self.get("api/v1/snapshot").await
    }

    pub async fn timeline(&self, limit: Option<usize>) -> Result<TimelineResponse> {
        match limit {
            Some(limit) => self.get(&format!("api/v1/timeline?limit={}", limit)).await,
            None => self.get("api/v1/timeline").await,
        }
    }

    pub async fn clear_timeline(&self) -> Result<ClearResponse> {
        self.delete("api/v1/timeline").await
    }

    pub async fn stats(&self) -> Result<TimelineStats> {
        self.get("api/v1/stats").await
    }

    pub async fn config(&self) -> Result<ConfigSummary> {
        self.get("api/v1/config").await
    }
}

// API response types

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TickReport {
    pub timestamp_ms: i64,
    pub sample_count: u64,
    pub warming_up: bool,
    pub values: Vec<f64>,
    pub z_scores: Vec<f64>,
    pub per_metric_active: Vec<bool>,
    pub any_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub timestamp: String,
    pub metric: String,
    pub value: f64,
    pub z_score: f64,
    /// `opened` or `cleared`
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineResponse {
    pub total: usize,
    pub events: Vec<AnomalyEvent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub cleared: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimelineStats {
    pub total_events: usize,
    pub anomalies_opened: usize,
    pub anomalies_cleared: usize,
    pub evicted_events: u64,
    pub max_abs_z_score: f64,
    pub mean_abs_z_score: f64,
    pub opened_per_metric: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub most_anomalous_metric: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricThresholds {
    pub metric: String,
    pub enter: f64,
    pub clear: f64,
}

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
    /// One entry per metric, in sample vector order
    pub thresholds: Vec<MetricThresholds>,
}
