//! Anomaly timeline
//!
//! Bounded in-memory record of surfaced anomaly transitions, with summary
//! statistics for the status API and CLI.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::hysteresis::GateTransition;
use crate::models::Metric;

/// Default maximum number of retained events
pub const DEFAULT_TIMELINE_CAPACITY: usize = 1000;

/// Timeline shared between the sampling loop and its readers
pub type SharedTimeline = Arc<RwLock<Timeline>>;

/// One surfaced anomaly transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub timestamp: DateTime<Utc>,
    pub metric: Metric,
    pub value: f64,
    pub z_score: f64,
    pub kind: GateTransition,
}

impl AnomalyEvent {
    pub fn new(metric: Metric, value: f64, z_score: f64, kind: GateTransition) -> Self {
        Self {
            timestamp: Utc::now(),
            metric,
            value,
            z_score,
            kind,
        }
    }
}

/// Summary statistics over the retained timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineStats {
    pub total_events: usize,
    pub anomalies_opened: usize,
    pub anomalies_cleared: usize,
    /// Events dropped because the timeline was full
    pub evicted_events: u64,
    pub max_abs_z_score: f64,
    pub mean_abs_z_score: f64,
    pub opened_per_metric: BTreeMap<Metric, usize>,
    pub most_anomalous_metric: Option<Metric>,
}

/// FIFO-bounded anomaly event log
#[derive(Debug, Clone)]
pub struct Timeline {
    events: VecDeque<AnomalyEvent>,
    capacity: usize,
    evicted: u64,
}

impl Timeline {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_TIMELINE_CAPACITY)),
            capacity: capacity.max(1),
            evicted: 0,
        }
    }

    /// Create an empty timeline wrapped for sharing
    pub fn shared(capacity: usize) -> SharedTimeline {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    /// Append an event, evicting the oldest when full
    pub fn record(&mut self, event: AnomalyEvent) {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }

    /// All retained events, oldest first
    pub fn events(&self) -> impl Iterator<Item = &AnomalyEvent> {
        self.events.iter()
    }

    /// Up to `limit` events, most recent first
    pub fn recent(&self, limit: usize) -> Vec<AnomalyEvent> {
        self.events.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.evicted = 0;
    }

    pub fn stats(&self) -> TimelineStats {
        let mut stats = TimelineStats {
            total_events: self.events.len(),
            evicted_events: self.evicted,
            ..Default::default()
        };

        let mut z_sum = 0.0;
        for event in self.events.iter() {
            match event.kind {
                GateTransition::Opened => {
                    stats.anomalies_opened += 1;
                    *stats.opened_per_metric.entry(event.metric).or_insert(0) += 1;
                    let magnitude = event.z_score.abs();
                    stats.max_abs_z_score = stats.max_abs_z_score.max(magnitude);
                    z_sum += magnitude;
                }
                GateTransition::Cleared => stats.anomalies_cleared += 1,
            }
        }

        if stats.anomalies_opened > 0 {
            stats.mean_abs_z_score = z_sum / stats.anomalies_opened as f64;
        }

        // Ties resolve to the lowest metric index
        stats.most_anomalous_metric = stats
            .opened_per_metric
            .iter()
            .fold(None, |best: Option<(Metric, usize)>, (&metric, &count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((metric, count)),
            })
            .map(|(metric, _)| metric);

        stats
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(DEFAULT_TIMELINE_CAPACITY)
    }
}
