//! Metrics and audit sink
//!
//! Every security decision, completed task, pipeline run and webhook
//! delivery is reported as a [`MetricRecord`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    SecurityDecision,
    TaskCompleted,
    PipelineRun,
    WebhookDelivery,
}

/// One structured metric record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub kind: MetricKind,
    /// Operation, task id, run id or delivery id
    pub subject: String,
    /// Seconds
    pub duration: f64,
    pub outcome: String,
    pub sla_met: bool,
    pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
    pub fn new(
        kind: MetricKind,
        subject: impl Into<String>,
        duration: f64,
        outcome: impl Into<String>,
        sla_met: bool,
    ) -> Self {
        Self {
            kind,
            subject: subject.into(),
            duration,
            outcome: outcome.into(),
            sla_met,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for metric records
pub trait MetricsSink: Send + Sync {
    fn record(&self, record: MetricRecord);
}

/// Shared handle to a sink
pub type SharedSink = Arc<dyn MetricsSink>;

/// Emits records as structured `tracing` events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetricsSink;

impl MetricsSink for TracingMetricsSink {
    fn record(&self, record: MetricRecord) {
        tracing::info!(
            target: "patchwarden::metrics",
            kind = ?record.kind,
            subject = %record.subject,
            duration = record.duration,
            outcome = %record.outcome,
            sla_met = record.sla_met,
            "metric"
        );
    }
}

/// Keeps records in memory for inspection
#[derive(Debug, Default)]
pub struct MemoryMetricsSink {
    records: Mutex<Vec<MetricRecord>>,
}

impl MemoryMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.lock().clone()
    }

    pub fn of_kind(&self, kind: MetricKind) -> Vec<MetricRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect()
    }
}

impl MetricsSink for MemoryMetricsSink {
    fn record(&self, record: MetricRecord) {
        self.records.lock().push(record);
    }
}

/// Default sink used when none is injected
pub fn default_sink() -> SharedSink {
    Arc::new(TracingMetricsSink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_filters_by_kind() {
        let sink = MemoryMetricsSink::new();
        sink.record(MetricRecord::new(MetricKind::TaskCompleted, "t1", 0.2, "success", true));
        sink.record(MetricRecord::new(MetricKind::PipelineRun, "r1", 3.0, "failed", false));

        assert_eq!(sink.records().len(), 2);
        let runs = sink.of_kind(MetricKind::PipelineRun);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].subject, "r1");
        assert!(!runs[0].sla_met);
    }
}
