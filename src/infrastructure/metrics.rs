//! Metrics collection
//!
//! Aggregates per-run counters for downstream reporting.

use crate::executor::scheduler::PipelineReport;
use crate::pipeline::types::JobStatus;
use ahash::AHashMap;
use parking_lot::RwLock;
use std::time::Duration;

/// Aggregate counters for one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMetrics {
    /// Run identifier
    pub run_id: String,

    /// Wall-clock duration
    pub duration: Duration,

    /// Included jobs
    pub total_jobs: usize,

    /// Jobs that reached `success`
    pub succeeded: usize,

    /// Jobs that reached `failed`
    pub failed: usize,

    /// Jobs that reached `skipped`
    pub skipped: usize,
}

impl RunMetrics {
    /// Derives the counters from a finished run's report
    #[must_use]
    pub fn from_report(report: &PipelineReport) -> Self {
        let count = |status: JobStatus| {
            report
                .records
                .values()
                .filter(|r| r.status == status)
                .count()
        };
        Self {
            run_id: report.run_id.clone(),
            duration: report.duration,
            total_jobs: report.records.len(),
            succeeded: count(JobStatus::Success),
            failed: count(JobStatus::Failed),
            skipped: count(JobStatus::Skipped),
        }
    }
}

/// Collects metrics across runs of the same process
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: RwLock<AHashMap<String, RunMetrics>>,
}

impl MetricsCollector {
    /// Creates a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records metrics for one run
    pub fn record(&self, metrics: RunMetrics) {
        self.metrics.write().insert(metrics.run_id.clone(), metrics);
    }

    /// Gets metrics for a specific run
    #[must_use]
    pub fn get(&self, run_id: &str) -> Option<RunMetrics> {
        self.metrics.read().get(run_id).cloned()
    }

    /// Gets all recorded metrics
    #[must_use]
    pub fn all(&self) -> Vec<RunMetrics> {
        self.metrics.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::record::ExecutionRecord;
    use crate::pipeline::types::{FailureCause, PipelineStatus, SkipReason};
    use std::collections::BTreeMap;

    fn sample_report() -> PipelineReport {
        let mut records = BTreeMap::new();
        let mut ok = ExecutionRecord::new("compile", "build");
        ok.mark_running();
        ok.mark_success(1);
        records.insert("compile".to_string(), ok);

        let mut bad = ExecutionRecord::new("unit", "test");
        bad.mark_running();
        bad.mark_failed(FailureCause::Script { exit_code: 1 }, 1);
        records.insert("unit".to_string(), bad);

        let mut gated = ExecutionRecord::new("publish", "release");
        gated.mark_skipped(SkipReason::UpstreamFailed {
            stage: "test".to_string(),
        });
        records.insert("publish".to_string(), gated);

        PipelineReport {
            pipeline: None,
            run_id: "run-7".to_string(),
            status: PipelineStatus::Failed,
            records,
            artifacts: Vec::new(),
            duration: Duration::from_secs(12),
        }
    }

    #[test]
    fn test_metrics_from_report() {
        let metrics = RunMetrics::from_report(&sample_report());

        assert_eq!(metrics.total_jobs, 3);
        assert_eq!(metrics.succeeded, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.skipped, 1);
        assert_eq!(metrics.duration, Duration::from_secs(12));
    }

    #[test]
    fn test_collector_record_and_get() {
        let collector = MetricsCollector::new();
        assert!(collector.get("run-7").is_none());

        collector.record(RunMetrics::from_report(&sample_report()));

        let stored = collector.get("run-7").unwrap();
        assert_eq!(stored.total_jobs, 3);
        assert_eq!(collector.all().len(), 1);
    }
}
