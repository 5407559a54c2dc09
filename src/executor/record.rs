//! Per-job execution records
//!
//! One record exists per included job per run. It is created `pending`
//! when the run starts, moves through the state machine as the scheduler
//! works, and is terminal once it reaches success, failed, or skipped;
//! a fresh run creates a fresh set of records, never recycling these.

use crate::executor::artifacts::ArtifactRef;
use crate::pipeline::types::{FailureCause, JobStatus, SkipReason};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Outcome of one job within one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Job name
    pub job: String,

    /// Stage the job ran in
    pub stage: String,

    /// Current lifecycle state
    pub status: JobStatus,

    /// Dispatch attempts consumed (0 for never-dispatched jobs)
    pub attempts: u32,

    /// When the job was first dispatched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<SystemTime>,

    /// When the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<SystemTime>,

    /// Artifacts captured from this job
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub artifacts: Vec<ArtifactRef>,

    /// Why the job failed, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureCause>,

    /// Why the job was skipped, when it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,

    /// Combined log of the final attempt
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub log: String,
}

impl ExecutionRecord {
    /// Creates a pending record for an included job
    #[must_use]
    pub fn new(job: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            stage: stage.into(),
            status: JobStatus::Pending,
            attempts: 0,
            started_at: None,
            finished_at: None,
            artifacts: Vec::new(),
            failure: None,
            skip_reason: None,
            log: String::new(),
        }
    }

    /// Marks the job as dispatched
    pub fn mark_running(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.status = JobStatus::Running;
        self.started_at = Some(SystemTime::now());
    }

    /// Marks the job as succeeded
    pub fn mark_success(&mut self, attempts: u32) {
        self.status = JobStatus::Success;
        self.attempts = attempts;
        self.finished_at = Some(SystemTime::now());
    }

    /// Marks the job as failed with its cause
    pub fn mark_failed(&mut self, cause: FailureCause, attempts: u32) {
        self.status = JobStatus::Failed;
        self.failure = Some(cause);
        self.attempts = attempts;
        self.finished_at = Some(SystemTime::now());
    }

    /// Marks a never-dispatched job as skipped
    pub fn mark_skipped(&mut self, reason: SkipReason) {
        self.status = JobStatus::Skipped;
        self.skip_reason = Some(reason);
        self.finished_at = Some(SystemTime::now());
    }

    /// Returns true once the record can no longer change state
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_lifecycle_success() {
        let mut record = ExecutionRecord::new("compile", "build");
        assert_eq!(record.status, JobStatus::Pending);
        assert!(!record.is_terminal());

        record.mark_running();
        assert_eq!(record.status, JobStatus::Running);
        assert!(record.started_at.is_some());

        record.mark_success(1);
        assert!(record.is_terminal());
        assert_eq!(record.attempts, 1);
        assert!(record.finished_at.is_some());
    }

    #[test]
    fn test_record_failure_keeps_cause() {
        let mut record = ExecutionRecord::new("unit", "test");
        record.mark_running();
        record.mark_failed(FailureCause::Script { exit_code: 2 }, 3);

        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.failure, Some(FailureCause::Script { exit_code: 2 }));
    }

    #[test]
    fn test_record_skip_keeps_reason() {
        let mut record = ExecutionRecord::new("publish", "release");
        record.mark_skipped(SkipReason::UpstreamFailed {
            stage: "test".to_string(),
        });

        assert_eq!(record.status, JobStatus::Skipped);
        assert!(record.started_at.is_none());
        assert!(record.skip_reason.is_some());
    }
}
