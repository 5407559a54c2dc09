//! Core status types for the pipeline domain
//!
//! This module contains the fundamental types that describe the
//! lifecycle of jobs and whole pipeline runs.

#![allow(clippy::must_use_candidate)]

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a single job run.
///
/// Transitions: `Pending -> Running -> {Success, Failed}`, plus a direct
/// `Pending -> Skipped` transition for gated or `when: never` jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Job is included in the run but not yet dispatched
    Pending,
    /// Job has been dispatched and is executing
    Running,
    /// Job completed with exit code zero
    Success,
    /// Job completed unsuccessfully (script failure, timeout, resolution error)
    Failed,
    /// Job was never dispatched (rule action, gating, or cancellation)
    Skipped,
}

impl JobStatus {
    /// Returns true if the status is terminal
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }

    /// Returns true if the job succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the job failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns true if the job was skipped
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Outcome of a whole pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Every non-skipped job succeeded
    Success,
    /// At least one non-skipped job failed
    Failed,
    /// The run was aborted by an external cancellation signal
    Canceled,
}

impl PipelineStatus {
    /// Returns true if the run succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the run failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Canceled => write!(f, "CANCELED"),
        }
    }
}

/// Why a job reached `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FailureCause {
    /// The job's script exited non-zero
    Script {
        /// Exit code reported by the dispatcher
        exit_code: i32,
    },

    /// The job exceeded its execution time limit
    Timeout {
        /// Limit that was exceeded, in seconds
        limit_secs: u64,
    },

    /// A variable reference could not be resolved before dispatch
    UnresolvedVariable {
        /// Name of the unresolved variable
        name: String,
    },

    /// The dispatcher itself failed before the script could report an exit code
    Dispatch {
        /// Description of the dispatch failure
        message: String,
    },
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script { exit_code } => write!(f, "script exited with code {exit_code}"),
            Self::Timeout { limit_secs } => write!(f, "timed out after {limit_secs}s"),
            Self::UnresolvedVariable { name } => write!(f, "unresolved variable '{name}'"),
            Self::Dispatch { message } => write!(f, "dispatch failed: {message}"),
        }
    }
}

/// Why a job reached `Skipped` without being dispatched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SkipReason {
    /// The matching rule clause carried `when: never`
    RuleNever,

    /// A job in an earlier stage failed and this job is not `when: always`
    UpstreamFailed {
        /// Stage containing the failure that gated this job
        stage: String,
    },

    /// The run was cancelled before this job started
    Canceled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RuleNever => write!(f, "rule action was 'never'"),
            Self::UpstreamFailed { stage } => write!(f, "upstream stage '{stage}' failed"),
            Self::Canceled => write!(f, "run was cancelled"),
        }
    }
}

/// Trait for types that can be validated
#[allow(clippy::missing_errors_doc)]
pub trait Validate {
    /// Type of validation error
    type Error;

    /// Validates this type
    fn validate(&self) -> std::result::Result<(), Self::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Success.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_job_status_display() {
        assert_eq!(JobStatus::Success.to_string(), "SUCCESS");
        assert_eq!(JobStatus::Skipped.to_string(), "SKIPPED");
    }

    #[test]
    fn test_pipeline_status_display() {
        assert_eq!(PipelineStatus::Failed.to_string(), "FAILED");
        assert_eq!(PipelineStatus::Canceled.to_string(), "CANCELED");
    }

    #[test]
    fn test_failure_cause_display() {
        let cause = FailureCause::Timeout { limit_secs: 30 };
        assert_eq!(cause.to_string(), "timed out after 30s");

        let cause = FailureCause::Script { exit_code: 2 };
        assert_eq!(cause.to_string(), "script exited with code 2");
    }

    #[test]
    fn test_skip_reason_display() {
        let reason = SkipReason::UpstreamFailed {
            stage: "build".to_string(),
        };
        assert_eq!(reason.to_string(), "upstream stage 'build' failed");
    }
}
