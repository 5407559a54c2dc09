//! Prelude module for common imports

// Re-export all pipeline types with full paths
pub use crate::pipeline::context::{PipelineSource, TriggerContext};
pub use crate::pipeline::definition::{
    ArtifactSpec, JobBuilder, JobDef, JobDefaults, PipelineBuilder, PipelineDef, StageDefaults,
};
pub use crate::pipeline::errors::{ConfigurationError, EngineError};
pub use crate::pipeline::graph::{StageGraph, StageLayer};
pub use crate::pipeline::rules::{Decision, Predicate, RuleClause, WhenAction};
pub use crate::pipeline::types::{FailureCause, JobStatus, PipelineStatus, SkipReason, Validate};
pub use crate::pipeline::variables::{Resolver, VariableMap};

// Re-export executor types
pub use crate::executor::{
    ArtifactRef, ArtifactStore, CancelHandle, CancelSignal, DispatchOutcome, DispatchRequest,
    ExecutionPlan, ExecutionRecord, JobExecutor, PipelineReport, Scheduler, ShellDispatcher,
    cancellation, plan,
};

// Re-export infrastructure helpers
pub use crate::infrastructure::{EngineConfig, MetricsCollector, RunMetrics, init_logging, loader};
