//! # Flowline - A stage-gated pipeline execution engine
//!
//! Flowline evaluates per-job trigger rules, sequences stages, fans job
//! execution out and back in, and propagates artifacts and variables
//! between jobs. It decides *whether*, *when*, and *in what order* jobs
//! run; what a job's script does is an external concern behind the
//! [`executor::JobExecutor`] trait.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flowline::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), EngineError> {
//! let pipeline = PipelineDef::builder()
//!     .stage("build")
//!     .stage("test")
//!     .job(
//!         JobBuilder::new("compile", "build")
//!             .script("make build")
//!             .rule(RuleClause::default())
//!             .build()?,
//!     )
//!     .build()?;
//!
//! let context = TriggerContext::push("group/project", "main");
//! let scheduler = Scheduler::new(Arc::new(ShellDispatcher::new()));
//! let report = scheduler.run(&pipeline, &context).await?;
//! assert!(report.status.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Rule-based inclusion**: ordered clauses with first-match-wins
//!   semantics, variable presence/equality/regex predicates, and
//!   changed-path glob filters
//! - **Stage barriers**: all jobs of a stage settle before the next
//!   stage starts; failures gate downstream work unless `when: always`
//! - **Layered variables**: deterministic five-layer resolution with
//!   `${VAR}` templating
//! - **Artifacts**: byte snapshots keyed by `(job, path)`, visible to
//!   later stages of the same run
//! - **Observability**: structured tracing and per-run metrics
//!
//! ## License
//!
//! Licensed under either of
//! - Apache License, Version 2.0 ([LICENSE-APACHE](LICENSE-APACHE) or <https://www.apache.org/licenses/LICENSE-2.0>)
//! - MIT license ([LICENSE-MIT](LICENSE-MIT) or <https://opensource.org/licenses/MIT>)
//!
//! at your option.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod executor;
pub mod infrastructure;
pub mod pipeline;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use executor::{
    ArtifactRef, ArtifactStore, CancelHandle, CancelSignal, DispatchOutcome, DispatchRequest,
    ExecutionPlan, ExecutionRecord, JobExecutor, PipelineReport, Scheduler, ShellDispatcher,
    cancellation, plan,
};
pub use infrastructure::{EngineConfig, MetricsCollector, RunMetrics, init_logging, loader};
pub use pipeline::{
    ConfigurationError, Decision, EngineError, FailureCause, JobBuilder, JobDef, JobStatus,
    PipelineBuilder, PipelineDef, PipelineSource, PipelineStatus, Predicate, Resolver, RuleClause,
    SkipReason, StageGraph, TriggerContext, Validate, VariableMap, WhenAction,
};

/// Version of the flowline crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
