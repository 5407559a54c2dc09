//! Pipeline domain types and evaluation logic

pub mod context;
pub mod definition;
pub mod errors;
pub mod graph;
pub mod rules;
pub mod types;
pub mod variables;

pub use context::{PipelineSource, TriggerContext};
pub use definition::{
    ArtifactSpec, JobBuilder, JobDef, JobDefaults, PipelineBuilder, PipelineDef, StageDefaults,
};
pub use errors::{ConfigurationError, EngineError};
pub use graph::{StageGraph, StageLayer};
pub use rules::{Decision, Predicate, RuleClause, WhenAction, evaluate};
pub use types::{FailureCause, JobStatus, PipelineStatus, SkipReason, Validate};
pub use variables::{Resolver, VariableMap};
