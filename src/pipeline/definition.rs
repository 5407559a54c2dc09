//! Pipeline and job definitions
//!
//! The definition is the immutable input of a run: an ordered stage
//! list, global variables, per-job attributes and rules. Construction
//! goes through the builders; [`Validate`] enforces the structural
//! invariants before anything is evaluated or dispatched.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use crate::pipeline::errors::ConfigurationError;
use crate::pipeline::rules::{RuleClause, WhenAction};
use crate::pipeline::types::Validate;
use crate::pipeline::variables::VariableMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

/// Artifact declarations attached to a job
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactSpec {
    /// Glob patterns, relative to the job working directory
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub paths: Vec<String>,

    /// Capture declared paths even when the job fails
    #[serde(default)]
    pub on_failure: bool,
}

impl ArtifactSpec {
    /// Returns true when the job declares no artifacts
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Pipeline-level defaults applied to jobs that omit the attribute
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobDefaults {
    /// Default image reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Default capability tags
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,
}

/// Stage-scoped variable overrides
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StageDefaults {
    /// Variables layered between pipeline globals and job variables
    #[serde(skip_serializing_if = "VariableMap::is_empty", default)]
    pub variables: VariableMap,
}

/// A unit of work: a script plus the conditions and resources to run it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDef {
    /// Job name, unique within the pipeline
    pub name: String,

    /// Name of the stage this job belongs to
    pub stage: String,

    /// Image reference; falls back to the pipeline default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Ordered rule clauses deciding inclusion
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub rules: Vec<RuleClause>,

    /// Opaque command sequence; never interpreted by the engine
    pub script: Vec<String>,

    /// Capability tags required from the dispatcher
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub tags: Vec<String>,

    /// Job-declared variables
    #[serde(skip_serializing_if = "VariableMap::is_empty", default)]
    pub variables: VariableMap,

    /// Declared outputs
    #[serde(skip_serializing_if = "ArtifactSpec::is_empty", default)]
    pub artifacts: ArtifactSpec,

    /// Auxiliary service containers, opaque to the engine
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub services: Vec<String>,

    /// Default gating action, used by rule clauses synthesized for jobs
    /// without an explicit rule list
    #[serde(default)]
    pub when: WhenAction,

    /// Re-dispatch budget after a failure
    #[serde(default)]
    pub retry: u32,

    /// Per-job execution time limit; the scheduler default applies when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl JobDef {
    /// Creates a job builder
    pub fn builder(name: impl Into<String>, stage: impl Into<String>) -> JobBuilder {
        JobBuilder::new(name, stage)
    }
}

impl Validate for JobDef {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.is_empty() {
            return Err(ConfigurationError::EmptyJobName);
        }
        if self.script.is_empty() {
            return Err(ConfigurationError::EmptyScript {
                job: self.name.clone(),
            });
        }
        if let Some(timeout) = self.timeout
            && timeout.is_zero()
        {
            return Err(ConfigurationError::InvalidTimeout {
                job: self.name.clone(),
            });
        }
        for clause in &self.rules {
            clause
                .validate()
                .map_err(|reason| ConfigurationError::MalformedRule {
                    job: self.name.clone(),
                    reason,
                })?;
        }
        Ok(())
    }
}

impl fmt::Display for JobDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({}) in stage '{}'", self.name, self.stage)
    }
}

/// Builder for creating jobs
#[derive(Debug, Clone)]
pub struct JobBuilder {
    job: JobDef,
}

impl JobBuilder {
    /// Creates a new job builder
    pub fn new(name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            job: JobDef {
                name: name.into(),
                stage: stage.into(),
                image: None,
                rules: Vec::new(),
                script: Vec::new(),
                tags: Vec::new(),
                variables: VariableMap::new(),
                artifacts: ArtifactSpec::default(),
                services: Vec::new(),
                when: WhenAction::OnSuccess,
                retry: 0,
                timeout: None,
            },
        }
    }

    /// Appends a script line
    pub fn script(mut self, line: impl Into<String>) -> Self {
        self.job.script.push(line.into());
        self
    }

    /// Sets the image reference
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.job.image = Some(image.into());
        self
    }

    /// Appends a rule clause
    pub fn rule(mut self, clause: RuleClause) -> Self {
        self.job.rules.push(clause);
        self
    }

    /// Appends a capability tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.job.tags.push(tag.into());
        self
    }

    /// Declares a job variable
    pub fn variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.job.variables.insert(key.into(), value.into());
        self
    }

    /// Declares artifact paths
    pub fn artifacts(mut self, paths: Vec<String>) -> Self {
        self.job.artifacts.paths = paths;
        self
    }

    /// Captures artifacts even on failure
    pub fn artifacts_on_failure(mut self) -> Self {
        self.job.artifacts.on_failure = true;
        self
    }

    /// Appends a service reference
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.job.services.push(service.into());
        self
    }

    /// Sets the default gating action
    pub fn when(mut self, action: WhenAction) -> Self {
        self.job.when = action;
        self
    }

    /// Sets the retry budget
    pub fn retry(mut self, count: u32) -> Self {
        self.job.retry = count;
        self
    }

    /// Sets the per-job timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.job.timeout = Some(timeout);
        self
    }

    /// Builds the job
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<JobDef, ConfigurationError> {
        self.job.validate()?;
        Ok(self.job)
    }

    /// Builds the job without validation (for internal use)
    #[must_use]
    pub fn build_unchecked(self) -> JobDef {
        self.job
    }
}

/// The top-level pipeline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDef {
    /// Pipeline name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Ordered stage names; jobs in stage N+1 wait for all of stage N
    pub stages: Vec<String>,

    /// Pipeline-global variables
    #[serde(skip_serializing_if = "VariableMap::is_empty", default)]
    pub variables: VariableMap,

    /// Defaults for jobs that omit image or tags
    #[serde(default)]
    pub defaults: JobDefaults,

    /// Stage-scoped variable overrides
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub stage_defaults: BTreeMap<String, StageDefaults>,

    /// Jobs owned by this pipeline
    pub jobs: Vec<JobDef>,
}

impl PipelineDef {
    /// Creates a pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Looks up a job by name
    #[must_use]
    pub fn job(&self, name: &str) -> Option<&JobDef> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Position of a stage in the declared order
    #[must_use]
    pub fn stage_index(&self, stage: &str) -> Option<usize> {
        self.stages.iter().position(|s| s == stage)
    }

    /// Jobs declared in the given stage, in declaration order
    pub fn jobs_in_stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a JobDef> {
        self.jobs.iter().filter(move |j| j.stage == stage)
    }

    /// Image for a job, falling back to the pipeline default
    #[must_use]
    pub fn effective_image(&self, job: &JobDef) -> Option<String> {
        job.image.clone().or_else(|| self.defaults.image.clone())
    }

    /// Capability tags for a job, falling back to the pipeline default
    #[must_use]
    pub fn effective_tags(&self, job: &JobDef) -> Vec<String> {
        if job.tags.is_empty() {
            self.defaults.tags.clone()
        } else {
            job.tags.clone()
        }
    }
}

impl Validate for PipelineDef {
    type Error = ConfigurationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.stages.is_empty() {
            return Err(ConfigurationError::EmptyStageList);
        }

        let mut seen_stages = HashSet::new();
        for stage in &self.stages {
            if !seen_stages.insert(stage.as_str()) {
                return Err(ConfigurationError::DuplicateStage {
                    stage: stage.clone(),
                });
            }
        }

        for stage in self.stage_defaults.keys() {
            if !seen_stages.contains(stage.as_str()) {
                return Err(ConfigurationError::UnknownStageDefaults {
                    stage: stage.clone(),
                });
            }
        }

        let mut seen_jobs = HashSet::new();
        for job in &self.jobs {
            job.validate()?;
            if !seen_jobs.insert(job.name.as_str()) {
                return Err(ConfigurationError::DuplicateJob {
                    job: job.name.clone(),
                });
            }
            if !seen_stages.contains(job.stage.as_str()) {
                return Err(ConfigurationError::UnknownStage {
                    job: job.name.clone(),
                    stage: job.stage.clone(),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for PipelineDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pipeline({}): {} stages, {} jobs",
            self.name.as_deref().unwrap_or("unnamed"),
            self.stages.len(),
            self.jobs.len()
        )
    }
}

/// Builder for creating pipelines
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    pipeline: PipelineDef,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder
    pub fn new() -> Self {
        Self {
            pipeline: PipelineDef {
                name: None,
                stages: Vec::new(),
                variables: VariableMap::new(),
                defaults: JobDefaults::default(),
                stage_defaults: BTreeMap::new(),
                jobs: Vec::new(),
            },
        }
    }

    /// Sets the pipeline name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.pipeline.name = Some(name.into());
        self
    }

    /// Appends a stage to the declared order
    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.pipeline.stages.push(stage.into());
        self
    }

    /// Sets the full stage order at once
    pub fn stages(mut self, stages: Vec<String>) -> Self {
        self.pipeline.stages = stages;
        self
    }

    /// Declares a global variable
    pub fn variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pipeline.variables.insert(key.into(), value.into());
        self
    }

    /// Sets the job defaults
    pub fn defaults(mut self, defaults: JobDefaults) -> Self {
        self.pipeline.defaults = defaults;
        self
    }

    /// Attaches stage-scoped variable overrides
    pub fn stage_defaults(mut self, stage: impl Into<String>, defaults: StageDefaults) -> Self {
        self.pipeline.stage_defaults.insert(stage.into(), defaults);
        self
    }

    /// Appends a job
    pub fn job(mut self, job: JobDef) -> Self {
        self.pipeline.jobs.push(job);
        self
    }

    /// Appends multiple jobs
    pub fn jobs(mut self, mut jobs: Vec<JobDef>) -> Self {
        self.pipeline.jobs.append(&mut jobs);
        self
    }

    /// Builds the pipeline
    #[allow(clippy::missing_errors_doc)]
    pub fn build(self) -> Result<PipelineDef, ConfigurationError> {
        self.pipeline.validate()?;
        Ok(self.pipeline)
    }

    /// Builds the pipeline without validation (for internal use)
    #[must_use]
    pub fn build_unchecked(self) -> PipelineDef {
        self.pipeline
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::rules::Predicate;

    fn minimal_job(name: &str, stage: &str) -> JobDef {
        JobBuilder::new(name, stage).script("true").build_unchecked()
    }

    #[test]
    fn test_pipeline_builder() {
        let pipeline = PipelineDef::builder()
            .name("release-train")
            .stage("build")
            .stage("test")
            .variable("RUST_BACKTRACE", "1")
            .job(minimal_job("compile", "build"))
            .job(minimal_job("unit", "test"))
            .build()
            .unwrap();

        assert_eq!(pipeline.stages.len(), 2);
        assert_eq!(pipeline.jobs.len(), 2);
        assert_eq!(pipeline.stage_index("test"), Some(1));
        assert!(pipeline.job("compile").is_some());
    }

    #[test]
    fn test_empty_stage_list_rejected() {
        let result = PipelineDef::builder().job(minimal_job("a", "build")).build();
        assert_eq!(result.unwrap_err(), ConfigurationError::EmptyStageList);
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let result = PipelineDef::builder().stage("build").stage("build").build();
        assert!(matches!(
            result,
            Err(ConfigurationError::DuplicateStage { .. })
        ));
    }

    #[test]
    fn test_duplicate_job_rejected() {
        let result = PipelineDef::builder()
            .stage("build")
            .job(minimal_job("compile", "build"))
            .job(minimal_job("compile", "build"))
            .build();
        assert!(matches!(result, Err(ConfigurationError::DuplicateJob { .. })));
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let result = PipelineDef::builder()
            .stage("build")
            .job(minimal_job("deploy", "release"))
            .build();
        assert_eq!(
            result.unwrap_err(),
            ConfigurationError::UnknownStage {
                job: "deploy".to_string(),
                stage: "release".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_stage_defaults_rejected() {
        let result = PipelineDef::builder()
            .stage("build")
            .stage_defaults("missing", StageDefaults::default())
            .job(minimal_job("compile", "build"))
            .build();
        assert!(matches!(
            result,
            Err(ConfigurationError::UnknownStageDefaults { .. })
        ));
    }

    #[test]
    fn test_empty_script_rejected() {
        let job = JobBuilder::new("compile", "build").build();
        assert!(matches!(job, Err(ConfigurationError::EmptyScript { .. })));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let job = JobBuilder::new("compile", "build")
            .script("true")
            .timeout(Duration::ZERO)
            .build();
        assert!(matches!(job, Err(ConfigurationError::InvalidTimeout { .. })));
    }

    #[test]
    fn test_malformed_rule_rejected() {
        let job = JobBuilder::new("compile", "build")
            .script("true")
            .rule(RuleClause::default().with_predicate(Predicate::matches("X", "([oops")))
            .build();
        assert!(matches!(job, Err(ConfigurationError::MalformedRule { .. })));
    }

    #[test]
    fn test_effective_image_and_tags() {
        let pipeline = PipelineDef::builder()
            .stage("build")
            .defaults(JobDefaults {
                image: Some("rust:1.92".to_string()),
                tags: vec!["linux".to_string()],
            })
            .job(minimal_job("compile", "build"))
            .job(
                JobBuilder::new("docs", "build")
                    .script("make docs")
                    .image("python:3.12")
                    .tag("docs-runner")
                    .build_unchecked(),
            )
            .build()
            .unwrap();

        let compile = pipeline.job("compile").unwrap();
        assert_eq!(
            pipeline.effective_image(compile),
            Some("rust:1.92".to_string())
        );
        assert_eq!(pipeline.effective_tags(compile), vec!["linux".to_string()]);

        let docs = pipeline.job("docs").unwrap();
        assert_eq!(pipeline.effective_image(docs), Some("python:3.12".to_string()));
        assert_eq!(pipeline.effective_tags(docs), vec!["docs-runner".to_string()]);
    }

    #[test]
    fn test_display() {
        let pipeline = PipelineDef::builder()
            .name("ci")
            .stage("build")
            .job(minimal_job("compile", "build"))
            .build()
            .unwrap();
        assert_eq!(pipeline.to_string(), "Pipeline(ci): 1 stages, 1 jobs");
    }
}
