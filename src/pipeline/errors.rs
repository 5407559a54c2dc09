//! Error types for the pipeline domain

use thiserror::Error;

/// Errors raised while evaluating or executing a pipeline run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The pipeline definition is invalid
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The pipeline definition document could not be parsed
    #[error("Failed to parse pipeline definition: {message}")]
    Parse {
        /// Parser diagnostic
        message: String,
    },

    /// A variable reference survived every resolution layer
    #[error("Job '{job}' references unresolved variable '{name}'")]
    UnresolvedVariable {
        /// Job whose variables were being resolved.
        job: String,
        /// Name of the dangling reference.
        name: String,
    },

    /// A requested artifact was never captured
    #[error("No artifact captured for job '{job}' at path '{path}'")]
    UnknownArtifact {
        /// Producing job name.
        job: String,
        /// Declared artifact path.
        path: String,
    },

    /// The shell override could not be split into a command line
    #[error("Invalid shell command line: '{value}'")]
    InvalidShell {
        /// The rejected shell string.
        value: String,
    },

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Configuration-time errors, fatal before any job is dispatched
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Pipeline must declare at least one stage
    #[error("Pipeline must declare at least one stage")]
    EmptyStageList,

    /// Stage names must be unique
    #[error("Duplicate stage name '{stage}'")]
    DuplicateStage {
        /// The repeated stage name.
        stage: String,
    },

    /// Job names must be unique within a pipeline
    #[error("Duplicate job name '{job}'")]
    DuplicateJob {
        /// The repeated job name.
        job: String,
    },

    /// Job name cannot be empty
    #[error("Job name cannot be empty")]
    EmptyJobName,

    /// A job referenced a stage missing from the stage list
    #[error("Job '{job}' references unknown stage '{stage}'")]
    UnknownStage {
        /// Referencing job name.
        job: String,
        /// The missing stage name.
        stage: String,
    },

    /// Stage defaults referenced a stage missing from the stage list
    #[error("Stage defaults reference unknown stage '{stage}'")]
    UnknownStageDefaults {
        /// The missing stage name.
        stage: String,
    },

    /// Every job needs at least one script line
    #[error("Job '{job}' has an empty script")]
    EmptyScript {
        /// The offending job name.
        job: String,
    },

    /// A rule clause could not be interpreted
    #[error("Job '{job}' has a malformed rule: {reason}")]
    MalformedRule {
        /// The offending job name.
        job: String,
        /// What was wrong with the clause.
        reason: String,
    },

    /// Timeouts must be positive
    #[error("Job '{job}' declares a zero timeout")]
    InvalidTimeout {
        /// The offending job name.
        job: String,
    },
}
