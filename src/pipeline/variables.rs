//! Layered variable resolution
//!
//! Each dispatched job sees a single flat variable map assembled from
//! five layers, later layers overriding earlier ones:
//!
//! 1. process-wide defaults plus the injected trigger context
//! 2. pipeline-global variables
//! 3. stage defaults
//! 4. job-declared variables
//! 5. overrides attached by the matching rule clause
//!
//! Values may reference other variables with `${NAME}`. References are
//! substituted against the map as resolved so far at the moment the value
//! is layered in; a reference that is still dangling after the last layer
//! is an error, never a silent empty string.

use crate::pipeline::definition::{JobDef, PipelineDef};
use crate::pipeline::errors::EngineError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Flat, ordered variable map. Ordered keys keep resolution deterministic.
pub type VariableMap = BTreeMap<String, String>;

static TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("template regex"));

/// Resolves the final variable map for each dispatched job
#[derive(Debug, Clone)]
pub struct Resolver {
    /// Layer 1: engine defaults and the injected trigger context
    process: VariableMap,
}

impl Resolver {
    /// Creates a resolver whose lowest layer contains the engine defaults
    /// and the given externally injected context variables.
    #[must_use]
    pub fn new(run_id: &str, context_vars: VariableMap) -> Self {
        let mut process = context_vars;
        process.insert("CI".to_string(), "true".to_string());
        process.insert("CI_PIPELINE_ID".to_string(), run_id.to_string());
        Self { process }
    }

    /// Resolves the variable map for one job.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnresolvedVariable`] naming the first
    /// dangling reference when a `${NAME}` survives all five layers.
    pub fn resolve(
        &self,
        pipeline: &PipelineDef,
        job: &JobDef,
        rule_overrides: &VariableMap,
    ) -> Result<VariableMap, EngineError> {
        let mut resolved = VariableMap::new();

        apply_layer(&mut resolved, &self.process);
        apply_layer(&mut resolved, &pipeline.variables);
        if let Some(defaults) = pipeline.stage_defaults.get(&job.stage) {
            apply_layer(&mut resolved, &defaults.variables);
        }
        apply_layer(&mut resolved, &job.variables);
        apply_layer(&mut resolved, rule_overrides);

        // Anything still templated after the last layer is a hard error.
        for value in resolved.values() {
            if let Some(caps) = TEMPLATE_RE.captures(value) {
                return Err(EngineError::UnresolvedVariable {
                    job: job.name.clone(),
                    name: caps[1].to_string(),
                });
            }
        }

        Ok(resolved)
    }
}

/// Merges one layer into the accumulated map.
///
/// The layer's raw values land first so references between keys of the
/// same layer resolve regardless of key order; each value is then
/// substituted against the merged map. References to keys only
/// introduced by a later layer stay literal. `BTreeMap` iteration keeps
/// the order, and therefore the result, deterministic.
fn apply_layer(resolved: &mut VariableMap, layer: &VariableMap) {
    for (key, value) in layer {
        resolved.insert(key.clone(), value.clone());
    }
    for (key, value) in layer {
        let substituted = substitute(value, resolved);
        resolved.insert(key.clone(), substituted);
    }
}

/// Replaces every `${NAME}` whose name is present in `map`; unknown
/// references are left verbatim for a later layer (or the final check).
fn substitute(value: &str, map: &VariableMap) -> String {
    TEMPLATE_RE
        .replace_all(value, |caps: &regex::Captures<'_>| {
            map.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::definition::{JobBuilder, PipelineBuilder, StageDefaults};
    use pretty_assertions::assert_eq;

    fn pipeline_with_job(job: JobDef) -> PipelineDef {
        PipelineBuilder::new()
            .stage("build")
            .variable("REGISTRY", "registry.example.com")
            .variable("IMAGE", "${REGISTRY}/app")
            .job(job)
            .build_unchecked()
    }

    fn build_job() -> JobDef {
        JobBuilder::new("compile", "build")
            .script("make")
            .build_unchecked()
    }

    #[test]
    fn test_layer_precedence() {
        let mut pipeline = pipeline_with_job(
            JobBuilder::new("compile", "build")
                .script("make")
                .variable("TARGET", "job-level")
                .build_unchecked(),
        );
        pipeline.variables.insert("TARGET".to_string(), "global".to_string());
        pipeline.stage_defaults.insert(
            "build".to_string(),
            StageDefaults {
                variables: VariableMap::from([("TARGET".to_string(), "stage".to_string())]),
            },
        );

        let resolver = Resolver::new("run-1", VariableMap::new());
        let job = pipeline.job("compile").unwrap().clone();

        let vars = resolver.resolve(&pipeline, &job, &VariableMap::new()).unwrap();
        assert_eq!(vars.get("TARGET"), Some(&"job-level".to_string()));

        let overrides = VariableMap::from([("TARGET".to_string(), "rule".to_string())]);
        let vars = resolver.resolve(&pipeline, &job, &overrides).unwrap();
        assert_eq!(vars.get("TARGET"), Some(&"rule".to_string()));
    }

    #[test]
    fn test_templating_uses_map_so_far() {
        let pipeline = pipeline_with_job(build_job());
        let resolver = Resolver::new("run-1", VariableMap::new());
        let job = pipeline.job("compile").unwrap().clone();

        let vars = resolver.resolve(&pipeline, &job, &VariableMap::new()).unwrap();
        assert_eq!(
            vars.get("IMAGE"),
            Some(&"registry.example.com/app".to_string())
        );
    }

    #[test]
    fn test_unresolved_reference_is_an_error() {
        let pipeline = pipeline_with_job(
            JobBuilder::new("compile", "build")
                .script("make")
                .variable("BROKEN", "${NO_SUCH_VARIABLE}")
                .build_unchecked(),
        );
        let resolver = Resolver::new("run-1", VariableMap::new());
        let job = pipeline.job("compile").unwrap().clone();

        let err = resolver
            .resolve(&pipeline, &job, &VariableMap::new())
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::UnresolvedVariable {
                job: "compile".to_string(),
                name: "NO_SUCH_VARIABLE".to_string(),
            }
        );
    }

    #[test]
    fn test_substitution_never_looks_ahead() {
        // A pipeline-level template referencing a job-level variable stays
        // literal at layer 2 and is still an error: substitution never
        // looks ahead, only at the map resolved so far.
        let mut pipeline = pipeline_with_job(
            JobBuilder::new("compile", "build")
                .script("make")
                .variable("SUFFIX", "prod")
                .build_unchecked(),
        );
        pipeline
            .variables
            .insert("NAME".to_string(), "app-${SUFFIX}".to_string());

        let resolver = Resolver::new("run-1", VariableMap::new());
        let job = pipeline.job("compile").unwrap().clone();
        let err = resolver
            .resolve(&pipeline, &job, &VariableMap::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedVariable { ref name, .. } if name == "SUFFIX"));
    }

    #[test]
    fn test_process_defaults_present() {
        let pipeline = pipeline_with_job(build_job());
        let resolver = Resolver::new("run-42", VariableMap::new());
        let job = pipeline.job("compile").unwrap().clone();

        let vars = resolver.resolve(&pipeline, &job, &VariableMap::new()).unwrap();
        assert_eq!(vars.get("CI"), Some(&"true".to_string()));
        assert_eq!(vars.get("CI_PIPELINE_ID"), Some(&"run-42".to_string()));
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let pipeline = pipeline_with_job(build_job());
        let resolver = Resolver::new("run-1", VariableMap::new());
        let job = pipeline.job("compile").unwrap().clone();

        let first = resolver.resolve(&pipeline, &job, &VariableMap::new()).unwrap();
        let second = resolver.resolve(&pipeline, &job, &VariableMap::new()).unwrap();
        assert_eq!(first, second);
    }
}

#[cfg(test)]
mod properties {
    use super::*;
    use crate::pipeline::definition::{JobBuilder, PipelineBuilder};
    use proptest::prelude::*;

    fn var_name() -> impl Strategy<Value = String> {
        "[A-Z][A-Z0-9_]{0,8}"
    }

    proptest! {
        #[test]
        fn resolving_twice_yields_identical_maps(
            entries in proptest::collection::btree_map(var_name(), "[a-z0-9 ]{0,12}", 0..8)
        ) {
            let job = JobBuilder::new("job", "build").script("true").build_unchecked();
            let mut pipeline = PipelineBuilder::new()
                .stage("build")
                .job(job)
                .build_unchecked();
            pipeline.variables = entries;

            let resolver = Resolver::new("run", VariableMap::new());
            let job = pipeline.job("job").unwrap().clone();
            let first = resolver.resolve(&pipeline, &job, &VariableMap::new()).unwrap();
            let second = resolver.resolve(&pipeline, &job, &VariableMap::new()).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn highest_layer_always_wins(
            key in var_name(),
            low in "[a-z]{1,8}",
            high in "[a-z]{1,8}",
        ) {
            let job = JobBuilder::new("job", "build").script("true").build_unchecked();
            let mut pipeline = PipelineBuilder::new()
                .stage("build")
                .job(job)
                .build_unchecked();
            pipeline.variables.insert(key.clone(), low);

            let resolver = Resolver::new("run", VariableMap::new());
            let job = pipeline.job("job").unwrap().clone();
            let overrides = VariableMap::from([(key.clone(), high.clone())]);
            let vars = resolver.resolve(&pipeline, &job, &overrides).unwrap();
            prop_assert_eq!(vars.get(&key), Some(&high));
        }
    }
}
