//! Pipeline definition loader
//!
//! Parses the YAML document format: `stages`, `variables`, `default`,
//! `stage_defaults`, and every remaining top-level key as a job
//! definition. Rule `if:` strings use a small closed grammar compiled to
//! [`Predicate`] values:
//!
//! ```text
//! $VAR                      presence
//! $VAR == "value"           equality ('single quotes' also accepted)
//! $VAR != "value"           inequality
//! $VAR == null              absence
//! $VAR != null              presence
//! $VAR =~ /pattern/         regular-expression match
//! atom && atom && ...       conjunction
//! atom || atom || ...       alternation
//! ```
//!
//! Conjunction and alternation cannot be mixed in one expression.

use crate::pipeline::definition::{
    ArtifactSpec, JobDef, JobDefaults, PipelineDef, StageDefaults,
};
use crate::pipeline::errors::{ConfigurationError, EngineError};
use crate::pipeline::rules::{Predicate, RuleClause, WhenAction};
use crate::pipeline::types::Validate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

static ATOM_DEFINED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\$([A-Za-z_][A-Za-z0-9_]*)\s*$").expect("defined atom regex"));
static ATOM_NULL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\$([A-Za-z_][A-Za-z0-9_]*)\s*(==|!=)\s*null\s*$").expect("null atom regex")
});
static ATOM_LITERAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*\$([A-Za-z_][A-Za-z0-9_]*)\s*(==|!=)\s*(?:"([^"]*)"|'([^']*)')\s*$"#)
        .expect("literal atom regex")
});
static ATOM_MATCH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\$([A-Za-z_][A-Za-z0-9_]*)\s*=~\s*/(.*)/\s*$").expect("match atom regex")
});

/// Raw document shape, lowered to the domain model after parsing
#[derive(Debug, Deserialize)]
struct RawPipeline {
    #[serde(default)]
    name: Option<String>,
    stages: Vec<String>,
    #[serde(default)]
    variables: BTreeMap<String, String>,
    #[serde(default)]
    default: RawDefaults,
    #[serde(default)]
    stage_defaults: BTreeMap<String, RawStageDefaults>,
    #[serde(flatten)]
    jobs: BTreeMap<String, RawJob>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDefaults {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStageDefaults {
    #[serde(default)]
    variables: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawJob {
    stage: String,
    script: Vec<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    variables: BTreeMap<String, String>,
    #[serde(default)]
    rules: Option<Vec<RawRule>>,
    #[serde(default)]
    artifacts: Option<RawArtifacts>,
    #[serde(default)]
    services: Vec<String>,
    #[serde(default)]
    when: Option<String>,
    #[serde(default)]
    retry: u32,
    #[serde(default)]
    timeout: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(rename = "if", default)]
    condition: Option<String>,
    #[serde(default)]
    changes: Option<Vec<String>>,
    #[serde(default)]
    when: Option<String>,
    #[serde(default)]
    variables: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawArtifacts {
    paths: Vec<String>,
    #[serde(default)]
    when: Option<String>,
}

/// Parses and validates a pipeline definition document.
///
/// # Errors
///
/// Returns [`EngineError::Parse`] for YAML problems and
/// [`EngineError::Configuration`] for structural ones.
pub fn from_str(document: &str) -> Result<PipelineDef, EngineError> {
    let raw: RawPipeline = serde_yaml::from_str(document).map_err(|e| EngineError::Parse {
        message: e.to_string(),
    })?;

    let pipeline = lower(raw)?;
    pipeline.validate().map_err(EngineError::Configuration)?;
    Ok(pipeline)
}

/// Loads and validates a pipeline definition file.
///
/// # Errors
///
/// Propagates IO errors plus everything [`from_str`] reports.
pub fn load_path(path: &Path) -> Result<PipelineDef, EngineError> {
    let document = std::fs::read_to_string(path)?;
    from_str(&document)
}

/// Lowers the raw document into the domain model
fn lower(raw: RawPipeline) -> Result<PipelineDef, EngineError> {
    let mut jobs = Vec::with_capacity(raw.jobs.len());

    for (name, job) in raw.jobs {
        jobs.push(lower_job(name, job)?);
    }

    Ok(PipelineDef {
        name: raw.name,
        stages: raw.stages,
        variables: raw.variables,
        defaults: JobDefaults {
            image: raw.default.image,
            tags: raw.default.tags,
        },
        stage_defaults: raw
            .stage_defaults
            .into_iter()
            .map(|(stage, defaults)| {
                (
                    stage,
                    StageDefaults {
                        variables: defaults.variables,
                    },
                )
            })
            .collect(),
        jobs,
    })
}

fn lower_job(name: String, raw: RawJob) -> Result<JobDef, EngineError> {
    let when = parse_when(&name, raw.when.as_deref())?.unwrap_or_default();

    // A job without a rules list runs by default: it gets one synthesized
    // catch-all clause carrying the job-level action. A declared (even
    // empty) list is taken at face value.
    let rules = match raw.rules {
        None => vec![RuleClause::when(when)],
        Some(raw_rules) => raw_rules
            .into_iter()
            .map(|rule| lower_rule(&name, rule))
            .collect::<Result<Vec<_>, _>>()?,
    };

    let artifacts = match raw.artifacts {
        None => ArtifactSpec::default(),
        Some(spec) => {
            let on_failure = match spec.when.as_deref() {
                None | Some("on_success") => false,
                Some("on_failure") | Some("always") => true,
                Some(other) => {
                    return Err(ConfigurationError::MalformedRule {
                        job: name,
                        reason: format!("unknown artifacts.when '{other}'"),
                    }
                    .into());
                }
            };
            ArtifactSpec {
                paths: spec.paths,
                on_failure,
            }
        }
    };

    Ok(JobDef {
        name,
        stage: raw.stage,
        image: raw.image,
        rules,
        script: raw.script,
        tags: raw.tags,
        variables: raw.variables,
        artifacts,
        services: raw.services,
        when,
        retry: raw.retry,
        timeout: raw.timeout.map(Duration::from_secs),
    })
}

fn lower_rule(job: &str, raw: RawRule) -> Result<RuleClause, EngineError> {
    let predicate = raw
        .condition
        .as_deref()
        .map(|expr| {
            parse_expression(expr).map_err(|reason| ConfigurationError::MalformedRule {
                job: job.to_string(),
                reason,
            })
        })
        .transpose()?;

    let when = parse_when(job, raw.when.as_deref())?.unwrap_or_default();

    Ok(RuleClause {
        predicate,
        changes: raw.changes.unwrap_or_default(),
        when,
        variables: raw.variables.unwrap_or_default(),
    })
}

fn parse_when(job: &str, value: Option<&str>) -> Result<Option<WhenAction>, EngineError> {
    value
        .map(|s| {
            s.parse().map_err(|reason| {
                EngineError::from(ConfigurationError::MalformedRule {
                    job: job.to_string(),
                    reason,
                })
            })
        })
        .transpose()
}

/// Compiles one `if:` expression into a predicate
fn parse_expression(expr: &str) -> Result<Predicate, String> {
    let has_and = expr.contains("&&");
    let has_or = expr.contains("||");

    match (has_and, has_or) {
        (true, true) => Err(format!(
            "expression '{expr}' mixes '&&' and '||'; split it into separate rules"
        )),
        (true, false) => Ok(Predicate::all_of(
            expr.split("&&")
                .map(parse_atom)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        (false, true) => Ok(Predicate::any_of(
            expr.split("||")
                .map(parse_atom)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        (false, false) => parse_atom(expr),
    }
}

fn parse_atom(atom: &str) -> Result<Predicate, String> {
    if let Some(caps) = ATOM_DEFINED.captures(atom) {
        return Ok(Predicate::defined(&caps[1]));
    }
    if let Some(caps) = ATOM_NULL.captures(atom) {
        return Ok(match &caps[2] {
            "==" => Predicate::not_defined(&caps[1]),
            _ => Predicate::defined(&caps[1]),
        });
    }
    if let Some(caps) = ATOM_LITERAL.captures(atom) {
        let value = caps
            .get(3)
            .or_else(|| caps.get(4))
            .map(|m| m.as_str())
            .unwrap_or_default();
        return Ok(match &caps[2] {
            "==" => Predicate::equals(&caps[1], value),
            _ => Predicate::not_equals(&caps[1], value),
        });
    }
    if let Some(caps) = ATOM_MATCH.captures(atom) {
        return Ok(Predicate::matches(&caps[1], &caps[2]));
    }
    Err(format!("unrecognized expression '{}'", atom.trim()))
}
