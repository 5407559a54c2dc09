//! Rule clauses and the per-job inclusion decision
//!
//! Each job carries an ordered list of [`RuleClause`]s. Evaluation walks
//! the list in declaration order and the first matching clause decides
//! whether and how the job runs; later clauses are never consulted. A job
//! whose list has no matching clause is excluded from the run entirely;
//! excluded jobs do not appear in the final report at all, unlike skipped
//! ones.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use crate::pipeline::context::TriggerContext;
use crate::pipeline::types::Validate;
use crate::pipeline::variables::VariableMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Action attached to a matching rule clause
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WhenAction {
    /// Run regardless of upstream stage outcomes
    Always,
    /// Include the job but never dispatch it (it reports as skipped)
    Never,
    /// Run only while no upstream stage has failed
    #[default]
    OnSuccess,
}

impl fmt::Display for WhenAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => write!(f, "always"),
            Self::Never => write!(f, "never"),
            Self::OnSuccess => write!(f, "on_success"),
        }
    }
}

impl FromStr for WhenAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            "on_success" => Ok(Self::OnSuccess),
            other => Err(format!("unknown when action '{other}'")),
        }
    }
}

/// Boolean condition over context variables
///
/// Kept as a closed set of comparison and membership operators rather
/// than a general expression tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Variable is present and non-empty
    Defined {
        /// Variable name
        var: String,
    },

    /// Variable is absent or empty
    NotDefined {
        /// Variable name
        var: String,
    },

    /// Variable equals a literal value
    Equals {
        /// Variable name
        var: String,
        /// Expected value
        value: String,
    },

    /// Variable differs from a literal value (an absent variable differs)
    NotEquals {
        /// Variable name
        var: String,
        /// Rejected value
        value: String,
    },

    /// Variable matches a regular expression
    Matches {
        /// Variable name
        var: String,
        /// Regular expression source
        pattern: String,
    },

    /// All listed predicates hold
    AllOf {
        /// Conjuncts, evaluated left to right
        predicates: Vec<Predicate>,
    },

    /// At least one listed predicate holds
    AnyOf {
        /// Disjuncts, evaluated left to right
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    /// Creates a presence check
    pub fn defined(var: impl Into<String>) -> Self {
        Self::Defined { var: var.into() }
    }

    /// Creates an absence check
    pub fn not_defined(var: impl Into<String>) -> Self {
        Self::NotDefined { var: var.into() }
    }

    /// Creates an equality check
    pub fn equals(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            var: var.into(),
            value: value.into(),
        }
    }

    /// Creates an inequality check
    pub fn not_equals(var: impl Into<String>, value: impl Into<String>) -> Self {
        Self::NotEquals {
            var: var.into(),
            value: value.into(),
        }
    }

    /// Creates a regular-expression check
    pub fn matches(var: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Matches {
            var: var.into(),
            pattern: pattern.into(),
        }
    }

    /// Creates a conjunction
    pub fn all_of(predicates: Vec<Predicate>) -> Self {
        Self::AllOf { predicates }
    }

    /// Creates a disjunction
    pub fn any_of(predicates: Vec<Predicate>) -> Self {
        Self::AnyOf { predicates }
    }

    /// Evaluates the predicate against the run's trigger context
    #[must_use]
    pub fn evaluate(&self, ctx: &TriggerContext) -> bool {
        match self {
            Self::Defined { var } => ctx.var(var).is_some_and(|v| !v.is_empty()),
            Self::NotDefined { var } => !ctx.var(var).is_some_and(|v| !v.is_empty()),
            Self::Equals { var, value } => ctx.var(var).as_deref() == Some(value.as_str()),
            Self::NotEquals { var, value } => ctx.var(var).as_deref() != Some(value.as_str()),
            Self::Matches { var, pattern } => match (ctx.var(var), regex::Regex::new(pattern)) {
                (Some(v), Ok(re)) => re.is_match(&v),
                _ => false,
            },
            Self::AllOf { predicates } => predicates.iter().all(|p| p.evaluate(ctx)),
            Self::AnyOf { predicates } => predicates.iter().any(|p| p.evaluate(ctx)),
        }
    }
}

impl Validate for Predicate {
    type Error = String;

    fn validate(&self) -> Result<(), Self::Error> {
        match self {
            Self::Defined { var }
            | Self::NotDefined { var }
            | Self::Equals { var, .. }
            | Self::NotEquals { var, .. } => {
                if var.is_empty() {
                    return Err("variable name cannot be empty".to_string());
                }
            }
            Self::Matches { var, pattern } => {
                if var.is_empty() {
                    return Err("variable name cannot be empty".to_string());
                }
                regex::Regex::new(pattern)
                    .map_err(|e| format!("invalid pattern '{pattern}': {e}"))?;
            }
            Self::AllOf { predicates } | Self::AnyOf { predicates } => {
                if predicates.is_empty() {
                    return Err("predicate list cannot be empty".to_string());
                }
                for p in predicates {
                    p.validate()?;
                }
            }
        }
        Ok(())
    }
}

/// One conditional entry deciding whether and how a job runs
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RuleClause {
    /// Condition over context variables; a clause without one matches
    /// unconditionally (in declaration position, never hoisted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<Predicate>,

    /// Glob patterns intersected against the run's changed-file set
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub changes: Vec<String>,

    /// Action applied when this clause matches
    #[serde(default)]
    pub when: WhenAction,

    /// Variable overrides attached to the job when this clause matches
    #[serde(skip_serializing_if = "VariableMap::is_empty", default)]
    pub variables: VariableMap,
}

impl RuleClause {
    /// Creates a bare clause with the given action
    pub fn when(action: WhenAction) -> Self {
        Self {
            when: action,
            ..Self::default()
        }
    }

    /// Sets the clause predicate
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Sets the changed-path filter
    pub fn with_changes(mut self, patterns: Vec<String>) -> Self {
        self.changes = patterns;
        self
    }

    /// Adds a variable override
    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    /// Returns true if this clause matches the given context
    #[must_use]
    pub fn matches(&self, ctx: &TriggerContext) -> bool {
        let predicate_holds = self.predicate.as_ref().is_none_or(|p| p.evaluate(ctx));
        predicate_holds && self.changes_match(ctx)
    }

    /// Intersects the `changes` patterns against the changed-file set.
    ///
    /// With an unknown file set the clause fails closed unless the
    /// pipeline source is commit-driven, in which case the full change
    /// list is treated as covering every pattern.
    fn changes_match(&self, ctx: &TriggerContext) -> bool {
        if self.changes.is_empty() {
            return true;
        }
        match &ctx.changed_files {
            Some(files) => self.changes.iter().any(|pattern| {
                glob::Pattern::new(pattern)
                    .map(|p| files.iter().any(|f| p.matches(f)))
                    .unwrap_or(false)
            }),
            None => ctx.source.guarantees_change_list(),
        }
    }
}

impl Validate for RuleClause {
    type Error = String;

    fn validate(&self) -> Result<(), Self::Error> {
        if let Some(ref predicate) = self.predicate {
            predicate.validate()?;
        }
        for pattern in &self.changes {
            glob::Pattern::new(pattern)
                .map_err(|e| format!("invalid changes pattern '{pattern}': {e}"))?;
        }
        Ok(())
    }
}

/// Outcome of evaluating a job's rule list against a context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// The job runs with the default `on_success` gating
    Include {
        /// Variable overrides from the matching clause
        variables: VariableMap,
    },

    /// The job is part of the run with an explicit action
    IncludeAs {
        /// Action from the matching clause (`always` or `never`)
        when: WhenAction,
        /// Variable overrides from the matching clause
        variables: VariableMap,
    },

    /// No clause matched; the job is absent from the run
    Exclude,
}

impl Decision {
    /// Returns true unless the decision is [`Decision::Exclude`]
    #[must_use]
    pub fn is_included(&self) -> bool {
        !matches!(self, Self::Exclude)
    }

    /// Effective gating action for an included job
    #[must_use]
    pub fn when_action(&self) -> WhenAction {
        match self {
            Self::Include { .. } => WhenAction::OnSuccess,
            Self::IncludeAs { when, .. } => *when,
            Self::Exclude => WhenAction::Never,
        }
    }

    /// Variable overrides carried by the matching clause
    #[must_use]
    pub fn variable_overrides(&self) -> VariableMap {
        match self {
            Self::Include { variables } | Self::IncludeAs { variables, .. } => variables.clone(),
            Self::Exclude => VariableMap::new(),
        }
    }
}

/// Evaluates an ordered rule list, returning on the first matching clause.
///
/// Pure function of the clause list and the context: no clause after the
/// first match is ever evaluated, and an empty or match-free list yields
/// [`Decision::Exclude`].
#[must_use]
pub fn evaluate(rules: &[RuleClause], ctx: &TriggerContext) -> Decision {
    for clause in rules {
        if clause.matches(ctx) {
            return match clause.when {
                WhenAction::OnSuccess => Decision::Include {
                    variables: clause.variables.clone(),
                },
                action => Decision::IncludeAs {
                    when: action,
                    variables: clause.variables.clone(),
                },
            };
        }
    }
    Decision::Exclude
}
