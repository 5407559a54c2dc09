//! Trigger context for a single pipeline run
//!
//! The context carries the external facts describing why the run was
//! started. It is constructed once, passed immutably into every rule
//! evaluation, and never mutated afterwards.

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use crate::pipeline::variables::VariableMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What started the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineSource {
    /// A branch or tag push
    Push,
    /// A merge-request event
    MergeRequest,
    /// A scheduled run
    Schedule,
    /// Manually started from a web UI
    Web,
    /// Started through an API call
    Api,
}

impl PipelineSource {
    /// Returns true when this source is commit-driven and therefore
    /// guarantees a full changed-file list can exist for the run.
    ///
    /// Schedule/web/api runs have no diff to enumerate, so `changes:`
    /// clauses must fail closed for them when the file set is absent.
    #[must_use]
    pub fn guarantees_change_list(&self) -> bool {
        matches!(self, Self::Push | Self::MergeRequest)
    }
}

impl fmt::Display for PipelineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "push"),
            Self::MergeRequest => write!(f, "merge_request_event"),
            Self::Schedule => write!(f, "schedule"),
            Self::Web => write!(f, "web"),
            Self::Api => write!(f, "api"),
        }
    }
}

impl FromStr for PipelineSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(Self::Push),
            "merge_request" | "merge_request_event" => Ok(Self::MergeRequest),
            "schedule" => Ok(Self::Schedule),
            "web" => Ok(Self::Web),
            "api" => Ok(Self::Api),
            other => Err(format!("unknown pipeline source '{other}'")),
        }
    }
}

/// Externally supplied facts for one pipeline run
///
/// Immutable for the duration of the run. Rule predicates read it through
/// [`TriggerContext::var`], and the variable resolver injects the same
/// view into every dispatched job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerContext {
    /// Project identity (namespace/name)
    pub project: String,

    /// What started the run
    pub source: PipelineSource,

    /// The project's default branch
    pub default_branch: String,

    /// Branch the commit was pushed to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_branch: Option<String>,

    /// Tag the run was triggered for, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_tag: Option<String>,

    /// Merge-request identifier, present only for merge-request runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_request_iid: Option<u64>,

    /// Source branch of the merge request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,

    /// Target branch of the merge request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_branch: Option<String>,

    /// Paths changed by the triggering event. `None` means the set is
    /// unknown, which is distinct from an empty diff.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_files: Option<Vec<String>>,

    /// Additional variables injected by the invoking environment
    #[serde(default)]
    pub extra: VariableMap,
}

impl TriggerContext {
    /// Creates a context for a plain push to a branch
    pub fn push(project: impl Into<String>, branch: impl Into<String>) -> Self {
        let branch = branch.into();
        Self {
            project: project.into(),
            source: PipelineSource::Push,
            default_branch: "main".to_string(),
            commit_branch: Some(branch),
            commit_tag: None,
            merge_request_iid: None,
            source_branch: None,
            target_branch: None,
            changed_files: None,
            extra: VariableMap::new(),
        }
    }

    /// Creates a context for a merge-request event
    pub fn merge_request(
        project: impl Into<String>,
        iid: u64,
        source_branch: impl Into<String>,
        target_branch: impl Into<String>,
    ) -> Self {
        Self {
            project: project.into(),
            source: PipelineSource::MergeRequest,
            default_branch: "main".to_string(),
            commit_branch: None,
            commit_tag: None,
            merge_request_iid: Some(iid),
            source_branch: Some(source_branch.into()),
            target_branch: Some(target_branch.into()),
            changed_files: None,
            extra: VariableMap::new(),
        }
    }

    /// Creates a context for a scheduled run on the default branch
    pub fn schedule(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            source: PipelineSource::Schedule,
            default_branch: "main".to_string(),
            commit_branch: Some("main".to_string()),
            commit_tag: None,
            merge_request_iid: None,
            source_branch: None,
            target_branch: None,
            changed_files: None,
            extra: VariableMap::new(),
        }
    }

    /// Overrides the pipeline source
    pub fn with_source(mut self, source: PipelineSource) -> Self {
        self.source = source;
        self
    }

    /// Sets the default branch
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Sets the commit tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.commit_tag = Some(tag.into());
        self
    }

    /// Sets the changed-file set
    pub fn with_changed_files(mut self, files: Vec<String>) -> Self {
        self.changed_files = Some(files);
        self
    }

    /// Adds an externally injected variable
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Looks up a single context variable by its CI name
    #[must_use]
    pub fn var(&self, name: &str) -> Option<String> {
        match name {
            "CI_PROJECT_PATH" => Some(self.project.clone()),
            "CI_PIPELINE_SOURCE" => Some(self.source.to_string()),
            "CI_DEFAULT_BRANCH" => Some(self.default_branch.clone()),
            "CI_COMMIT_BRANCH" => self.commit_branch.clone(),
            "CI_COMMIT_TAG" => self.commit_tag.clone(),
            "CI_MERGE_REQUEST_IID" => self.merge_request_iid.map(|iid| iid.to_string()),
            "CI_MERGE_REQUEST_SOURCE_BRANCH_NAME" => self.source_branch.clone(),
            "CI_MERGE_REQUEST_TARGET_BRANCH_NAME" => self.target_branch.clone(),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Returns the full variable view of this context, suitable for
    /// injection into the lowest resolver layer.
    #[must_use]
    pub fn variables(&self) -> VariableMap {
        let mut vars = self.extra.clone();
        vars.insert("CI_PROJECT_PATH".to_string(), self.project.clone());
        vars.insert("CI_PIPELINE_SOURCE".to_string(), self.source.to_string());
        vars.insert("CI_DEFAULT_BRANCH".to_string(), self.default_branch.clone());
        if let Some(ref branch) = self.commit_branch {
            vars.insert("CI_COMMIT_BRANCH".to_string(), branch.clone());
        }
        if let Some(ref tag) = self.commit_tag {
            vars.insert("CI_COMMIT_TAG".to_string(), tag.clone());
        }
        if let Some(iid) = self.merge_request_iid {
            vars.insert("CI_MERGE_REQUEST_IID".to_string(), iid.to_string());
        }
        if let Some(ref branch) = self.source_branch {
            vars.insert(
                "CI_MERGE_REQUEST_SOURCE_BRANCH_NAME".to_string(),
                branch.clone(),
            );
        }
        if let Some(ref branch) = self.target_branch {
            vars.insert(
                "CI_MERGE_REQUEST_TARGET_BRANCH_NAME".to_string(),
                branch.clone(),
            );
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_context_vars() {
        let ctx = TriggerContext::push("group/project", "main");

        assert_eq!(ctx.var("CI_COMMIT_BRANCH"), Some("main".to_string()));
        assert_eq!(ctx.var("CI_PIPELINE_SOURCE"), Some("push".to_string()));
        assert_eq!(ctx.var("CI_MERGE_REQUEST_IID"), None);
        assert_eq!(ctx.var("CI_COMMIT_TAG"), None);
    }

    #[test]
    fn test_merge_request_context_vars() {
        let ctx = TriggerContext::merge_request("group/project", 42, "feature", "main");

        assert_eq!(ctx.var("CI_MERGE_REQUEST_IID"), Some("42".to_string()));
        assert_eq!(
            ctx.var("CI_MERGE_REQUEST_TARGET_BRANCH_NAME"),
            Some("main".to_string())
        );
        assert_eq!(ctx.var("CI_COMMIT_BRANCH"), None);
    }

    #[test]
    fn test_extra_vars_visible() {
        let ctx = TriggerContext::schedule("group/project").with_var("NIGHTLY", "1");

        assert_eq!(ctx.var("NIGHTLY"), Some("1".to_string()));
        assert!(ctx.variables().contains_key("NIGHTLY"));
    }

    #[test]
    fn test_source_change_list_guarantee() {
        assert!(PipelineSource::Push.guarantees_change_list());
        assert!(PipelineSource::MergeRequest.guarantees_change_list());
        assert!(!PipelineSource::Schedule.guarantees_change_list());
        assert!(!PipelineSource::Web.guarantees_change_list());
    }

    #[test]
    fn test_source_round_trip() {
        let source: PipelineSource = "merge_request_event".parse().unwrap();
        assert_eq!(source, PipelineSource::MergeRequest);
        assert!("mystery".parse::<PipelineSource>().is_err());
    }

    #[test]
    fn test_variables_view_complete() {
        let ctx = TriggerContext::push("group/project", "develop")
            .with_tag("v1.2.0")
            .with_default_branch("trunk");
        let vars = ctx.variables();

        assert_eq!(vars.get("CI_COMMIT_TAG"), Some(&"v1.2.0".to_string()));
        assert_eq!(vars.get("CI_DEFAULT_BRANCH"), Some(&"trunk".to_string()));
    }
}
