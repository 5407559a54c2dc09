//! Local shell dispatcher
//!
//! Runs job scripts through a configurable shell on the host. This is
//! the reference [`JobExecutor`]: each script line is executed in order
//! inside the job's working directory with the resolved variables as
//! environment, and the first non-zero exit code ends the attempt.
//! Images, tags and services are accepted and logged but not enforced;
//! the host shell has no container runtime behind it.

use crate::executor::artifacts::matching_files;
use crate::executor::traits::{DispatchOutcome, DispatchRequest, JobExecutor};
use crate::pipeline::errors::EngineError;
use async_trait::async_trait;
use std::fmt::Write as _;
use std::process::Stdio;
use tokio::process::Command;

/// Dispatcher executing scripts with a host shell
#[derive(Debug, Clone)]
pub struct ShellDispatcher {
    /// Shell program
    program: String,

    /// Leading shell arguments; each script line is appended after these
    /// (so a `-c`-style flag belongs here)
    args: Vec<String>,
}

impl ShellDispatcher {
    /// Creates a dispatcher using `sh -c`
    #[must_use]
    pub fn new() -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string()],
        }
    }

    /// Creates a dispatcher from a shell override like `"bash -ec"`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidShell`] when the override cannot be
    /// split into a program and arguments.
    pub fn with_shell(value: &str) -> Result<Self, EngineError> {
        let mut words = shell_words::split(value)
            .map_err(|_| EngineError::InvalidShell {
                value: value.to_string(),
            })?
            .into_iter();
        let Some(program) = words.next() else {
            return Err(EngineError::InvalidShell {
                value: value.to_string(),
            });
        };
        Ok(Self {
            program,
            args: words.collect(),
        })
    }
}

impl Default for ShellDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for ShellDispatcher {
    async fn execute(&self, request: DispatchRequest) -> Result<DispatchOutcome, EngineError> {
        tokio::fs::create_dir_all(&request.workdir).await?;

        if let Some(ref image) = request.image {
            tracing::debug!(job = %request.job, image = %image, "image requested; host shell dispatch ignores it");
        }
        if !request.services.is_empty() {
            tracing::debug!(job = %request.job, services = ?request.services, "services are not provisioned by the shell dispatcher");
        }

        let mut log = String::new();
        let mut exit_code = 0;

        for line in &request.script {
            let _ = writeln!(log, "$ {line}");

            let output = Command::new(&self.program)
                .args(&self.args)
                .arg(line)
                .current_dir(&request.workdir)
                .envs(request.variables.iter())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                // Cancellation drops this future; the process must not
                // outlive it.
                .kill_on_drop(true)
                .output()
                .await?;

            log.push_str(&String::from_utf8_lossy(&output.stdout));
            log.push_str(&String::from_utf8_lossy(&output.stderr));

            if !output.status.success() {
                exit_code = output.status.code().unwrap_or(-1);
                tracing::debug!(job = %request.job, line = %line, exit_code, "script line failed");
                break;
            }
        }

        let produced_paths = request
            .artifact_globs
            .iter()
            .flat_map(|pattern| matching_files(&request.workdir, pattern))
            .collect();

        Ok(DispatchOutcome {
            exit_code,
            produced_paths,
            log,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::variables::VariableMap;

    fn request(script: Vec<&str>, workdir: &std::path::Path) -> DispatchRequest {
        DispatchRequest {
            job: "test-job".to_string(),
            stage: "test".to_string(),
            image: None,
            script: script.into_iter().map(String::from).collect(),
            variables: VariableMap::new(),
            tags: Vec::new(),
            services: Vec::new(),
            artifact_globs: Vec::new(),
            workdir: workdir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_successful_script() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = ShellDispatcher::new();

        let outcome = dispatcher
            .execute(request(vec!["echo hello"], dir.path()))
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert!(outcome.log.contains("$ echo hello"));
        assert!(outcome.log.contains("hello"));
    }

    #[tokio::test]
    async fn test_first_failing_line_stops_the_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = ShellDispatcher::new();

        let outcome = dispatcher
            .execute(request(vec!["echo before", "exit 3", "echo after"], dir.path()))
            .await
            .unwrap();

        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.log.contains("before"));
        assert!(!outcome.log.contains("after"));
    }

    #[tokio::test]
    async fn test_variables_reach_the_environment() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = ShellDispatcher::new();

        let mut req = request(vec!["echo value=$GREETING"], dir.path());
        req.variables
            .insert("GREETING".to_string(), "bonjour".to_string());

        let outcome = dispatcher.execute(req).await.unwrap();
        assert!(outcome.log.contains("value=bonjour"));
    }

    #[tokio::test]
    async fn test_produced_paths_match_declared_globs() {
        let dir = tempfile::tempdir().unwrap();
        let dispatcher = ShellDispatcher::new();

        let mut req = request(vec!["mkdir -p dist", "echo artifact > dist/out.txt"], dir.path());
        req.artifact_globs = vec!["dist/*.txt".to_string()];

        let outcome = dispatcher.execute(req).await.unwrap();
        assert_eq!(outcome.produced_paths.len(), 1);
        assert!(outcome.produced_paths[0].ends_with("dist/out.txt"));
    }

    #[test]
    fn test_shell_override_parsing() {
        let dispatcher = ShellDispatcher::with_shell("bash -ec").unwrap();
        assert_eq!(dispatcher.program, "bash");
        assert_eq!(dispatcher.args, vec!["-ec"]);

        assert!(ShellDispatcher::with_shell("").is_err());
        assert!(ShellDispatcher::with_shell("sh 'unclosed").is_err());
    }
}
