//! Run-scoped artifact store
//!
//! Artifacts are byte snapshots of declared paths, taken when a job
//! completes and keyed by `(job, path)`. Because every key embeds the
//! producing job's name, two jobs can never race on the same key: the
//! store only needs an insert-once map behind a lock. Entries live for
//! one run and are never visible across runs.

use crate::pipeline::errors::EngineError;
use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Handle to one captured artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Producing job
    pub job: String,

    /// Path relative to the job's working directory
    pub path: String,
}

impl ArtifactRef {
    /// Creates a reference
    #[must_use]
    pub fn new(job: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.job, self.path)
    }
}

/// What one capture pass recorded
#[derive(Debug, Clone, Default)]
pub struct CaptureReport {
    /// Artifacts stored by this pass
    pub captured: Vec<ArtifactRef>,

    /// Declared patterns that matched nothing (warnings, never fatal)
    pub missing: Vec<String>,
}

/// In-memory artifact store shared by one run
#[derive(Debug, Default)]
pub struct ArtifactStore {
    entries: RwLock<AHashMap<ArtifactRef, Vec<u8>>>,
}

impl ArtifactStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots the declared paths out of `workdir`.
    ///
    /// Patterns that match nothing are recorded as warnings in the
    /// report; later stages may legitimately depend on a partial output
    /// set. Matching files are read immediately so later modification of
    /// the working directory cannot alter what was captured.
    pub fn capture(&self, job: &str, declared: &[String], workdir: &Path) -> CaptureReport {
        let mut report = CaptureReport::default();

        for pattern in declared {
            let matches = matching_files(workdir, pattern);
            if matches.is_empty() {
                tracing::warn!(job, pattern = %pattern, "declared artifact path matched nothing");
                report.missing.push(pattern.clone());
                continue;
            }

            for path in matches {
                let relative = path
                    .strip_prefix(workdir)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .into_owned();
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        let artifact = ArtifactRef::new(job, relative);
                        let mut entries = self.entries.write();
                        // Insert-once: capture happens at most once per key.
                        entries.entry(artifact.clone()).or_insert(bytes);
                        report.captured.push(artifact);
                    }
                    Err(e) => {
                        tracing::warn!(job, path = %relative, error = %e, "artifact unreadable at capture time");
                        report.missing.push(relative);
                    }
                }
            }
        }

        report.captured.sort();
        report
    }

    /// Fetches the bytes of a captured artifact.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownArtifact`] when nothing was captured
    /// under the given key.
    pub fn fetch(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, EngineError> {
        self.entries
            .read()
            .get(artifact)
            .cloned()
            .ok_or_else(|| EngineError::UnknownArtifact {
                job: artifact.job.clone(),
                path: artifact.path.clone(),
            })
    }

    /// All captured artifact keys, sorted
    #[must_use]
    pub fn index(&self) -> Vec<ArtifactRef> {
        let mut keys: Vec<ArtifactRef> = self.entries.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of captured artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true when nothing has been captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Files under `root` whose relative path matches `pattern`.
///
/// A pattern naming a directory captures the files below it.
pub(crate) fn matching_files(root: &Path, pattern: &str) -> Vec<PathBuf> {
    let Ok(compiled) = glob::Pattern::new(pattern) else {
        return Vec::new();
    };

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                let relative = relative.to_string_lossy();
                if compiled.matches(&relative) || relative.starts_with(&format!("{pattern}/")) {
                    files.push(path);
                }
            }
        }
    }

    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, content: &[u8]) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_capture_and_fetch_round_trip() {
        let workdir = tempfile::tempdir().unwrap();
        write(workdir.path(), "dist/report.xml", b"<coverage/>");

        let store = ArtifactStore::new();
        let report = store.capture("unit", &["dist/report.xml".to_string()], workdir.path());

        assert!(report.missing.is_empty());
        assert_eq!(report.captured.len(), 1);

        let bytes = store.fetch(&report.captured[0]).unwrap();
        assert_eq!(bytes, b"<coverage/>");
    }

    #[test]
    fn test_capture_snapshot_survives_mutation() {
        let workdir = tempfile::tempdir().unwrap();
        write(workdir.path(), "out.txt", b"first");

        let store = ArtifactStore::new();
        let report = store.capture("compile", &["out.txt".to_string()], workdir.path());

        // Rewriting the source file must not affect the captured bytes.
        write(workdir.path(), "out.txt", b"second");
        assert_eq!(store.fetch(&report.captured[0]).unwrap(), b"first");
    }

    #[test]
    fn test_missing_path_is_warning_not_error() {
        let workdir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new();

        let report = store.capture("docs", &["site/**".to_string()], workdir.path());
        assert_eq!(report.missing, vec!["site/**".to_string()]);
        assert!(report.captured.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_glob_patterns_expand() {
        let workdir = tempfile::tempdir().unwrap();
        write(workdir.path(), "logs/a.log", b"a");
        write(workdir.path(), "logs/sub/b.log", b"b");
        write(workdir.path(), "logs/readme.md", b"md");

        let store = ArtifactStore::new();
        let report = store.capture("unit", &["logs/**/*.log".to_string()], workdir.path());

        let paths: Vec<&str> = report.captured.iter().map(|a| a.path.as_str()).collect();
        assert!(paths.contains(&"logs/sub/b.log"));
        // `**` spans directory separators, including zero of them.
        assert!(paths.contains(&"logs/a.log"));
        assert!(!paths.iter().any(|p| p.ends_with(".md")));
    }

    #[test]
    fn test_directory_pattern_captures_contents() {
        let workdir = tempfile::tempdir().unwrap();
        write(workdir.path(), "site/index.html", b"<html/>");

        let store = ArtifactStore::new();
        let report = store.capture("docs", &["site".to_string()], workdir.path());
        assert_eq!(report.captured.len(), 1);
        assert_eq!(report.captured[0].path, "site/index.html");
    }

    #[test]
    fn test_fetch_unknown_artifact() {
        let store = ArtifactStore::new();
        let err = store.fetch(&ArtifactRef::new("ghost", "out.txt")).unwrap_err();
        assert!(matches!(err, EngineError::UnknownArtifact { .. }));
    }

    #[test]
    fn test_keys_isolated_per_job() {
        let workdir_a = tempfile::tempdir().unwrap();
        let workdir_b = tempfile::tempdir().unwrap();
        write(workdir_a.path(), "out.txt", b"from-a");
        write(workdir_b.path(), "out.txt", b"from-b");

        let store = ArtifactStore::new();
        store.capture("job-a", &["out.txt".to_string()], workdir_a.path());
        store.capture("job-b", &["out.txt".to_string()], workdir_b.path());

        assert_eq!(store.len(), 2);
        assert_eq!(
            store.fetch(&ArtifactRef::new("job-a", "out.txt")).unwrap(),
            b"from-a"
        );
        assert_eq!(
            store.fetch(&ArtifactRef::new("job-b", "out.txt")).unwrap(),
            b"from-b"
        );
    }
}
