//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for the scheduler and its dispatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker capacity bounding intra-stage parallelism
    pub workers: usize,
    /// Timeout applied to jobs that declare none, in seconds
    pub default_timeout_secs: u64,
    /// Shell command line for the local dispatcher
    pub shell: String,
    /// Root directory for per-job workdirs
    pub workdir_root: String,
    /// Log level
    pub log_level: String,
}

impl EngineConfig {
    /// Default job timeout as a [`Duration`]
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            default_timeout_secs: 3600,
            shell: "sh -c".to_string(),
            workdir_root: ".flowline/work".to_string(),
            log_level: "info".to_string(),
        }
    }
}
