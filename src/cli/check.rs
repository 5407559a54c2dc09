//! `flowline check` - Validate a pipeline definition

use flowline::infrastructure::loader;
use anyhow::{Context, Result};
use std::path::Path;

/// Loads and validates a definition file, printing a summary on success
pub fn check_pipeline(file: &Path) -> Result<()> {
    let pipeline = loader::load_path(file)
        .with_context(|| format!("Failed to load pipeline from: {}", file.display()))?;

    println!(
        "OK: {} ({} stages, {} jobs)",
        pipeline.name.as_deref().unwrap_or("unnamed"),
        pipeline.stages.len(),
        pipeline.jobs.len()
    );
    Ok(())
}
