//! `flowline run` - Execute a pipeline with the local shell dispatcher

use flowline::executor::{PipelineReport, Scheduler, ShellDispatcher, cancellation};
use flowline::infrastructure::loader;
use flowline::infrastructure::metrics::{MetricsCollector, RunMetrics};
use flowline::pipeline::{PipelineStatus, TriggerContext};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Options for one `run` invocation
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Worker capacity
    pub workers: usize,
    /// Default job timeout in seconds
    pub timeout_secs: u64,
    /// Shell command line for the dispatcher
    pub shell: String,
    /// Root for per-job workdirs; a temp directory when absent
    pub workdir: Option<PathBuf>,
    /// Emit the report as JSON instead of text
    pub json: bool,
}

/// Runs the pipeline and prints the final report. Ctrl-C cancels the run.
pub fn run_pipeline(file: &Path, context: TriggerContext, options: RunOptions) -> Result<()> {
    let pipeline = loader::load_path(file)
        .with_context(|| format!("Failed to load pipeline from: {}", file.display()))?;

    let dispatcher = ShellDispatcher::with_shell(&options.shell)?;
    let mut scheduler = Scheduler::new(Arc::new(dispatcher))
        .with_workers(options.workers)
        .with_default_timeout(Duration::from_secs(options.timeout_secs));
    if let Some(ref root) = options.workdir {
        scheduler = scheduler.with_workdir_root(root.clone());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    let report = runtime.block_on(async {
        let (handle, signal) = cancellation();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling the run");
                handle.cancel();
            }
        });

        scheduler.with_cancel(signal).run(&pipeline, &context).await
    })?;

    let collector = MetricsCollector::new();
    collector.record(RunMetrics::from_report(&report));

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }

    match report.status {
        PipelineStatus::Success => Ok(()),
        status => anyhow::bail!("pipeline finished {status}"),
    }
}

fn render_report(report: &PipelineReport) -> String {
    let mut out = String::new();

    for record in report.records.values() {
        out.push_str(&format!(
            "{:<8} {} ({})",
            record.status.to_string(),
            record.job,
            record.stage
        ));
        if let Some(ref cause) = record.failure {
            out.push_str(&format!(" - {cause}"));
        }
        if let Some(ref reason) = record.skip_reason {
            out.push_str(&format!(" - {reason}"));
        }
        out.push('\n');
    }

    if !report.artifacts.is_empty() {
        out.push_str("Artifacts:\n");
        for artifact in &report.artifacts {
            out.push_str(&format!("  {artifact}\n"));
        }
    }

    out.push_str(&format!(
        "Pipeline {} in {:.2}s ({} jobs)\n",
        report.status,
        report.duration.as_secs_f64(),
        report.records.len()
    ));
    out
}
