//! CLI for the flowline engine
//!
//! - `check`: validate a pipeline definition
//! - `plan`: evaluate rules for a context and print the stage plan
//! - `run`: execute a pipeline with the local shell dispatcher
//! - `completions`: generate shell completions

pub mod check;
pub mod completions;
pub mod plan;
pub mod run;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for flowline
#[derive(Parser, Debug)]
#[command(name = "flowline")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a pipeline definition
    Check {
        /// Definition file to validate
        file: PathBuf,
    },

    /// Evaluate rules for a trigger context and print the execution plan
    Plan {
        /// Definition file to plan
        file: PathBuf,

        #[command(flatten)]
        context: ContextArgs,

        /// Print the stage graph in DOT format instead of the plan
        #[arg(long)]
        dot: bool,
    },

    /// Execute a pipeline with the local shell dispatcher
    Run {
        /// Definition file to run
        file: PathBuf,

        #[command(flatten)]
        context: ContextArgs,

        /// Worker capacity for intra-stage parallelism
        #[arg(long)]
        workers: Option<usize>,

        /// Default job timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Shell command line used to execute script lines
        #[arg(long)]
        shell: Option<String>,

        /// Root directory for per-job workdirs
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Report format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
    },

    /// Generate shell completions
    Completions {
        /// Shell type
        #[arg(value_enum)]
        shell: ShellArg,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Trigger-context flags shared by `plan` and `run`
#[derive(clap::Args, Debug, Clone)]
struct ContextArgs {
    /// Project identity (namespace/name)
    #[arg(long, default_value = "local/project")]
    project: String,

    /// Pipeline source: push, merge_request, schedule, web, api
    #[arg(long, default_value = "push")]
    source: String,

    /// Commit branch
    #[arg(long)]
    branch: Option<String>,

    /// Commit tag
    #[arg(long)]
    tag: Option<String>,

    /// Default branch of the project
    #[arg(long, default_value = "main")]
    default_branch: String,

    /// Merge-request identifier
    #[arg(long)]
    merge_request: Option<u64>,

    /// Merge-request source branch
    #[arg(long)]
    source_branch: Option<String>,

    /// Merge-request target branch
    #[arg(long)]
    target_branch: Option<String>,

    /// Changed file path (repeatable; omit entirely for an unknown set)
    #[arg(long = "changed-file")]
    changed_files: Vec<String>,

    /// Extra context variable as KEY=VALUE (repeatable)
    #[arg(long = "var", value_parser = parse_var)]
    vars: Vec<(String, String)>,
}

impl ContextArgs {
    fn into_context(self) -> Result<flowline::pipeline::TriggerContext> {
        let source = self
            .source
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        Ok(flowline::pipeline::TriggerContext {
            project: self.project,
            source,
            default_branch: self.default_branch,
            commit_branch: self.branch,
            commit_tag: self.tag,
            merge_request_iid: self.merge_request,
            source_branch: self.source_branch,
            target_branch: self.target_branch,
            changed_files: if self.changed_files.is_empty() {
                None
            } else {
                Some(self.changed_files)
            },
            extra: self.vars.into_iter().collect(),
        })
    }
}

fn parse_var(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{value}'"))
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ShellArg {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

/// Build the CLI command for completion generation
pub fn build_cli() -> clap::Command {
    Args::command()
}

/// Parse and execute CLI arguments
pub fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Check { file } => {
            check::check_pipeline(&file)?;
        }
        Command::Plan { file, context, dot } => {
            plan::plan_pipeline(&file, context.into_context()?, dot)?;
        }
        Command::Run {
            file,
            context,
            workers,
            timeout,
            shell,
            workdir,
            format,
        } => {
            // Flags override the engine defaults.
            let config = flowline::EngineConfig::default();
            let options = run::RunOptions {
                workers: workers.unwrap_or(config.workers),
                timeout_secs: timeout.unwrap_or(config.default_timeout_secs),
                shell: shell.unwrap_or_else(|| config.shell.clone()),
                workdir: workdir.or_else(|| Some(PathBuf::from(&config.workdir_root))),
                json: format == ReportFormat::Json,
            };
            run::run_pipeline(&file, context.into_context()?, options)?;
        }
        Command::Completions { shell, output } => {
            use clap_complete::Shell;

            let shell_enum = match shell {
                ShellArg::Bash => Shell::Bash,
                ShellArg::Zsh => Shell::Zsh,
                ShellArg::Fish => Shell::Fish,
                ShellArg::PowerShell => Shell::PowerShell,
            };

            let generated = completions::generate_completions(shell_enum)?;

            if let Some(output_path) = output {
                completions::save_completions(&generated, &output_path)?;
            } else {
                println!("{generated}");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline::pipeline::PipelineSource;

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("KEY=value").unwrap(),
            ("KEY".to_string(), "value".to_string())
        );
        assert!(parse_var("novalue").is_err());
    }

    #[test]
    fn test_context_args_lowering() {
        let args = ContextArgs {
            project: "group/project".to_string(),
            source: "merge_request".to_string(),
            branch: None,
            tag: None,
            default_branch: "main".to_string(),
            merge_request: Some(12),
            source_branch: Some("feature".to_string()),
            target_branch: Some("main".to_string()),
            changed_files: vec!["docs/index.md".to_string()],
            vars: vec![("NIGHTLY".to_string(), "1".to_string())],
        };

        let ctx = args.into_context().unwrap();
        assert_eq!(ctx.source, PipelineSource::MergeRequest);
        assert_eq!(ctx.merge_request_iid, Some(12));
        assert_eq!(ctx.changed_files.as_deref(), Some(&["docs/index.md".to_string()][..]));
        assert_eq!(ctx.var("NIGHTLY"), Some("1".to_string()));
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli().debug_assert();
    }
}
