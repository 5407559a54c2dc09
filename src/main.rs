//! flowline - CLI for the stage-gated pipeline execution engine
//!
//! ## Commands
//!
//! - `flowline check` - Validate a pipeline definition
//! - `flowline plan` - Evaluate rules for a context and print the plan
//! - `flowline run` - Execute a pipeline with the local shell dispatcher
//! - `flowline completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Validate a definition
//! flowline check .pipeline.yml
//!
//! # What would a merge-request run do?
//! flowline plan .pipeline.yml --source merge_request --merge-request 42
//!
//! # Run it
//! flowline run .pipeline.yml --branch main
//! ```

use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    flowline::init_logging("info");

    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if std::env::var("FLOWLINE_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
