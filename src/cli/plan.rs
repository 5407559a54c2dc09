//! `flowline plan` - Dry-run rule evaluation and stage planning

use flowline::executor;
use flowline::infrastructure::loader;
use flowline::pipeline::{StageGraph, TriggerContext, rules};
use anyhow::{Context, Result};
use std::path::Path;

/// Prints the execution plan (or the DOT graph) for a definition and context
pub fn plan_pipeline(file: &Path, context: TriggerContext, dot: bool) -> Result<()> {
    let pipeline = loader::load_path(file)
        .with_context(|| format!("Failed to load pipeline from: {}", file.display()))?;

    if dot {
        let included: Vec<String> = pipeline
            .jobs
            .iter()
            .filter(|job| rules::evaluate(&job.rules, &context).is_included())
            .map(|job| job.name.clone())
            .collect();
        let graph = StageGraph::build(&pipeline, &included)?;
        print!("{}", graph.to_dot());
        return Ok(());
    }

    let plan = executor::plan(&pipeline, &context)?;
    print!("{}", render_plan(&plan));
    Ok(())
}

fn render_plan(plan: &executor::ExecutionPlan) -> String {
    let mut out = String::new();

    if plan.layers.is_empty() {
        out.push_str("Nothing to run: every job was excluded by its rules.\n");
    }
    for (i, layer) in plan.layers.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, layer.stage));
        for job in &layer.jobs {
            out.push_str(&format!("   - {} (when: {})\n", job.name, job.when));
        }
    }
    if !plan.excluded.is_empty() {
        out.push_str(&format!("Excluded: {}\n", plan.excluded.join(", ")));
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline::executor::{ExecutionPlan, PlanLayer, PlannedJob};
    use flowline::pipeline::WhenAction;

    #[test]
    fn test_render_plan() {
        let plan = ExecutionPlan {
            layers: vec![
                PlanLayer {
                    stage: "build".to_string(),
                    jobs: vec![PlannedJob {
                        name: "compile".to_string(),
                        when: WhenAction::OnSuccess,
                    }],
                },
                PlanLayer {
                    stage: "release".to_string(),
                    jobs: vec![PlannedJob {
                        name: "cleanup".to_string(),
                        when: WhenAction::Always,
                    }],
                },
            ],
            excluded: vec!["docs".to_string()],
        };

        let rendered = render_plan(&plan);
        assert!(rendered.contains("1. build"));
        assert!(rendered.contains("- compile (when: on_success)"));
        assert!(rendered.contains("- cleanup (when: always)"));
        assert!(rendered.contains("Excluded: docs"));
    }

    #[test]
    fn test_render_empty_plan() {
        let plan = ExecutionPlan {
            layers: Vec::new(),
            excluded: Vec::new(),
        };
        assert!(render_plan(&plan).contains("Nothing to run"));
    }
}
