//! Stage-stratified job graph
//!
//! The declared stage order induces every dependency in this domain:
//! there are no per-job edges, only the rule that all jobs of stage N
//! finish before any job of stage N+1 starts. The graph is therefore
//! built in layers, one per stage with at least one included job, with
//! edges from every job of a layer to every job of the next layer. A
//! stage with zero included jobs contributes no layer and never blocks
//! its successors.

use crate::pipeline::definition::PipelineDef;
use crate::pipeline::errors::ConfigurationError;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// One synchronization layer of the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageLayer {
    /// Stage name
    pub stage: String,
    /// Included jobs of this stage, in declaration order
    pub jobs: Vec<String>,
}

/// Directed acyclic graph of the included jobs
#[derive(Debug, Clone)]
pub struct StageGraph {
    graph: DiGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    layers: Vec<StageLayer>,
}

impl StageGraph {
    /// Builds the graph for the given included job names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnknownStage`] when an included job
    /// names a stage missing from the pipeline's stage list.
    pub fn build(pipeline: &PipelineDef, included: &[String]) -> Result<Self, ConfigurationError> {
        let mut per_stage: Vec<Vec<String>> = vec![Vec::new(); pipeline.stages.len()];

        for name in included {
            let stage = pipeline
                .job(name)
                .map(|job| job.stage.clone())
                .unwrap_or_default();
            match pipeline.stage_index(&stage) {
                Some(idx) => per_stage[idx].push(name.clone()),
                None => {
                    return Err(ConfigurationError::UnknownStage {
                        job: name.clone(),
                        stage,
                    });
                }
            }
        }

        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut layers = Vec::new();

        for (stage_idx, jobs) in per_stage.iter().enumerate() {
            if jobs.is_empty() {
                continue;
            }
            for job in jobs {
                let node = graph.add_node(job.clone());
                index.insert(job.clone(), node);
            }
            layers.push(StageLayer {
                stage: pipeline.stages[stage_idx].clone(),
                jobs: jobs.clone(),
            });
        }

        // Every job of a layer precedes every job of the next layer;
        // consecutive layers already encode the full stage order
        // transitively.
        for window in layers.windows(2) {
            for from in &window[0].jobs {
                for to in &window[1].jobs {
                    graph.add_edge(index[from], index[to], ());
                }
            }
        }

        Ok(Self {
            graph,
            index,
            layers,
        })
    }

    /// Synchronization layers in stage order
    #[must_use]
    pub fn layers(&self) -> &[StageLayer] {
        &self.layers
    }

    /// Number of included jobs
    #[must_use]
    pub fn job_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of ordering edges
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns true when the graph orders `from` before `to` directly
    #[must_use]
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(a), Some(b)) => self.graph.contains_edge(*a, *b),
            _ => false,
        }
    }

    /// Renders the graph in DOT format for external visualization
    #[must_use]
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n");

        for edge in self.graph.edge_indices() {
            if let Some((from, to)) = self.graph.edge_endpoints(edge) {
                out.push_str(&format!(
                    "    \"{}\" -> \"{}\";\n",
                    self.graph[from], self.graph[to]
                ));
            }
        }
        for layer in &self.layers {
            for job in &layer.jobs {
                if self
                    .index
                    .get(job)
                    .is_some_and(|n| self.graph.neighbors_undirected(*n).count() == 0)
                {
                    out.push_str(&format!("    \"{job}\";\n"));
                }
            }
        }

        out.push_str("}\n");
        out
    }
}


#[cfg(test)]
mod properties {
    use super::*;
    use crate::pipeline::definition::{JobBuilder, PipelineDef};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn graph_is_always_stage_stratified(
            // Up to four stages with 0..3 included jobs each.
            counts in proptest::collection::vec(0usize..3, 1..5)
        ) {
            let mut builder = PipelineDef::builder();
            let mut included = Vec::new();
            for (s, count) in counts.iter().enumerate() {
                let stage = format!("stage{s}");
                builder = builder.stage(stage.clone());
                for j in 0..*count {
                    let name = format!("job{s}x{j}");
                    builder = builder.job(
                        JobBuilder::new(&name, &stage).script("true").build_unchecked(),
                    );
                    included.push(name);
                }
            }
            let pipeline = builder.build_unchecked();
            let graph = StageGraph::build(&pipeline, &included).unwrap();

            // No edge connects two jobs of the same layer, and every pair
            // of consecutive layers is fully connected.
            for layer in graph.layers() {
                for a in &layer.jobs {
                    for b in &layer.jobs {
                        prop_assert!(!graph.has_edge(a, b));
                    }
                }
            }
            for window in graph.layers().windows(2) {
                for a in &window[0].jobs {
                    for b in &window[1].jobs {
                        prop_assert!(graph.has_edge(a, b));
                        prop_assert!(!graph.has_edge(b, a));
                    }
                }
            }
        }
    }
}
