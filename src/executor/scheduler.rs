//! Stage-barrier scheduler
//!
//! One control task walks the stage layers in order. Within a layer every
//! dispatchable job is spawned concurrently (bounded by the worker
//! capacity) and the layer is complete only when each of its jobs is
//! terminal. Stage advancement is an explicit synchronization barrier,
//! because gating decisions are only knowable once the prior stage has
//! fully settled. Jobs inside a layer have no ordering guarantee relative
//! to each other.

use crate::executor::artifacts::{ArtifactRef, ArtifactStore};
use crate::executor::record::ExecutionRecord;
use crate::executor::traits::{DispatchRequest, JobExecutor};
use crate::pipeline::context::TriggerContext;
use crate::pipeline::definition::{JobDef, PipelineDef};
use crate::pipeline::errors::EngineError;
use crate::pipeline::graph::StageGraph;
use crate::pipeline::rules::{self, Decision, WhenAction};
use crate::pipeline::types::{FailureCause, PipelineStatus, SkipReason, Validate};
use crate::pipeline::variables::Resolver;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use uuid::Uuid;

/// Sender half of an external cancellation signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Requests cancellation of the run
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Receiver half of an external cancellation signal
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Returns true once cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when cancellation is requested; never resolves if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                futures::future::pending::<()>().await;
            }
        }
    }
}

/// Creates a linked cancellation handle/signal pair
#[must_use]
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Final result of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Pipeline name, when the definition carries one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,

    /// Unique identifier of this run
    pub run_id: String,

    /// Overall outcome
    pub status: PipelineStatus,

    /// Terminal record of every included job, keyed by job name.
    /// Excluded jobs are absent; they were never part of the run.
    pub records: BTreeMap<String, ExecutionRecord>,

    /// Index of every artifact captured during the run
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub artifacts: Vec<ArtifactRef>,

    /// Wall-clock duration of the run
    pub duration: Duration,
}

impl PipelineReport {
    /// Looks up one job's record
    #[must_use]
    pub fn record(&self, job: &str) -> Option<&ExecutionRecord> {
        self.records.get(job)
    }
}

/// A job slot in a dry-run plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedJob {
    /// Job name
    pub name: String,
    /// Effective gating action
    pub when: WhenAction,
}

/// One stage of a dry-run plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLayer {
    /// Stage name
    pub stage: String,
    /// Included jobs
    pub jobs: Vec<PlannedJob>,
}

/// What a run would do, without dispatching anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Non-empty stage layers in execution order
    pub layers: Vec<PlanLayer>,
    /// Jobs excluded by rule evaluation
    pub excluded: Vec<String>,
}

/// Evaluates rules and builds the stage plan for a context, with no side
/// effects. This is the scheduler's selection pass, exposed for dry runs.
///
/// # Errors
///
/// Returns configuration errors from validation or graph construction.
pub fn plan(pipeline: &PipelineDef, context: &TriggerContext) -> Result<ExecutionPlan, EngineError> {
    pipeline.validate().map_err(EngineError::Configuration)?;
    let selection = select_jobs(pipeline, context)?;

    let layers = selection
        .graph
        .layers()
        .iter()
        .map(|layer| PlanLayer {
            stage: layer.stage.clone(),
            jobs: layer
                .jobs
                .iter()
                .map(|name| PlannedJob {
                    name: name.clone(),
                    when: selection.decisions[name].when_action(),
                })
                .collect(),
        })
        .collect();

    Ok(ExecutionPlan {
        layers,
        excluded: selection.excluded,
    })
}

/// Inclusion pass output shared by `plan` and `run`
struct Selection {
    decisions: BTreeMap<String, Decision>,
    excluded: Vec<String>,
    graph: StageGraph,
}

/// Evaluates every job's rules once for the run and stratifies the
/// included set. Inclusion is decided here and never re-evaluated.
fn select_jobs(pipeline: &PipelineDef, context: &TriggerContext) -> Result<Selection, EngineError> {
    let mut decisions = BTreeMap::new();
    let mut included = Vec::new();
    let mut excluded = Vec::new();

    for job in &pipeline.jobs {
        let decision = rules::evaluate(&job.rules, context);
        if decision.is_included() {
            included.push(job.name.clone());
            decisions.insert(job.name.clone(), decision);
        } else {
            tracing::debug!(job = %job.name, "excluded by rules");
            excluded.push(job.name.clone());
        }
    }

    let graph = StageGraph::build(pipeline, &included)?;
    Ok(Selection {
        decisions,
        excluded,
        graph,
    })
}

/// Result of one job task
struct TaskOutcome {
    attempts: u32,
    result: AttemptResult,
    log: String,
    artifacts: Vec<ArtifactRef>,
}

enum AttemptResult {
    Success,
    Failed(FailureCause),
    Canceled,
}

/// Stage-barrier scheduler for one pipeline at a time
pub struct Scheduler {
    executor: Arc<dyn JobExecutor>,
    workers: usize,
    default_timeout: Duration,
    workdir_root: PathBuf,
    cancel: Option<CancelSignal>,
}

impl Scheduler {
    /// Creates a scheduler dispatching through the given executor
    #[must_use]
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self {
            executor,
            workers: 4,
            default_timeout: Duration::from_secs(3600),
            workdir_root: std::env::temp_dir().join("flowline"),
            cancel: None,
        }
    }

    /// Sets the worker capacity bounding intra-stage parallelism
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the timeout applied to jobs that declare none
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the directory under which per-job workdirs are created
    #[must_use]
    pub fn with_workdir_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workdir_root = root.into();
        self
    }

    /// Attaches an external cancellation signal
    #[must_use]
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Runs the pipeline to completion and reports every included job's
    /// terminal state.
    ///
    /// # Errors
    ///
    /// Configuration errors abort the run before anything is dispatched.
    /// Job-level failures never surface here; they are recorded and fold
    /// into the report status.
    pub async fn run(
        &self,
        pipeline: &PipelineDef,
        context: &TriggerContext,
    ) -> Result<PipelineReport, EngineError> {
        self.run_with_store(pipeline, context, Arc::new(ArtifactStore::new()))
            .await
    }

    /// Like [`Scheduler::run`], capturing artifacts into an externally
    /// owned store so downstream consumers can fetch the bytes after the
    /// run. Pass a fresh store per run: artifacts are never visible
    /// across separate runs.
    ///
    /// # Errors
    ///
    /// Same contract as [`Scheduler::run`].
    pub async fn run_with_store(
        &self,
        pipeline: &PipelineDef,
        context: &TriggerContext,
        store: Arc<ArtifactStore>,
    ) -> Result<PipelineReport, EngineError> {
        pipeline.validate().map_err(EngineError::Configuration)?;

        let run_id = Uuid::new_v4().to_string();
        let selection = select_jobs(pipeline, context)?;
        let resolver = Resolver::new(&run_id, context.variables());
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let started = Instant::now();

        tracing::info!(
            run_id = %run_id,
            jobs = selection.decisions.len(),
            excluded = selection.excluded.len(),
            "starting pipeline run"
        );

        let mut records: BTreeMap<String, ExecutionRecord> = selection
            .graph
            .layers()
            .iter()
            .flat_map(|layer| {
                layer
                    .jobs
                    .iter()
                    .map(move |j| (layer.stage.clone(), j.clone()))
            })
            .map(|(stage, job)| (job.clone(), ExecutionRecord::new(job, stage)))
            .collect();

        let mut gate: Option<String> = None;
        let mut canceled = false;

        for layer in selection.graph.layers() {
            if canceled || self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled) {
                canceled = true;
                break;
            }

            tracing::info!(stage = %layer.stage, jobs = layer.jobs.len(), "entering stage");
            let mut handles = Vec::new();

            for name in &layer.jobs {
                let decision = &selection.decisions[name];
                let when = decision.when_action();
                let record = records
                    .get_mut(name)
                    .ok_or_else(|| EngineError::Io(format!("missing record for job '{name}'")))?;

                if when == WhenAction::Never {
                    record.mark_skipped(SkipReason::RuleNever);
                    continue;
                }
                if let Some(ref failed_stage) = gate
                    && when != WhenAction::Always
                {
                    tracing::info!(job = %name, upstream = %failed_stage, "gated by upstream failure");
                    record.mark_skipped(SkipReason::UpstreamFailed {
                        stage: failed_stage.clone(),
                    });
                    continue;
                }

                // Present in the layer, therefore present in the pipeline.
                let Some(job) = pipeline.job(name).cloned() else {
                    continue;
                };
                let overrides = decision.variable_overrides();
                let variables = match resolver.resolve(pipeline, &job, &overrides) {
                    Ok(vars) => vars,
                    Err(EngineError::UnresolvedVariable { job: j, name: var }) => {
                        tracing::error!(job = %j, variable = %var, "failed before dispatch");
                        record.mark_failed(FailureCause::UnresolvedVariable { name: var }, 0);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let workdir = self.workdir_root.join(&run_id).join(&job.name);
                let request = DispatchRequest {
                    job: job.name.clone(),
                    stage: job.stage.clone(),
                    image: pipeline.effective_image(&job),
                    script: job.script.clone(),
                    variables,
                    tags: pipeline.effective_tags(&job),
                    services: job.services.clone(),
                    artifact_globs: job.artifacts.paths.clone(),
                    workdir,
                };

                record.mark_running();
                handles.push((
                    name.clone(),
                    tokio::spawn(run_job(
                        job,
                        request,
                        Arc::clone(&self.executor),
                        Arc::clone(&store),
                        Arc::clone(&semaphore),
                        self.default_timeout,
                        self.cancel.clone(),
                    )),
                ));
            }

            // Stage barrier: the layer settles before gating is decided.
            let (names, futures): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
            let outcomes = join_all(futures).await;

            for (name, joined) in names.into_iter().zip(outcomes) {
                let record = records
                    .get_mut(&name)
                    .ok_or_else(|| EngineError::Io(format!("missing record for job '{name}'")))?;
                match joined {
                    Err(e) => {
                        record.mark_failed(
                            FailureCause::Dispatch {
                                message: e.to_string(),
                            },
                            0,
                        );
                    }
                    Ok(task) => {
                        record.log = task.log;
                        record.artifacts = task.artifacts;
                        match task.result {
                            AttemptResult::Success => record.mark_success(task.attempts),
                            AttemptResult::Failed(cause) => {
                                record.mark_failed(cause, task.attempts);
                            }
                            AttemptResult::Canceled => {
                                record.mark_skipped(SkipReason::Canceled);
                                canceled = true;
                            }
                        }
                    }
                }
                tracing::info!(job = %name, status = %record.status, "job settled");
            }

            if gate.is_none()
                && layer
                    .jobs
                    .iter()
                    .any(|j| records.get(j).is_some_and(|r| r.status.is_failed()))
            {
                tracing::warn!(stage = %layer.stage, "stage failed; gating downstream stages");
                gate = Some(layer.stage.clone());
            }
        }

        if canceled {
            for record in records.values_mut() {
                if !record.is_terminal() {
                    record.mark_skipped(SkipReason::Canceled);
                }
            }
        }

        let status = if canceled {
            PipelineStatus::Canceled
        } else if records.values().any(|r| r.status.is_failed()) {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Success
        };

        let report = PipelineReport {
            pipeline: pipeline.name.clone(),
            run_id,
            status,
            records,
            artifacts: store.index(),
            duration: started.elapsed(),
        };
        tracing::info!(
            run_id = %report.run_id,
            status = %report.status,
            duration_ms = report.duration.as_millis(),
            "pipeline run finished"
        );
        Ok(report)
    }
}

/// Runs one job to a terminal state: retry loop, per-attempt timeout,
/// artifact capture, cancellation.
async fn run_job(
    job: JobDef,
    request: DispatchRequest,
    executor: Arc<dyn JobExecutor>,
    store: Arc<ArtifactStore>,
    semaphore: Arc<Semaphore>,
    default_timeout: Duration,
    mut cancel: Option<CancelSignal>,
) -> TaskOutcome {
    let Ok(_permit) = semaphore.acquire_owned().await else {
        return TaskOutcome {
            attempts: 0,
            result: AttemptResult::Failed(FailureCause::Dispatch {
                message: "worker pool shut down".to_string(),
            }),
            log: String::new(),
            artifacts: Vec::new(),
        };
    };

    let timeout = job.timeout.unwrap_or(default_timeout);
    let total_attempts = job.retry + 1;
    let mut attempts = 0;
    let mut log = String::new();

    while attempts < total_attempts {
        attempts += 1;

        let attempt = tokio::time::timeout(timeout, executor.execute(request.clone()));
        let outcome = match cancel {
            Some(ref mut signal) => {
                tokio::select! {
                    () = signal.cancelled() => {
                        return TaskOutcome {
                            attempts,
                            result: AttemptResult::Canceled,
                            log,
                            artifacts: Vec::new(),
                        };
                    }
                    result = attempt => result,
                }
            }
            None => attempt.await,
        };

        let cause = match outcome {
            Ok(Ok(dispatch)) if dispatch.is_success() => {
                let capture = store.capture(&job.name, &job.artifacts.paths, &request.workdir);
                return TaskOutcome {
                    attempts,
                    result: AttemptResult::Success,
                    log: dispatch.log,
                    artifacts: capture.captured,
                };
            }
            Ok(Ok(dispatch)) => {
                log = dispatch.log;
                FailureCause::Script {
                    exit_code: dispatch.exit_code,
                }
            }
            Ok(Err(e)) => FailureCause::Dispatch {
                message: e.to_string(),
            },
            Err(_) => FailureCause::Timeout {
                limit_secs: timeout.as_secs(),
            },
        };

        if attempts < total_attempts {
            tracing::warn!(
                job = %job.name,
                attempt = attempts,
                total = total_attempts,
                cause = %cause,
                "attempt failed, retrying"
            );
            continue;
        }

        let artifacts = if job.artifacts.on_failure {
            store
                .capture(&job.name, &job.artifacts.paths, &request.workdir)
                .captured
        } else {
            Vec::new()
        };
        return TaskOutcome {
            attempts,
            result: AttemptResult::Failed(cause),
            log,
            artifacts,
        };
    }

    // Retry budget arithmetic guarantees the loop returns; this arm is
    // unreachable with total_attempts >= 1.
    TaskOutcome {
        attempts,
        result: AttemptResult::Failed(FailureCause::Dispatch {
            message: "no attempt was made".to_string(),
        }),
        log,
        artifacts: Vec::new(),
    }
}
