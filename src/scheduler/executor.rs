//! Plan executor: drives a built plan to completion or first terminal
//! failure.
//!
//! A coordinator loop claims ready steps (every predecessor executed) with
//! an atomic status transition, so each step is dispatched exactly once,
//! and runs them on spawned tasks bounded by a semaphore sized to
//! `min(jobs, project count)`. Mojos within one step always run strictly
//! serially in priority order; parallelism exists only between steps with
//! no path between them. Edges are never touched at runtime; only step
//! status and skip flags change.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::errors::BuildError;
use crate::mojo::{MojoExecution, MojoExecutor, MojoOutcome};
use crate::plan::{BuildPlan, PlanLogger, SETUP, StepIndex, StepStatus, TEARDOWN};
use crate::project::{ExecutedProject, ProjectKey};
use crate::scheduler::output::BuildOutput;
use crate::scheduler::result::{BuildResult, ExecutionTimer, ProjectResult, ProjectStatus};

/// Failure propagation policy for the whole reactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureBehavior {
    /// Stop scheduling new steps on the first failure; in-flight steps
    /// finish.
    #[default]
    FailFast,
    /// Keep scheduling steps whose predecessors all succeeded; report the
    /// aggregate at the end.
    FailAtEnd,
    /// Downgrade every mojo failure to a warning and keep going.
    FailNever,
}

/// Configuration for the plan executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Requested degree of concurrency; capped by the project count.
    pub jobs: usize,
    pub failure_behavior: FailureBehavior,
    /// Render the plan before executing it.
    pub verbose: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            jobs: 1,
            failure_behavior: FailureBehavior::default(),
            verbose: false,
        }
    }
}

impl ExecutorConfig {
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    pub fn with_failure_behavior(mut self, behavior: FailureBehavior) -> Self {
        self.failure_behavior = behavior;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Events emitted during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepEvent {
    StepStarted {
        project: String,
        step: String,
    },
    StepCompleted {
        project: String,
        step: String,
        status: StepStatus,
    },
    ProjectStarted {
        project: String,
    },
    ProjectCompleted {
        project: String,
        status: ProjectStatus,
    },
    BuildCompleted {
        success: bool,
        halted: bool,
    },
}

/// What running one step produced.
enum StepDisposition {
    Executed,
    Failed(String),
    /// Fail-never: a mojo failed but the step was forced to `Executed`.
    ForcedExecuted(String),
}

/// Drives a [`BuildPlan`] against a [`MojoExecutor`] capability.
pub struct PlanExecutor {
    config: ExecutorConfig,
    halted: Arc<AtomicBool>,
    event_tx: Option<mpsc::Sender<StepEvent>>,
}

impl PlanExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            halted: Arc::new(AtomicBool::new(false)),
            event_tx: None,
        }
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<StepEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Shared abort flag. Setting it stops new steps from becoming
    /// eligible; in-flight steps finish (cancellation acts at step
    /// boundaries only).
    pub fn halt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.halted)
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Execute the plan to completion, a terminal failure, or a halt.
    pub async fn execute(
        &self,
        plan: Arc<BuildPlan>,
        mojo_executor: Arc<dyn MojoExecutor>,
    ) -> Result<BuildResult, BuildError> {
        let timer = ExecutionTimer::start();
        let output = Arc::new(BuildOutput::new(&plan));
        let threads = self.config.jobs.max(1).min(plan.projects().len().max(1));
        let semaphore = Arc::new(Semaphore::new(threads));

        if self.config.verbose {
            print!("{}", PlanLogger::render(&plan));
        }
        debug!(steps = plan.len(), threads, "executing build plan");

        let mut tasks: JoinSet<(StepIndex, StepDisposition)> = JoinSet::new();
        let mut clocks: HashMap<ProjectKey, Instant> = HashMap::new();
        let mut causes: HashMap<ProjectKey, String> = HashMap::new();
        let mut durations: HashMap<ProjectKey, Duration> = HashMap::new();
        let mut internal_error: Option<anyhow::Error> = None;

        loop {
            if !self.is_halted() && internal_error.is_none() {
                self.dispatch_ready(
                    &plan,
                    &mut tasks,
                    &semaphore,
                    &mojo_executor,
                    &output,
                    &mut clocks,
                )
                .await;
            }
            match tasks.join_next().await {
                None => break,
                Some(Ok((idx, disposition))) => {
                    self.handle_completion(
                        &plan,
                        idx,
                        disposition,
                        &output,
                        &clocks,
                        &mut causes,
                        &mut durations,
                    )
                    .await;
                }
                Some(Err(join_error)) => {
                    // a worker bug, not a mojo failure: abort like fail-fast
                    // but let in-flight steps drain with the plan intact
                    self.halted.store(true, Ordering::Release);
                    internal_error
                        .get_or_insert_with(|| anyhow!("scheduler worker failed: {join_error}"));
                }
            }
        }

        output.flush_remaining();

        if let Some(error) = internal_error {
            return Err(BuildError::Internal(error));
        }

        let result = self.collect_results(&plan, &causes, &durations, timer.elapsed());
        self.emit(StepEvent::BuildCompleted {
            success: result.success(),
            halted: result.halted,
        })
        .await;
        Ok(result)
    }

    /// Claim and spawn every step whose predecessors have all executed.
    /// The `Created → Scheduled` (or `Planning → Scheduled`) transition is
    /// the claim; a step that loses the race is already someone else's.
    async fn dispatch_ready(
        &self,
        plan: &Arc<BuildPlan>,
        tasks: &mut JoinSet<(StepIndex, StepDisposition)>,
        semaphore: &Arc<Semaphore>,
        mojo_executor: &Arc<dyn MojoExecutor>,
        output: &Arc<BuildOutput>,
        clocks: &mut HashMap<ProjectKey, Instant>,
    ) {
        for idx in 0..plan.len() {
            let step = plan.step(idx);
            if !matches!(step.status(), StepStatus::Created | StepStatus::Planning) {
                continue;
            }
            let ready = plan
                .predecessors(idx)
                .iter()
                .all(|&p| plan.step(p).status() == StepStatus::Executed);
            if !ready {
                continue;
            }
            if !(step.transition(StepStatus::Created, StepStatus::Scheduled)
                || step.transition(StepStatus::Planning, StepStatus::Scheduled))
            {
                continue;
            }

            if step.name == SETUP {
                clocks.entry(step.project.clone()).or_insert_with(Instant::now);
            }
            debug!(project = %step.project, step = %step.name, "step scheduled");
            self.emit(StepEvent::StepStarted {
                project: step.project.to_string(),
                step: step.name.clone(),
            })
            .await;

            let plan = Arc::clone(plan);
            let semaphore = Arc::clone(semaphore);
            let mojo_executor = Arc::clone(mojo_executor);
            let output = Arc::clone(output);
            let behavior = self.config.failure_behavior;
            tasks.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("scheduler semaphore closed");
                let disposition =
                    run_step(&plan, idx, mojo_executor.as_ref(), &output, behavior).await;
                (idx, disposition)
            });
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn handle_completion(
        &self,
        plan: &Arc<BuildPlan>,
        idx: StepIndex,
        disposition: StepDisposition,
        output: &Arc<BuildOutput>,
        clocks: &HashMap<ProjectKey, Instant>,
        causes: &mut HashMap<ProjectKey, String>,
        durations: &mut HashMap<ProjectKey, Duration>,
    ) {
        let step = plan.step(idx);
        let project = step.project.clone();
        let elapsed = clocks.get(&project).map(Instant::elapsed).unwrap_or_default();

        match disposition {
            StepDisposition::Executed => {
                self.emit(StepEvent::StepCompleted {
                    project: project.to_string(),
                    step: step.name.clone(),
                    status: StepStatus::Executed,
                })
                .await;
                if step.name == SETUP {
                    self.emit(StepEvent::ProjectStarted {
                        project: project.to_string(),
                    })
                    .await;
                } else if step.name == TEARDOWN {
                    durations.insert(project.clone(), elapsed);
                    output.flush(&project);
                    self.emit(StepEvent::ProjectCompleted {
                        project: project.to_string(),
                        status: ProjectStatus::Succeeded,
                    })
                    .await;
                }
            }
            StepDisposition::ForcedExecuted(cause) => {
                warn!(project = %project, step = %step.name, %cause, "failure ignored (fail-never)");
                causes.entry(project).or_insert(cause);
                self.emit(StepEvent::StepCompleted {
                    project: step.project.to_string(),
                    step: step.name.clone(),
                    status: StepStatus::Executed,
                })
                .await;
            }
            StepDisposition::Failed(cause) => {
                causes.entry(project.clone()).or_insert(cause);
                durations.insert(project.clone(), elapsed);
                output.flush(&project);
                self.emit(StepEvent::StepCompleted {
                    project: project.to_string(),
                    step: step.name.clone(),
                    status: StepStatus::Failed,
                })
                .await;
                self.emit(StepEvent::ProjectCompleted {
                    project: project.to_string(),
                    status: ProjectStatus::Failed,
                })
                .await;

                skip_successors(plan, idx);
                if self.config.failure_behavior == FailureBehavior::FailFast {
                    self.halted.store(true, Ordering::Release);
                }
            }
        }
    }

    fn collect_results(
        &self,
        plan: &BuildPlan,
        causes: &HashMap<ProjectKey, String>,
        durations: &HashMap<ProjectKey, Duration>,
        total: Duration,
    ) -> BuildResult {
        let mut projects = Vec::new();
        let mut any_failed = false;

        for key in plan.projects() {
            let failed = plan
                .steps_of(key)
                .into_iter()
                .any(|i| plan.step(i).status() == StepStatus::Failed);
            let completed = plan
                .step_index(key, TEARDOWN)
                .map(|i| plan.step(i).status() == StepStatus::Executed)
                .unwrap_or(false);
            let status = if failed {
                any_failed = true;
                ProjectStatus::Failed
            } else if completed {
                ProjectStatus::Succeeded
            } else {
                ProjectStatus::Skipped
            };
            projects.push(ProjectResult {
                project: key.clone(),
                status,
                duration: durations.get(key).copied().unwrap_or_default(),
                cause: causes.get(key).cloned(),
            });
        }

        BuildResult {
            projects,
            halted: any_failed || self.is_halted(),
            duration: total,
        }
    }

    async fn emit(&self, event: StepEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}

/// Run one step: sentinels carry coordination only; phase steps run their
/// mojo executions strictly serially in priority order, each mojo's forked
/// executions first (against a forked project view), then the mojo itself.
async fn run_step(
    plan: &BuildPlan,
    idx: StepIndex,
    mojo_executor: &dyn MojoExecutor,
    output: &BuildOutput,
    behavior: FailureBehavior,
) -> StepDisposition {
    let step = plan.step(idx);
    let log = output.log(&step.project);
    let mut forced_cause: Option<String> = None;

    if !step.is_sentinel() {
        let main_view = ExecutedProject::Main(step.project.clone());
        'mojos: for mojo in step.executions() {
            let mut units: Vec<(ExecutedProject, &MojoExecution)> = Vec::new();
            for (label, forked) in &mojo.forked_executions {
                let view = ExecutedProject::Forked {
                    project: step.project.clone(),
                    fork: label.clone(),
                };
                for nested in forked {
                    units.push((view.clone(), nested));
                }
            }
            units.push((main_view.clone(), &mojo));

            for (view, execution) in units {
                match mojo_executor.execute(&view, execution, log).await {
                    MojoOutcome::Success => {}
                    MojoOutcome::Skip => {
                        // the executor requires the remaining work of this
                        // step to be skipped; the step still satisfies its
                        // successors
                        step.skip();
                        break 'mojos;
                    }
                    MojoOutcome::Failure(cause) => {
                        if behavior == FailureBehavior::FailNever {
                            log.warn(format!(
                                "goal {} failed: {cause} (continuing)",
                                execution.label()
                            ));
                            forced_cause.get_or_insert(cause);
                        } else {
                            step.transition(StepStatus::Scheduled, StepStatus::Failed);
                            return StepDisposition::Failed(cause);
                        }
                    }
                }
            }
        }
    }

    step.transition(StepStatus::Scheduled, StepStatus::Executed);
    match forced_cause {
        Some(cause) => StepDisposition::ForcedExecuted(cause),
        None => StepDisposition::Executed,
    }
}

/// Recursively mark everything downstream of a failed step as skipped.
/// Steps already claimed by a worker are left alone; nothing is skipped
/// after it has been scheduled.
fn skip_successors(plan: &BuildPlan, idx: StepIndex) {
    let mut visited = HashSet::new();
    let mut stack: Vec<StepIndex> = plan.successors(idx).to_vec();
    while let Some(next) = stack.pop() {
        if !visited.insert(next) {
            continue;
        }
        let step = plan.step(next);
        if matches!(step.status(), StepStatus::Created | StepStatus::Planning) {
            step.skip();
            stack.extend_from_slice(plan.successors(next));
        }
    }
}
