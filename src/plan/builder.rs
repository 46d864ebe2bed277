//! Plan builder: materializes steps and edges from the static inputs.
//!
//! The builder consumes a validated reactor, the lifecycle registry and the
//! requested task list, and produces a [`BuildPlan`]. Everything that can
//! fail is checked before the first step is created, and every problem
//! found is reported in one aggregate error.
//!
//! Construction order: task segments (intra-project phase chains, sequenced
//! per project), mojo attachment (forks resolved eagerly into nested
//! execution lists), inter-project dependency edges, the skip pass for
//! workless phases, and finally the per-project sentinel steps.

use std::collections::HashMap;

use crate::errors::PlanError;
use crate::lifecycle::{Lifecycle, LifecycleRegistry};
use crate::mojo::{Fork, MojoBinding, MojoExecution};
use crate::plan::plan::BuildPlan;
use crate::plan::step::{BuildStep, PLAN, SETUP, StepIndex, TEARDOWN};
use crate::project::{Project, ProjectKey, Reactor};

/// A parsed top-level task.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Task {
    /// A lifecycle phase name (possibly an alias).
    Phase(String),
    /// A direct `prefix:goal` invocation.
    Goal { prefix: String, goal: String },
}

impl Task {
    fn parse(task: &str) -> Task {
        match task.split_once(':') {
            Some((prefix, goal)) if !prefix.is_empty() && !goal.is_empty() => Task::Goal {
                prefix: prefix.to_string(),
                goal: goal.to_string(),
            },
            _ => Task::Phase(task.to_string()),
        }
    }
}

/// Builds a [`BuildPlan`] from a reactor and a task list.
pub struct PlanBuilder<'a> {
    reactor: &'a Reactor,
    registry: &'a LifecycleRegistry,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(reactor: &'a Reactor, registry: &'a LifecycleRegistry) -> Self {
        Self { reactor, registry }
    }

    /// Construct the plan for the requested tasks.
    pub fn build(&self, tasks: &[String]) -> Result<BuildPlan, PlanError> {
        let parsed: Vec<Task> = tasks.iter().map(|t| Task::parse(t)).collect();

        let mut errors = Vec::new();
        self.validate_tasks(&parsed, &mut errors);
        self.validate_bindings(&mut errors);
        if !errors.is_empty() {
            return Err(PlanError::aggregate(errors));
        }

        let mut plan = BuildPlan::new();
        let mut tails: HashMap<ProjectKey, StepIndex> = HashMap::new();
        for task in &parsed {
            match task {
                Task::Phase(name) => {
                    let (lifecycle, end_phase) = self.registry.require_phase(name)?;
                    self.add_phase_segment(&mut plan, &mut tails, lifecycle, end_phase);
                }
                Task::Goal { prefix, goal } => {
                    self.add_goal_segment(&mut plan, &mut tails, prefix, goal)?;
                }
            }
        }

        self.attach_mojos(&plan)?;
        self.wire_dependencies(&mut plan);
        skip_workless_steps(&plan);
        wire_sentinels(&mut plan);

        Ok(plan)
    }

    /// One step per phase up to the requested one, chained in lifecycle
    /// order and sequenced after the project's previous segment.
    fn add_phase_segment(
        &self,
        plan: &mut BuildPlan,
        tails: &mut HashMap<ProjectKey, StepIndex>,
        lifecycle: &Lifecycle,
        end_phase: &str,
    ) {
        for project in self.reactor.projects() {
            let key = project.key();
            let mut first = None;
            let mut prev: Option<StepIndex> = None;
            for spec in lifecycle.phases_up_to(end_phase) {
                let idx = plan.add_step(BuildStep::new(key.clone(), spec.name.as_str()));
                if let Some(p) = prev {
                    plan.execute_after(idx, p);
                }
                first.get_or_insert(idx);
                prev = Some(idx);
            }
            sequence_segment(plan, tails, &key, first, prev);
        }
    }

    /// One step per project named after the goal task, holding the matching
    /// binding's execution under the conventional CLI execution id.
    fn add_goal_segment(
        &self,
        plan: &mut BuildPlan,
        tails: &mut HashMap<ProjectKey, StepIndex>,
        prefix: &str,
        goal: &str,
    ) -> Result<(), PlanError> {
        let name = format!("{prefix}:{goal}");
        for project in self.reactor.projects() {
            let key = project.key();
            let idx = plan.add_step(BuildStep::new(key.clone(), name.as_str()));
            if let Some(binding) = find_goal_binding(project, prefix, goal) {
                let mut execution = self.resolve_execution(project, binding, &mut Vec::new())?;
                execution.execution_id = "default-cli".to_string();
                plan.step(idx).add_mojo(execution, 0);
            }
            sequence_segment(plan, tails, &key, Some(idx), Some(idx));
        }
        Ok(())
    }

    /// Attach every binding whose resolved phase materialized as a step.
    /// Bindings past the requested phase simply do not run.
    fn attach_mojos(&self, plan: &BuildPlan) -> Result<(), PlanError> {
        for project in self.reactor.projects() {
            let key = project.key();
            for binding in &project.mojos {
                let Some((_, canonical)) = self.registry.lifecycle_of(&binding.phase) else {
                    continue;
                };
                if let Some(idx) = plan.step_index(&key, canonical) {
                    let execution = self.resolve_execution(project, binding, &mut Vec::new())?;
                    plan.step(idx).add_mojo(execution, binding.priority);
                }
            }
        }
        Ok(())
    }

    /// Turn a binding into a runtime execution, resolving its fork (if any)
    /// into a nested execution list attached under the fork label. The
    /// top-level edge set is never touched; forks stay local to the mojo.
    fn resolve_execution(
        &self,
        project: &Project,
        binding: &MojoBinding,
        stack: &mut Vec<String>,
    ) -> Result<MojoExecution, PlanError> {
        let mut execution = MojoExecution::from_binding(binding);
        if let Some(fork) = &binding.fork {
            let marker = format!("{}:{}", binding.plugin, binding.goal);
            // a mojo reachable from its own fork is resolved once
            if !stack.contains(&marker) {
                stack.push(marker);
                let forked = match fork {
                    Fork::Goal { goal } => {
                        let target = project
                            .mojos
                            .iter()
                            .find(|b| b.plugin == binding.plugin && b.goal == *goal)
                            .ok_or_else(|| PlanError::UnknownForkTarget {
                                goal: goal.clone(),
                                plugin: binding.plugin.to_string(),
                            })?;
                        vec![self.resolve_execution(project, target, stack)?]
                    }
                    Fork::Phase { phase, lifecycle } => {
                        self.resolve_phase_fork(project, phase, lifecycle.as_deref(), stack)?
                    }
                };
                execution
                    .forked_executions
                    .insert(fork.label().to_string(), forked);
                stack.pop();
            }
        }
        Ok(execution)
    }

    /// Flatten the project's bindings for every phase up to the forked one,
    /// in phase order then priority then declaration order.
    fn resolve_phase_fork(
        &self,
        project: &Project,
        phase: &str,
        lifecycle_id: Option<&str>,
        stack: &mut Vec<String>,
    ) -> Result<Vec<MojoExecution>, PlanError> {
        let (lifecycle, canonical) = match lifecycle_id {
            Some(id) => {
                let lifecycle = self
                    .registry
                    .lifecycle(id)
                    .ok_or_else(|| PlanError::UnknownPhase {
                        task: format!("{id}:{phase}"),
                        available: self.registry.available_phases(),
                    })?;
                let canonical =
                    lifecycle
                        .canonical_phase(phase)
                        .ok_or_else(|| PlanError::UnknownPhase {
                            task: phase.to_string(),
                            available: self.registry.available_phases(),
                        })?;
                (lifecycle, canonical)
            }
            None => self.registry.require_phase(phase)?,
        };

        let mut result = Vec::new();
        for spec in lifecycle.phases_up_to(canonical) {
            let mut bucket: Vec<&MojoBinding> = project
                .mojos
                .iter()
                .filter(|b| {
                    lifecycle
                        .canonical_phase(&b.phase)
                        .is_some_and(|c| c == spec.name)
                })
                .collect();
            bucket.sort_by_key(|b| b.priority);
            for binding in bucket {
                result.push(self.resolve_execution(project, binding, stack)?);
            }
        }
        Ok(result)
    }

    /// Wire inter-project edges: a consuming step of B executes after the
    /// producing phase of every (transitive) upstream A, and a mojo that
    /// resolves dependencies forces its step after every upstream's
    /// artifact phase.
    fn wire_dependencies(&self, plan: &mut BuildPlan) {
        let mut edges: Vec<(StepIndex, StepIndex)> = Vec::new();

        for project in self.reactor.projects() {
            let key = project.key();
            let upstreams = self.reactor.transitive_upstreams(&key);
            if upstreams.is_empty() {
                continue;
            }

            for idx in plan.steps_of(&key) {
                let step = plan.step(idx);
                let Some((lifecycle, canonical)) = self.registry.lifecycle_of(&step.name) else {
                    continue;
                };
                let spec = lifecycle
                    .phases()
                    .iter()
                    .find(|p| p.name == canonical)
                    .expect("canonical phase belongs to its lifecycle");
                if let Some(up_phase) = &spec.consumes_upstream {
                    for upstream in &upstreams {
                        if let Some(a_idx) = producing_step(plan, lifecycle, upstream, up_phase) {
                            edges.push((idx, a_idx));
                        }
                    }
                }
            }

            for binding in &project.mojos {
                if !binding.requires_dependencies {
                    continue;
                }
                let Some((lifecycle, canonical)) = self.registry.lifecycle_of(&binding.phase)
                else {
                    continue;
                };
                let Some(idx) = plan.step_index(&key, canonical) else {
                    continue;
                };
                let Some(artifact_phase) = lifecycle.artifact_phase() else {
                    continue;
                };
                for upstream in &upstreams {
                    if let Some(a_idx) = producing_step(plan, lifecycle, upstream, artifact_phase) {
                        edges.push((idx, a_idx));
                    }
                }
            }
        }

        for (step, pred) in edges {
            plan.execute_after(step, pred);
        }
    }

    fn validate_tasks(&self, tasks: &[Task], errors: &mut Vec<PlanError>) {
        for task in tasks {
            match task {
                Task::Phase(name) => {
                    if let Err(e) = self.registry.require_phase(name) {
                        errors.push(e);
                    }
                }
                Task::Goal { prefix, goal } => {
                    let bound_anywhere = self
                        .reactor
                        .projects()
                        .iter()
                        .any(|p| find_goal_binding(p, prefix, goal).is_some());
                    if !bound_anywhere {
                        errors.push(PlanError::UnknownGoal {
                            task: format!("{prefix}:{goal}"),
                        });
                    }
                }
            }
        }
    }

    /// Check every binding's phase and fork target up front so all problems
    /// surface in one pass.
    fn validate_bindings(&self, errors: &mut Vec<PlanError>) {
        for project in self.reactor.projects() {
            for binding in &project.mojos {
                if self.registry.lifecycle_of(&binding.phase).is_none() {
                    errors.push(PlanError::UnknownPhase {
                        task: binding.phase.clone(),
                        available: self.registry.available_phases(),
                    });
                }
                match &binding.fork {
                    Some(Fork::Goal { goal }) => {
                        let exists = project
                            .mojos
                            .iter()
                            .any(|b| b.plugin == binding.plugin && b.goal == *goal);
                        if !exists {
                            errors.push(PlanError::UnknownForkTarget {
                                goal: goal.clone(),
                                plugin: binding.plugin.to_string(),
                            });
                        }
                    }
                    Some(Fork::Phase { phase, lifecycle }) => {
                        let known = match lifecycle {
                            Some(id) => self
                                .registry
                                .lifecycle(id)
                                .is_some_and(|l| l.canonical_phase(phase).is_some()),
                            None => self.registry.lifecycle_of(phase).is_some(),
                        };
                        if !known {
                            errors.push(PlanError::UnknownPhase {
                                task: phase.clone(),
                                available: self.registry.available_phases(),
                            });
                        }
                    }
                    None => {}
                }
            }
        }
    }
}

/// The upstream step a consuming step must follow: the named producing
/// phase when it materialized, otherwise the last phase of that lifecycle
/// the upstream actually builds (a `compile`-only build still orders B's
/// compile after A's compile).
fn producing_step(
    plan: &BuildPlan,
    lifecycle: &Lifecycle,
    upstream: &ProjectKey,
    phase: &str,
) -> Option<StepIndex> {
    if let Some(idx) = plan.step_index(upstream, phase) {
        return Some(idx);
    }
    lifecycle
        .phases()
        .iter()
        .rev()
        .find_map(|spec| plan.step_index(upstream, &spec.name))
}

fn find_goal_binding<'p>(project: &'p Project, prefix: &str, goal: &str) -> Option<&'p MojoBinding> {
    project
        .mojos
        .iter()
        .find(|b| b.plugin.artifact_id == prefix && b.goal == goal)
}

/// Wire a segment's chain after the project's previous segment, and record
/// the new tail.
fn sequence_segment(
    plan: &mut BuildPlan,
    tails: &mut HashMap<ProjectKey, StepIndex>,
    project: &ProjectKey,
    first: Option<StepIndex>,
    last: Option<StepIndex>,
) {
    if let (Some(first), Some(&tail)) = (first, tails.get(project)) {
        plan.execute_after(first, tail);
    }
    if let Some(last) = last {
        tails.insert(project.clone(), last);
    }
}

/// A phase with no applicable mojos contributes no work but remains a graph
/// node, preserving phase sequencing for display and predecessor tracking.
fn skip_workless_steps(plan: &BuildPlan) {
    for idx in 0..plan.len() {
        let step = plan.step(idx);
        if !step.is_sentinel() && step.mojo_count() == 0 {
            step.skip();
        }
    }
}

/// Per project: a `$plan` sentinel (in planning state), a `$setup` step
/// after it, every intra-project root after `$setup`, and a `$teardown`
/// step after every intra-project leaf.
fn wire_sentinels(plan: &mut BuildPlan) {
    for project in plan.projects().to_vec() {
        let roots = plan.project_roots(&project);
        let leaves = plan.project_leaves(&project);

        let plan_idx = plan.add_step(BuildStep::new(project.clone(), PLAN));
        plan.step(plan_idx).mark_planning();
        let setup_idx = plan.add_step(BuildStep::new(project.clone(), SETUP));
        let teardown_idx = plan.add_step(BuildStep::new(project.clone(), TEARDOWN));

        plan.execute_after(setup_idx, plan_idx);
        for root in roots {
            plan.execute_after(root, setup_idx);
        }
        for leaf in leaves {
            plan.execute_after(teardown_idx, leaf);
        }
    }
}
