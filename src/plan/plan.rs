//! The build plan: a DAG of steps across all reactor projects.
//!
//! Steps live in an arena indexed by `(project, step name)`; predecessor and
//! successor edge lists are kept symmetric and are immutable once the
//! builder hands the plan to the scheduler; only step status and skip flags
//! change during execution.

use std::collections::{HashMap, HashSet};

use crate::errors::PlanError;
use crate::plan::step::{BuildStep, StepIndex};
use crate::project::ProjectKey;

/// The full DAG of build steps for one build invocation.
#[derive(Debug, Default)]
pub struct BuildPlan {
    steps: Vec<BuildStep>,
    index: HashMap<(ProjectKey, String), StepIndex>,
    predecessors: Vec<Vec<StepIndex>>,
    successors: Vec<Vec<StepIndex>>,
    /// Projects in the order they entered the plan (reactor order).
    projects: Vec<ProjectKey>,
}

impl BuildPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps in the plan.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Insert a step, or return the existing one with the same identity.
    ///
    /// The same logical step can be reached via different construction
    /// paths (task segments, dependency wiring); identity is
    /// `(project, name)` and the first instance wins.
    pub fn add_step(&mut self, step: BuildStep) -> StepIndex {
        let key = (step.project.clone(), step.name.clone());
        if let Some(&existing) = self.index.get(&key) {
            return existing;
        }
        if !self.projects.contains(&step.project) {
            self.projects.push(step.project.clone());
        }
        let idx = self.steps.len();
        self.steps.push(step);
        self.predecessors.push(Vec::new());
        self.successors.push(Vec::new());
        self.index.insert(key, idx);
        idx
    }

    pub fn step(&self, idx: StepIndex) -> &BuildStep {
        &self.steps[idx]
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn step_index(&self, project: &ProjectKey, name: &str) -> Option<StepIndex> {
        self.index.get(&(project.clone(), name.to_string())).copied()
    }

    pub fn get(&self, project: &ProjectKey, name: &str) -> Option<&BuildStep> {
        self.step_index(project, name).map(|i| &self.steps[i])
    }

    /// Like [`step_index`](Self::step_index) but a missing step is a plan
    /// construction error.
    pub fn required_index(&self, project: &ProjectKey, name: &str) -> Result<StepIndex, PlanError> {
        self.step_index(project, name)
            .ok_or_else(|| PlanError::MissingStep {
                project: project.clone(),
                step: name.to_string(),
            })
    }

    /// Projects touched by this plan, in reactor order.
    pub fn projects(&self) -> &[ProjectKey] {
        &self.projects
    }

    /// All steps of one project, in creation order.
    pub fn steps_of(&self, project: &ProjectKey) -> Vec<StepIndex> {
        (0..self.steps.len())
            .filter(|&i| &self.steps[i].project == project)
            .collect()
    }

    /// Establish `pred → step`.
    ///
    /// Silently idempotent: no edge is added when `pred` is already among
    /// `step`'s transitive predecessors, or when the edge would close a
    /// cycle (`step` already precedes `pred`).
    pub fn execute_after(&mut self, step: StepIndex, pred: StepIndex) {
        if step == pred || self.is_successor_of(step, pred) || self.is_successor_of(pred, step) {
            return;
        }
        self.predecessors[step].push(pred);
        self.successors[pred].push(step);
    }

    pub fn predecessors(&self, idx: StepIndex) -> &[StepIndex] {
        &self.predecessors[idx]
    }

    pub fn successors(&self, idx: StepIndex) -> &[StepIndex] {
        &self.successors[idx]
    }

    /// The transitive predecessor closure of a step (the step excluded).
    pub fn all_predecessors(&self, idx: StepIndex) -> HashSet<StepIndex> {
        let mut visited = HashSet::new();
        let mut stack: Vec<StepIndex> = self.predecessors[idx].to_vec();
        while let Some(next) = stack.pop() {
            if visited.insert(next) {
                stack.extend_from_slice(&self.predecessors[next]);
            }
        }
        visited
    }

    /// Whether `other` is reachable from `step` via predecessor edges.
    pub fn is_successor_of(&self, step: StepIndex, other: StepIndex) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<StepIndex> = self.predecessors[step].to_vec();
        while let Some(next) = stack.pop() {
            if next == other {
                return true;
            }
            if visited.insert(next) {
                stack.extend_from_slice(&self.predecessors[next]);
            }
        }
        false
    }

    /// Steps of a project with no predecessors within the same project.
    /// Cross-project edges do not count; sentinel wiring is per project.
    pub fn project_roots(&self, project: &ProjectKey) -> Vec<StepIndex> {
        self.steps_of(project)
            .into_iter()
            .filter(|&i| {
                self.predecessors[i]
                    .iter()
                    .all(|&p| &self.steps[p].project != project)
            })
            .collect()
    }

    /// Steps of a project with no successors within the same project.
    pub fn project_leaves(&self, project: &ProjectKey) -> Vec<StepIndex> {
        self.steps_of(project)
            .into_iter()
            .filter(|&i| {
                self.successors[i]
                    .iter()
                    .all(|&s| &self.steps[s].project != project)
            })
            .collect()
    }

    /// A stable topological ordering of all steps (Kahn's algorithm, ties
    /// broken by insertion index). Used for deterministic display and
    /// iteration, never for correctness of execution.
    pub fn sorted_indices(&self) -> Vec<StepIndex> {
        let mut in_degree: Vec<usize> = self.predecessors.iter().map(Vec::len).collect();
        let mut ready: Vec<StepIndex> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();
        ready.sort_unstable_by(|a, b| b.cmp(a));

        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(node) = ready.pop() {
            order.push(node);
            for &succ in &self.successors[node] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    let pos = ready.binary_search_by(|x| succ.cmp(x)).unwrap_or_else(|p| p);
                    ready.insert(pos, succ);
                }
            }
        }
        order
    }

    /// Artifact ids appearing under more than one group id, used to
    /// disambiguate display labels.
    pub fn duplicate_artifact_ids(&self) -> HashSet<String> {
        let mut groups_by_artifact: HashMap<&str, HashSet<&str>> = HashMap::new();
        for project in &self.projects {
            groups_by_artifact
                .entry(project.artifact_id.as_str())
                .or_default()
                .insert(project.group_id.as_str());
        }
        groups_by_artifact
            .into_iter()
            .filter(|(_, groups)| groups.len() > 1)
            .map(|(artifact, _)| artifact.to_string())
            .collect()
    }

    /// Display label for a project: the artifact id, qualified with the
    /// group id when the artifact id is ambiguous in this reactor.
    pub fn project_label(&self, project: &ProjectKey, duplicates: &HashSet<String>) -> String {
        if duplicates.contains(&project.artifact_id) {
            format!("{}:{}", project.group_id, project.artifact_id)
        } else {
            project.artifact_id.clone()
        }
    }
}
