//! Build steps: one named execution point for exactly one project.
//!
//! A step is either a lifecycle phase or one of the sentinel points every
//! project gets (`$plan`, `$setup`, `$teardown`). Steps hold their mojo
//! executions in priority buckets; edges between steps live in the owning
//! [`BuildPlan`](crate::plan::BuildPlan) arena. Status and the skip flag are
//! the only fields mutated after plan construction, and both are atomic:
//! multiple workers race to observe and advance them.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::mojo::MojoExecution;
use crate::project::ProjectKey;

/// Index of a step within its plan's arena.
pub type StepIndex = usize;

/// Sentinel step executed before any phase of a project; carries planning
/// status rather than work.
pub const PLAN: &str = "$plan";
/// Sentinel step opening a project's execution (project-started events,
/// log block begin).
pub const SETUP: &str = "$setup";
/// Sentinel step closing a project's execution (summary, log flush).
pub const TEARDOWN: &str = "$teardown";

/// Lifecycle of a step.
///
/// `Created → Scheduled → Executed | Failed` for ordinary steps; `$plan`
/// sentinels sit in `Planning` until the scheduler claims them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StepStatus {
    Created = 0,
    Planning = 1,
    Scheduled = 2,
    Executed = 3,
    Failed = 4,
}

impl StepStatus {
    fn from_u8(value: u8) -> StepStatus {
        match value {
            0 => StepStatus::Created,
            1 => StepStatus::Planning,
            2 => StepStatus::Scheduled,
            3 => StepStatus::Executed,
            _ => StepStatus::Failed,
        }
    }

    /// Whether the step has finished, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Executed | StepStatus::Failed)
    }
}

/// One execution point for one project.
///
/// Identity (equality, hashing) is `(project, name)` only; two instances
/// referring to the same project and name are interchangeable.
#[derive(Debug)]
pub struct BuildStep {
    pub project: ProjectKey,
    pub name: String,
    status: AtomicU8,
    skipped: AtomicBool,
    /// priority -> [(mojo key, execution)], insertion-ordered within a bucket.
    mojos: Mutex<BTreeMap<i32, Vec<(String, MojoExecution)>>>,
}

impl BuildStep {
    pub fn new(project: ProjectKey, name: impl Into<String>) -> Self {
        Self {
            project,
            name: name.into(),
            status: AtomicU8::new(StepStatus::Created as u8),
            skipped: AtomicBool::new(false),
            mojos: Mutex::new(BTreeMap::new()),
        }
    }

    /// Whether this is one of the `$plan`/`$setup`/`$teardown` sentinels.
    pub fn is_sentinel(&self) -> bool {
        self.name == PLAN || self.name == SETUP || self.name == TEARDOWN
    }

    pub fn status(&self) -> StepStatus {
        StepStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Atomically advance `from → to`. Returns false when another worker got
    /// there first; the step is claimed by exactly one caller.
    pub fn transition(&self, from: StepStatus, to: StepStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move a freshly created `$plan` sentinel into `Planning`.
    pub fn mark_planning(&self) {
        self.transition(StepStatus::Created, StepStatus::Planning);
    }

    /// Insert a mojo execution into its priority bucket.
    ///
    /// Re-registering the same `goal:execution_id` key within a bucket
    /// overwrites in place (last registration wins). No-op once the step is
    /// skipped.
    pub fn add_mojo(&self, mojo: MojoExecution, priority: i32) {
        if self.is_skipped() {
            return;
        }
        let key = mojo.key();
        let mut buckets = self.mojos.lock().expect("mojo buckets poisoned");
        let bucket = buckets.entry(priority).or_default();
        match bucket.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = mojo,
            None => bucket.push((key, mojo)),
        }
    }

    /// Mark the step as contributing no work. Clears all attached mojo
    /// executions; the step remains a valid graph node for ordering.
    pub fn skip(&self) {
        self.skipped.store(true, Ordering::Release);
        self.mojos.lock().expect("mojo buckets poisoned").clear();
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped.load(Ordering::Acquire)
    }

    /// Snapshot of the attached executions, flattened in ascending priority
    /// then insertion order. Reflects current state on every call.
    pub fn executions(&self) -> Vec<MojoExecution> {
        let buckets = self.mojos.lock().expect("mojo buckets poisoned");
        buckets
            .values()
            .flat_map(|bucket| bucket.iter().map(|(_, m)| m.clone()))
            .collect()
    }

    pub fn mojo_count(&self) -> usize {
        let buckets = self.mojos.lock().expect("mojo buckets poisoned");
        buckets.values().map(Vec::len).sum()
    }
}

impl PartialEq for BuildStep {
    fn eq(&self, other: &Self) -> bool {
        self.project == other.project && self.name == other.name
    }
}

impl Eq for BuildStep {}

impl std::hash::Hash for BuildStep {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.project.hash(state);
        self.name.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mojo(goal: &str, execution_id: &str) -> MojoExecution {
        MojoExecution {
            plugin: ProjectKey::new("org.example.plugins", "plugin", "1.0"),
            goal: goal.to_string(),
            execution_id: execution_id.to_string(),
            command: None,
            forked_executions: Default::default(),
        }
    }

    fn step() -> BuildStep {
        BuildStep::new(ProjectKey::new("org.example", "core", "1.0"), "compile")
    }

    #[test]
    fn test_status_transitions_once() {
        let step = step();
        assert_eq!(step.status(), StepStatus::Created);
        assert!(step.transition(StepStatus::Created, StepStatus::Scheduled));
        assert!(!step.transition(StepStatus::Created, StepStatus::Scheduled));
        assert!(step.transition(StepStatus::Scheduled, StepStatus::Executed));
        assert_eq!(step.status(), StepStatus::Executed);
        assert!(step.status().is_terminal());
    }

    #[test]
    fn test_priority_ordering_deterministic() {
        let step = step();
        step.add_mojo(mojo("a", "first"), 1);
        step.add_mojo(mojo("b", "second"), 1);
        step.add_mojo(mojo("c", "third"), 2);

        for _ in 0..3 {
            let order: Vec<String> = step.executions().iter().map(|m| m.key()).collect();
            assert_eq!(order, vec!["a:first", "b:second", "c:third"]);
        }
    }

    #[test]
    fn test_same_key_overwrites_in_place() {
        let step = step();
        step.add_mojo(mojo("a", "one"), 0);
        step.add_mojo(mojo("b", "two"), 0);
        let mut replacement = mojo("a", "one");
        replacement.command = Some("echo replaced".to_string());

        step.add_mojo(replacement, 0);

        let executions = step.executions();
        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].key(), "a:one");
        assert_eq!(executions[0].command.as_deref(), Some("echo replaced"));
    }

    #[test]
    fn test_skip_clears_mojos() {
        let step = step();
        step.add_mojo(mojo("a", "one"), 0);
        step.skip();
        assert!(step.is_skipped());
        assert!(step.executions().is_empty());

        step.add_mojo(mojo("b", "two"), 0);
        assert!(step.executions().is_empty());
    }

    #[test]
    fn test_equality_by_identity() {
        let a = step();
        let b = step();
        a.add_mojo(mojo("a", "one"), 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_plan_sentinel_planning() {
        let plan_step = BuildStep::new(ProjectKey::new("org.example", "core", "1.0"), PLAN);
        plan_step.mark_planning();
        assert_eq!(plan_step.status(), StepStatus::Planning);
        assert!(plan_step.is_sentinel());
    }
}
