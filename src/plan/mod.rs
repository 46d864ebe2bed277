//! The build plan: a DAG of per-project, per-phase execution steps.
//!
//! This module turns the static inputs (reactor, lifecycle registry, task
//! list) into an executable graph:
//!
//! 1. **Step** - one execution point (a phase or a `$plan`/`$setup`/
//!    `$teardown` sentinel) for one project, holding mojo executions in
//!    priority buckets
//! 2. **Plan** - the arena of steps with symmetric predecessor/successor
//!    edges and display queries
//! 3. **Builder** - materializes steps, wires phase ordering, dependency
//!    edges and fork resolution
//! 4. **Logger** - deterministic human-readable rendering
//!
//! Edges are immutable once built; only step status and skip flags change
//! during execution.

mod builder;
mod logger;
#[allow(clippy::module_inception)]
mod plan;
mod step;

pub use builder::PlanBuilder;
pub use logger::PlanLogger;
pub use plan::BuildPlan;
pub use step::{BuildStep, PLAN, SETUP, StepIndex, StepStatus, TEARDOWN};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleRegistry;
    use crate::project::{Project, ProjectKey, Reactor};

    fn project(artifact_id: &str, deps: Vec<&str>) -> Project {
        Project {
            group_id: "org.example".to_string(),
            artifact_id: artifact_id.to_string(),
            version: "1.0".to_string(),
            dependencies: deps
                .into_iter()
                .map(|d| ProjectKey::new("org.example", d, "1.0"))
                .collect(),
            mojos: Vec::new(),
        }
    }

    #[test]
    fn test_plan_construction_across_projects() {
        let reactor = Reactor::new(vec![
            project("util", vec![]),
            project("core", vec!["util"]),
        ])
        .unwrap();
        let registry = LifecycleRegistry::standard();
        let plan = PlanBuilder::new(&reactor, &registry)
            .build(&["install".to_string()])
            .unwrap();

        // 11 phases up to install plus three sentinels, per project
        assert_eq!(plan.len(), 2 * (11 + 3));
        assert_eq!(plan.projects().len(), 2);
    }

    #[test]
    fn test_every_step_reachable_from_its_plan_sentinel() {
        let reactor = Reactor::new(vec![project("core", vec![])]).unwrap();
        let registry = LifecycleRegistry::standard();
        let plan = PlanBuilder::new(&reactor, &registry)
            .build(&["package".to_string()])
            .unwrap();

        let key = ProjectKey::new("org.example", "core", "1.0");
        let plan_idx = plan.step_index(&key, PLAN).unwrap();
        for idx in plan.steps_of(&key) {
            if idx != plan_idx {
                assert!(plan.all_predecessors(idx).contains(&plan_idx));
            }
        }
    }
}
