//! Human-readable rendering of a build plan.
//!
//! Not load-bearing for execution, but the traversal mirrors the scheduler's
//! view of the graph: every step appears exactly once, in topological order,
//! with its work and its predecessors. Used by `weaver plan` and by the
//! executor in verbose mode.

use std::fmt::{self, Write};

use crate::plan::plan::BuildPlan;
use crate::plan::step::StepStatus;

pub struct PlanLogger;

impl PlanLogger {
    pub fn render(plan: &BuildPlan) -> String {
        let mut out = String::new();
        Self::write(plan, &mut out).expect("writing to a String cannot fail");
        out
    }

    pub fn write(plan: &BuildPlan, out: &mut impl Write) -> fmt::Result {
        let duplicates = plan.duplicate_artifact_ids();
        let order = plan.sorted_indices();
        debug_assert_eq!(order.len(), plan.len(), "topological order lost steps");

        writeln!(out, "Build plan for {} project(s):", plan.projects().len())?;
        for project in plan.projects() {
            writeln!(out, "{}:", plan.project_label(project, &duplicates))?;
            for &idx in &order {
                let step = plan.step(idx);
                if &step.project != project {
                    continue;
                }

                let status = match step.status() {
                    StepStatus::Created => "created",
                    StepStatus::Planning => "planning",
                    StepStatus::Scheduled => "scheduled",
                    StepStatus::Executed => "executed",
                    StepStatus::Failed => "failed",
                };
                let skipped = if step.is_skipped() { ", skipped" } else { "" };
                writeln!(out, "  {} ({status}{skipped})", step.name)?;

                for mojo in step.executions() {
                    writeln!(out, "    run {}", mojo.label())?;
                    for (label, forked) in &mojo.forked_executions {
                        writeln!(out, "      forks {label} ({} executions)", forked.len())?;
                    }
                }

                let preds: Vec<String> = plan
                    .predecessors(idx)
                    .iter()
                    .map(|&p| {
                        let pred = plan.step(p);
                        if pred.project == step.project {
                            pred.name.clone()
                        } else {
                            format!(
                                "{}/{}",
                                plan.project_label(&pred.project, &duplicates),
                                pred.name
                            )
                        }
                    })
                    .collect();
                if !preds.is_empty() {
                    writeln!(out, "    after: {}", preds.join(", "))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleRegistry;
    use crate::mojo::MojoBinding;
    use crate::plan::builder::PlanBuilder;
    use crate::project::{Project, ProjectKey, Reactor};

    fn rendered() -> String {
        let projects = vec![
            Project {
                group_id: "org.example".to_string(),
                artifact_id: "util".to_string(),
                version: "1.0".to_string(),
                dependencies: Vec::new(),
                mojos: vec![MojoBinding {
                    plugin: ProjectKey::new("org.example.plugins", "builder", "1.0"),
                    goal: "jar".to_string(),
                    execution_id: "default-jar".to_string(),
                    phase: "package".to_string(),
                    priority: 0,
                    requires_dependencies: false,
                    command: None,
                    fork: None,
                }],
            },
            Project {
                group_id: "org.example".to_string(),
                artifact_id: "core".to_string(),
                version: "1.0".to_string(),
                dependencies: vec![ProjectKey::new("org.example", "util", "1.0")],
                mojos: vec![MojoBinding {
                    plugin: ProjectKey::new("org.example.plugins", "builder", "1.0"),
                    goal: "compile".to_string(),
                    execution_id: "default-compile".to_string(),
                    phase: "compile".to_string(),
                    priority: 0,
                    requires_dependencies: false,
                    command: None,
                    fork: None,
                }],
            },
        ];
        let reactor = Reactor::new(projects).unwrap();
        let registry = LifecycleRegistry::standard();
        let plan = PlanBuilder::new(&reactor, &registry)
            .build(&["package".to_string()])
            .unwrap();
        PlanLogger::render(&plan)
    }

    #[test]
    fn test_render_covers_every_step() {
        let out = rendered();
        assert!(out.contains("util:"));
        assert!(out.contains("core:"));
        for name in ["$plan", "$setup", "$teardown", "validate", "compile", "package"] {
            assert!(out.contains(name), "missing {name} in:\n{out}");
        }
    }

    #[test]
    fn test_render_shows_work_and_edges() {
        let out = rendered();
        assert!(out.contains("run jar@default-jar"));
        assert!(out.contains("run compile@default-compile"));
        assert!(out.contains("util/package"));
        assert!(out.contains("(planning)"));
        assert!(out.contains(", skipped"));
    }
}
