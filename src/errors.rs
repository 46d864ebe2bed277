//! Typed error hierarchy for the weaver scheduler.
//!
//! Two top-level enums cover the two subsystems:
//! - `PlanError` — plan construction failures, reported pre-execution
//! - `BuildError` — runtime failures while driving a built plan

use thiserror::Error;

use crate::project::ProjectKey;

/// Errors raised while constructing a build plan.
///
/// Construction validates everything it can before creating a single step,
/// and collects every problem found into an [`PlanError::Aggregate`] so a
/// user can fix multiple issues in one pass.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Unknown lifecycle phase \"{task}\". Available phases are: {available}")]
    UnknownPhase { task: String, available: String },

    #[error("Unknown goal task \"{task}\": no reactor project binds it")]
    UnknownGoal { task: String },

    #[error("The projects {members:?} form a dependency cycle")]
    ProjectCycle { members: Vec<String> },

    #[error("Duplicate project {key} in the reactor")]
    DuplicateProject { key: ProjectKey },

    #[error("Forked goal \"{goal}\" does not exist on plugin {plugin}")]
    UnknownForkTarget { goal: String, plugin: String },

    #[error("No step {step} for project {project} in the plan")]
    MissingStep { project: ProjectKey, step: String },

    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<PlanError>),
}

impl PlanError {
    /// Collapse a list of problems into a single error.
    ///
    /// A one-element list unwraps to the problem itself; an empty list is a
    /// caller bug and panics.
    pub fn aggregate(mut errors: Vec<PlanError>) -> PlanError {
        assert!(!errors.is_empty(), "aggregating zero plan errors");
        if errors.len() == 1 {
            errors.remove(0)
        } else {
            PlanError::Aggregate(errors)
        }
    }
}

fn format_aggregate(errors: &[PlanError]) -> String {
    let mut msg = format!("{} problems were found while building the plan:", errors.len());
    for e in errors {
        msg.push_str("\n  - ");
        msg.push_str(&e.to_string());
    }
    msg
}

/// Errors from executing a built plan.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Failed to read reactor definition at {path}: {source}")]
    ReactorReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse reactor definition at {path}: {source}")]
    ReactorParseFailed {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_single_unwraps() {
        let err = PlanError::aggregate(vec![PlanError::UnknownPhase {
            task: "compil".to_string(),
            available: "compile, test".to_string(),
        }]);
        assert!(matches!(err, PlanError::UnknownPhase { .. }));
    }

    #[test]
    fn test_aggregate_lists_every_problem() {
        let err = PlanError::aggregate(vec![
            PlanError::UnknownPhase {
                task: "compil".to_string(),
                available: "compile".to_string(),
            },
            PlanError::ProjectCycle {
                members: vec!["a".to_string(), "b".to_string()],
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("2 problems"));
        assert!(msg.contains("compil"));
        assert!(msg.contains("cycle"));
    }
}
