//! Mojo bindings, runtime executions and the executor capability seam.
//!
//! A `MojoBinding` is the declarative form found in the reactor definition
//! (one goal bound to one phase). The plan builder turns bindings into
//! `MojoExecution`s attached to steps; forked sub-builds are nested inside
//! the originating execution rather than spliced into the top-level graph.
//! How a goal actually runs is behind the `MojoExecutor` trait; the
//! scheduler only branches on the outcome.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::project::{ExecutedProject, ProjectKey};
use crate::scheduler::ProjectLog;

fn default_execution_id() -> String {
    "default".to_string()
}

/// A goal bound to a lifecycle phase in a project's effective model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MojoBinding {
    /// Plugin coordinates providing the goal.
    pub plugin: ProjectKey,
    pub goal: String,
    #[serde(default = "default_execution_id")]
    pub execution_id: String,
    /// Bound phase; may be a lifecycle alias.
    pub phase: String,
    /// Mojos in one phase run in ascending priority, insertion order within
    /// a priority.
    #[serde(default)]
    pub priority: i32,
    /// Whether this mojo resolves the project's dependencies, forcing its
    /// step after every upstream's artifact phase.
    #[serde(default)]
    pub requires_dependencies: bool,
    /// Command line the process executor runs for this goal.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub fork: Option<Fork>,
}

/// A mojo-declared nested execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fork {
    /// Run a single goal of the same plugin first.
    Goal { goal: String },
    /// Run a lifecycle up to `phase` first, on a snapshot of the project.
    Phase {
        phase: String,
        #[serde(default)]
        lifecycle: Option<String>,
    },
}

impl Fork {
    /// Label under which the forked executions are attached.
    pub fn label(&self) -> &str {
        match self {
            Fork::Goal { goal } => goal,
            Fork::Phase { phase, .. } => phase,
        }
    }
}

/// One runtime execution of a goal against a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MojoExecution {
    pub plugin: ProjectKey,
    pub goal: String,
    pub execution_id: String,
    #[serde(default)]
    pub command: Option<String>,
    /// Fork label -> executions that run before this mojo, against a forked
    /// project view.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub forked_executions: BTreeMap<String, Vec<MojoExecution>>,
}

impl MojoExecution {
    pub fn from_binding(binding: &MojoBinding) -> Self {
        Self {
            plugin: binding.plugin.clone(),
            goal: binding.goal.clone(),
            execution_id: binding.execution_id.clone(),
            command: binding.command.clone(),
            forked_executions: BTreeMap::new(),
        }
    }

    /// Registration key within a priority bucket; re-registering the same
    /// key overwrites (last wins).
    pub fn key(&self) -> String {
        format!("{}:{}", self.goal, self.execution_id)
    }

    /// Display label: `goal@execution_id`.
    pub fn label(&self) -> String {
        format!("{}@{}", self.goal, self.execution_id)
    }
}

/// Outcome of one mojo execution, as reported by the executor capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MojoOutcome {
    Success,
    Failure(String),
    /// The executor requires the remaining work of this step to be skipped.
    Skip,
}

/// External capability that runs a single mojo execution.
///
/// Implementations are opaque, synchronous units of work from the
/// scheduler's perspective; no mid-mojo cancellation is supported.
#[async_trait]
pub trait MojoExecutor: Send + Sync {
    async fn execute(
        &self,
        project: &ExecutedProject,
        mojo: &MojoExecution,
        log: &ProjectLog,
    ) -> MojoOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_key() {
        let binding = MojoBinding {
            plugin: ProjectKey::new("org.example.plugins", "compiler", "1.0"),
            goal: "compile".to_string(),
            execution_id: "default-compile".to_string(),
            phase: "compile".to_string(),
            priority: 0,
            requires_dependencies: false,
            command: None,
            fork: None,
        };
        let execution = MojoExecution::from_binding(&binding);
        assert_eq!(execution.key(), "compile:default-compile");
        assert_eq!(execution.label(), "compile@default-compile");
    }

    #[test]
    fn test_fork_label() {
        let goal = Fork::Goal {
            goal: "report".to_string(),
        };
        assert_eq!(goal.label(), "report");
        let phase = Fork::Phase {
            phase: "test".to_string(),
            lifecycle: None,
        };
        assert_eq!(phase.label(), "test");
    }

    #[test]
    fn test_binding_defaults() {
        let json = r#"{
            "plugin": "org.example.plugins:compiler:1.0",
            "goal": "compile",
            "phase": "compile"
        }"#;
        let binding: MojoBinding = serde_json::from_str(json).unwrap();
        assert_eq!(binding.execution_id, "default");
        assert_eq!(binding.priority, 0);
        assert!(!binding.requires_dependencies);
        assert!(binding.fork.is_none());
    }

    #[test]
    fn test_fork_deserialization() {
        let json = r#"{"type": "phase", "phase": "test", "lifecycle": "default"}"#;
        let fork: Fork = serde_json::from_str(json).unwrap();
        assert_eq!(
            fork,
            Fork::Phase {
                phase: "test".to_string(),
                lifecycle: Some("default".to_string()),
            }
        );
    }
}
