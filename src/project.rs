//! Project identity and the reactor (the full set of projects in a build).
//!
//! The reactor is loaded from a JSON definition file and validated up front:
//! duplicate coordinates and dependency cycles among reactor projects are
//! plan-construction errors, reported before any step is created.
//! Dependencies pointing outside the reactor are external artifacts and are
//! not the scheduler's concern.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{BuildError, PlanError};
use crate::mojo::MojoBinding;

/// Project coordinates: `group_id:artifact_id:version`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectKey {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
}

impl ProjectKey {
    pub fn new(group_id: &str, artifact_id: &str, version: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            artifact_id: artifact_id.to_string(),
            version: version.to_string(),
        }
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group_id, self.artifact_id, self.version)
    }
}

impl FromStr for ProjectKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [g, a, v] if !g.is_empty() && !a.is_empty() && !v.is_empty() => {
                Ok(ProjectKey::new(g, a, v))
            }
            _ => Err(format!("invalid project coordinates \"{s}\", expected group:artifact:version")),
        }
    }
}

impl Serialize for ProjectKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ProjectKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One module of a multi-module build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub group_id: String,
    pub artifact_id: String,
    pub version: String,
    /// Reactor-internal dependencies, as coordinates.
    #[serde(default)]
    pub dependencies: Vec<ProjectKey>,
    /// Mojo-to-phase bindings from the project's effective model.
    #[serde(default)]
    pub mojos: Vec<MojoBinding>,
}

impl Project {
    pub fn key(&self) -> ProjectKey {
        ProjectKey::new(&self.group_id, &self.artifact_id, &self.version)
    }
}

/// The project view handed to a mojo execution.
///
/// A forked sub-build operates on a `Forked` snapshot so its side effects
/// cannot alias main-build state; the forking mojo sees the fork's results
/// only through this view, never through the main project object graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutedProject {
    Main(ProjectKey),
    Forked { project: ProjectKey, fork: String },
}

impl ExecutedProject {
    pub fn key(&self) -> &ProjectKey {
        match self {
            ExecutedProject::Main(key) => key,
            ExecutedProject::Forked { project, .. } => project,
        }
    }

    pub fn is_forked(&self) -> bool {
        matches!(self, ExecutedProject::Forked { .. })
    }
}

/// File format of a reactor definition.
#[derive(Debug, Serialize, Deserialize)]
struct ReactorFile {
    projects: Vec<Project>,
}

/// The ordered set of projects participating in a build, with their
/// resolved inter-dependencies.
#[derive(Debug, Clone)]
pub struct Reactor {
    projects: Vec<Project>,
    index: HashMap<ProjectKey, usize>,
}

impl Reactor {
    /// Validate and index a project list.
    ///
    /// Reports every duplicate coordinate found; when coordinates are
    /// unique, also rejects dependency cycles among reactor projects.
    pub fn new(projects: Vec<Project>) -> Result<Self, PlanError> {
        let mut index = HashMap::new();
        let mut errors = Vec::new();
        for (i, project) in projects.iter().enumerate() {
            if index.insert(project.key(), i).is_some() {
                errors.push(PlanError::DuplicateProject { key: project.key() });
            }
        }
        if !errors.is_empty() {
            return Err(PlanError::aggregate(errors));
        }

        let reactor = Self { projects, index };
        reactor.check_cycles()?;
        Ok(reactor)
    }

    /// Load a reactor definition from a JSON file.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let data = std::fs::read_to_string(path).map_err(|source| BuildError::ReactorReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ReactorFile =
            serde_json::from_str(&data).map_err(|source| BuildError::ReactorParseFailed {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(file.projects)?)
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    pub fn get(&self, key: &ProjectKey) -> Option<&Project> {
        self.index.get(key).map(|&i| &self.projects[i])
    }

    /// Direct reactor-internal upstreams of a project.
    pub fn upstreams(&self, key: &ProjectKey) -> Vec<&Project> {
        self.get(key)
            .map(|p| {
                p.dependencies
                    .iter()
                    .filter_map(|dep| self.get(dep))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All reactor-internal upstreams of a project, direct and transitive,
    /// in deterministic discovery order.
    pub fn transitive_upstreams(&self, key: &ProjectKey) -> Vec<ProjectKey> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack: Vec<ProjectKey> = self
            .upstreams(key)
            .iter()
            .map(|p| p.key())
            .collect();
        stack.reverse();
        while let Some(next) = stack.pop() {
            if !visited.insert(next.clone()) {
                continue;
            }
            for up in self.upstreams(&next) {
                stack.push(up.key());
            }
            order.push(next);
        }
        order
    }

    /// Reject dependency cycles among reactor projects via Kahn's algorithm,
    /// naming every project left on a cycle.
    fn check_cycles(&self) -> Result<(), PlanError> {
        let mut in_degree = vec![0usize; self.projects.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.projects.len()];
        for (i, project) in self.projects.iter().enumerate() {
            for dep in &project.dependencies {
                if let Some(&d) = self.index.get(dep) {
                    in_degree[i] += 1;
                    dependents[d].push(i);
                }
            }
        }

        let mut queue: Vec<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, deg)| *deg == 0)
            .map(|(i, _)| i)
            .collect();
        let mut processed = 0;
        while let Some(node) = queue.pop() {
            processed += 1;
            for &dependent in &dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if processed != self.projects.len() {
            let members: Vec<String> = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, deg)| *deg > 0)
                .map(|(i, _)| self.projects[i].key().to_string())
                .collect();
            return Err(PlanError::ProjectCycle { members });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_key_roundtrip() {
        let key = ProjectKey::new("org.example", "core", "1.0");
        let parsed: ProjectKey = key.to_string().parse().unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_key_rejects_malformed() {
        assert!("core".parse::<ProjectKey>().is_err());
        assert!("a:b".parse::<ProjectKey>().is_err());
        assert!("::".parse::<ProjectKey>().is_err());
    }

    #[test]
    fn test_reactor_upstreams() {
        let reactor =
            Reactor::new(vec![project("util", vec![]), project("core", vec!["util"])]).unwrap();
        let ups = reactor.upstreams(&ProjectKey::new("org.example", "core", "1.0"));
        assert_eq!(ups.len(), 1);
        assert_eq!(ups[0].artifact_id, "util");
    }

    #[test]
    fn test_transitive_upstreams() {
        let reactor = Reactor::new(vec![
            project("util", vec![]),
            project("core", vec!["util"]),
            project("app", vec!["core"]),
        ])
        .unwrap();
        let ups = reactor.transitive_upstreams(&ProjectKey::new("org.example", "app", "1.0"));
        let names: Vec<&str> = ups.iter().map(|k| k.artifact_id.as_str()).collect();
        assert_eq!(names, vec!["core", "util"]);
    }

    #[test]
    fn test_external_dependencies_ignored() {
        let mut p = project("core", vec![]);
        p.dependencies
            .push(ProjectKey::new("com.vendor", "sdk", "2.0"));
        let reactor = Reactor::new(vec![p]).unwrap();
        assert!(
            reactor
                .upstreams(&ProjectKey::new("org.example", "core", "1.0"))
                .is_empty()
        );
    }

    #[test]
    fn test_duplicate_project_rejected() {
        let err = Reactor::new(vec![project("core", vec![]), project("core", vec![])])
            .unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_cycle_rejected_with_members() {
        let err = Reactor::new(vec![
            project("a", vec!["c"]),
            project("b", vec!["a"]),
            project("c", vec!["b"]),
        ])
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("cycle"));
        assert!(msg.contains("org.example:a:1.0"));
        assert!(msg.contains("org.example:b:1.0"));
        assert!(msg.contains("org.example:c:1.0"));
    }
}
