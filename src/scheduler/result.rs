//! Build results and execution timing.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::project::ProjectKey;

/// Terminal status of one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Succeeded,
    Failed,
    /// Not attempted, because an upstream project failed or the build was
    /// halted first.
    Skipped,
}

/// Result of one project within a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectResult {
    pub project: ProjectKey,
    pub status: ProjectStatus,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// The triggering mojo failure. Also set on a succeeded project under
    /// fail-never, where the failure was downgraded to a warning.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Terminal result of a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildResult {
    /// Per-project results, in reactor order.
    pub projects: Vec<ProjectResult>,
    /// Whether remaining work was withheld (a failure under fail-fast or
    /// fail-at-end, or an external abort).
    pub halted: bool,
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl BuildResult {
    pub fn success(&self) -> bool {
        self.projects
            .iter()
            .all(|p| p.status == ProjectStatus::Succeeded)
    }

    pub fn count(&self, status: ProjectStatus) -> usize {
        self.projects.iter().filter(|p| p.status == status).count()
    }

    pub fn failed_projects(&self) -> impl Iterator<Item = &ProjectResult> {
        self.projects
            .iter()
            .filter(|p| p.status == ProjectStatus::Failed)
    }
}

/// Tracks execution timing.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Serde helpers for Duration serialization (milliseconds).
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: ProjectStatus) -> ProjectResult {
        ProjectResult {
            project: ProjectKey::new("org.example", "core", "1.0"),
            status,
            duration: Duration::from_millis(10),
            cause: None,
        }
    }

    #[test]
    fn test_success_requires_every_project() {
        let ok = BuildResult {
            projects: vec![result(ProjectStatus::Succeeded)],
            halted: false,
            duration: Duration::ZERO,
        };
        assert!(ok.success());

        let failed = BuildResult {
            projects: vec![result(ProjectStatus::Succeeded), result(ProjectStatus::Failed)],
            halted: true,
            duration: Duration::ZERO,
        };
        assert!(!failed.success());
        assert_eq!(failed.count(ProjectStatus::Failed), 1);
    }

    #[test]
    fn test_duration_serializes_as_millis() {
        let r = result(ProjectStatus::Succeeded);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"duration\":10"));
    }
}
