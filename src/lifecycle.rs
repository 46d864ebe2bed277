//! Lifecycle definitions and phase resolution.
//!
//! A lifecycle is a named, totally ordered sequence of phases. Requesting a
//! phase pulls in every phase before it in its lifecycle. The registry ships
//! the three standard lifecycles (`clean`, `default`, `site`) and resolves
//! user-facing aliases onto canonical phase names.

use crate::errors::PlanError;

/// One phase of a lifecycle.
#[derive(Debug, Clone)]
pub struct PhaseSpec {
    /// Canonical phase name (e.g. "compile").
    pub name: String,
    /// Upstream phase whose output this phase consumes, if any.
    ///
    /// When set, a step for this phase in project B must execute after the
    /// named phase of every reactor project B depends on.
    pub consumes_upstream: Option<String>,
}

impl PhaseSpec {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            consumes_upstream: None,
        }
    }

    fn consuming(name: &str, upstream: &str) -> Self {
        Self {
            name: name.to_string(),
            consumes_upstream: Some(upstream.to_string()),
        }
    }
}

/// A named, totally ordered sequence of phases.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    /// Lifecycle id ("clean", "default", "site").
    pub id: String,
    phases: Vec<PhaseSpec>,
    aliases: Vec<(String, String)>,
    /// Phase that produces the artifact consumed by downstream projects.
    artifact_phase: Option<String>,
}

impl Lifecycle {
    /// All phases in declared order.
    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    /// Position of a canonical phase name within this lifecycle.
    pub fn index_of(&self, phase: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.name == phase)
    }

    /// The prefix of the phase order up to and including `phase`.
    pub fn phases_up_to(&self, phase: &str) -> &[PhaseSpec] {
        match self.index_of(phase) {
            Some(i) => &self.phases[..=i],
            None => &[],
        }
    }

    /// Phase whose completion makes this project's artifact available to
    /// dependent projects ("package" for the default lifecycle).
    pub fn artifact_phase(&self) -> Option<&str> {
        self.artifact_phase.as_deref()
    }

    /// Resolve an alias and verify the result is a phase of this lifecycle.
    pub fn canonical_phase(&self, name: &str) -> Option<&str> {
        let canonical = self
            .aliases
            .iter()
            .find(|(alias, _)| alias == name)
            .map(|(_, canonical)| canonical.as_str())
            .unwrap_or(name);
        self.phases
            .iter()
            .find(|p| p.name == canonical)
            .map(|p| p.name.as_str())
    }
}

/// Registry of the lifecycles known to a build.
#[derive(Debug, Clone)]
pub struct LifecycleRegistry {
    lifecycles: Vec<Lifecycle>,
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl LifecycleRegistry {
    /// The standard clean / default / site lifecycles.
    pub fn standard() -> Self {
        let clean = Lifecycle {
            id: "clean".to_string(),
            phases: vec![
                PhaseSpec::new("pre-clean"),
                PhaseSpec::new("clean"),
                PhaseSpec::new("post-clean"),
            ],
            aliases: Vec::new(),
            artifact_phase: None,
        };
        let default = Lifecycle {
            id: "default".to_string(),
            phases: vec![
                PhaseSpec::new("validate"),
                PhaseSpec::new("initialize"),
                PhaseSpec::new("generate-sources"),
                PhaseSpec::new("process-sources"),
                PhaseSpec::consuming("compile", "package"),
                PhaseSpec::new("process-classes"),
                PhaseSpec::new("test-compile"),
                PhaseSpec::consuming("test", "package"),
                PhaseSpec::new("package"),
                PhaseSpec::new("verify"),
                PhaseSpec::new("install"),
                PhaseSpec::new("deploy"),
            ],
            aliases: vec![
                ("build".to_string(), "package".to_string()),
                ("check".to_string(), "verify".to_string()),
            ],
            artifact_phase: Some("package".to_string()),
        };
        let site = Lifecycle {
            id: "site".to_string(),
            phases: vec![
                PhaseSpec::new("pre-site"),
                PhaseSpec::new("site"),
                PhaseSpec::new("post-site"),
                PhaseSpec::new("site-deploy"),
            ],
            aliases: Vec::new(),
            artifact_phase: None,
        };
        Self {
            lifecycles: vec![clean, default, site],
        }
    }

    /// All registered lifecycles.
    pub fn lifecycles(&self) -> &[Lifecycle] {
        &self.lifecycles
    }

    /// Find the lifecycle containing `phase` (after alias resolution) and
    /// return it with the canonical phase name.
    pub fn lifecycle_of(&self, phase: &str) -> Option<(&Lifecycle, &str)> {
        for lifecycle in &self.lifecycles {
            if let Some(canonical) = lifecycle.canonical_phase(phase) {
                return Some((lifecycle, canonical));
            }
        }
        None
    }

    /// Look up a lifecycle by id.
    pub fn lifecycle(&self, id: &str) -> Option<&Lifecycle> {
        self.lifecycles.iter().find(|l| l.id == id)
    }

    /// Resolve a requested task to (lifecycle, canonical phase), or produce
    /// the plan error listing every available phase.
    pub fn require_phase(&self, task: &str) -> Result<(&Lifecycle, &str), PlanError> {
        self.lifecycle_of(task).ok_or_else(|| PlanError::UnknownPhase {
            task: task.to_string(),
            available: self.available_phases(),
        })
    }

    /// Comma-joined list of every canonical phase, for error messages.
    pub fn available_phases(&self) -> String {
        self.lifecycles
            .iter()
            .flat_map(|l| l.phases.iter().map(|p| p.name.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_lifecycle_order() {
        let registry = LifecycleRegistry::standard();
        let (lifecycle, _) = registry.lifecycle_of("package").unwrap();
        assert_eq!(lifecycle.id, "default");
        assert!(lifecycle.index_of("compile").unwrap() < lifecycle.index_of("package").unwrap());
        assert!(lifecycle.index_of("validate").unwrap() < lifecycle.index_of("compile").unwrap());
    }

    #[test]
    fn test_phases_up_to() {
        let registry = LifecycleRegistry::standard();
        let (lifecycle, canonical) = registry.lifecycle_of("compile").unwrap();
        let names: Vec<&str> = lifecycle
            .phases_up_to(canonical)
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "validate",
                "initialize",
                "generate-sources",
                "process-sources",
                "compile"
            ]
        );
    }

    #[test]
    fn test_alias_resolution() {
        let registry = LifecycleRegistry::standard();
        let (_, canonical) = registry.lifecycle_of("build").unwrap();
        assert_eq!(canonical, "package");
    }

    #[test]
    fn test_unknown_phase_lists_available() {
        let registry = LifecycleRegistry::standard();
        let err = registry.require_phase("compil").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("compil"));
        assert!(msg.contains("compile"));
        assert!(msg.contains("deploy"));
    }

    #[test]
    fn test_clean_lifecycle_has_no_artifact_phase() {
        let registry = LifecycleRegistry::standard();
        let (lifecycle, _) = registry.lifecycle_of("clean").unwrap();
        assert!(lifecycle.artifact_phase().is_none());
    }
}
