//! Per-project log demultiplexing.
//!
//! Steps of unrelated projects execute concurrently, but a project's log
//! must read as one coherent block. Each project gets a line buffer that
//! mojo executions append to; the whole block is written out in a single
//! flush when the project completes (teardown or failure), serialized by a
//! global sink lock.

use std::collections::HashMap;
use std::sync::Mutex;

use console::style;

use crate::plan::BuildPlan;
use crate::project::ProjectKey;

/// Buffered log block for one project.
#[derive(Debug)]
pub struct ProjectLog {
    label: String,
    lines: Mutex<Vec<String>>,
}

impl ProjectLog {
    pub fn new(label: String) -> Self {
        Self {
            label,
            lines: Mutex::new(Vec::new()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn line(&self, msg: impl Into<String>) {
        self.lines.lock().expect("log buffer poisoned").push(msg.into());
    }

    pub fn warn(&self, msg: impl Into<String>) {
        self.line(format!("WARNING: {}", msg.into()));
    }

    /// Drain the buffer. A second call returns nothing, which makes
    /// flushing idempotent.
    pub fn take_lines(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock().expect("log buffer poisoned"))
    }
}

/// All project log buffers of one build.
#[derive(Debug)]
pub struct BuildOutput {
    logs: HashMap<ProjectKey, ProjectLog>,
    sink: Mutex<()>,
}

impl BuildOutput {
    /// One buffer per plan project, labels disambiguated when an artifact
    /// id appears under several group ids.
    pub fn new(plan: &BuildPlan) -> Self {
        let duplicates = plan.duplicate_artifact_ids();
        let logs = plan
            .projects()
            .iter()
            .map(|p| {
                (
                    p.clone(),
                    ProjectLog::new(plan.project_label(p, &duplicates)),
                )
            })
            .collect();
        Self {
            logs,
            sink: Mutex::new(()),
        }
    }

    pub fn log(&self, project: &ProjectKey) -> &ProjectLog {
        self.logs
            .get(project)
            .expect("every plan project has a log buffer")
    }

    /// Write the project's block to stdout as one unit. Nothing is printed
    /// for a project that never produced output.
    pub fn flush(&self, project: &ProjectKey) {
        let log = self.log(project);
        let lines = log.take_lines();
        if lines.is_empty() {
            return;
        }
        let _guard = self.sink.lock().expect("output sink poisoned");
        println!("{} {}", style("──").dim(), style(log.label()).bold());
        for line in lines {
            println!("  {line}");
        }
    }

    /// Flush whatever is still buffered (projects cut short by a halt).
    pub fn flush_remaining(&self) {
        let mut keys: Vec<&ProjectKey> = self.logs.keys().collect();
        keys.sort();
        for key in keys {
            self.flush(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_accumulate_and_drain_once() {
        let log = ProjectLog::new("core".to_string());
        log.line("first");
        log.warn("careful");

        let lines = log.take_lines();
        assert_eq!(lines, vec!["first".to_string(), "WARNING: careful".to_string()]);
        assert!(log.take_lines().is_empty());
    }
}
