//! Process-backed mojo executor.
//!
//! The scheduler treats goal execution as opaque work behind the
//! [`MojoExecutor`] trait; this implementation runs the command attached to
//! a binding through `sh -c`, captures its output into the project's log
//! buffer, and maps the exit status onto a mojo outcome. A goal without a
//! command is a declarative no-op.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use crate::mojo::{MojoExecution, MojoExecutor, MojoOutcome};
use crate::project::ExecutedProject;
use crate::scheduler::ProjectLog;

pub struct ProcessMojoExecutor {
    working_dir: PathBuf,
}

impl ProcessMojoExecutor {
    pub fn new(working_dir: PathBuf) -> Self {
        Self { working_dir }
    }
}

#[async_trait]
impl MojoExecutor for ProcessMojoExecutor {
    async fn execute(
        &self,
        project: &ExecutedProject,
        mojo: &MojoExecution,
        log: &ProjectLog,
    ) -> MojoOutcome {
        let context = if project.is_forked() { " [forked]" } else { "" };
        let Some(command) = &mojo.command else {
            log.line(format!("{} (no work attached){context}", mojo.label()));
            return MojoOutcome::Success;
        };

        log.line(format!("{}{context}: {command}", mojo.label()));
        let spawned = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .env("WEAVER_PROJECT", project.key().to_string())
            .env("WEAVER_FORKED", if project.is_forked() { "1" } else { "0" })
            .output()
            .await;

        let output = match spawned {
            Ok(output) => output,
            Err(e) => return MojoOutcome::Failure(format!("failed to spawn command: {e}")),
        };

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log.line(line);
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            log.warn(line);
        }

        if output.status.success() {
            MojoOutcome::Success
        } else {
            MojoOutcome::Failure(format!(
                "goal {} exited with {}",
                mojo.label(),
                output
                    .status
                    .code()
                    .map_or_else(|| "signal".to_string(), |c| format!("code {c}"))
            ))
        }
    }
}
