//! `weaver build` - execute the requested tasks across the reactor.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result};
use console::style;
use tokio::sync::mpsc;

use weaver::lifecycle::LifecycleRegistry;
use weaver::plan::PlanBuilder;
use weaver::project::Reactor;
use weaver::runner::ProcessMojoExecutor;
use weaver::scheduler::{
    BuildResult, ExecutorConfig, FailureBehavior, PlanExecutor, ProjectStatus, StepEvent,
};

use super::super::Cli;

pub async fn run(cli: &Cli, tasks: &[String], jobs: usize, behavior: FailureBehavior) -> Result<()> {
    let reactor = Reactor::load(&cli.reactor)
        .with_context(|| format!("loading reactor from {}", cli.reactor.display()))?;
    let registry = LifecycleRegistry::standard();
    let plan = Arc::new(PlanBuilder::new(&reactor, &registry).build(tasks)?);

    let working_dir = cli
        .reactor
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."))
        .to_path_buf();
    let mojo_executor = Arc::new(ProcessMojoExecutor::new(working_dir));

    let config = ExecutorConfig::default()
        .with_jobs(jobs)
        .with_failure_behavior(behavior)
        .with_verbose(cli.verbose);
    let mut executor = PlanExecutor::new(config);

    // Ctrl-C stops new steps from becoming eligible; in-flight steps finish
    let halt = executor.halt_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            halt.store(true, Ordering::Release);
        }
    });

    let printer = if cli.verbose {
        let (tx, rx) = mpsc::channel(64);
        executor = executor.with_event_channel(tx);
        Some(tokio::spawn(print_events(rx)))
    } else {
        None
    };

    let result = executor.execute(Arc::clone(&plan), mojo_executor).await?;
    drop(executor);
    if let Some(printer) = printer {
        printer.await.ok();
    }

    print_summary(&plan, &result);
    if result.success() {
        Ok(())
    } else {
        anyhow::bail!("The build failed")
    }
}

async fn print_events(mut rx: mpsc::Receiver<StepEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            StepEvent::ProjectStarted { project } => {
                eprintln!("{} {project}", style("Building").cyan());
            }
            StepEvent::ProjectCompleted { project, status } => {
                eprintln!("{} {project} ({status:?})", style("Finished").cyan());
            }
            _ => {}
        }
    }
}

fn print_summary(plan: &weaver::plan::BuildPlan, result: &BuildResult) {
    let duplicates = plan.duplicate_artifact_ids();

    println!();
    println!("{}", style("Reactor summary:").bold());
    for project in &result.projects {
        let label = plan.project_label(&project.project, &duplicates);
        match project.status {
            ProjectStatus::Succeeded => {
                let mut line = format!(
                    "{} {label} ({})",
                    style("ok").green(),
                    fmt_duration(project.duration)
                );
                if let Some(cause) = &project.cause {
                    line.push_str(&format!(" - {}", style(cause).yellow()));
                }
                println!("  {line}");
            }
            ProjectStatus::Failed => {
                let cause = project.cause.as_deref().unwrap_or("unknown cause");
                println!("  {} {label} - {}", style("FAILED").red().bold(), cause);
            }
            ProjectStatus::Skipped => {
                println!("  {} {label} (not attempted)", style("skipped").dim());
            }
        }
    }
    println!("Total time: {}", fmt_duration(result.duration));
    if result.halted {
        println!(
            "{}",
            style("The build was halted; remaining work was not attempted.").yellow()
        );
    }
}

fn fmt_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}
