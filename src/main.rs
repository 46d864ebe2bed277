use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "weaver")]
#[command(version, about = "Concurrent build plan scheduler - weave multi-module builds phase by phase")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the reactor definition file
    #[arg(long, default_value = "reactor.json", global = true)]
    pub reactor: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build and print the execution plan without running anything
    Plan {
        /// Lifecycle phases and/or prefix:goal tasks
        #[arg(required = true)]
        tasks: Vec<String>,
    },
    /// Execute the requested tasks across the reactor
    Build {
        /// Lifecycle phases and/or prefix:goal tasks
        #[arg(required = true)]
        tasks: Vec<String>,

        /// Degree of concurrency (capped by the project count)
        #[arg(short, long, default_value = "1")]
        jobs: usize,

        /// Stop scheduling new steps on the first failure (default)
        #[arg(long, conflicts_with_all = ["fail_at_end", "fail_never"])]
        fail_fast: bool,

        /// Keep building projects whose upstreams succeeded, report at the end
        #[arg(long, conflicts_with = "fail_never")]
        fail_at_end: bool,

        /// Downgrade goal failures to warnings and keep going
        #[arg(long)]
        fail_never: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Plan { tasks } => cmd::plan::run(&cli, tasks),
        Commands::Build {
            tasks,
            jobs,
            fail_fast,
            fail_at_end,
            fail_never,
        } => {
            use weaver::scheduler::FailureBehavior;
            let behavior = match (*fail_fast, *fail_at_end, *fail_never) {
                (_, _, true) => FailureBehavior::FailNever,
                (_, true, _) => FailureBehavior::FailAtEnd,
                _ => FailureBehavior::FailFast,
            };
            cmd::build::run(&cli, tasks, *jobs, behavior).await
        }
    }
}
