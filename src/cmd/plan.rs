//! `weaver plan` - render the build plan without executing it.

use anyhow::{Context, Result};
use weaver::lifecycle::LifecycleRegistry;
use weaver::plan::{PlanBuilder, PlanLogger};
use weaver::project::Reactor;

use super::super::Cli;

pub fn run(cli: &Cli, tasks: &[String]) -> Result<()> {
    let reactor = Reactor::load(&cli.reactor)
        .with_context(|| format!("loading reactor from {}", cli.reactor.display()))?;
    let registry = LifecycleRegistry::standard();
    let plan = PlanBuilder::new(&reactor, &registry).build(tasks)?;
    print!("{}", PlanLogger::render(&plan));
    Ok(())
}
