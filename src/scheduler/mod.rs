//! Scheduler: concurrent execution of a built plan.
//!
//! Three pieces:
//!
//! 1. **Executor** - the coordinator loop claiming ready steps and running
//!    them on bounded worker tasks
//! 2. **Result** - per-project outcomes and the terminal build result
//! 3. **Output** - per-project log buffers flushed as coherent blocks
//!
//! The executor owns failure-policy interpretation; the plan and step types
//! stay policy-agnostic.

mod executor;
mod output;
mod result;

pub use executor::{ExecutorConfig, FailureBehavior, PlanExecutor, StepEvent};
pub use output::{BuildOutput, ProjectLog};
pub use result::{BuildResult, ExecutionTimer, ProjectResult, ProjectStatus};
