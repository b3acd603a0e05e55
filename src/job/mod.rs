// src/job/mod.rs

//! Durable job/task model: the source-of-truth entities the scheduler
//! persists, plus the executable containers and workflow declarations they
//! carry.

mod container;
mod flow;
mod internal_job;
mod internal_task;

pub use container::{Executable, ExecutableContainer, ExecutableInitializer};
pub use flow::{Branch, FlowAction, FlowSpec};
pub use internal_job::{InternalJob, TaskFailureOutcome};
pub use internal_task::{InternalTask, ParallelEnvironment, Script, TaskScripts};
