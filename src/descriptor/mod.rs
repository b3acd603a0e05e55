// src/descriptor/mod.rs

//! Live scheduling view of a job: the dependency graph, the eligible set
//! and the workflow (IF / REPLICATE / LOOP) graph surgery.

mod job_descriptor;
mod task_descriptor;

pub use job_descriptor::{JobDescriptor, NewTaskInstance, TerminationOutcome};
pub use task_descriptor::{EligibleTaskDescriptor, TaskDescriptor};
