// src/db/mod.rs

//! Durable storage: schema, transactional manager and job-listing
//! sort/paging parameters.

mod manager;
mod schema;
mod sort;

pub(crate) use manager::PersistedJob;
pub use manager::{JobInfo, JobPage, SchedulerDb, TaskResult, TaskUsage, WorkflowChanges};
pub use sort::{JobPageRequest, JobSortField, JobSortParameter, SortOrder};
