// src/lib.rs

//! jobdag: a job/task dependency-graph scheduler core.
//!
//! A submitted job is a DAG of tasks. The crate maintains, for every live
//! job, the *eligible set* of tasks whose dependencies are all satisfied,
//! applies workflow actions (IF branching, block replication, loops) as
//! graph surgery when tasks terminate, persists every scheduling event
//! transactionally to SQLite, and rebuilds the whole live state from the
//! database after a crash.
//!
//! Entry points:
//! - [`submission::JobSpec`] for building and validating a job,
//! - [`service::SchedulerService`] for the runtime surface (submit,
//!   dispatch, completion events, administration),
//! - [`recovery::recover`] for restoring state from a database.

pub mod config;
pub mod db;
pub mod descriptor;
pub mod errors;
pub mod job;
pub mod logging;
pub mod recovery;
pub mod service;
pub mod submission;
pub mod types;

pub use crate::errors::{Result, SchedulerError};
