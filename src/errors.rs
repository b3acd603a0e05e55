// src/errors.rs

//! Crate-wide error type and helpers.
//!
//! The variants follow the failure taxonomy of the scheduler core:
//!
//! - `InvalidJob` / `InvalidQuery`: user-level mistakes, rejected before any
//!   live graph is built or any row is touched.
//! - `UnknownJob` / `UnknownTask` / `InvariantViolation`: logic errors that
//!   mean the durable and live state have drifted apart. These are fatal to
//!   the operation; no repair is attempted.
//! - `Database`: persistence failures. `retryable` marks transient classes
//!   (lock contention, connection loss); the retry policy belongs to the
//!   caller, never to this crate.

use thiserror::Error;

use crate::types::{JobId, TaskId};

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("invalid job: {0}")]
    InvalidJob(String),

    #[error("invalid query parameter: {0}")]
    InvalidQuery(String),

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error("unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("scheduler invariant violated: {0}")]
    InvariantViolation(String),

    #[error("database error (retryable: {retryable}): {source}")]
    Database {
        #[source]
        source: sqlx::Error,
        retryable: bool,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SchedulerError {
    /// Wrap a sqlx error, classifying transient failures as retryable.
    ///
    /// SQLite reports lock contention as primary result codes 5 (`BUSY`)
    /// and 6 (`LOCKED`); pool timeouts and IO errors are transient too.
    pub fn db(source: sqlx::Error) -> Self {
        let retryable = match &source {
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => true,
            sqlx::Error::Database(db) => {
                matches!(db.code().as_deref(), Some("5") | Some("6"))
            }
            _ => false,
        };
        SchedulerError::Database { source, retryable }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulerError::Database { retryable: true, .. })
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
