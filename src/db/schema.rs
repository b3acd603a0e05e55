// src/db/schema.rs

//! SQLite schema. Statuses are stored as their wire strings, priorities as
//! integers, and structured task data (container, scripts, flow, generic
//! info) as JSON TEXT columns. Task results live in their own table keyed
//! by (job, task sequence, attempt) so they survive the runtime purge.

use sqlx::SqlitePool;

use crate::errors::{Result, SchedulerError};

const DDL: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS jobs (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        owner TEXT NOT NULL,
        priority INTEGER NOT NULL,
        status TEXT NOT NULL,
        submitted_time INTEGER NOT NULL,
        start_time INTEGER,
        finish_time INTEGER,
        removed_time INTEGER,
        to_be_removed INTEGER NOT NULL DEFAULT 0,
        generic_info TEXT NOT NULL DEFAULT '{}',
        pending_tasks_count INTEGER NOT NULL DEFAULT 0,
        running_tasks_count INTEGER NOT NULL DEFAULT 0,
        finished_tasks_count INTEGER NOT NULL DEFAULT 0,
        total_tasks_count INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS tasks (
        job_id INTEGER NOT NULL,
        task_seq INTEGER NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        start_time INTEGER,
        finish_time INTEGER,
        execution_host TEXT,
        max_executions INTEGER NOT NULL DEFAULT 1,
        executions_left INTEGER NOT NULL DEFAULT 1,
        executions_on_failure_left INTEGER NOT NULL DEFAULT 1,
        container TEXT NOT NULL,
        generic_info TEXT NOT NULL DEFAULT '{}',
        scripts TEXT,
        flow TEXT,
        parallel_nodes INTEGER,
        precious_result INTEGER NOT NULL DEFAULT 0,
        precious_logs INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (job_id, task_seq)
    )",
    "CREATE TABLE IF NOT EXISTS task_dependencies (
        job_id INTEGER NOT NULL,
        task_seq INTEGER NOT NULL,
        depends_on_seq INTEGER NOT NULL,
        PRIMARY KEY (job_id, task_seq, depends_on_seq)
    )",
    "CREATE TABLE IF NOT EXISTS task_results (
        job_id INTEGER NOT NULL,
        task_seq INTEGER NOT NULL,
        attempt INTEGER NOT NULL,
        task_name TEXT NOT NULL,
        value TEXT,
        precious INTEGER NOT NULL DEFAULT 0,
        created_time INTEGER NOT NULL,
        PRIMARY KEY (job_id, task_seq, attempt)
    )",
    "CREATE TABLE IF NOT EXISTS scheduler_meta (
        key TEXT PRIMARY KEY,
        value INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_jobs_removed ON jobs (removed_time)",
    "CREATE INDEX IF NOT EXISTS idx_tasks_job ON tasks (job_id)",
];

/// Create all tables and indexes, then seed the monotonic job-id sequence
/// from the highest id ever stored so ids are never reused.
pub(crate) async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in DDL {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(SchedulerError::db)?;
    }

    sqlx::query("INSERT OR IGNORE INTO scheduler_meta (key, value) VALUES ('last_job_id', 0)")
        .execute(pool)
        .await
        .map_err(SchedulerError::db)?;
    sqlx::query(
        "UPDATE scheduler_meta
         SET value = max(value, (SELECT COALESCE(MAX(id), 0) FROM jobs))
         WHERE key = 'last_job_id'",
    )
    .execute(pool)
    .await
    .map_err(SchedulerError::db)?;

    Ok(())
}
