// src/db/manager.rs

//! Transactional persistence over a SQLite pool.
//!
//! Every public method is one transaction: a scheduling event either lands
//! completely or not at all, so a crash between statements can never leave
//! a job row disagreeing with its task rows. Rows are written from the
//! in-memory entities, never patched incrementally.

use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::db::schema;
use crate::db::sort::{order_by_clause, JobPageRequest};
use crate::errors::{Result, SchedulerError};
use crate::job::{ExecutableContainer, FlowSpec, InternalJob, InternalTask, ParallelEnvironment, TaskScripts};
use crate::types::{JobId, JobPriority, JobStatus, TaskId, TaskStatus};

/// One stored task result, keyed by (job, task sequence, attempt).
#[derive(Debug, Clone, PartialEq)]
pub struct TaskResult {
    pub job: JobId,
    pub task_seq: u64,
    pub task_name: String,
    pub attempt: u32,
    pub value: Option<String>,
    pub precious: bool,
    pub created_time: i64,
}

/// Per-task duration aggregation for the usage report.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskUsage {
    pub job: JobId,
    pub job_name: String,
    pub task_seq: u64,
    pub task_name: String,
    pub start_time: i64,
    pub finish_time: i64,
    pub duration_ms: i64,
}

/// Job listing row (no task data).
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: JobId,
    pub name: String,
    pub owner: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub submitted_time: i64,
    pub start_time: Option<i64>,
    pub finish_time: Option<i64>,
    pub to_be_removed: bool,
    pub pending_tasks_count: i64,
    pub running_tasks_count: i64,
    pub finished_tasks_count: i64,
    pub total_tasks_count: i64,
}

#[derive(Debug, Clone)]
pub struct JobPage {
    pub jobs: Vec<JobInfo>,
    /// Total rows matching the filters, ignoring paging.
    pub total: i64,
}

/// What a workflow termination changed, for the single-transaction update.
#[derive(Debug, Clone)]
pub struct WorkflowChanges {
    pub finished: TaskId,
    pub skipped: Vec<TaskId>,
    pub new_tasks: Vec<TaskId>,
}

/// A job as loaded from the database, before any recovery adjustment.
#[derive(Debug, Clone)]
pub(crate) struct PersistedJob {
    pub(crate) id: JobId,
    pub(crate) name: String,
    pub(crate) owner: String,
    pub(crate) priority: JobPriority,
    pub(crate) status: JobStatus,
    pub(crate) submitted_time: i64,
    pub(crate) start_time: Option<i64>,
    pub(crate) finish_time: Option<i64>,
    pub(crate) removed_time: Option<i64>,
    pub(crate) to_be_removed: bool,
    pub(crate) generic_info: std::collections::BTreeMap<String, String>,
    pub(crate) tasks: Vec<InternalTask>,
}

#[derive(Debug, Clone)]
pub struct SchedulerDb {
    pool: SqlitePool,
    store_runtime_data_after_finish: bool,
}

impl SchedulerDb {
    /// Open (creating if needed) the database, run the schema migration and
    /// seed the job-id sequence.
    pub async fn open(config: &SchedulerConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(SchedulerError::db)?;

        schema::migrate(&pool).await?;
        info!(db = %config.db_path.display(), "scheduler database opened");

        Ok(Self {
            pool,
            store_runtime_data_after_finish: config.store_runtime_data_after_finish,
        })
    }

    /// Atomically reserve the next job id. Ids are monotonic across
    /// restarts and never reused, even after hard deletes.
    pub async fn reserve_job_id(&self) -> Result<JobId> {
        let row = sqlx::query(
            "UPDATE scheduler_meta SET value = value + 1 WHERE key = 'last_job_id' RETURNING value",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(SchedulerError::db)?;
        let value: i64 = row.try_get("value").map_err(SchedulerError::db)?;
        Ok(JobId(value as u64))
    }

    /// Persist a freshly submitted job: job row, task rows, dependency
    /// edges, one transaction.
    pub async fn insert_job(&self, job: &InternalJob) -> Result<()> {
        let mut tx = self.begin().await?;
        write_job_row(&mut tx, job).await?;
        for task in job.tasks_in_order() {
            write_task_row(&mut tx, job.id(), task).await?;
            write_dependency_edges(&mut tx, task).await?;
        }
        tx.commit().await.map_err(SchedulerError::db)?;
        debug!(job = %job.id(), tasks = job.total_tasks_count(), "job persisted");
        Ok(())
    }

    /// Persist a task start: the task row plus the job row (counters, and
    /// possibly the Pending→Running flip).
    pub async fn job_task_started(&self, job: &InternalJob, task: &TaskId) -> Result<()> {
        let task = job
            .task(task)
            .ok_or_else(|| SchedulerError::UnknownTask(task.clone()))?;
        let mut tx = self.begin().await?;
        write_task_row(&mut tx, job.id(), task).await?;
        write_job_row(&mut tx, job).await?;
        tx.commit().await.map_err(SchedulerError::db)?;
        Ok(())
    }

    /// Persist a plain (non-workflow) task termination: optional result
    /// row, task row, job row; purges runtime rows when the job reached a
    /// terminal status and retention says so.
    pub async fn update_after_task_finished(
        &self,
        job: &InternalJob,
        task: &TaskId,
        result: Option<&TaskResult>,
    ) -> Result<()> {
        let task = job
            .task(task)
            .ok_or_else(|| SchedulerError::UnknownTask(task.clone()))?;
        let mut tx = self.begin().await?;
        if let Some(result) = result {
            write_result_row(&mut tx, result).await?;
        }
        write_task_row(&mut tx, job.id(), task).await?;
        write_job_row(&mut tx, job).await?;
        self.maybe_purge(&mut tx, job).await?;
        tx.commit().await.map_err(SchedulerError::db)?;
        Ok(())
    }

    /// Persist a workflow termination: everything
    /// [`update_after_task_finished`](Self::update_after_task_finished)
    /// does, plus skipped-branch rows and replicated/looped task rows with
    /// their dependency edges.
    pub async fn update_after_workflow_task_finished(
        &self,
        job: &InternalJob,
        changes: &WorkflowChanges,
        result: Option<&TaskResult>,
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        if let Some(result) = result {
            write_result_row(&mut tx, result).await?;
        }

        let finished = job
            .task(&changes.finished)
            .ok_or_else(|| SchedulerError::UnknownTask(changes.finished.clone()))?;
        write_task_row(&mut tx, job.id(), finished).await?;

        for id in &changes.skipped {
            let task = job
                .task(id)
                .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?;
            write_task_row(&mut tx, job.id(), task).await?;
        }
        for id in &changes.new_tasks {
            let task = job
                .task(id)
                .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?;
            write_task_row(&mut tx, job.id(), task).await?;
            write_dependency_edges(&mut tx, task).await?;
        }

        write_job_row(&mut tx, job).await?;
        self.maybe_purge(&mut tx, job).await?;
        tx.commit().await.map_err(SchedulerError::db)?;
        Ok(())
    }

    /// Persist a job-level failure or kill: every affected task row plus
    /// the terminal job row, one transaction.
    pub async fn update_after_job_failed(
        &self,
        job: &InternalJob,
        affected: &[TaskId],
    ) -> Result<()> {
        let mut tx = self.begin().await?;
        for id in affected {
            let task = job
                .task(id)
                .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?;
            write_task_row(&mut tx, job.id(), task).await?;
        }
        write_job_row(&mut tx, job).await?;
        self.maybe_purge(&mut tx, job).await?;
        tx.commit().await.map_err(SchedulerError::db)?;
        Ok(())
    }

    /// Remove a job. With `delete_data` the job and everything keyed under
    /// it (results included) are hard-deleted; without, the job row is
    /// soft-marked with `removed_time` and all data stays loadable.
    pub async fn remove_job(&self, id: JobId, removed_time: i64, delete_data: bool) -> Result<()> {
        let mut tx = self.begin().await?;
        if delete_data {
            for table in ["task_results", "task_dependencies", "tasks"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE job_id = ?1"))
                    .bind(id.value() as i64)
                    .execute(&mut *tx)
                    .await
                    .map_err(SchedulerError::db)?;
            }
            sqlx::query("DELETE FROM jobs WHERE id = ?1")
                .bind(id.value() as i64)
                .execute(&mut *tx)
                .await
                .map_err(SchedulerError::db)?;
        } else {
            sqlx::query("UPDATE jobs SET removed_time = ?2 WHERE id = ?1")
                .bind(id.value() as i64)
                .bind(removed_time)
                .execute(&mut *tx)
                .await
                .map_err(SchedulerError::db)?;
        }
        tx.commit().await.map_err(SchedulerError::db)?;
        info!(job = %id, delete_data, "job removed");
        Ok(())
    }

    pub async fn change_job_priority(&self, id: JobId, priority: JobPriority) -> Result<()> {
        sqlx::query("UPDATE jobs SET priority = ?2 WHERE id = ?1")
            .bind(id.value() as i64)
            .bind(priority.as_i64())
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::db)?;
        Ok(())
    }

    pub async fn set_job_to_be_removed(&self, id: JobId) -> Result<()> {
        sqlx::query("UPDATE jobs SET to_be_removed = 1 WHERE id = ?1")
            .bind(id.value() as i64)
            .execute(&self.pool)
            .await
            .map_err(SchedulerError::db)?;
        Ok(())
    }

    /// One page of the job listing, with filters and multi-key sorting.
    pub async fn load_jobs(&self, request: &JobPageRequest) -> Result<JobPage> {
        let mut count = QueryBuilder::<Sqlite>::new(
            "SELECT COUNT(*) AS n FROM jobs WHERE removed_time IS NULL",
        );
        push_filters(&mut count, request);
        let total: i64 = count
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(SchedulerError::db)?
            .try_get("n")
            .map_err(SchedulerError::db)?;

        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, owner, priority, status, submitted_time, start_time, \
             finish_time, to_be_removed, pending_tasks_count, running_tasks_count, \
             finished_tasks_count, total_tasks_count \
             FROM jobs WHERE removed_time IS NULL",
        );
        push_filters(&mut query, request);
        query.push(order_by_clause(&request.sort));
        if request.limit > 0 {
            query.push(" LIMIT ");
            query.push_bind(request.limit);
            query.push(" OFFSET ");
            query.push_bind(request.offset);
        } else if request.offset > 0 {
            query.push(" LIMIT -1 OFFSET ");
            query.push_bind(request.offset);
        }

        let rows = query
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(SchedulerError::db)?;
        let jobs = rows
            .iter()
            .map(job_info_from_row)
            .collect::<Result<Vec<_>>>()?;
        Ok(JobPage { jobs, total })
    }

    /// Count of non-removed jobs.
    pub async fn get_total_jobs_count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM jobs WHERE removed_time IS NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(SchedulerError::db)?;
        row.try_get("n").map_err(SchedulerError::db)
    }

    /// Per-task durations for an owner's work finished inside the window.
    pub async fn get_usage(&self, owner: &str, from: i64, to: i64) -> Result<Vec<TaskUsage>> {
        let rows = sqlx::query(
            "SELECT t.job_id, j.name AS job_name, t.task_seq, t.name AS task_name, \
             t.start_time, t.finish_time \
             FROM tasks t JOIN jobs j ON j.id = t.job_id \
             WHERE j.owner = ?1 AND t.start_time IS NOT NULL \
             AND t.finish_time IS NOT NULL AND t.finish_time BETWEEN ?2 AND ?3 \
             ORDER BY t.job_id, t.task_seq",
        )
        .bind(owner)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::db)?;

        let mut usage = Vec::with_capacity(rows.len());
        for row in &rows {
            let job: i64 = row.try_get("job_id").map_err(SchedulerError::db)?;
            let start_time: i64 = row.try_get("start_time").map_err(SchedulerError::db)?;
            let finish_time: i64 = row.try_get("finish_time").map_err(SchedulerError::db)?;
            let task_seq: i64 = row.try_get("task_seq").map_err(SchedulerError::db)?;
            usage.push(TaskUsage {
                job: JobId(job as u64),
                job_name: row.try_get("job_name").map_err(SchedulerError::db)?,
                task_seq: task_seq as u64,
                task_name: row.try_get("task_name").map_err(SchedulerError::db)?,
                start_time,
                finish_time,
                duration_ms: finish_time - start_time,
            });
        }
        Ok(usage)
    }

    /// Load one stored result. Works after the runtime purge: results have
    /// their own table and are never part of it.
    pub async fn load_task_result(
        &self,
        job: JobId,
        task_seq: u64,
        attempt: u32,
    ) -> Result<Option<TaskResult>> {
        let row = sqlx::query(
            "SELECT task_name, value, precious, created_time FROM task_results \
             WHERE job_id = ?1 AND task_seq = ?2 AND attempt = ?3",
        )
        .bind(job.value() as i64)
        .bind(task_seq as i64)
        .bind(attempt as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(SchedulerError::db)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let precious: i64 = row.try_get("precious").map_err(SchedulerError::db)?;
        Ok(Some(TaskResult {
            job,
            task_seq,
            task_name: row.try_get("task_name").map_err(SchedulerError::db)?,
            attempt,
            value: row.try_get("value").map_err(SchedulerError::db)?,
            precious: precious != 0,
            created_time: row.try_get("created_time").map_err(SchedulerError::db)?,
        }))
    }

    /// Load every non-removed job with its tasks and dependency edges, in
    /// id order. A dependency edge pointing at a missing task aborts the
    /// whole load rather than producing a half-wired job.
    pub(crate) async fn load_full_jobs(&self) -> Result<Vec<PersistedJob>> {
        let job_rows = sqlx::query(
            "SELECT id, name, owner, priority, status, submitted_time, start_time, \
             finish_time, removed_time, to_be_removed, generic_info \
             FROM jobs WHERE removed_time IS NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::db)?;

        let mut jobs = Vec::with_capacity(job_rows.len());
        for row in &job_rows {
            jobs.push(self.load_persisted_job(row).await?);
        }
        Ok(jobs)
    }

    async fn load_persisted_job(&self, row: &SqliteRow) -> Result<PersistedJob> {
        let id: i64 = row.try_get("id").map_err(SchedulerError::db)?;
        let job = JobId(id as u64);
        let priority: i64 = row.try_get("priority").map_err(SchedulerError::db)?;
        let status: String = row.try_get("status").map_err(SchedulerError::db)?;
        let generic_info: String = row.try_get("generic_info").map_err(SchedulerError::db)?;
        let to_be_removed: i64 = row.try_get("to_be_removed").map_err(SchedulerError::db)?;

        let task_rows = sqlx::query(
            "SELECT task_seq, name, status, start_time, finish_time, execution_host, \
             max_executions, executions_left, executions_on_failure_left, container, \
             generic_info, scripts, flow, parallel_nodes, precious_result, precious_logs \
             FROM tasks WHERE job_id = ?1 ORDER BY task_seq",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::db)?;

        let mut tasks = Vec::with_capacity(task_rows.len());
        for task_row in &task_rows {
            tasks.push(task_from_row(job, task_row)?);
        }

        let id_by_seq: std::collections::HashMap<u64, TaskId> = tasks
            .iter()
            .map(|t| (t.id().value(), t.id().clone()))
            .collect();

        let edge_rows = sqlx::query(
            "SELECT task_seq, depends_on_seq FROM task_dependencies WHERE job_id = ?1 \
             ORDER BY task_seq, depends_on_seq",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(SchedulerError::db)?;

        for edge in &edge_rows {
            let seq: i64 = edge.try_get("task_seq").map_err(SchedulerError::db)?;
            let dep_seq: i64 = edge.try_get("depends_on_seq").map_err(SchedulerError::db)?;
            let dep = id_by_seq.get(&(dep_seq as u64)).ok_or_else(|| {
                SchedulerError::InvariantViolation(format!(
                    "job {job}: dependency edge {seq} -> {dep_seq} references a missing task"
                ))
            })?;
            let task = tasks
                .iter_mut()
                .find(|t| t.id().value() == seq as u64)
                .ok_or_else(|| {
                    SchedulerError::InvariantViolation(format!(
                        "job {job}: dependency edge for missing task {seq}"
                    ))
                })?;
            task.depends_on.push(dep.clone());
        }

        Ok(PersistedJob {
            id: job,
            name: row.try_get("name").map_err(SchedulerError::db)?,
            owner: row.try_get("owner").map_err(SchedulerError::db)?,
            priority: JobPriority::from_i64(priority)
                .map_err(SchedulerError::InvariantViolation)?,
            status: status
                .parse::<JobStatus>()
                .map_err(SchedulerError::InvariantViolation)?,
            submitted_time: row.try_get("submitted_time").map_err(SchedulerError::db)?,
            start_time: row.try_get("start_time").map_err(SchedulerError::db)?,
            finish_time: row.try_get("finish_time").map_err(SchedulerError::db)?,
            removed_time: row.try_get("removed_time").map_err(SchedulerError::db)?,
            to_be_removed: to_be_removed != 0,
            generic_info: serde_json::from_str(&generic_info)?,
            tasks,
        })
    }

    async fn begin(&self) -> Result<Transaction<'_, Sqlite>> {
        self.pool.begin().await.map_err(SchedulerError::db)
    }

    /// Inside a job-terminal transaction, drop the runtime rows when
    /// retention says finished jobs keep only their results.
    async fn maybe_purge(&self, tx: &mut Transaction<'_, Sqlite>, job: &InternalJob) -> Result<()> {
        if self.store_runtime_data_after_finish || !job.status().is_terminal() {
            return Ok(());
        }
        for (table, key) in [
            ("task_dependencies", "job_id"),
            ("tasks", "job_id"),
            ("jobs", "id"),
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE {key} = ?1"))
                .bind(job.id().value() as i64)
                .execute(&mut **tx)
                .await
                .map_err(SchedulerError::db)?;
        }
        debug!(job = %job.id(), "runtime rows purged; results kept");
        Ok(())
    }
}

fn push_filters<'a>(query: &mut QueryBuilder<'a, Sqlite>, request: &'a JobPageRequest) {
    if let Some(owner) = &request.owner {
        query.push(" AND owner = ");
        query.push_bind(owner.as_str());
    }
    if let Some(statuses) = &request.statuses {
        query.push(" AND status IN (");
        let mut separated = query.separated(", ");
        for status in statuses {
            separated.push_bind(status.as_str());
        }
        query.push(")");
    }
}

fn job_info_from_row(row: &SqliteRow) -> Result<JobInfo> {
    let id: i64 = row.try_get("id").map_err(SchedulerError::db)?;
    let priority: i64 = row.try_get("priority").map_err(SchedulerError::db)?;
    let status: String = row.try_get("status").map_err(SchedulerError::db)?;
    let to_be_removed: i64 = row.try_get("to_be_removed").map_err(SchedulerError::db)?;
    Ok(JobInfo {
        id: JobId(id as u64),
        name: row.try_get("name").map_err(SchedulerError::db)?,
        owner: row.try_get("owner").map_err(SchedulerError::db)?,
        priority: JobPriority::from_i64(priority).map_err(SchedulerError::InvariantViolation)?,
        status: status
            .parse::<JobStatus>()
            .map_err(SchedulerError::InvariantViolation)?,
        submitted_time: row.try_get("submitted_time").map_err(SchedulerError::db)?,
        start_time: row.try_get("start_time").map_err(SchedulerError::db)?,
        finish_time: row.try_get("finish_time").map_err(SchedulerError::db)?,
        to_be_removed: to_be_removed != 0,
        pending_tasks_count: row
            .try_get("pending_tasks_count")
            .map_err(SchedulerError::db)?,
        running_tasks_count: row
            .try_get("running_tasks_count")
            .map_err(SchedulerError::db)?,
        finished_tasks_count: row
            .try_get("finished_tasks_count")
            .map_err(SchedulerError::db)?,
        total_tasks_count: row
            .try_get("total_tasks_count")
            .map_err(SchedulerError::db)?,
    })
}

fn task_from_row(job: JobId, row: &SqliteRow) -> Result<InternalTask> {
    let seq: i64 = row.try_get("task_seq").map_err(SchedulerError::db)?;
    let name: String = row.try_get("name").map_err(SchedulerError::db)?;
    let status: String = row.try_get("status").map_err(SchedulerError::db)?;
    let max_executions: i64 = row.try_get("max_executions").map_err(SchedulerError::db)?;
    let executions_left: i64 = row.try_get("executions_left").map_err(SchedulerError::db)?;
    let on_failure_left: i64 = row
        .try_get("executions_on_failure_left")
        .map_err(SchedulerError::db)?;
    let container: String = row.try_get("container").map_err(SchedulerError::db)?;
    let generic_info: String = row.try_get("generic_info").map_err(SchedulerError::db)?;
    let scripts: Option<String> = row.try_get("scripts").map_err(SchedulerError::db)?;
    let flow: Option<String> = row.try_get("flow").map_err(SchedulerError::db)?;
    let parallel_nodes: Option<i64> = row.try_get("parallel_nodes").map_err(SchedulerError::db)?;
    let precious_result: i64 = row.try_get("precious_result").map_err(SchedulerError::db)?;
    let precious_logs: i64 = row.try_get("precious_logs").map_err(SchedulerError::db)?;

    let container: ExecutableContainer = serde_json::from_str(&container)?;
    let mut task = InternalTask::new(TaskId::new(job, seq as u64, name), container);
    task.status = status
        .parse::<TaskStatus>()
        .map_err(SchedulerError::InvariantViolation)?;
    task.start_time = row.try_get("start_time").map_err(SchedulerError::db)?;
    task.finish_time = row.try_get("finish_time").map_err(SchedulerError::db)?;
    task.execution_host = row.try_get("execution_host").map_err(SchedulerError::db)?;
    task.max_executions = max_executions as u32;
    task.executions_left = executions_left as u32;
    task.executions_on_failure_left = on_failure_left as u32;
    task.generic_info = serde_json::from_str(&generic_info)?;
    task.scripts = match scripts {
        Some(json) => serde_json::from_str::<TaskScripts>(&json)?,
        None => TaskScripts::default(),
    };
    task.flow = match flow {
        Some(json) => Some(serde_json::from_str::<FlowSpec>(&json)?),
        None => None,
    };
    task.parallel = parallel_nodes.map(|n| ParallelEnvironment {
        nodes_needed: n as u32,
    });
    task.precious_result = precious_result != 0;
    task.precious_logs = precious_logs != 0;
    Ok(task)
}

async fn write_job_row(tx: &mut Transaction<'_, Sqlite>, job: &InternalJob) -> Result<()> {
    sqlx::query(
        "INSERT INTO jobs (id, name, owner, priority, status, submitted_time, start_time, \
         finish_time, removed_time, to_be_removed, generic_info, pending_tasks_count, \
         running_tasks_count, finished_tasks_count, total_tasks_count) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
         ON CONFLICT (id) DO UPDATE SET \
         priority = excluded.priority, status = excluded.status, \
         start_time = excluded.start_time, finish_time = excluded.finish_time, \
         removed_time = excluded.removed_time, to_be_removed = excluded.to_be_removed, \
         pending_tasks_count = excluded.pending_tasks_count, \
         running_tasks_count = excluded.running_tasks_count, \
         finished_tasks_count = excluded.finished_tasks_count, \
         total_tasks_count = excluded.total_tasks_count",
    )
    .bind(job.id().value() as i64)
    .bind(job.name())
    .bind(job.owner())
    .bind(job.priority().as_i64())
    .bind(job.status().as_str())
    .bind(job.submitted_time())
    .bind(job.start_time())
    .bind(job.finish_time())
    .bind(job.removed_time())
    .bind(job.to_be_removed() as i64)
    .bind(serde_json::to_string(job.generic_info())?)
    .bind(job.pending_tasks_count() as i64)
    .bind(job.running_tasks_count() as i64)
    .bind(job.finished_tasks_count() as i64)
    .bind(job.total_tasks_count() as i64)
    .execute(&mut **tx)
    .await
    .map_err(SchedulerError::db)?;
    Ok(())
}

async fn write_task_row(
    tx: &mut Transaction<'_, Sqlite>,
    job: JobId,
    task: &InternalTask,
) -> Result<()> {
    let scripts = if task.scripts().is_empty() {
        None
    } else {
        Some(serde_json::to_string(task.scripts())?)
    };
    let flow = match task.flow() {
        Some(flow) => Some(serde_json::to_string(flow)?),
        None => None,
    };
    sqlx::query(
        "INSERT INTO tasks (job_id, task_seq, name, status, start_time, finish_time, \
         execution_host, max_executions, executions_left, executions_on_failure_left, \
         container, generic_info, scripts, flow, parallel_nodes, precious_result, \
         precious_logs) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17) \
         ON CONFLICT (job_id, task_seq) DO UPDATE SET \
         status = excluded.status, start_time = excluded.start_time, \
         finish_time = excluded.finish_time, execution_host = excluded.execution_host, \
         executions_left = excluded.executions_left, \
         executions_on_failure_left = excluded.executions_on_failure_left",
    )
    .bind(job.value() as i64)
    .bind(task.id().value() as i64)
    .bind(task.id().readable_name())
    .bind(task.status().as_str())
    .bind(task.start_time())
    .bind(task.finish_time())
    .bind(task.execution_host())
    .bind(task.max_executions() as i64)
    .bind(task.executions_left() as i64)
    .bind(task.executions_on_failure_left() as i64)
    .bind(serde_json::to_string(task.container())?)
    .bind(serde_json::to_string(task.generic_info())?)
    .bind(scripts)
    .bind(flow)
    .bind(task.parallel().map(|p| p.nodes_needed as i64))
    .bind(task.precious_result() as i64)
    .bind(task.precious_logs() as i64)
    .execute(&mut **tx)
    .await
    .map_err(SchedulerError::db)?;
    Ok(())
}

async fn write_result_row(tx: &mut Transaction<'_, Sqlite>, result: &TaskResult) -> Result<()> {
    sqlx::query(
        "INSERT INTO task_results (job_id, task_seq, attempt, task_name, value, precious, \
         created_time) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
         ON CONFLICT (job_id, task_seq, attempt) DO UPDATE SET \
         value = excluded.value, precious = excluded.precious, \
         created_time = excluded.created_time",
    )
    .bind(result.job.value() as i64)
    .bind(result.task_seq as i64)
    .bind(result.attempt as i64)
    .bind(result.task_name.as_str())
    .bind(result.value.as_deref())
    .bind(result.precious as i64)
    .bind(result.created_time)
    .execute(&mut **tx)
    .await
    .map_err(SchedulerError::db)?;
    Ok(())
}

async fn write_dependency_edges(tx: &mut Transaction<'_, Sqlite>, task: &InternalTask) -> Result<()> {
    for dep in task.depends_on() {
        sqlx::query(
            "INSERT OR IGNORE INTO task_dependencies (job_id, task_seq, depends_on_seq) \
             VALUES (?1, ?2, ?3)",
        )
        .bind(task.id().job().value() as i64)
        .bind(task.id().value() as i64)
        .bind(dep.value() as i64)
        .execute(&mut **tx)
        .await
        .map_err(SchedulerError::db)?;
    }
    Ok(())
}
