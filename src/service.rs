// src/service.rs

//! Scheduler front: owns the live job map and the database handle.
//!
//! State is constructor-injected; there is no global. A per-job async mutex
//! serializes every mutation of one job (live graph change and its
//! persistence happen inside the same critical section), while different
//! jobs proceed independently. Late or duplicate execution events against a
//! job that already reached a terminal status are ignored, not errors.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::db::{JobPage, JobPageRequest, SchedulerDb, TaskResult, WorkflowChanges};
use crate::descriptor::EligibleTaskDescriptor;
use crate::errors::{Result, SchedulerError};
use crate::job::{FlowAction, InternalJob, TaskFailureOutcome};
use crate::recovery::recover;
use crate::submission::JobSpec;
use crate::types::{epoch_millis, JobId, JobPriority, TaskId};

pub struct SchedulerService {
    db: SchedulerDb,
    jobs: RwLock<HashMap<JobId, Arc<Mutex<InternalJob>>>>,
}

impl SchedulerService {
    /// Open the service over a database: run recovery once and seed the
    /// live map with everything it returns.
    pub async fn bootstrap(db: SchedulerDb, config: &SchedulerConfig) -> Result<Self> {
        let recovered = recover(&db, config.finished_job_window_secs).await?;
        let mut jobs = HashMap::with_capacity(recovered.total());
        for job in recovered.into_jobs() {
            jobs.insert(job.id(), Arc::new(Mutex::new(job)));
        }
        Ok(Self {
            db,
            jobs: RwLock::new(jobs),
        })
    }

    pub fn db(&self) -> &SchedulerDb {
        &self.db
    }

    /// Validate, persist and activate a submitted job.
    pub async fn submit(&self, spec: &JobSpec) -> Result<JobId> {
        let id = self.db.reserve_job_id().await?;
        let job = spec.instantiate(id)?;
        self.db.insert_job(&job).await?;
        self.jobs
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(job)));
        info!(job = %id, name = %spec.name, "job submitted");
        Ok(id)
    }

    /// Snapshot of a job's ready-to-run frontier, for the dispatch loop.
    pub async fn eligible_tasks(&self, job: JobId) -> Result<Vec<EligibleTaskDescriptor>> {
        let handle = self.handle(job).await?;
        let job = handle.lock().await;
        Ok(job.eligible_tasks())
    }

    /// Read access to a live job under its lock.
    pub async fn with_job<R>(&self, id: JobId, f: impl FnOnce(&InternalJob) -> R) -> Result<R> {
        let handle = self.handle(id).await?;
        let job = handle.lock().await;
        Ok(f(&job))
    }

    /// An eligible task was dispatched to an execution host.
    pub async fn task_started(&self, job: JobId, task: &TaskId, host: &str) -> Result<()> {
        let handle = self.handle(job).await?;
        let mut job = handle.lock().await;
        if job.status().is_terminal() {
            debug!(job = %job.id(), task = %task, "ignoring start event on a terminal job");
            return Ok(());
        }
        job.start_task(task, host, epoch_millis())?;
        self.db.job_task_started(&job, task).await
    }

    /// A task finished successfully, with its workflow action and optional
    /// result payload. Duplicate notifications are no-ops.
    pub async fn task_terminated(
        &self,
        job: JobId,
        task: &TaskId,
        action: &FlowAction,
        result: Option<TaskResult>,
    ) -> Result<()> {
        let handle = self.handle(job).await?;
        let mut job = handle.lock().await;
        let Some(outcome) = job.terminate_task(task, action, epoch_millis())? else {
            return Ok(());
        };

        if outcome.changed_graph_shape() {
            let changes = WorkflowChanges {
                finished: task.clone(),
                skipped: outcome.pruned,
                new_tasks: outcome.new_tasks.into_iter().map(|t| t.id).collect(),
            };
            self.db
                .update_after_workflow_task_finished(&job, &changes, result.as_ref())
                .await
        } else {
            self.db
                .update_after_task_finished(&job, task, result.as_ref())
                .await
        }
    }

    /// A running task's execution failed. Either the task re-enters the
    /// eligible set (attempts left) or the whole job aborts.
    pub async fn task_failed(&self, job: JobId, task: &TaskId) -> Result<TaskFailureOutcome> {
        let handle = self.handle(job).await?;
        let mut job = handle.lock().await;
        let outcome = job.task_failed(task, epoch_millis())?;
        match &outcome {
            TaskFailureOutcome::Restarted { .. } => {
                self.db.job_task_started(&job, task).await?;
            }
            TaskFailureOutcome::JobFailed { aborted } => {
                self.db.update_after_job_failed(&job, aborted).await?;
            }
        }
        Ok(outcome)
    }

    /// Administrative kill. Killing a terminal job is a no-op.
    pub async fn kill_job(&self, job: JobId) -> Result<Vec<TaskId>> {
        let handle = self.handle(job).await?;
        let mut job = handle.lock().await;
        let was_terminal = job.status().is_terminal();
        let aborted = job.kill(epoch_millis())?;
        if !was_terminal {
            self.db.update_after_job_failed(&job, &aborted).await?;
        }
        Ok(aborted)
    }

    /// Drop a job from the live map and remove it durably; `delete_data`
    /// hard-deletes results too.
    pub async fn remove_job(&self, id: JobId, delete_data: bool) -> Result<()> {
        let removed_time = epoch_millis();
        let handle = self.jobs.write().await.remove(&id);
        if let Some(handle) = handle {
            let mut job = handle.lock().await;
            job.set_removed_time(removed_time);
        }
        self.db.remove_job(id, removed_time, delete_data).await
    }

    pub async fn change_priority(&self, id: JobId, priority: JobPriority) -> Result<()> {
        let handle = self.handle(id).await?;
        {
            let mut job = handle.lock().await;
            job.set_priority(priority);
        }
        self.db.change_job_priority(id, priority).await
    }

    pub async fn set_to_be_removed(&self, id: JobId) -> Result<()> {
        let handle = self.handle(id).await?;
        {
            let mut job = handle.lock().await;
            job.set_to_be_removed();
        }
        self.db.set_job_to_be_removed(id).await
    }

    /// Paged, filtered, sorted job listing straight from the database.
    pub async fn list_jobs(&self, request: &JobPageRequest) -> Result<JobPage> {
        self.db.load_jobs(request).await
    }

    async fn handle(&self, id: JobId) -> Result<Arc<Mutex<InternalJob>>> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(SchedulerError::UnknownJob(id))
    }
}
