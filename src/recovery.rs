// src/recovery.rs

//! Crash recovery: rebuild the live scheduler state from the database.
//!
//! Recovery only reads. Adjustments (running tasks whose executions died
//! with the process, stale counters) are made in memory, so running it
//! twice over the same database gives the same state.

use tracing::{info, warn};

use crate::db::{PersistedJob, SchedulerDb};
use crate::errors::Result;
use crate::job::InternalJob;
use crate::types::{epoch_millis, JobStatus, TaskStatus};

/// Live jobs rebuilt from the database, bucketed by lifecycle stage.
/// Each bucket is ordered by job id.
#[derive(Debug, Default)]
pub struct RecoveredSchedulerState {
    pub pending_jobs: Vec<InternalJob>,
    pub running_jobs: Vec<InternalJob>,
    pub finished_jobs: Vec<InternalJob>,
}

impl RecoveredSchedulerState {
    pub fn total(&self) -> usize {
        self.pending_jobs.len() + self.running_jobs.len() + self.finished_jobs.len()
    }

    /// All recovered jobs, pending first, then running, then finished.
    pub fn into_jobs(self) -> Vec<InternalJob> {
        let mut jobs = self.pending_jobs;
        jobs.extend(self.running_jobs);
        jobs.extend(self.finished_jobs);
        jobs
    }
}

/// Rebuild every non-removed job. Finished jobs older than
/// `finished_job_window_secs` are left in the database but not loaded;
/// a negative window disables that cutoff.
pub async fn recover(
    db: &SchedulerDb,
    finished_job_window_secs: i64,
) -> Result<RecoveredSchedulerState> {
    let persisted = db.load_full_jobs().await?;
    let now = epoch_millis();

    let mut state = RecoveredSchedulerState::default();
    let mut skipped = 0usize;
    for job in persisted {
        if outside_retention_window(&job, now, finished_job_window_secs) {
            skipped += 1;
            continue;
        }
        let job = rebuild(job)?;
        match job.status() {
            JobStatus::Pending => state.pending_jobs.push(job),
            JobStatus::Running | JobStatus::Stalled | JobStatus::Paused => {
                state.running_jobs.push(job)
            }
            status if status.is_terminal() => state.finished_jobs.push(job),
            _ => state.pending_jobs.push(job),
        }
    }

    info!(
        pending = state.pending_jobs.len(),
        running = state.running_jobs.len(),
        finished = state.finished_jobs.len(),
        skipped,
        "scheduler state recovered"
    );
    Ok(state)
}

fn outside_retention_window(job: &PersistedJob, now: i64, window_secs: i64) -> bool {
    if window_secs < 0 || !job.status.is_terminal() {
        return false;
    }
    match job.finish_time {
        Some(finished) => now - finished > window_secs.saturating_mul(1000),
        None => false,
    }
}

/// Turn a persisted job back into a live one.
///
/// Tasks that were `Running` when the process died are reset to `Pending`:
/// their executions did not survive, and their unfinished state means the
/// descriptor must offer them again. The database row is left as is.
fn rebuild(mut persisted: PersistedJob) -> Result<InternalJob> {
    let mut reset = 0usize;
    for task in &mut persisted.tasks {
        if task.status() == TaskStatus::Running {
            task.status = TaskStatus::Pending;
            task.start_time = None;
            task.execution_host = None;
            reset += 1;
        }
    }
    if reset > 0 {
        warn!(job = %persisted.id, reset, "reset in-flight tasks to pending during recovery");
    }

    InternalJob::assemble(
        persisted.id,
        persisted.name,
        persisted.owner,
        persisted.priority,
        persisted.status,
        persisted.submitted_time,
        persisted.start_time,
        persisted.finish_time,
        persisted.removed_time,
        persisted.to_be_removed,
        persisted.generic_info,
        persisted.tasks,
    )
}
