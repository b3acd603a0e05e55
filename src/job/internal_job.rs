// src/job/internal_job.rs

//! Durable job representation and its lifecycle operations.
//!
//! An `InternalJob` owns its tasks and exactly one [`JobDescriptor`]. All
//! mutations go through the job-level operations here so that task rows,
//! aggregate counters and the live graph never drift apart; callers get
//! back everything the durable layer needs to persist in one transaction.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::descriptor::{EligibleTaskDescriptor, JobDescriptor, TerminationOutcome};
use crate::errors::{Result, SchedulerError};
use crate::job::flow::FlowAction;
use crate::job::internal_task::InternalTask;
use crate::types::{JobId, JobPriority, JobStatus, TaskId, TaskStatus};

/// What a failure event did to the job.
#[derive(Debug, Clone)]
pub enum TaskFailureOutcome {
    /// Attempts remain; the task is back in the eligible set.
    Restarted { attempts_left: u32 },
    /// No attempts left; the job aborted. Every task drained by the abort,
    /// in insertion order, for the durable layer.
    JobFailed { aborted: Vec<TaskId> },
}

#[derive(Debug, Clone)]
pub struct InternalJob {
    id: JobId,
    name: String,
    owner: String,
    priority: JobPriority,
    status: JobStatus,
    submitted_time: i64,
    start_time: Option<i64>,
    finish_time: Option<i64>,
    /// Soft-removal mark; the row survives until a hard delete.
    removed_time: Option<i64>,
    to_be_removed: bool,
    generic_info: BTreeMap<String, String>,
    tasks: HashMap<TaskId, InternalTask>,
    /// Task insertion order, extended as workflow clones are registered.
    task_order: Vec<TaskId>,
    pending_tasks_count: usize,
    running_tasks_count: usize,
    finished_tasks_count: usize,
    descriptor: JobDescriptor,
}

impl InternalJob {
    /// Assemble a job from its tasks (submission or recovery) and build the
    /// descriptor graph from their current statuses.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn assemble(
        id: JobId,
        name: String,
        owner: String,
        priority: JobPriority,
        status: JobStatus,
        submitted_time: i64,
        start_time: Option<i64>,
        finish_time: Option<i64>,
        removed_time: Option<i64>,
        to_be_removed: bool,
        generic_info: BTreeMap<String, String>,
        tasks_in_order: Vec<InternalTask>,
    ) -> Result<Self> {
        let task_order: Vec<TaskId> = tasks_in_order.iter().map(|t| t.id().clone()).collect();
        let refs: Vec<&InternalTask> = tasks_in_order.iter().collect();
        let descriptor = JobDescriptor::build(id, &refs)?;

        let tasks: HashMap<TaskId, InternalTask> = tasks_in_order
            .into_iter()
            .map(|t| (t.id().clone(), t))
            .collect();
        if tasks.len() != task_order.len() {
            return Err(SchedulerError::InvariantViolation(format!(
                "job {id} has duplicate task ids"
            )));
        }

        let mut job = Self {
            id,
            name,
            owner,
            priority,
            status,
            submitted_time,
            start_time,
            finish_time,
            removed_time,
            to_be_removed,
            generic_info,
            tasks,
            task_order,
            pending_tasks_count: 0,
            running_tasks_count: 0,
            finished_tasks_count: 0,
            descriptor,
        };
        job.recompute_counters();
        Ok(job)
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn priority(&self) -> JobPriority {
        self.priority
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn submitted_time(&self) -> i64 {
        self.submitted_time
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn finish_time(&self) -> Option<i64> {
        self.finish_time
    }

    pub fn removed_time(&self) -> Option<i64> {
        self.removed_time
    }

    pub fn to_be_removed(&self) -> bool {
        self.to_be_removed
    }

    pub fn generic_info(&self) -> &BTreeMap<String, String> {
        &self.generic_info
    }

    pub fn pending_tasks_count(&self) -> usize {
        self.pending_tasks_count
    }

    pub fn running_tasks_count(&self) -> usize {
        self.running_tasks_count
    }

    pub fn finished_tasks_count(&self) -> usize {
        self.finished_tasks_count
    }

    pub fn total_tasks_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn descriptor(&self) -> &JobDescriptor {
        &self.descriptor
    }

    pub fn task(&self, id: &TaskId) -> Option<&InternalTask> {
        self.tasks.get(id)
    }

    /// Tasks in insertion order (static tasks first, then workflow clones in
    /// the order they were registered).
    pub fn tasks_in_order(&self) -> impl Iterator<Item = &InternalTask> {
        self.task_order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Snapshot of the ready-to-run frontier.
    pub fn eligible_tasks(&self) -> Vec<EligibleTaskDescriptor> {
        self.descriptor.eligible_tasks()
    }

    pub(crate) fn set_priority(&mut self, priority: JobPriority) {
        self.priority = priority;
    }

    pub(crate) fn set_to_be_removed(&mut self) {
        self.to_be_removed = true;
    }

    pub(crate) fn set_removed_time(&mut self, at: i64) {
        self.removed_time = Some(at);
    }

    /// An eligible task was handed to an execution host.
    ///
    /// Returns `true` when job-level fields changed too (first task of a
    /// pending job flips the job to Running), so persistence can include
    /// the job row in the same write.
    pub fn start_task(&mut self, id: &TaskId, host: &str, now: i64) -> Result<bool> {
        if self.status.is_terminal() {
            return Err(SchedulerError::InvariantViolation(format!(
                "task start on job {} which is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.descriptor.start(id)?;

        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?;
        task.status = TaskStatus::Running;
        task.start_time = Some(now);
        task.finish_time = None;
        task.execution_host = Some(host.to_string());

        let job_changed = if self.status == JobStatus::Pending {
            self.status = JobStatus::Running;
            self.start_time = Some(now);
            true
        } else {
            false
        };

        self.recompute_counters();
        info!(job = %self.id, task = %id, host, "task started");
        Ok(job_changed)
    }

    /// A task finished successfully, with the workflow action its execution
    /// reported.
    ///
    /// A duplicate notification for an already-terminated task (at-least-once
    /// delivery from the execution layer) is a no-op and returns `None`.
    pub fn terminate_task(
        &mut self,
        id: &TaskId,
        action: &FlowAction,
        now: i64,
    ) -> Result<Option<TerminationOutcome>> {
        let task = self
            .tasks
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?;
        if task.status.is_terminal() || self.status.is_terminal() {
            debug!(job = %self.id, task = %id, "ignoring duplicate or late finish notification");
            return Ok(None);
        }

        let outcome = self.descriptor.terminate(id, action)?;

        if let Some(task) = self.tasks.get_mut(id) {
            task.status = TaskStatus::Finished;
            task.finish_time = Some(now);
        }
        for skipped in &outcome.pruned {
            if let Some(task) = self.tasks.get_mut(skipped) {
                task.status = TaskStatus::Skipped;
                task.finish_time = Some(now);
            }
        }
        for instance in &outcome.new_tasks {
            let template = self.tasks.get(&instance.template).ok_or_else(|| {
                SchedulerError::UnknownTask(instance.template.clone())
            })?;
            let clone =
                template.clone_as_instance(instance.id.clone(), instance.depends_on.clone());
            self.task_order.push(instance.id.clone());
            self.tasks.insert(instance.id.clone(), clone);
        }

        self.recompute_counters();
        if self.finished_tasks_count == self.tasks.len() {
            self.status = JobStatus::Finished;
            self.finish_time = Some(now);
            info!(job = %self.id, "job finished");
        }
        info!(
            job = %self.id,
            task = %id,
            newly_eligible = outcome.newly_eligible.len(),
            pruned = outcome.pruned.len(),
            new_tasks = outcome.new_tasks.len(),
            "task terminated"
        );
        Ok(Some(outcome))
    }

    /// A running task's execution failed.
    ///
    /// While attempts remain the task goes back to the end of the eligible
    /// set; when the last attempt is burned the whole job aborts.
    pub fn task_failed(&mut self, id: &TaskId, now: i64) -> Result<TaskFailureOutcome> {
        let task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?;
        if task.status != TaskStatus::Running {
            return Err(SchedulerError::InvariantViolation(format!(
                "failure reported for task {id} which is not running"
            )));
        }

        task.executions_left = task.executions_left.saturating_sub(1);
        if task.executions_left > 0 {
            task.status = TaskStatus::Pending;
            task.start_time = None;
            task.execution_host = None;
            let attempts_left = task.executions_left;
            self.descriptor.restore_eligible(id)?;
            self.recompute_counters();
            warn!(job = %self.id, task = %id, attempts_left, "task failed; restarting");
            return Ok(TaskFailureOutcome::Restarted { attempts_left });
        }

        task.status = TaskStatus::Faulty;
        task.finish_time = Some(now);
        let aborted = self.abort_remaining_all(now)?;
        self.status = JobStatus::Failed;
        self.finish_time = Some(now);
        self.recompute_counters();
        warn!(
            job = %self.id,
            task = %id,
            aborted = aborted.len(),
            "task exhausted its attempts; job failed"
        );
        Ok(TaskFailureOutcome::JobFailed { aborted })
    }

    /// Administrative kill. A kill of an already-terminal job is a no-op.
    pub fn kill(&mut self, now: i64) -> Result<Vec<TaskId>> {
        if self.status.is_terminal() {
            debug!(job = %self.id, "ignoring kill of a terminal job");
            return Ok(Vec::new());
        }
        let aborted = self.abort_remaining_all(now)?;
        self.status = JobStatus::Killed;
        self.finish_time = Some(now);
        self.recompute_counters();
        info!(job = %self.id, aborted = aborted.len(), "job killed");
        Ok(aborted)
    }

    /// Derive the aggregate counters from actual task statuses. Stored
    /// counters are never trusted across a restart.
    pub(crate) fn recompute_counters(&mut self) {
        let mut pending = 0;
        let mut running = 0;
        let mut finished = 0;
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Running => running += 1,
                s if s.is_terminal() => finished += 1,
                _ => pending += 1,
            }
        }
        self.pending_tasks_count = pending;
        self.running_tasks_count = running;
        self.finished_tasks_count = finished;
    }

    /// Drain every non-terminal task: running and eligible tasks become
    /// `Aborted`, tasks still blocked on dependencies become `NotStarted`.
    fn abort_remaining_all(&mut self, now: i64) -> Result<Vec<TaskId>> {
        let eligible: HashSet<TaskId> = self.descriptor.eligible_ids().into_iter().collect();
        let mut drained = self.descriptor.clear_running();
        drained.extend(self.descriptor.abort_pending());

        for id in &drained {
            let task = self
                .tasks
                .get_mut(id)
                .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?;
            if task.status.is_terminal() {
                continue;
            }
            task.status = if task.status == TaskStatus::Running || eligible.contains(id) {
                TaskStatus::Aborted
            } else {
                TaskStatus::NotStarted
            };
            task.finish_time = Some(now);
        }
        Ok(drained)
    }
}
