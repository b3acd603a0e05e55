// src/types.rs

//! Identifier and status types shared across the crate.
//!
//! `JobId` and `TaskId` are the only keys used to relate durable rows and
//! live descriptors; everything else keys off them. Task names can carry
//! `*R` (replication) and `#I` (iteration) suffixes produced by workflow
//! actions, e.g. `split*3#1`; the indices are derived from the name while
//! the raw `(job, value)` pair stays unique regardless of cloning.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Globally unique job identifier (monotonic sequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl JobId {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task identifier: job id plus a per-job sequence number.
///
/// The readable name is carried along for diagnostics and for deriving
/// iteration/replication indices, but equality and hashing use only
/// `(job, value)`. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskId {
    job: JobId,
    value: u64,
    readable_name: String,
}

impl TaskId {
    pub fn new(job: JobId, value: u64, readable_name: impl Into<String>) -> Self {
        Self {
            job,
            value,
            readable_name: readable_name.into(),
        }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn value(&self) -> u64 {
        self.value
    }

    pub fn readable_name(&self) -> &str {
        &self.readable_name
    }

    /// Name with any `*R` / `#I` suffixes stripped.
    pub fn base_name(&self) -> &str {
        let name = self.readable_name.as_str();
        let end = name.find(['*', '#']).unwrap_or(name.len());
        &name[..end]
    }

    /// Iteration index derived from the `#I` suffix (0 for the first pass).
    pub fn iteration_index(&self) -> u32 {
        suffix_index(&self.readable_name, '#')
    }

    /// Replication index derived from the `*R` suffix (0 for the original).
    pub fn replication_index(&self) -> u32 {
        suffix_index(&self.readable_name, '*')
    }
}

impl PartialEq for TaskId {
    fn eq(&self, other: &Self) -> bool {
        self.job == other.job && self.value == other.value
    }
}

impl Eq for TaskId {}

impl std::hash::Hash for TaskId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.job.hash(state);
        self.value.hash(state);
    }
}

impl PartialOrd for TaskId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.job, self.value).cmp(&(other.job, other.value))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t{} ({})", self.job, self.value, self.readable_name)
    }
}

/// Build an instance name from a base name plus replication/iteration
/// indices: `instance_name("split", 3, 1)` → `"split*3#1"`. Zero indices
/// add nothing.
pub fn instance_name(base: &str, replication: u32, iteration: u32) -> String {
    let mut name = String::from(base);
    if replication > 0 {
        name.push('*');
        name.push_str(&replication.to_string());
    }
    if iteration > 0 {
        name.push('#');
        name.push_str(&iteration.to_string());
    }
    name
}

fn suffix_index(name: &str, marker: char) -> u32 {
    match name.rfind(marker) {
        Some(pos) => {
            let digits: String = name[pos + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().unwrap_or(0)
        }
        None => 0,
    }
}

/// Status of a single task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Created at submission, not yet handed to the scheduler.
    Submitted,
    /// Waiting for dependencies or for dispatch.
    Pending,
    /// Dispatch suspended by a job-level pause.
    Paused,
    /// Currently executing on some host.
    Running,
    /// Terminated successfully.
    Finished,
    /// Terminated with an execution error and no attempts left.
    Faulty,
    /// Killed mid-flight (job kill, or node failure with no restarts left).
    Aborted,
    /// Cut off by a job-level failure before it ever ran.
    NotStarted,
    /// Pruned branch of an IF workflow action; never ran, never will.
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished
                | TaskStatus::Faulty
                | TaskStatus::Aborted
                | TaskStatus::NotStarted
                | TaskStatus::Skipped
        )
    }

    /// Whether a dependency in this status counts as met for its children.
    ///
    /// `Skipped` satisfies dependencies: the continuation of an IF must not
    /// wait for the branch that was pruned.
    pub fn satisfies_dependencies(self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Submitted => "SUBMITTED",
            TaskStatus::Pending => "PENDING",
            TaskStatus::Paused => "PAUSED",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Finished => "FINISHED",
            TaskStatus::Faulty => "FAULTY",
            TaskStatus::Aborted => "ABORTED",
            TaskStatus::NotStarted => "NOT_STARTED",
            TaskStatus::Skipped => "SKIPPED",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(TaskStatus::Submitted),
            "PENDING" => Ok(TaskStatus::Pending),
            "PAUSED" => Ok(TaskStatus::Paused),
            "RUNNING" => Ok(TaskStatus::Running),
            "FINISHED" => Ok(TaskStatus::Finished),
            "FAULTY" => Ok(TaskStatus::Faulty),
            "ABORTED" => Ok(TaskStatus::Aborted),
            "NOT_STARTED" => Ok(TaskStatus::NotStarted),
            "SKIPPED" => Ok(TaskStatus::Skipped),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a whole job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    /// Running but with nothing currently dispatchable.
    Stalled,
    Paused,
    Finished,
    Canceled,
    Failed,
    Killed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Canceled | JobStatus::Failed | JobStatus::Killed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Stalled => "STALLED",
            JobStatus::Paused => "PAUSED",
            JobStatus::Finished => "FINISHED",
            JobStatus::Canceled => "CANCELED",
            JobStatus::Failed => "FAILED",
            JobStatus::Killed => "KILLED",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "RUNNING" => Ok(JobStatus::Running),
            "STALLED" => Ok(JobStatus::Stalled),
            "PAUSED" => Ok(JobStatus::Paused),
            "FINISHED" => Ok(JobStatus::Finished),
            "CANCELED" => Ok(JobStatus::Canceled),
            "FAILED" => Ok(JobStatus::Failed),
            "KILLED" => Ok(JobStatus::Killed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job priority. Only consulted by scheduling policies outside this crate;
/// the descriptor layer never reorders on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Idle,
    Lowest,
    Low,
    Normal,
    High,
    Highest,
}

impl JobPriority {
    pub fn as_i64(self) -> i64 {
        match self {
            JobPriority::Idle => 0,
            JobPriority::Lowest => 1,
            JobPriority::Low => 2,
            JobPriority::Normal => 3,
            JobPriority::High => 4,
            JobPriority::Highest => 5,
        }
    }

    pub fn from_i64(value: i64) -> Result<Self, String> {
        match value {
            0 => Ok(JobPriority::Idle),
            1 => Ok(JobPriority::Lowest),
            2 => Ok(JobPriority::Low),
            3 => Ok(JobPriority::Normal),
            4 => Ok(JobPriority::High),
            5 => Ok(JobPriority::Highest),
            other => Err(format!("unknown job priority: {other}")),
        }
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

/// Current wall-clock time as epoch milliseconds, the unit used for every
/// persisted timestamp.
pub fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
