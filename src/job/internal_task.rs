// src/job/internal_task.rs

//! Durable task representation.
//!
//! An `InternalTask` is the source-of-truth entity for one task: status,
//! timing, attempt counters, dependency ids and the executable container.
//! It is owned exclusively by its `InternalJob` and mutated only through
//! job-level operations so that task rows, job counters and the live
//! descriptor graph stay consistent.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::job::container::ExecutableContainer;
use crate::job::flow::FlowSpec;
use crate::types::{TaskId, TaskStatus};

/// An inline script with its engine name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub engine: String,
    pub code: String,
}

/// Optional scripts surrounding a task execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskScripts {
    #[serde(default)]
    pub pre: Option<Script>,
    #[serde(default)]
    pub post: Option<Script>,
    #[serde(default)]
    pub clean: Option<Script>,
    #[serde(default)]
    pub selection: Option<Script>,
}

impl TaskScripts {
    pub fn is_empty(&self) -> bool {
        self.pre.is_none() && self.post.is_none() && self.clean.is_none() && self.selection.is_none()
    }
}

/// Multi-node execution requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelEnvironment {
    pub nodes_needed: u32,
}

#[derive(Debug, Clone)]
pub struct InternalTask {
    pub(crate) id: TaskId,
    pub(crate) status: TaskStatus,
    pub(crate) start_time: Option<i64>,
    pub(crate) finish_time: Option<i64>,
    pub(crate) execution_host: Option<String>,
    /// Total execution attempts allowed for this task.
    pub(crate) max_executions: u32,
    /// Remaining attempts after execution errors.
    pub(crate) executions_left: u32,
    /// Remaining restarts after node failures.
    pub(crate) executions_on_failure_left: u32,
    pub(crate) depends_on: Vec<TaskId>,
    pub(crate) container: ExecutableContainer,
    pub(crate) generic_info: BTreeMap<String, String>,
    pub(crate) scripts: TaskScripts,
    pub(crate) flow: Option<FlowSpec>,
    pub(crate) parallel: Option<ParallelEnvironment>,
    pub(crate) precious_result: bool,
    pub(crate) precious_logs: bool,
}

impl InternalTask {
    pub(crate) fn new(id: TaskId, container: ExecutableContainer) -> Self {
        Self {
            id,
            status: TaskStatus::Submitted,
            start_time: None,
            finish_time: None,
            execution_host: None,
            max_executions: 1,
            executions_left: 1,
            executions_on_failure_left: 1,
            depends_on: Vec::new(),
            container,
            generic_info: BTreeMap::new(),
            scripts: TaskScripts::default(),
            flow: None,
            parallel: None,
            precious_result: false,
            precious_logs: false,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn finish_time(&self) -> Option<i64> {
        self.finish_time
    }

    pub fn execution_host(&self) -> Option<&str> {
        self.execution_host.as_deref()
    }

    pub fn max_executions(&self) -> u32 {
        self.max_executions
    }

    pub fn executions_left(&self) -> u32 {
        self.executions_left
    }

    pub fn executions_on_failure_left(&self) -> u32 {
        self.executions_on_failure_left
    }

    pub fn depends_on(&self) -> &[TaskId] {
        &self.depends_on
    }

    pub fn container(&self) -> &ExecutableContainer {
        &self.container
    }

    pub fn generic_info(&self) -> &BTreeMap<String, String> {
        &self.generic_info
    }

    pub fn scripts(&self) -> &TaskScripts {
        &self.scripts
    }

    pub fn flow(&self) -> Option<&FlowSpec> {
        self.flow.as_ref()
    }

    pub fn parallel(&self) -> Option<ParallelEnvironment> {
        self.parallel
    }

    pub fn precious_result(&self) -> bool {
        self.precious_result
    }

    pub fn precious_logs(&self) -> bool {
        self.precious_logs
    }

    /// Zero-based index of the execution attempt currently in flight (or the
    /// one that just finished): the number of attempts already burned.
    pub fn attempt_index(&self) -> u32 {
        self.max_executions.saturating_sub(self.executions_left)
    }

    /// Clone this task as a fresh workflow instance (replica or loop
    /// iteration) under a new id with remapped dependencies.
    ///
    /// Status, times, host and attempt counters are reset; everything
    /// structural (container, scripts, flow, generic info) is inherited.
    pub(crate) fn clone_as_instance(&self, id: TaskId, depends_on: Vec<TaskId>) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            start_time: None,
            finish_time: None,
            execution_host: None,
            max_executions: self.max_executions,
            executions_left: self.max_executions,
            executions_on_failure_left: self.executions_on_failure_left,
            depends_on,
            container: self.container.clone(),
            generic_info: self.generic_info.clone(),
            scripts: self.scripts.clone(),
            flow: self.flow.clone(),
            parallel: self.parallel,
            precious_result: self.precious_result,
            precious_logs: self.precious_logs,
        }
    }
}
