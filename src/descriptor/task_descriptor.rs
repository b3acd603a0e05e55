// src/descriptor/task_descriptor.rs

//! One node of the live dependency graph.
//!
//! Parent/child lists hold `TaskId`s that index into the owning
//! `JobDescriptor`'s arena; a descriptor never owns another descriptor, so
//! there is no cyclic ownership to worry about. Equality and hashing use
//! the `TaskId` only.

use std::collections::BTreeMap;

use crate::errors::{Result, SchedulerError};
use crate::job::FlowSpec;
use crate::types::TaskId;

#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    id: TaskId,
    parents: Vec<TaskId>,
    children: Vec<TaskId>,
    /// Remaining unmet dependencies. Starts at 0 and is incremented as
    /// unresolved parents are attached; reaching 0 again makes the task
    /// eligible.
    parents_count: usize,
    generic_info: BTreeMap<String, String>,
    flow: Option<FlowSpec>,
}

impl TaskDescriptor {
    pub(crate) fn new(
        id: TaskId,
        generic_info: BTreeMap<String, String>,
        flow: Option<FlowSpec>,
    ) -> Self {
        Self {
            id,
            parents: Vec::new(),
            children: Vec::new(),
            parents_count: 0,
            generic_info,
            flow,
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn parents(&self) -> &[TaskId] {
        &self.parents
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    pub fn parents_count(&self) -> usize {
        self.parents_count
    }

    pub fn children_count(&self) -> usize {
        self.children.len()
    }

    pub fn generic_info(&self) -> &BTreeMap<String, String> {
        &self.generic_info
    }

    pub fn flow(&self) -> Option<&FlowSpec> {
        self.flow.as_ref()
    }

    /// Attach a parent whose completion this task still waits for.
    /// Only valid while building or extending the graph.
    pub(crate) fn add_parent(&mut self, parent: TaskId) {
        self.parents.push(parent);
        self.parents_count += 1;
    }

    /// Attach a parent that is already terminated (recovery of a partially
    /// executed job): recorded for graph shape, not counted as unmet.
    pub(crate) fn add_resolved_parent(&mut self, parent: TaskId) {
        self.parents.push(parent);
    }

    pub(crate) fn add_child(&mut self, child: TaskId) {
        self.children.push(child);
    }

    /// One parent terminated successfully. Returns `true` when the last
    /// unmet dependency was just resolved.
    ///
    /// Decrementing below zero means a parent terminated twice or the graph
    /// wiring is broken; that is a programming-invariant violation, never
    /// clamped.
    pub(crate) fn parent_terminated(&mut self) -> Result<bool> {
        if self.parents_count == 0 {
            return Err(SchedulerError::InvariantViolation(format!(
                "task {} got a parent-terminated signal with no unmet parents left",
                self.id
            )));
        }
        self.parents_count -= 1;
        Ok(self.parents_count == 0)
    }

    /// Detach a pruned (never-terminated) parent edge. Returns `true` when
    /// the task has no unmet dependencies left.
    pub(crate) fn remove_parent(&mut self, parent: &TaskId) -> Result<bool> {
        let pos = self.parents.iter().position(|p| p == parent).ok_or_else(|| {
            SchedulerError::InvariantViolation(format!(
                "task {} asked to drop parent {} which is not wired",
                self.id, parent
            ))
        })?;
        self.parents.remove(pos);
        if self.parents_count == 0 {
            return Err(SchedulerError::InvariantViolation(format!(
                "task {} dropped parent {} below a zero unmet-parent count",
                self.id, parent
            )));
        }
        self.parents_count -= 1;
        Ok(self.parents_count == 0)
    }

    /// Swap one unmet parent edge for another without touching the count
    /// (loop rewiring: an exit child stops waiting for the old block
    /// terminator and waits for the new one instead).
    pub(crate) fn replace_parent(&mut self, old: &TaskId, new: TaskId) -> Result<()> {
        let pos = self.parents.iter().position(|p| p == old).ok_or_else(|| {
            SchedulerError::InvariantViolation(format!(
                "task {} asked to replace parent {} which is not wired",
                self.id, old
            ))
        })?;
        self.parents[pos] = new;
        Ok(())
    }

    pub(crate) fn remove_child(&mut self, child: &TaskId) {
        self.children.retain(|c| c != child);
    }
}

impl PartialEq for TaskDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskDescriptor {}

impl std::hash::Hash for TaskDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Capability wrapper around a descriptor that is in the eligible set.
///
/// Only `JobDescriptor` can construct one, so execution scheduling can never
/// be handed a task whose dependencies are unmet.
#[derive(Debug, Clone)]
pub struct EligibleTaskDescriptor {
    inner: TaskDescriptor,
}

impl EligibleTaskDescriptor {
    pub(crate) fn new(inner: TaskDescriptor) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> &TaskId {
        self.inner.id()
    }

    pub fn generic_info(&self) -> &BTreeMap<String, String> {
        self.inner.generic_info()
    }

    pub fn as_descriptor(&self) -> &TaskDescriptor {
        &self.inner
    }
}
