// src/descriptor/job_descriptor.rs

//! Live dependency graph and eligibility engine for one job.
//!
//! The descriptor owns an arena of [`TaskDescriptor`]s keyed by `TaskId` and
//! maintains the *eligible set*: the authoritative ready-to-run frontier, in
//! insertion order. Every task event (start, terminate, failure, workflow
//! action) flows through here so the frontier is updated incrementally
//! instead of being recomputed.
//!
//! Operating on an unknown `TaskId` is always an error: it means the durable
//! and live state have drifted apart, and that must surface, not be papered
//! over.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::descriptor::task_descriptor::{EligibleTaskDescriptor, TaskDescriptor};
use crate::errors::{Result, SchedulerError};
use crate::job::{Branch, FlowAction, FlowSpec, InternalTask};
use crate::types::{instance_name, JobId, TaskId, TaskStatus};

/// Everything a termination did to the graph, for the durable layer to
/// persist in the same transaction.
#[derive(Debug, Clone, Default)]
pub struct TerminationOutcome {
    /// Tasks whose last unmet dependency was just resolved.
    pub newly_eligible: Vec<TaskId>,
    /// Untaken-branch tasks removed from the graph; to be marked `Skipped`.
    pub pruned: Vec<TaskId>,
    /// Workflow clones added to the graph; to be inserted as task rows.
    pub new_tasks: Vec<NewTaskInstance>,
}

impl TerminationOutcome {
    pub fn changed_graph_shape(&self) -> bool {
        !self.pruned.is_empty() || !self.new_tasks.is_empty()
    }
}

/// A task instance created by a REPLICATE or LOOP action.
#[derive(Debug, Clone)]
pub struct NewTaskInstance {
    pub id: TaskId,
    /// The static task this instance was cloned from.
    pub template: TaskId,
    /// Dependencies already remapped into the new instance space.
    pub depends_on: Vec<TaskId>,
}

/// Graph mutation a termination resolved to, validated before the
/// running/finished sets change.
enum GraphSurgery {
    None,
    PruneBranch { pruned: TaskId, continuation: TaskId },
    ReplicateBlock { block: Vec<String>, runs: u32 },
    IterateBlock { block: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct JobDescriptor {
    job: JobId,
    tasks: HashMap<TaskId, TaskDescriptor>,
    /// Arena insertion order; the source of every deterministic iteration.
    order: Vec<TaskId>,
    by_name: HashMap<String, TaskId>,
    /// Ready-to-run frontier, in insertion order.
    eligible: Vec<TaskId>,
    running: HashSet<TaskId>,
    finished: HashSet<TaskId>,
    /// Next per-job sequence number for workflow clones.
    next_seq: u64,
}

impl JobDescriptor {
    /// Build the graph from a job's tasks, in task insertion order.
    ///
    /// Tasks with no dependencies enter the eligible set immediately. A
    /// dependency that is already terminated (recovery of a partially
    /// executed job) is recorded but not counted as unmet, so the rebuilt
    /// frontier matches what would have existed had the process never
    /// stopped.
    pub(crate) fn build(job: JobId, tasks_in_order: &[&InternalTask]) -> Result<Self> {
        let mut descriptor = Self {
            job,
            tasks: HashMap::new(),
            order: Vec::new(),
            by_name: HashMap::new(),
            eligible: Vec::new(),
            running: HashSet::new(),
            finished: HashSet::new(),
            next_seq: 0,
        };

        for task in tasks_in_order {
            let id = task.id().clone();
            descriptor.next_seq = descriptor.next_seq.max(id.value() + 1);
            descriptor.insert_descriptor(TaskDescriptor::new(
                id,
                task.generic_info().clone(),
                task.flow().cloned(),
            ))?;
        }

        let status_of: HashMap<TaskId, TaskStatus> = tasks_in_order
            .iter()
            .map(|t| (t.id().clone(), t.status()))
            .collect();

        for task in tasks_in_order {
            for dep in task.depends_on() {
                let dep_status = *status_of
                    .get(dep)
                    .ok_or_else(|| SchedulerError::UnknownTask(dep.clone()))?;

                descriptor.with_task_mut(dep, |d| d.add_child(task.id().clone()))?;
                descriptor.with_task_mut(task.id(), |d| {
                    if dep_status.satisfies_dependencies() {
                        d.add_resolved_parent(dep.clone());
                    } else {
                        d.add_parent(dep.clone());
                    }
                })?;
            }
        }

        for task in tasks_in_order {
            let id = task.id();
            let status = task.status();
            if status.is_terminal() {
                descriptor.finished.insert(id.clone());
            } else if status == TaskStatus::Running {
                descriptor.running.insert(id.clone());
            } else if descriptor.parents_count_of(id)? == 0 {
                descriptor.eligible.push(id.clone());
            }
        }

        debug!(
            job = %job,
            tasks = descriptor.order.len(),
            eligible = descriptor.eligible.len(),
            "job descriptor built"
        );

        Ok(descriptor)
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskDescriptor> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_eligible(&self, id: &TaskId) -> bool {
        self.eligible.contains(id)
    }

    /// Ids of the eligible set, in insertion order.
    pub fn eligible_ids(&self) -> Vec<TaskId> {
        self.eligible.clone()
    }

    /// Snapshot of the eligible frontier for the dispatch loop.
    pub fn eligible_tasks(&self) -> Vec<EligibleTaskDescriptor> {
        self.eligible
            .iter()
            .filter_map(|id| self.tasks.get(id))
            .cloned()
            .map(EligibleTaskDescriptor::new)
            .collect()
    }

    /// Ids of currently running tasks, in arena insertion order.
    pub fn running_ids(&self) -> Vec<TaskId> {
        self.order
            .iter()
            .filter(|id| self.running.contains(*id))
            .cloned()
            .collect()
    }

    /// Remove a task from the eligible set and mark it running.
    pub(crate) fn start(&mut self, id: &TaskId) -> Result<()> {
        if !self.tasks.contains_key(id) {
            return Err(SchedulerError::UnknownTask(id.clone()));
        }
        let pos = self.eligible.iter().position(|e| e == id).ok_or_else(|| {
            SchedulerError::InvariantViolation(format!(
                "start for task {id} which is not in the eligible set"
            ))
        })?;
        self.eligible.remove(pos);
        self.running.insert(id.clone());
        debug!(job = %self.job, task = %id, "task left the eligible set and is running");
        Ok(())
    }

    /// Put a failed-but-restartable task back at the end of the frontier.
    pub(crate) fn restore_eligible(&mut self, id: &TaskId) -> Result<()> {
        if !self.tasks.contains_key(id) {
            return Err(SchedulerError::UnknownTask(id.clone()));
        }
        if !self.running.remove(id) {
            return Err(SchedulerError::InvariantViolation(format!(
                "restart for task {id} which is not running"
            )));
        }
        self.eligible.push(id.clone());
        debug!(job = %self.job, task = %id, "task re-entered the eligible set after a failed attempt");
        Ok(())
    }

    /// Apply a successful termination plus its workflow action.
    pub(crate) fn terminate(
        &mut self,
        id: &TaskId,
        action: &FlowAction,
    ) -> Result<TerminationOutcome> {
        if !self.tasks.contains_key(id) {
            return Err(SchedulerError::UnknownTask(id.clone()));
        }
        if !self.running.contains(id) {
            return Err(SchedulerError::InvariantViolation(format!(
                "terminate for task {id} which is not running"
            )));
        }

        // Resolve the action against the task's declared flow before any
        // mutation, so a mismatched action leaves the descriptor untouched.
        let surgery = match action {
            FlowAction::Continue | FlowAction::Loop { iterate: false } => GraphSurgery::None,
            FlowAction::IfBranch { branch } => {
                let (selected, pruned, continuation) = match self.flow_of(id)? {
                    Some(FlowSpec::If {
                        if_branch,
                        else_branch,
                        continuation,
                    }) => match branch {
                        Branch::If => (if_branch, else_branch, continuation),
                        Branch::Else => (else_branch, if_branch, continuation),
                    },
                    _ => {
                        return Err(SchedulerError::InvariantViolation(format!(
                            "IF action reported for task {id} which has no IF flow"
                        )));
                    }
                };
                debug!(
                    job = %self.job,
                    task = %id,
                    selected = %selected,
                    pruned = %pruned,
                    "IF action fired; pruning the untaken branch"
                );
                let rep = id.replication_index();
                let iter = id.iteration_index();
                GraphSurgery::PruneBranch {
                    pruned: self.resolve_instance(&pruned, rep, iter)?,
                    continuation: self.resolve_instance(&continuation, rep, iter)?,
                }
            }
            FlowAction::Replicate { runs } => {
                let block = match self.flow_of(id)? {
                    Some(FlowSpec::Replicate { block }) => block,
                    _ => {
                        return Err(SchedulerError::InvariantViolation(format!(
                            "REPLICATE action reported for task {id} which has no REPLICATE flow"
                        )));
                    }
                };
                if *runs == 0 {
                    return Err(SchedulerError::InvariantViolation(format!(
                        "REPLICATE action for task {id} asked for zero runs"
                    )));
                }
                GraphSurgery::ReplicateBlock { block, runs: *runs }
            }
            FlowAction::Loop { iterate: true } => {
                let block = match self.flow_of(id)? {
                    Some(FlowSpec::Loop { block }) => block,
                    _ => {
                        return Err(SchedulerError::InvariantViolation(format!(
                            "LOOP action reported for task {id} which has no LOOP flow"
                        )));
                    }
                };
                GraphSurgery::IterateBlock { block }
            }
        };

        self.running.remove(id);
        self.finished.insert(id.clone());

        let mut outcome = TerminationOutcome::default();
        match surgery {
            GraphSurgery::None => {}
            GraphSurgery::PruneBranch {
                pruned,
                continuation,
            } => {
                self.prune_branch(&pruned, &continuation, &mut outcome)?;
            }
            GraphSurgery::ReplicateBlock { block, runs } => {
                if runs > 1 {
                    self.replicate_block(id, &block, runs, &mut outcome)?;
                }
            }
            GraphSurgery::IterateBlock { block } => {
                self.iterate_block(id, &block, &mut outcome)?;
            }
        }
        self.release_children(id, &mut outcome)?;

        Ok(outcome)
    }

    /// Job abort: drain every descriptor that has not run yet, without
    /// releasing children. Returns the drained ids in insertion order so the
    /// durable layer can mark them in the same transaction.
    pub(crate) fn abort_pending(&mut self) -> Vec<TaskId> {
        let mut aborted = Vec::new();
        for id in self.order.clone() {
            if self.finished.contains(&id) || self.running.contains(&id) {
                continue;
            }
            self.finished.insert(id.clone());
            aborted.push(id);
        }
        self.eligible.clear();
        aborted
    }

    /// Job abort: mark every still-running descriptor terminal. Returns the
    /// drained ids in insertion order.
    pub(crate) fn clear_running(&mut self) -> Vec<TaskId> {
        let drained: Vec<TaskId> = self
            .order
            .iter()
            .filter(|id| self.running.contains(*id))
            .cloned()
            .collect();
        for id in &drained {
            self.running.remove(id);
            self.finished.insert(id.clone());
        }
        drained
    }

    fn flow_of(&self, id: &TaskId) -> Result<Option<FlowSpec>> {
        Ok(self
            .tasks
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?
            .flow()
            .cloned())
    }

    fn parents_count_of(&self, id: &TaskId) -> Result<usize> {
        Ok(self
            .tasks
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?
            .parents_count())
    }

    fn with_task_mut<T>(
        &mut self,
        id: &TaskId,
        f: impl FnOnce(&mut TaskDescriptor) -> T,
    ) -> Result<T> {
        let desc = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?;
        Ok(f(desc))
    }

    fn insert_descriptor(&mut self, descriptor: TaskDescriptor) -> Result<()> {
        let id = descriptor.id().clone();
        let name = id.readable_name().to_string();
        if self.tasks.contains_key(&id) {
            return Err(SchedulerError::InvariantViolation(format!(
                "duplicate task id {id} in job descriptor"
            )));
        }
        if self.by_name.insert(name.clone(), id.clone()).is_some() {
            return Err(SchedulerError::InvariantViolation(format!(
                "duplicate task name '{name}' in job descriptor"
            )));
        }
        self.order.push(id.clone());
        self.tasks.insert(id, descriptor);
        Ok(())
    }

    fn resolve_instance(&self, base: &str, replication: u32, iteration: u32) -> Result<TaskId> {
        let name = instance_name(base, replication, iteration);
        self.by_name.get(&name).cloned().ok_or_else(|| {
            SchedulerError::InvariantViolation(format!(
                "flow target '{name}' is not present in the graph"
            ))
        })
    }

    /// Decrement every remaining child of a terminated task; children whose
    /// last unmet dependency was just resolved enter the eligible set.
    fn release_children(&mut self, id: &TaskId, outcome: &mut TerminationOutcome) -> Result<()> {
        let children = self
            .tasks
            .get(id)
            .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?
            .children()
            .to_vec();

        for child in children {
            let now_ready = self.with_task_mut(&child, |d| d.parent_terminated())??;
            if now_ready && !self.finished.contains(&child) && !self.running.contains(&child) {
                debug!(job = %self.job, task = %child, "dependencies satisfied; task is eligible");
                self.eligible.push(child.clone());
                outcome.newly_eligible.push(child);
            }
        }
        Ok(())
    }

    /// Remove the untaken IF branch from the graph.
    ///
    /// A task is pruned when every one of its parents is pruned; the
    /// continuation (join) task is never pruned, it just stops waiting for
    /// the edges that disappear. Pruned descriptors leave the arena
    /// entirely rather than being left pending.
    fn prune_branch(
        &mut self,
        entry: &TaskId,
        continuation: &TaskId,
        outcome: &mut TerminationOutcome,
    ) -> Result<()> {
        let mut pruned_set: HashSet<TaskId> = HashSet::new();
        pruned_set.insert(entry.clone());

        // Fixpoint over the arena: anything whose parents are all pruned is
        // part of the dead branch. Insertion order keeps this deterministic.
        loop {
            let mut changed = false;
            for id in &self.order {
                if pruned_set.contains(id)
                    || id == continuation
                    || self.finished.contains(id)
                    || self.running.contains(id)
                {
                    continue;
                }
                let desc = self
                    .tasks
                    .get(id)
                    .ok_or_else(|| SchedulerError::UnknownTask(id.clone()))?;
                if !desc.parents().is_empty()
                    && desc.parents().iter().all(|p| pruned_set.contains(p))
                {
                    pruned_set.insert(id.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let pruned_in_order: Vec<TaskId> = self
            .order
            .iter()
            .filter(|id| pruned_set.contains(*id))
            .cloned()
            .collect();

        for p in &pruned_in_order {
            let parents = self
                .tasks
                .get(p)
                .ok_or_else(|| SchedulerError::UnknownTask(p.clone()))?
                .parents()
                .to_vec();
            let children = self
                .tasks
                .get(p)
                .ok_or_else(|| SchedulerError::UnknownTask(p.clone()))?
                .children()
                .to_vec();

            for parent in parents {
                if !pruned_set.contains(&parent) {
                    self.with_task_mut(&parent, |d| d.remove_child(p))?;
                }
            }
            for child in children {
                if pruned_set.contains(&child) {
                    continue;
                }
                let now_ready = self.with_task_mut(&child, |d| d.remove_parent(p))??;
                if now_ready && !self.finished.contains(&child) && !self.running.contains(&child) {
                    self.eligible.push(child.clone());
                    outcome.newly_eligible.push(child);
                }
            }

            let removed = self.tasks.remove(p);
            if let Some(desc) = removed {
                self.by_name.remove(desc.id().readable_name());
            }
            self.order.retain(|o| o != p);
            self.eligible.retain(|e| e != p);
            debug!(job = %self.job, task = %p, "pruned untaken branch task");
            outcome.pruned.push(p.clone());
        }

        Ok(())
    }

    /// Clone the declared block `runs - 1` extra times, wiring each copy
    /// between the replicating task and the block's merge children.
    fn replicate_block(
        &mut self,
        origin: &TaskId,
        block: &[String],
        runs: u32,
        outcome: &mut TerminationOutcome,
    ) -> Result<()> {
        let iter = origin.iteration_index();
        let templates: Vec<TaskId> = block
            .iter()
            .map(|base| self.resolve_instance(base, 0, iter))
            .collect::<Result<_>>()?;
        let template_set: HashSet<TaskId> = templates.iter().cloned().collect();

        for dup in 1..runs {
            let mut clone_of: HashMap<TaskId, TaskId> = HashMap::new();
            for template in &templates {
                let name = instance_name(template.base_name(), dup, iter);
                let id = TaskId::new(self.job, self.next_seq, name);
                self.next_seq += 1;
                clone_of.insert(template.clone(), id);
            }

            // Create all clone descriptors before wiring so in-block edges
            // can resolve regardless of declaration order.
            for template in &templates {
                let (gi, flow) = {
                    let desc = self
                        .tasks
                        .get(template)
                        .ok_or_else(|| SchedulerError::UnknownTask(template.clone()))?;
                    (desc.generic_info().clone(), desc.flow().cloned())
                };
                let clone_id = clone_of[template].clone();
                self.insert_descriptor(TaskDescriptor::new(clone_id, gi, flow))?;
            }

            for template in &templates {
                let clone_id = clone_of[template].clone();
                let (parents_src, children_src) = {
                    let desc = self
                        .tasks
                        .get(template)
                        .ok_or_else(|| SchedulerError::UnknownTask(template.clone()))?;
                    (desc.parents().to_vec(), desc.children().to_vec())
                };

                let mut deps: Vec<TaskId> = Vec::new();
                for parent in parents_src {
                    let mapped = clone_of.get(&parent).cloned().unwrap_or(parent);
                    if !deps.contains(&mapped) {
                        deps.push(mapped);
                    }
                }
                for parent in &deps {
                    // The replicating task itself is already terminated, but
                    // its children are released right after wiring, so edges
                    // to it stay unresolved here. Any other terminated
                    // parent will never fire again and must not be counted.
                    let resolved = parent != origin && self.finished.contains(parent);
                    self.with_task_mut(parent, |d| d.add_child(clone_of[template].clone()))?;
                    self.with_task_mut(&clone_of[template], |d| {
                        if resolved {
                            d.add_resolved_parent(parent.clone());
                        } else {
                            d.add_parent(parent.clone());
                        }
                    })?;
                }

                // Merge children outside the block wait for every replica.
                for child in children_src {
                    if template_set.contains(&child) || clone_of.contains_key(&child) {
                        continue;
                    }
                    self.with_task_mut(&clone_id, |d| d.add_child(child.clone()))?;
                    self.with_task_mut(&child, |d| d.add_parent(clone_id.clone()))?;
                }

                debug!(
                    job = %self.job,
                    task = %clone_id,
                    template = %template,
                    dup,
                    "replicated task instance added to the graph"
                );
                outcome.new_tasks.push(NewTaskInstance {
                    id: clone_id,
                    template: template.clone(),
                    depends_on: deps,
                });
            }
        }

        Ok(())
    }

    /// Clone the loop block with the next iteration index, wiring the
    /// terminated task to the new block entry and moving the loop-exit
    /// children onto the new block terminator.
    fn iterate_block(
        &mut self,
        origin: &TaskId,
        block: &[String],
        outcome: &mut TerminationOutcome,
    ) -> Result<()> {
        let rep = origin.replication_index();
        let iter = origin.iteration_index();
        let next_iter = iter + 1;

        let templates: Vec<TaskId> = block
            .iter()
            .map(|base| self.resolve_instance(base, rep, iter))
            .collect::<Result<_>>()?;
        if templates.last() != Some(origin) {
            return Err(SchedulerError::InvariantViolation(format!(
                "loop block of task {origin} does not terminate at the looping task"
            )));
        }
        let template_set: HashSet<TaskId> = templates.iter().cloned().collect();

        // Exit children snapshot before any rewiring.
        let exit_children: Vec<TaskId> = self
            .tasks
            .get(origin)
            .ok_or_else(|| SchedulerError::UnknownTask(origin.clone()))?
            .children()
            .iter()
            .filter(|c| !template_set.contains(*c))
            .cloned()
            .collect();

        let mut clone_of: HashMap<TaskId, TaskId> = HashMap::new();
        for template in &templates {
            let name = instance_name(template.base_name(), template.replication_index(), next_iter);
            let id = TaskId::new(self.job, self.next_seq, name);
            self.next_seq += 1;
            clone_of.insert(template.clone(), id);
        }

        for template in &templates {
            let (gi, flow) = {
                let desc = self
                    .tasks
                    .get(template)
                    .ok_or_else(|| SchedulerError::UnknownTask(template.clone()))?;
                (desc.generic_info().clone(), desc.flow().cloned())
            };
            self.insert_descriptor(TaskDescriptor::new(clone_of[template].clone(), gi, flow))?;
        }

        for template in &templates {
            let clone_id = clone_of[template].clone();
            let parents_src = self
                .tasks
                .get(template)
                .ok_or_else(|| SchedulerError::UnknownTask(template.clone()))?
                .parents()
                .to_vec();

            // In-block parents map to their clones; anything outside the
            // block collapses onto the just-terminated task, which gates the
            // next iteration.
            let mut deps: Vec<TaskId> = Vec::new();
            for parent in parents_src {
                let mapped = match clone_of.get(&parent) {
                    Some(clone) => clone.clone(),
                    None => origin.clone(),
                };
                if !deps.contains(&mapped) {
                    deps.push(mapped);
                }
            }
            if deps.is_empty() {
                // A block entry with no declared parents still waits for the
                // previous iteration to terminate.
                deps.push(origin.clone());
            }

            for parent in &deps {
                self.with_task_mut(parent, |d| d.add_child(clone_id.clone()))?;
                self.with_task_mut(&clone_id, |d| d.add_parent(parent.clone()))?;
            }

            debug!(
                job = %self.job,
                task = %clone_id,
                template = %template,
                iteration = next_iter,
                "loop iteration instance added to the graph"
            );
            outcome.new_tasks.push(NewTaskInstance {
                id: clone_id,
                template: template.clone(),
                depends_on: deps,
            });
        }

        // The loop-exit children now wait for the new terminator instead of
        // the terminated one; their unmet-parent counts are unchanged.
        let new_terminator = clone_of[origin].clone();
        for child in exit_children {
            self.with_task_mut(&child, |d| d.replace_parent(origin, new_terminator.clone()))??;
            self.with_task_mut(origin, |d| d.remove_child(&child))?;
            self.with_task_mut(&new_terminator, |d| d.add_child(child.clone()))?;
        }

        Ok(())
    }
}
