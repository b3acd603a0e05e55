// src/submission.rs

//! Submission front door: user-facing job/task specs and their validation.
//!
//! A [`JobSpec`] is what a client hands the scheduler. It refers to tasks
//! and flow targets by readable name; [`JobSpec::instantiate`] validates the
//! whole thing, assigns per-job sequence numbers, resolves names to
//! [`TaskId`]s and assembles the [`InternalJob`] with its descriptor graph.
//! Validation failures are user errors (`InvalidJob`), reported before any
//! state exists.

use std::collections::{BTreeMap, HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::info;

use crate::errors::{Result, SchedulerError};
use crate::job::{
    ExecutableContainer, FlowSpec, InternalJob, InternalTask, ParallelEnvironment, TaskScripts,
};
use crate::types::{epoch_millis, JobId, JobPriority, JobStatus, TaskId, TaskStatus};

/// One task as submitted, before any id exists.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub name: String,
    pub container: ExecutableContainer,
    /// Names of tasks this one depends on.
    pub depends_on: Vec<String>,
    pub max_executions: u32,
    pub max_executions_on_failure: u32,
    pub generic_info: BTreeMap<String, String>,
    pub scripts: TaskScripts,
    pub flow: Option<FlowSpec>,
    pub parallel: Option<ParallelEnvironment>,
    pub precious_result: bool,
    pub precious_logs: bool,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, container: ExecutableContainer) -> Self {
        Self {
            name: name.into(),
            container,
            depends_on: Vec::new(),
            max_executions: 1,
            max_executions_on_failure: 1,
            generic_info: BTreeMap::new(),
            scripts: TaskScripts::default(),
            flow: None,
            parallel: None,
            precious_result: false,
            precious_logs: false,
        }
    }
}

/// A whole job as submitted.
#[derive(Debug, Clone)]
pub struct JobSpec {
    pub name: String,
    pub owner: String,
    pub priority: JobPriority,
    pub generic_info: BTreeMap<String, String>,
    pub tasks: Vec<TaskSpec>,
}

impl JobSpec {
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            priority: JobPriority::default(),
            generic_info: BTreeMap::new(),
            tasks: Vec::new(),
        }
    }

    /// Validate the submission and build the live job under the given id.
    pub fn instantiate(&self, id: JobId) -> Result<InternalJob> {
        validate_spec(self)?;

        let mut id_of: HashMap<&str, TaskId> = HashMap::new();
        for (seq, task) in self.tasks.iter().enumerate() {
            id_of.insert(
                task.name.as_str(),
                TaskId::new(id, seq as u64, task.name.clone()),
            );
        }

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for spec in &self.tasks {
            let mut task = InternalTask::new(id_of[spec.name.as_str()].clone(), spec.container.clone());
            task.status = TaskStatus::Pending;
            task.max_executions = spec.max_executions.max(1);
            task.executions_left = spec.max_executions.max(1);
            task.executions_on_failure_left = spec.max_executions_on_failure.max(1);
            task.depends_on = spec
                .depends_on
                .iter()
                .map(|d| id_of[d.as_str()].clone())
                .collect();
            task.generic_info = spec.generic_info.clone();
            task.scripts = spec.scripts.clone();
            task.flow = spec.flow.clone();
            task.parallel = spec.parallel;
            task.precious_result = spec.precious_result;
            task.precious_logs = spec.precious_logs;
            tasks.push(task);
        }

        let job = InternalJob::assemble(
            id,
            self.name.clone(),
            self.owner.clone(),
            self.priority,
            JobStatus::Pending,
            epoch_millis(),
            None,
            None,
            None,
            false,
            self.generic_info.clone(),
            tasks,
        )?;
        info!(
            job = %id,
            name = %self.name,
            owner = %self.owner,
            tasks = self.tasks.len(),
            "job instantiated"
        );
        Ok(job)
    }
}

fn validate_spec(spec: &JobSpec) -> Result<()> {
    if spec.name.trim().is_empty() {
        return Err(SchedulerError::InvalidJob(
            "job name must not be empty".to_string(),
        ));
    }
    if spec.tasks.is_empty() {
        return Err(SchedulerError::InvalidJob(
            "job must contain at least one task".to_string(),
        ));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for task in &spec.tasks {
        if task.name.trim().is_empty() {
            return Err(SchedulerError::InvalidJob(
                "task name must not be empty".to_string(),
            ));
        }
        if task.name.contains('*') || task.name.contains('#') {
            return Err(SchedulerError::InvalidJob(format!(
                "task name '{}' uses a reserved instance-suffix character",
                task.name
            )));
        }
        if !seen.insert(task.name.as_str()) {
            return Err(SchedulerError::InvalidJob(format!(
                "duplicate task name '{}'",
                task.name
            )));
        }
    }

    validate_dependencies(spec)?;
    validate_flow_targets(spec)?;
    validate_dag(spec)?;
    Ok(())
}

fn validate_dependencies(spec: &JobSpec) -> Result<()> {
    let names: HashSet<&str> = spec.tasks.iter().map(|t| t.name.as_str()).collect();
    for task in &spec.tasks {
        for dep in &task.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(SchedulerError::InvalidJob(format!(
                    "task '{}' depends on unknown task '{}'",
                    task.name, dep
                )));
            }
            if dep == &task.name {
                return Err(SchedulerError::InvalidJob(format!(
                    "task '{}' cannot depend on itself",
                    task.name
                )));
            }
        }
    }
    Ok(())
}

fn validate_flow_targets(spec: &JobSpec) -> Result<()> {
    let names: HashMap<&str, &TaskSpec> =
        spec.tasks.iter().map(|t| (t.name.as_str(), t)).collect();
    let require = |owner: &str, target: &str| -> Result<()> {
        if !names.contains_key(target) {
            return Err(SchedulerError::InvalidJob(format!(
                "flow on task '{owner}' targets unknown task '{target}'"
            )));
        }
        Ok(())
    };

    for task in &spec.tasks {
        match &task.flow {
            None => {}
            Some(FlowSpec::If {
                if_branch,
                else_branch,
                continuation,
            }) => {
                require(&task.name, if_branch)?;
                require(&task.name, else_branch)?;
                require(&task.name, continuation)?;
                if if_branch == else_branch {
                    return Err(SchedulerError::InvalidJob(format!(
                        "IF flow on task '{}' uses the same task for both branches",
                        task.name
                    )));
                }
            }
            Some(FlowSpec::Replicate { block }) => {
                if block.is_empty() {
                    return Err(SchedulerError::InvalidJob(format!(
                        "REPLICATE flow on task '{}' declares an empty block",
                        task.name
                    )));
                }
                for member in block {
                    require(&task.name, member)?;
                }
                validate_replicate_block(&task.name, block, &names)?;
            }
            Some(FlowSpec::Loop { block }) => {
                if block.is_empty() {
                    return Err(SchedulerError::InvalidJob(format!(
                        "LOOP flow on task '{}' declares an empty block",
                        task.name
                    )));
                }
                for member in block {
                    require(&task.name, member)?;
                }
                if block.last().map(String::as_str) != Some(task.name.as_str()) {
                    return Err(SchedulerError::InvalidJob(format!(
                        "LOOP flow on task '{}' must declare itself as the last block member",
                        task.name
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Every parent of a replicated block member must be the replicating task
/// itself or another block member, otherwise the clones could wait on an
/// edge that never fires.
fn validate_replicate_block(
    owner: &str,
    block: &[String],
    names: &HashMap<&str, &TaskSpec>,
) -> Result<()> {
    for member in block {
        let Some(task) = names.get(member.as_str()) else {
            continue;
        };
        for dep in &task.depends_on {
            if dep != owner && !block.contains(dep) {
                return Err(SchedulerError::InvalidJob(format!(
                    "replicated task '{member}' depends on '{dep}' outside the block of '{owner}'"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(spec: &JobSpec) -> Result<()> {
    // Edge direction: dependency -> dependent, so a toposort failure names a
    // task on the cycle.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for task in &spec.tasks {
        graph.add_node(task.name.as_str());
    }
    for task in &spec.tasks {
        for dep in &task.depends_on {
            graph.add_edge(dep.as_str(), task.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(SchedulerError::InvalidJob(format!(
            "dependency cycle involving task '{}'",
            cycle.node_id()
        ))),
    }
}
