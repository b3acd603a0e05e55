#![allow(dead_code)]

use std::collections::BTreeMap;

use jobdag::job::{ExecutableContainer, FlowSpec};
use jobdag::submission::{JobSpec, TaskSpec};
use jobdag::types::JobPriority;

/// Builder for `JobSpec` to simplify test setup.
pub struct JobSpecBuilder {
    spec: JobSpec,
}

impl JobSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            spec: JobSpec::new(name, "tester"),
        }
    }

    pub fn owner(mut self, owner: &str) -> Self {
        self.spec.owner = owner.to_string();
        self
    }

    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.spec.priority = priority;
        self
    }

    pub fn generic_info(mut self, key: &str, value: &str) -> Self {
        self.spec
            .generic_info
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_task(mut self, task: TaskSpec) -> Self {
        self.spec.tasks.push(task);
        self
    }

    pub fn build(self) -> JobSpec {
        self.spec
    }
}

/// Builder for `TaskSpec`. Defaults to a trivial native command.
pub struct TaskSpecBuilder {
    task: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            task: TaskSpec::new(name, native_container("true")),
        }
    }

    pub fn container(mut self, container: ExecutableContainer) -> Self {
        self.task.container = container;
        self
    }

    pub fn depends_on(mut self, dep: &str) -> Self {
        self.task.depends_on.push(dep.to_string());
        self
    }

    pub fn max_executions(mut self, n: u32) -> Self {
        self.task.max_executions = n;
        self
    }

    pub fn generic_info(mut self, key: &str, value: &str) -> Self {
        self.task
            .generic_info
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn flow(mut self, flow: FlowSpec) -> Self {
        self.task.flow = Some(flow);
        self
    }

    pub fn precious_result(mut self, val: bool) -> Self {
        self.task.precious_result = val;
        self
    }

    pub fn precious_logs(mut self, val: bool) -> Self {
        self.task.precious_logs = val;
        self
    }

    pub fn build(self) -> TaskSpec {
        self.task
    }
}

/// A native container running a single command.
pub fn native_container(cmd: &str) -> ExecutableContainer {
    ExecutableContainer::Native {
        command_line: vec![cmd.to_string()],
    }
}

/// A Java container with no arguments.
pub fn java_container(class_name: &str) -> ExecutableContainer {
    ExecutableContainer::Java {
        class_name: class_name.to_string(),
        serialized_args: BTreeMap::new(),
    }
}

/// A linear chain job: each task depends on the previous one.
pub fn chain_job(name: &str, task_names: &[&str]) -> JobSpec {
    let mut builder = JobSpecBuilder::new(name);
    let mut prev: Option<&str> = None;
    for task_name in task_names {
        let mut task = TaskSpecBuilder::new(task_name);
        if let Some(prev) = prev {
            task = task.depends_on(prev);
        }
        builder = builder.with_task(task.build());
        prev = Some(task_name);
    }
    builder.build()
}
