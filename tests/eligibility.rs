// tests/eligibility.rs

use jobdag::errors::SchedulerError;
use jobdag::job::{FlowAction, InternalJob};
use jobdag::types::{JobId, JobStatus, TaskId, TaskStatus};
use jobdag_test_utils::builders::{chain_job, JobSpecBuilder, TaskSpecBuilder};
use jobdag_test_utils::init_tracing;

fn id_of(job: &InternalJob, name: &str) -> TaskId {
    job.tasks_in_order()
        .find(|t| t.id().readable_name() == name)
        .unwrap_or_else(|| panic!("no task named '{name}'"))
        .id()
        .clone()
}

fn eligible_names(job: &InternalJob) -> Vec<String> {
    job.eligible_tasks()
        .iter()
        .map(|t| t.id().readable_name().to_string())
        .collect()
}

#[test]
fn test_zero_dependency_tasks_start_eligible_in_insertion_order() {
    init_tracing();
    let spec = JobSpecBuilder::new("independent")
        .with_task(TaskSpecBuilder::new("a").build())
        .with_task(TaskSpecBuilder::new("b").build())
        .with_task(TaskSpecBuilder::new("c").build())
        .build();

    let job = spec.instantiate(JobId(1)).unwrap();
    assert_eq!(eligible_names(&job), vec!["a", "b", "c"]);
}

#[test]
fn test_task_becomes_eligible_only_after_every_dependency_terminates() {
    init_tracing();
    // Diamond: b and c depend on a, d depends on both b and c.
    let spec = JobSpecBuilder::new("diamond")
        .with_task(TaskSpecBuilder::new("a").build())
        .with_task(TaskSpecBuilder::new("b").depends_on("a").build())
        .with_task(TaskSpecBuilder::new("c").depends_on("a").build())
        .with_task(
            TaskSpecBuilder::new("d")
                .depends_on("b")
                .depends_on("c")
                .build(),
        )
        .build();

    let mut job = spec.instantiate(JobId(2)).unwrap();
    let a = id_of(&job, "a");
    let b = id_of(&job, "b");
    let c = id_of(&job, "c");

    assert_eq!(eligible_names(&job), vec!["a"]);

    job.start_task(&a, "host-1", 1000).unwrap();
    let outcome = job
        .terminate_task(&a, &FlowAction::Continue, 1001)
        .unwrap()
        .unwrap();
    let released: Vec<&str> = outcome
        .newly_eligible
        .iter()
        .map(|t| t.readable_name())
        .collect();
    assert_eq!(released, vec!["b", "c"]);

    // One of d's two parents done: still not eligible.
    job.start_task(&b, "host-1", 1002).unwrap();
    job.terminate_task(&b, &FlowAction::Continue, 1003).unwrap();
    assert_eq!(eligible_names(&job), vec!["c"]);

    job.start_task(&c, "host-2", 1004).unwrap();
    let outcome = job
        .terminate_task(&c, &FlowAction::Continue, 1005)
        .unwrap()
        .unwrap();
    assert_eq!(outcome.newly_eligible.len(), 1);
    assert_eq!(eligible_names(&job), vec!["d"]);
}

#[test]
fn test_three_task_graph_counts_and_frontier() {
    init_tracing();
    // task2 waits on task3; task1 waits on both.
    let spec = JobSpecBuilder::new("counts")
        .with_task(TaskSpecBuilder::new("task3").build())
        .with_task(TaskSpecBuilder::new("task2").depends_on("task3").build())
        .with_task(
            TaskSpecBuilder::new("task1")
                .depends_on("task2")
                .depends_on("task3")
                .build(),
        )
        .build();

    let mut job = spec.instantiate(JobId(3)).unwrap();
    let task3 = id_of(&job, "task3");

    let d3 = job.descriptor().task(&task3).unwrap();
    assert_eq!(d3.children_count(), 2);
    assert_eq!(d3.parents_count(), 0);
    let d1 = job.descriptor().task(&id_of(&job, "task1")).unwrap();
    assert_eq!(d1.parents_count(), 2);

    assert_eq!(eligible_names(&job), vec!["task3"]);

    job.start_task(&task3, "host-1", 2000).unwrap();
    let outcome = job
        .terminate_task(&task3, &FlowAction::Continue, 2001)
        .unwrap()
        .unwrap();
    let released: Vec<&str> = outcome
        .newly_eligible
        .iter()
        .map(|t| t.readable_name())
        .collect();

    // task1 still waits on task2; only task2 joins the frontier.
    assert_eq!(released, vec!["task2"]);
    assert_eq!(eligible_names(&job), vec!["task2"]);
}

#[test]
fn test_started_task_leaves_the_eligible_set() {
    init_tracing();
    let spec = chain_job("chain", &["first", "second"]);
    let mut job = spec.instantiate(JobId(4)).unwrap();
    let first = id_of(&job, "first");

    job.start_task(&first, "host-1", 100).unwrap();
    assert!(eligible_names(&job).is_empty());
    assert_eq!(job.task(&first).unwrap().status(), TaskStatus::Running);
    assert_eq!(job.running_tasks_count(), 1);
}

#[test]
fn test_operations_on_unknown_or_non_eligible_tasks_fail() {
    init_tracing();
    let spec = chain_job("chain", &["first", "second"]);
    let mut job = spec.instantiate(JobId(5)).unwrap();
    let second = id_of(&job, "second");
    let ghost = TaskId::new(JobId(5), 99, "ghost");

    match job.start_task(&ghost, "host-1", 100) {
        Err(SchedulerError::UnknownTask(id)) => assert_eq!(id, ghost),
        other => panic!("expected UnknownTask, got {other:?}"),
    }

    // "second" exists but its dependency has not finished.
    match job.start_task(&second, "host-1", 100) {
        Err(SchedulerError::InvariantViolation(msg)) => {
            assert!(msg.contains("eligible"));
        }
        other => panic!("expected InvariantViolation, got {other:?}"),
    }
}

#[test]
fn test_job_finishes_when_last_task_terminates() {
    init_tracing();
    let spec = chain_job("chain", &["first", "second"]);
    let mut job = spec.instantiate(JobId(6)).unwrap();
    assert_eq!(job.status(), JobStatus::Pending);

    let first = id_of(&job, "first");
    job.start_task(&first, "host-1", 100).unwrap();
    assert_eq!(job.status(), JobStatus::Running);
    assert_eq!(job.start_time(), Some(100));
    job.terminate_task(&first, &FlowAction::Continue, 101)
        .unwrap();

    let second = id_of(&job, "second");
    job.start_task(&second, "host-1", 102).unwrap();
    job.terminate_task(&second, &FlowAction::Continue, 103)
        .unwrap();

    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(job.finish_time(), Some(103));
    assert_eq!(job.finished_tasks_count(), 2);
    assert_eq!(job.pending_tasks_count(), 0);
    assert_eq!(job.running_tasks_count(), 0);
}

#[test]
fn test_duplicate_finish_notification_is_a_no_op() {
    init_tracing();
    let spec = chain_job("chain", &["first", "second"]);
    let mut job = spec.instantiate(JobId(7)).unwrap();
    let first = id_of(&job, "first");

    job.start_task(&first, "host-1", 100).unwrap();
    let outcome = job
        .terminate_task(&first, &FlowAction::Continue, 101)
        .unwrap();
    assert!(outcome.is_some());

    // Redelivered event: swallowed, graph untouched.
    let outcome = job
        .terminate_task(&first, &FlowAction::Continue, 102)
        .unwrap();
    assert!(outcome.is_none());
    assert_eq!(eligible_names(&job), vec!["second"]);
    assert_eq!(job.task(&first).unwrap().finish_time(), Some(101));
}
