// tests/failure_handling.rs

use jobdag::config::SchedulerConfig;
use jobdag::db::SchedulerDb;
use jobdag::job::{InternalJob, TaskFailureOutcome};
use jobdag::service::SchedulerService;
use jobdag::types::{JobId, JobStatus, TaskId, TaskStatus};
use jobdag_test_utils::builders::{chain_job, JobSpecBuilder, TaskSpecBuilder};
use jobdag_test_utils::init_tracing;
use tempfile::TempDir;

fn id_of(job: &InternalJob, name: &str) -> TaskId {
    job.tasks_in_order()
        .find(|t| t.id().readable_name() == name)
        .unwrap_or_else(|| panic!("no task named '{name}'"))
        .id()
        .clone()
}

#[test]
fn test_failed_task_with_attempts_left_re_enters_the_frontier() {
    init_tracing();
    let spec = JobSpecBuilder::new("retrying")
        .with_task(TaskSpecBuilder::new("flaky").max_executions(3).build())
        .build();
    let mut job = spec.instantiate(JobId(1)).unwrap();
    let flaky = id_of(&job, "flaky");

    job.start_task(&flaky, "host-1", 100).unwrap();
    assert_eq!(job.task(&flaky).unwrap().attempt_index(), 0);

    match job.task_failed(&flaky, 101).unwrap() {
        TaskFailureOutcome::Restarted { attempts_left } => assert_eq!(attempts_left, 2),
        other => panic!("expected Restarted, got {other:?}"),
    }
    assert_eq!(job.task(&flaky).unwrap().status(), TaskStatus::Pending);
    assert_eq!(job.status(), JobStatus::Running);
    assert_eq!(job.eligible_tasks().len(), 1);

    // The next dispatch is attempt 1.
    job.start_task(&flaky, "host-2", 102).unwrap();
    assert_eq!(job.task(&flaky).unwrap().attempt_index(), 1);
}

#[test]
fn test_exhausted_attempts_fail_the_job_and_classify_survivors() {
    init_tracing();
    // "doomed" and "bystander" run in parallel off the root; "downstream"
    // never becomes dispatchable.
    let spec = JobSpecBuilder::new("doomed-job")
        .with_task(TaskSpecBuilder::new("root").build())
        .with_task(TaskSpecBuilder::new("doomed").depends_on("root").build())
        .with_task(TaskSpecBuilder::new("bystander").depends_on("root").build())
        .with_task(
            TaskSpecBuilder::new("downstream")
                .depends_on("doomed")
                .build(),
        )
        .build();
    let mut job = spec.instantiate(JobId(2)).unwrap();
    let root = id_of(&job, "root");
    let doomed = id_of(&job, "doomed");
    let bystander = id_of(&job, "bystander");
    let downstream = id_of(&job, "downstream");

    job.start_task(&root, "host-1", 100).unwrap();
    job.terminate_task(&root, &jobdag::job::FlowAction::Continue, 101)
        .unwrap();
    job.start_task(&doomed, "host-1", 102).unwrap();

    match job.task_failed(&doomed, 103).unwrap() {
        TaskFailureOutcome::JobFailed { aborted } => {
            assert!(!aborted.is_empty());
        }
        other => panic!("expected JobFailed, got {other:?}"),
    }

    assert_eq!(job.status(), JobStatus::Failed);
    assert_eq!(job.task(&doomed).unwrap().status(), TaskStatus::Faulty);
    // Eligible-but-never-started work is aborted; blocked work never
    // started at all.
    assert_eq!(
        job.task(&bystander).unwrap().status(),
        TaskStatus::Aborted
    );
    assert_eq!(
        job.task(&downstream).unwrap().status(),
        TaskStatus::NotStarted
    );
    assert_eq!(job.finished_tasks_count(), 4);
}

#[test]
fn test_kill_drains_running_and_pending_work() {
    init_tracing();
    let spec = chain_job("killable", &["first", "second"]);
    let mut job = spec.instantiate(JobId(3)).unwrap();
    let first = id_of(&job, "first");
    let second = id_of(&job, "second");

    job.start_task(&first, "host-1", 100).unwrap();
    let aborted = job.kill(101).unwrap();
    assert_eq!(aborted.len(), 2);

    assert_eq!(job.status(), JobStatus::Killed);
    assert_eq!(job.task(&first).unwrap().status(), TaskStatus::Aborted);
    assert_eq!(job.task(&second).unwrap().status(), TaskStatus::NotStarted);

    // A second kill is a no-op.
    assert!(job.kill(102).unwrap().is_empty());
    assert_eq!(job.finish_time(), Some(101));
}

#[tokio::test]
async fn test_job_failure_is_durable() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = SchedulerConfig {
        db_path: dir.path().join("scheduler.sqlite"),
        ..SchedulerConfig::default()
    };

    let id = {
        let db = SchedulerDb::open(&config).await.unwrap();
        let service = SchedulerService::bootstrap(db, &config).await.unwrap();
        let id = service
            .submit(&chain_job("fragile", &["only", "never"]))
            .await
            .unwrap();
        let only = TaskId::new(id, 0, "only");
        service.task_started(id, &only, "host-1").await.unwrap();
        match service.task_failed(id, &only).await.unwrap() {
            TaskFailureOutcome::JobFailed { .. } => {}
            other => panic!("expected JobFailed, got {other:?}"),
        }
        id
    };

    let db = SchedulerDb::open(&config).await.unwrap();
    let service = SchedulerService::bootstrap(db, &config).await.unwrap();
    service
        .with_job(id, |job| {
            assert_eq!(job.status(), JobStatus::Failed);
            assert_eq!(
                job.task(&TaskId::new(id, 0, "only")).unwrap().status(),
                TaskStatus::Faulty
            );
            assert_eq!(
                job.task(&TaskId::new(id, 1, "never")).unwrap().status(),
                TaskStatus::NotStarted
            );
            assert!(job.eligible_tasks().is_empty());
        })
        .await
        .unwrap();
}
