// tests/concurrency.rs

use std::sync::Arc;

use jobdag::config::SchedulerConfig;
use jobdag::db::SchedulerDb;
use jobdag::service::SchedulerService;
use jobdag_test_utils::builders::chain_job;
use jobdag_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;

async fn service_for(config: &SchedulerConfig) -> SchedulerService {
    let db = SchedulerDb::open(config).await.unwrap();
    SchedulerService::bootstrap(db, config).await.unwrap()
}

/// Thirty concurrent workers: a third submit and keep their job, a third
/// submit and soft-remove it, a third submit and hard-delete it. Whatever
/// the interleaving, the final count must equal the kept third.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_submit_and_remove_keeps_the_count_consistent() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = SchedulerConfig {
        db_path: dir.path().join("scheduler.sqlite"),
        ..SchedulerConfig::default()
    };
    let service = Arc::new(service_for(&config).await);

    let mut handles = Vec::new();
    for index in 0..30u64 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            let spec = chain_job(&format!("job-{index}"), &["solo"]);
            let id = service.submit(&spec).await.unwrap();
            match index % 3 {
                0 => {}
                1 => service.remove_job(id, false).await.unwrap(),
                _ => service.remove_job(id, true).await.unwrap(),
            }
        }));
    }
    for handle in handles {
        with_timeout(handle).await.unwrap();
    }

    assert_eq!(service.db().get_total_jobs_count().await.unwrap(), 10);

    // The database agrees after a cold restart too.
    drop(service);
    let service = service_for(&config).await;
    assert_eq!(service.db().get_total_jobs_count().await.unwrap(), 10);
}

/// Events against different jobs take independent locks; a slow job must
/// not serialize the others.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_jobs_progress_concurrently() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let config = SchedulerConfig {
        db_path: dir.path().join("scheduler.sqlite"),
        ..SchedulerConfig::default()
    };
    let service = Arc::new(service_for(&config).await);

    let mut ids = Vec::new();
    for index in 0..8u64 {
        let spec = chain_job(&format!("job-{index}"), &["first", "second"]);
        ids.push(service.submit(&spec).await.unwrap());
    }

    let mut handles = Vec::new();
    for id in ids.clone() {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            use jobdag::job::FlowAction;
            for seq in 0..2u64 {
                let eligible = service.eligible_tasks(id).await.unwrap();
                assert_eq!(eligible.len(), 1);
                let task = eligible[0].id().clone();
                assert_eq!(task.value(), seq);
                service.task_started(id, &task, "host-1").await.unwrap();
                service
                    .task_terminated(id, &task, &FlowAction::Continue, None)
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        with_timeout(handle).await.unwrap();
    }

    for id in ids {
        service
            .with_job(id, |job| {
                assert_eq!(job.finished_tasks_count(), 2);
                assert!(job.status().is_terminal());
            })
            .await
            .unwrap();
    }
}
