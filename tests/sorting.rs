// tests/sorting.rs

use jobdag::config::SchedulerConfig;
use jobdag::db::{JobPageRequest, JobSortField, JobSortParameter, SchedulerDb, SortOrder};
use jobdag::service::SchedulerService;
use jobdag::types::{JobId, JobStatus};
use jobdag_test_utils::builders::{JobSpecBuilder, TaskSpecBuilder};
use jobdag_test_utils::init_tracing;
use tempfile::TempDir;

async fn seeded_service(dir: &TempDir) -> SchedulerService {
    let config = SchedulerConfig {
        db_path: dir.path().join("scheduler.sqlite"),
        ..SchedulerConfig::default()
    };
    let db = SchedulerDb::open(&config).await.unwrap();
    let service = SchedulerService::bootstrap(db, &config).await.unwrap();

    // Duplicate names on purpose: the id tie-break is what the paging
    // stability rests on. Submission order fixes the ids 1..=6.
    for (name, owner) in [
        ("alpha", "ana"),
        ("beta", "ana"),
        ("gamma", "bob"),
        ("alpha", "bob"),
        ("beta", "ana"),
        ("gamma", "ana"),
    ] {
        let spec = JobSpecBuilder::new(name)
            .owner(owner)
            .with_task(TaskSpecBuilder::new("solo").build())
            .build();
        service.submit(&spec).await.unwrap();
    }
    service
}

fn ids(page: &jobdag::db::JobPage) -> Vec<u64> {
    page.jobs.iter().map(|j| j.id.value()).collect()
}

#[tokio::test]
async fn test_name_sort_breaks_ties_by_id() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let service = seeded_service(&dir).await;

    let request = JobPageRequest {
        sort: vec![JobSortParameter::asc(JobSortField::Name)],
        ..JobPageRequest::default()
    };
    let page = service.list_jobs(&request).await.unwrap();
    assert_eq!(page.total, 6);
    assert_eq!(ids(&page), vec![1, 4, 2, 5, 3, 6]);
}

#[tokio::test]
async fn test_descending_sort_and_default_order() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let service = seeded_service(&dir).await;

    let page = service
        .list_jobs(&JobPageRequest::default())
        .await
        .unwrap();
    assert_eq!(ids(&page), vec![1, 2, 3, 4, 5, 6]);

    let request = JobPageRequest {
        sort: vec![JobSortParameter {
            field: JobSortField::Name,
            order: SortOrder::Desc,
        }],
        ..JobPageRequest::default()
    };
    let page = service.list_jobs(&request).await.unwrap();
    assert_eq!(ids(&page), vec![3, 6, 2, 5, 1, 4]);
}

#[tokio::test]
async fn test_pagination_boundaries() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let service = seeded_service(&dir).await;

    let request = JobPageRequest {
        offset: 2,
        limit: 2,
        sort: vec![JobSortParameter::asc(JobSortField::Name)],
        ..JobPageRequest::default()
    };
    let page = service.list_jobs(&request).await.unwrap();
    // Paging window moves; the total does not.
    assert_eq!(page.total, 6);
    assert_eq!(ids(&page), vec![2, 5]);

    let request = JobPageRequest {
        offset: 5,
        limit: 10,
        sort: vec![JobSortParameter::asc(JobSortField::Name)],
        ..JobPageRequest::default()
    };
    let page = service.list_jobs(&request).await.unwrap();
    assert_eq!(ids(&page), vec![6]);

    let request = JobPageRequest {
        offset: 6,
        limit: 2,
        sort: vec![JobSortParameter::asc(JobSortField::Name)],
        ..JobPageRequest::default()
    };
    let page = service.list_jobs(&request).await.unwrap();
    assert!(page.jobs.is_empty());
    assert_eq!(page.total, 6);
}

#[tokio::test]
async fn test_owner_and_status_filters() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let service = seeded_service(&dir).await;

    let request = JobPageRequest {
        owner: Some("bob".to_string()),
        ..JobPageRequest::default()
    };
    let page = service.list_jobs(&request).await.unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(ids(&page), vec![3, 4]);

    service.kill_job(JobId(3)).await.unwrap();
    let request = JobPageRequest {
        statuses: Some(vec![JobStatus::Killed]),
        ..JobPageRequest::default()
    };
    let page = service.list_jobs(&request).await.unwrap();
    assert_eq!(ids(&page), vec![3]);

    let request = JobPageRequest {
        owner: Some("ana".to_string()),
        statuses: Some(vec![JobStatus::Pending]),
        ..JobPageRequest::default()
    };
    let page = service.list_jobs(&request).await.unwrap();
    assert_eq!(page.total, 4);
}

#[tokio::test]
async fn test_unknown_sort_field_is_an_invalid_query() {
    init_tracing();
    match JobSortField::parse("SHOE_SIZE") {
        Err(jobdag::errors::SchedulerError::InvalidQuery(msg)) => {
            assert!(msg.contains("SHOE_SIZE"));
        }
        other => panic!("expected InvalidQuery, got {other:?}"),
    }
}
