//! End-to-end repository behaviour against the simulation backend.

use std::sync::Arc;

use chrono::{NaiveDate, TimeZone, Utc};
use jobstatus_core::{
    Column, ErrorKind, FilterSet, JobStatusDto, JobStatusRecord, JobStatusRepo,
    SimJobStatusRepo, WrapErr,
};

fn record(job_id: &str, hour: u32) -> JobStatusRecord {
    JobStatusRecord::new(JobStatusDto {
        application_id: "App1".to_string(),
        job_id: job_id.to_string(),
        job_status_code: "START".to_string(),
        job_status_timestamp: Utc.with_ymd_and_hms(2023, 7, 1, hour, 0, 0).unwrap(),
        business_date: NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
        run_id: None,
        host_id: None,
    })
    .unwrap()
}

async fn open_repo() -> SimJobStatusRepo {
    let mut repo = SimJobStatusRepo::new("sim://scenario");
    repo.open().await.unwrap();
    repo
}

#[tokio::test]
async fn test_add_get_query_scenario() {
    let repo = open_repo().await;
    let r = record("J1", 10);

    repo.add(&r).await.unwrap();

    let err = repo.add(&r).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateRow);
    assert_eq!(err.code(), "DuplicateRowError");

    let found = repo.get_by_job_id("J1").await.unwrap();
    assert_eq!(found, vec![r.clone()]);

    let err = repo
        .get_by_query(&FilterSet::new().with_text(Column::JobId, "J1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidQuery);
    assert!(err.data().is_some());

    let filters = FilterSet::new()
        .with_text(Column::JobId, "J1")
        .with_business_date(NaiveDate::from_ymd_opt(2023, 7, 1).unwrap());
    assert_eq!(repo.get_by_query(&filters).await.unwrap(), vec![r]);
}

#[tokio::test]
async fn test_empty_results_are_success() {
    let repo = open_repo().await;

    assert!(repo.get_by_job_id("nope").await.unwrap().is_empty());
    assert!(repo
        .get_by_job_id_business_date("nope", NaiveDate::from_ymd_opt(2023, 7, 1).unwrap())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_query_from_params() {
    let repo = open_repo().await;
    repo.add(&record("J1", 10)).await.unwrap();
    repo.add(&record("J1", 11)).await.unwrap();
    repo.add(&record("J2", 10)).await.unwrap();

    let filters = FilterSet::from_params([
        ("applicationId", "App1"),
        ("businessDate", "2023-07-01"),
    ])
    .unwrap();
    assert_eq!(repo.get_by_query(&filters).await.unwrap().len(), 3);

    let filters = FilterSet::from_params([
        ("jobId", "J1"),
        ("jobStatusTimestamp", "2023-07-01T11:00:00Z"),
    ])
    .unwrap();
    let found = repo.get_by_query(&filters).await.unwrap();
    assert_eq!(found, vec![record("J1", 11)]);
}

#[tokio::test]
async fn test_shared_repo_concurrent_adds() {
    let repo: Arc<dyn JobStatusRepo> = Arc::new(open_repo().await);

    let mut handles = Vec::new();
    for hour in 0..8 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move { repo.add(&record("J1", hour)).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(repo.get_by_job_id("J1").await.unwrap().len(), 8);
}

#[tokio::test]
async fn test_concurrent_duplicate_adds_yield_one_row() {
    let repo: Arc<dyn JobStatusRepo> = Arc::new(open_repo().await);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let repo = Arc::clone(&repo);
        handles.push(tokio::spawn(async move { repo.add(&record("J1", 10)).await }));
    }

    let mut ok = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::DuplicateRow),
        }
    }
    assert_eq!(ok, 1);
    assert_eq!(repo.get_by_job_id("J1").await.unwrap().len(), 1);
}

async fn service_record_start(
    repo: &dyn JobStatusRepo,
    r: &JobStatusRecord,
) -> jobstatus_core::RepoResult<()> {
    repo.add(r).await.wrap_err("service", "record_start")
}

#[tokio::test]
async fn test_wrapped_error_keeps_origin() {
    let repo = open_repo().await;
    let r = record("J1", 10);
    service_record_start(&repo, &r).await.unwrap();

    let err = service_record_start(&repo, &r).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateRow);
    assert_eq!(err.trail().len(), 2);
    assert_eq!(err.origin().component, "repo.sim");

    let stack = err.call_stack();
    assert!(stack.starts_with("service::record_start::"), "{stack}");
    assert!(stack.contains(" <- repo.sim::add::"), "{stack}");
}
