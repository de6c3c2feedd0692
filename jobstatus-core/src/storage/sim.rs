//! SimJobStatusRepo - In-Memory Storage with Fault Injection
//!
//! Behaves like the `JobStatus` table: rows are raw cells, the unique key
//! (JobId, BusinessDate, JobStatusTimestamp, ApplicationId) is enforced, and
//! failures are reported as driver errors carrying a SQLSTATE so they go
//! through the same classifier as a real database.

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::{Mutex, RwLock};

use crate::constants::SIM_DSN_SCHEME;
use crate::config::ConfigError;
use crate::dst::{FaultInjector, FaultType};
use crate::error::{
    classify_sqlstate, to_payload, Classify, ClassifiedError, ErrorKind, RepoResult,
};
use crate::record::JobStatusRecord;

use super::backend::{not_open, query_predicate, records_from_cells, JobStatusRepo};
use super::predicate::{FilterSet, Predicate, UsabilityPolicy};
use super::row::{Column, ColumnValue, JobStatusRow};

const COMPONENT: &str = "repo.sim";

/// Columns making up the unique constraint.
const UNIQUE_KEY: [Column; 4] = [
    Column::JobId,
    Column::BusinessDate,
    Column::JobStatusTimestamp,
    Column::ApplicationId,
];

// =============================================================================
// Driver Error
// =============================================================================

/// Failure reported by the simulated storage engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (SQLSTATE {sqlstate})")]
pub struct SimDriverError {
    /// Five-character SQLSTATE, as a real server would report
    pub sqlstate: &'static str,
    /// Server message
    pub message: String,
}

impl SimDriverError {
    fn new(sqlstate: &'static str, message: impl Into<String>) -> Self {
        Self {
            sqlstate,
            message: message.into(),
        }
    }
}

impl Classify for SimDriverError {
    fn classify(&self) -> ErrorKind {
        classify_sqlstate(self.sqlstate)
    }
}

// =============================================================================
// SimJobStatusRepo
// =============================================================================

/// Simulation backend for tests and local runs.
#[derive(Debug)]
pub struct SimJobStatusRepo {
    dsn: String,
    policy: UsabilityPolicy,
    is_open: bool,
    rows: RwLock<Vec<Vec<ColumnValue>>>,
    faults: Mutex<FaultInjector>,
}

impl SimJobStatusRepo {
    /// `dsn` must use the `sim://` scheme to open.
    #[must_use]
    pub fn new(dsn: impl Into<String>) -> Self {
        Self {
            dsn: dsn.into(),
            policy: UsabilityPolicy::default(),
            is_open: false,
            rows: RwLock::new(Vec::new()),
            faults: Mutex::new(FaultInjector::disabled()),
        }
    }

    /// Inject faults from `faults` into every operation.
    #[must_use]
    pub fn with_faults(mut self, faults: FaultInjector) -> Self {
        self.faults = Mutex::new(faults);
        self
    }

    /// Replace the default usability policy for `get_by_query`.
    #[must_use]
    pub fn with_policy(mut self, policy: UsabilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Connect.
    ///
    /// # Errors
    /// `NoDsnError` without a target; `ConnectionExceptionError` for a
    /// non-`sim://` target or an injected open failure.
    pub async fn open(&mut self) -> RepoResult<()> {
        if self.dsn.is_empty() {
            return Err(ClassifiedError::new(
                ErrorKind::NoDsn,
                ConfigError::NoDsn,
                COMPONENT,
                "open",
            ));
        }
        if !self.dsn.starts_with(SIM_DSN_SCHEME) {
            return Err(ClassifiedError::classify(
                SimDriverError::new("08001", format!("cannot connect to {:?}", self.dsn)),
                COMPONENT,
                "open",
            ));
        }
        if self.faults.get_mut().should_inject(FaultType::OpenFail) {
            return Err(ClassifiedError::classify(
                SimDriverError::new("08001", "connection refused"),
                COMPONENT,
                "open",
            ));
        }

        self.is_open = true;
        tracing::info!(dsn = %self.dsn, "sim repository opened");
        Ok(())
    }

    /// Disconnect. Stored rows survive, as they would in a database.
    pub async fn close(&mut self) {
        if self.is_open {
            self.is_open = false;
            tracing::info!(dsn = %self.dsn, "sim repository closed");
        }
    }

    /// Whether [`Self::open`] succeeded and [`Self::close`] has not run.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Write cells directly, bypassing the mapper, validation and the unique
    /// key, as an out-of-band writer would.
    pub async fn insert_raw(&self, cells: Vec<ColumnValue>) {
        self.rows.write().await.push(cells);
    }

    /// Stored rows, including raw ones.
    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    async fn check_connection(&self, operation: &'static str) -> RepoResult<()> {
        if !self.is_open {
            return Err(not_open(COMPONENT, operation));
        }
        if self.faults.lock().await.should_inject(FaultType::ConnectionDrop) {
            return Err(ClassifiedError::classify(
                SimDriverError::new("08006", "server closed the connection unexpectedly"),
                COMPONENT,
                operation,
            ));
        }
        Ok(())
    }

    async fn fetch(
        &self,
        predicate: &Predicate,
        operation: &'static str,
        payload: serde_json::Value,
    ) -> RepoResult<Vec<JobStatusRecord>> {
        self.check_connection(operation)
            .await
            .map_err(|e| e.with_data(&payload))?;

        let mut matched: Vec<Vec<ColumnValue>> = self
            .rows
            .read()
            .await
            .iter()
            .filter(|cells| predicate.matches(cells))
            .cloned()
            .collect();

        {
            let mut faults = self.faults.lock().await;
            for cells in &mut matched {
                if faults.should_inject(FaultType::CorruptRow) {
                    if let Some(cell) = cells.get_mut(Column::JobStatusCode.position()) {
                        *cell = ColumnValue::NullableText(None);
                    }
                }
            }
        }

        let records =
            records_from_cells(matched.into_iter().map(Ok), COMPONENT, operation, &payload)?;
        tracing::debug!(operation, count = records.len(), "sim fetch");
        Ok(records)
    }
}

fn same_key(a: &[ColumnValue], b: &[ColumnValue]) -> bool {
    UNIQUE_KEY
        .iter()
        .all(|c| a.get(c.position()) == b.get(c.position()))
}

#[async_trait]
impl JobStatusRepo for SimJobStatusRepo {
    async fn add(&self, record: &JobStatusRecord) -> RepoResult<()> {
        self.check_connection("add")
            .await
            .map_err(|e| e.with_data(record))?;

        if self.faults.lock().await.should_inject(FaultType::WriteFail) {
            return Err(ClassifiedError::classify(
                SimDriverError::new("XX000", "internal error during write"),
                COMPONENT,
                "add",
            )
            .with_data(record));
        }

        let cells = JobStatusRow::from_record(record).into_values();
        let mut rows = self.rows.write().await;
        if rows.iter().any(|existing| same_key(existing, &cells)) {
            return Err(ClassifiedError::classify(
                SimDriverError::new(
                    "23505",
                    "duplicate key value violates unique constraint \"JobStatus_key\"",
                ),
                COMPONENT,
                "add",
            )
            .with_data(record));
        }
        rows.push(cells);

        tracing::debug!(job_id = record.job_id(), "sim add");
        Ok(())
    }

    async fn get_by_job_id(&self, job_id: &str) -> RepoResult<Vec<JobStatusRecord>> {
        self.fetch(
            &Predicate::job_id(job_id),
            "get_by_job_id",
            serde_json::json!({ "jobId": job_id }),
        )
        .await
    }

    async fn get_by_job_id_business_date(
        &self,
        job_id: &str,
        business_date: NaiveDate,
    ) -> RepoResult<Vec<JobStatusRecord>> {
        self.fetch(
            &Predicate::job_id_business_date(job_id, business_date),
            "get_by_job_id_business_date",
            serde_json::json!({ "jobId": job_id, "businessDate": business_date }),
        )
        .await
    }

    async fn get_by_query(&self, filters: &FilterSet) -> RepoResult<Vec<JobStatusRecord>> {
        let predicate = query_predicate(filters, &self.policy, COMPONENT)?;
        let payload = to_payload(filters);
        self.fetch(&predicate, "get_by_query", payload).await
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dst::{DeterministicRng, FaultConfig};
    use crate::storage::{RowError, ScanFailure};
    use crate::record::JobStatusDto;
    use chrono::{TimeZone, Utc};

    fn record(job_id: &str, code: &str, hour: u32) -> JobStatusRecord {
        JobStatusRecord::new(JobStatusDto {
            application_id: "App1".to_string(),
            job_id: job_id.to_string(),
            job_status_code: code.to_string(),
            job_status_timestamp: Utc.with_ymd_and_hms(2023, 7, 1, hour, 0, 0).unwrap(),
            business_date: NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            run_id: None,
            host_id: Some("host-a".to_string()),
        })
        .unwrap()
    }

    async fn open_repo() -> SimJobStatusRepo {
        let mut repo = SimJobStatusRepo::new("sim://test");
        repo.open().await.unwrap();
        repo
    }

    fn faulty(fault: FaultType) -> FaultInjector {
        FaultInjector::new(DeterministicRng::from_env()).with_fault(FaultConfig::always(fault))
    }

    #[tokio::test]
    async fn test_open_without_dsn() {
        let mut repo = SimJobStatusRepo::new("");
        let err = repo.open().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDsn);
        assert!(!repo.is_open());
    }

    #[tokio::test]
    async fn test_open_bad_target() {
        let mut repo = SimJobStatusRepo::new("postgres://nowhere");
        let err = repo.open().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionException);
    }

    #[tokio::test]
    async fn test_open_fault() {
        let mut repo = SimJobStatusRepo::new("sim://test").with_faults(faulty(FaultType::OpenFail));
        let err = repo.open().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionException);
    }

    #[tokio::test]
    async fn test_close_when_never_opened() {
        let mut repo = SimJobStatusRepo::new("sim://test");
        repo.close().await;
        assert!(!repo.is_open());
    }

    #[tokio::test]
    async fn test_ops_before_open_fail() {
        let repo = SimJobStatusRepo::new("sim://test");
        let err = repo.add(&record("J1", "START", 10)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionException);
        assert!(err.inner().downcast_ref::<crate::storage::RepoStateError>().is_some());
    }

    #[tokio::test]
    async fn test_add_and_duplicate() {
        let repo = open_repo().await;
        let r = record("J1", "START", 10);

        repo.add(&r).await.unwrap();
        let err = repo.add(&r).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateRow);
        assert_eq!(err.data().unwrap()["jobId"], "J1");
        assert_eq!(repo.row_count().await, 1);

        // Same key except timestamp is a different row.
        repo.add(&record("J1", "SUCCEED", 11)).await.unwrap();
        assert_eq!(repo.row_count().await, 2);
    }

    #[tokio::test]
    async fn test_get_by_job_id_business_date_excludes_other_dates() {
        let repo = open_repo().await;
        let day_one = record("J1", "START", 10);
        let day_two = JobStatusRecord::new(JobStatusDto {
            job_status_timestamp: Utc.with_ymd_and_hms(2023, 7, 2, 10, 0, 0).unwrap(),
            business_date: NaiveDate::from_ymd_opt(2023, 7, 2).unwrap(),
            ..day_one.to_dto()
        })
        .unwrap();
        repo.add(&day_one).await.unwrap();
        repo.add(&day_two).await.unwrap();
        repo.add(&record("J2", "START", 10)).await.unwrap();

        let found = repo
            .get_by_job_id_business_date("J1", NaiveDate::from_ymd_opt(2023, 7, 1).unwrap())
            .await
            .unwrap();
        assert_eq!(found, vec![day_one.clone()]);

        let found = repo
            .get_by_job_id_business_date("J1", day_two.business_date())
            .await
            .unwrap();
        assert_eq!(found, vec![day_two]);

        assert_eq!(repo.get_by_job_id("J1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_subsecond_timestamp_filter_finds_record() {
        let repo = open_repo().await;
        let r = record("J1", "START", 10);
        repo.add(&r).await.unwrap();

        let filters = FilterSet::from_params([
            ("jobId", "J1"),
            ("jobStatusTimestamp", "2023-07-01T10:00:00.400Z"),
        ])
        .unwrap();
        assert_eq!(repo.get_by_query(&filters).await.unwrap(), vec![r.clone()]);

        let filters = FilterSet::new()
            .with_text(Column::JobId, "J1")
            .with_timestamp(r.job_status_timestamp() + chrono::Duration::milliseconds(250));
        assert_eq!(repo.get_by_query(&filters).await.unwrap(), vec![r]);
    }

    #[tokio::test]
    async fn test_get_by_job_id_empty_is_ok() {
        let repo = open_repo().await;
        assert!(repo.get_by_job_id("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unusable_query_never_reaches_storage() {
        // A dropped connection would fail any storage call; the rejection
        // must come first.
        let mut repo =
            SimJobStatusRepo::new("sim://test").with_faults(faulty(FaultType::ConnectionDrop));
        repo.open().await.unwrap();

        let filters = FilterSet::new().with_text(Column::JobId, "J1");
        let err = repo.get_by_query(&filters).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidQuery);
        assert_eq!(err.data().unwrap()["jobId"], "J1");
    }

    #[tokio::test]
    async fn test_connection_drop_classified() {
        let mut repo =
            SimJobStatusRepo::new("sim://test").with_faults(faulty(FaultType::ConnectionDrop));
        repo.open().await.unwrap();

        let err = repo.get_by_job_id("J1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConnectionException);
        assert!(err.kind().is_retryable());
        assert_eq!(err.inner().downcast_ref::<SimDriverError>().unwrap().sqlstate, "08006");
    }

    #[tokio::test]
    async fn test_write_fail_is_other() {
        let mut repo = SimJobStatusRepo::new("sim://test").with_faults(faulty(FaultType::WriteFail));
        repo.open().await.unwrap();

        let err = repo.add(&record("J1", "START", 10)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RepoOther);
        assert_eq!(repo.row_count().await, 0);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_scan_error() {
        let mut repo = SimJobStatusRepo::new("sim://test").with_faults(faulty(FaultType::CorruptRow));
        repo.open().await.unwrap();
        repo.add(&record("J1", "START", 10)).await.unwrap();

        let err = repo.get_by_job_id("J1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Scan);
        assert_eq!(err.data().unwrap()["row"], 0);
    }

    #[tokio::test]
    async fn test_corrupt_fault_on_short_raw_row_is_scan_error() {
        let mut repo = SimJobStatusRepo::new("sim://test").with_faults(faulty(FaultType::CorruptRow));
        repo.open().await.unwrap();
        repo.insert_raw(vec![
            ColumnValue::Text("App1".to_string()),
            ColumnValue::Text("J1".to_string()),
        ])
        .await;

        let err = repo.get_by_job_id("J1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Scan);
        assert_eq!(
            err.inner().downcast_ref::<RowError>(),
            Some(&RowError::Scan(ScanFailure::ColumnCount {
                expected: 7,
                actual: 2
            }))
        );
    }

    #[tokio::test]
    async fn test_out_of_band_invalid_row_is_props_error() {
        let repo = open_repo().await;
        repo.add(&record("J1", "START", 10)).await.unwrap();

        let mut cells = JobStatusRow::from_record(&record("J1", "START", 11)).into_values();
        cells[Column::JobStatusCode.position()] = ColumnValue::Text("BOGUS".to_string());
        repo.insert_raw(cells).await;

        let err = repo.get_by_job_id("J1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Props);
        assert_eq!(err.data().unwrap()["row"], 1);
    }

    #[tokio::test]
    async fn test_rows_survive_reopen() {
        let mut repo = open_repo().await;
        repo.add(&record("J1", "START", 10)).await.unwrap();
        repo.close().await;
        assert!(repo.get_by_job_id("J1").await.is_err());

        repo.open().await.unwrap();
        assert_eq!(repo.get_by_job_id("J1").await.unwrap().len(), 1);
    }
}
