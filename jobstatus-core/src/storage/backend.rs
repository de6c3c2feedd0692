//! JobStatusRepo - Backend Trait
//!
//! One implementation per storage technology. The helpers below carry the
//! parts every backend shares: query predicate checks and turning scanned
//! cells into records with the right error kind.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::{ClassifiedError, ErrorKind, RepoResult};
use crate::record::JobStatusRecord;

use super::predicate::{FilterSet, Predicate, UsabilityPolicy};
use super::row::{rows_to_records, ColumnValue, RowError, ScanFailure};

/// Persistence operations over job status events.
///
/// Implementations are shared between callers (`Arc<dyn JobStatusRepo>`)
/// and do no locking of their own beyond what the storage engine provides.
/// No operation retries. An empty result is success.
#[async_trait]
pub trait JobStatusRepo: Send + Sync {
    /// Persist one record. Duplicates fail with `DuplicateRowError`.
    async fn add(&self, record: &JobStatusRecord) -> RepoResult<()>;

    /// All records for a job id.
    async fn get_by_job_id(&self, job_id: &str) -> RepoResult<Vec<JobStatusRecord>>;

    /// All records for a job id on one business date.
    async fn get_by_job_id_business_date(
        &self,
        job_id: &str,
        business_date: NaiveDate,
    ) -> RepoResult<Vec<JobStatusRecord>>;

    /// All records matching `filters`. Filter sets failing the usability
    /// policy are rejected before storage is touched.
    async fn get_by_query(&self, filters: &FilterSet) -> RepoResult<Vec<JobStatusRecord>>;
}

/// Lifecycle misuse, as opposed to a storage failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepoStateError {
    /// `open` has not succeeded, or `close` has run
    #[error("repository is not open")]
    NotOpen,
}

// =============================================================================
// Shared Helpers
// =============================================================================

/// Check `filters` against `policy` and build the predicate.
#[track_caller]
pub(crate) fn query_predicate(
    filters: &FilterSet,
    policy: &UsabilityPolicy,
    component: &'static str,
) -> RepoResult<Predicate> {
    match Predicate::build(filters, policy) {
        Ok(predicate) => Ok(predicate),
        Err(rejection) => Err(ClassifiedError::new(
            ErrorKind::InvalidQuery,
            rejection,
            component,
            "get_by_query",
        )
        .with_data(filters)),
    }
}

#[track_caller]
pub(crate) fn not_open(component: &'static str, operation: &'static str) -> ClassifiedError {
    ClassifiedError::new(
        ErrorKind::ConnectionException,
        RepoStateError::NotOpen,
        component,
        operation,
    )
}

/// Scanned cells → records. The first failing row fails the whole call.
///
/// Cells that do not scan are `ScanError`; rows that scan but break record
/// rules are `PropsError`.
#[track_caller]
pub(crate) fn records_from_cells<I>(
    cells: I,
    component: &'static str,
    operation: &'static str,
    payload: &serde_json::Value,
) -> RepoResult<Vec<JobStatusRecord>>
where
    I: IntoIterator<Item = Result<Vec<ColumnValue>, ScanFailure>>,
{
    match rows_to_records(cells) {
        Ok(records) => Ok(records),
        Err((index, err)) => {
            let kind = match err {
                RowError::Scan(_) => ErrorKind::Scan,
                RowError::Invalid(_) => ErrorKind::Props,
            };
            Err(ClassifiedError::new(kind, err, component, operation)
                .with_data(&serde_json::json!({ "query": payload, "row": index })))
        }
    }
}
