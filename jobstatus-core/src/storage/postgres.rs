//! PostgresJobStatusRepo - Production Storage
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  PostgresJobStatusRepo                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pool: sqlx::PgPool (connection pooling, set by open)        │
//! │  Insert: $1..$7 bound in Column::ALL order                   │
//! │  Select: Column::ALL projection + Predicate clause           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Schema
//!
//! The table is managed outside this crate:
//!
//! ```sql
//! CREATE TABLE "JobStatus" (
//!     "ApplicationId"      TEXT        NOT NULL,
//!     "JobId"              TEXT        NOT NULL,
//!     "JobStatusCode"      TEXT        NOT NULL,
//!     "JobStatusTimestamp" TIMESTAMPTZ NOT NULL,
//!     "BusinessDate"       DATE        NOT NULL,
//!     "RunId"              TEXT        NULL,
//!     "HostId"             TEXT        NULL,
//!     UNIQUE ("JobId", "BusinessDate", "JobStatusTimestamp", "ApplicationId")
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};

use crate::config::{ConfigError, RepoConfig};
use crate::error::{to_payload, ClassifiedError, ErrorKind, RepoResult};
use crate::record::JobStatusRecord;

use super::backend::{not_open, query_predicate, records_from_cells, JobStatusRepo};
use super::predicate::{FilterSet, Predicate, UsabilityPolicy};
use super::row::{
    insert_statement, select_statement, Column, ColumnKind, ColumnValue, JobStatusRow,
};

const COMPONENT: &str = "repo.postgres";

// =============================================================================
// PostgresJobStatusRepo
// =============================================================================

/// PostgreSQL backend.
pub struct PostgresJobStatusRepo {
    config: RepoConfig,
    policy: UsabilityPolicy,
    pool: Option<PgPool>,
    sql_insert: String,
    sql_select: String,
}

impl PostgresJobStatusRepo {
    /// Build an unopened repository. Call [`Self::open`] before use.
    #[must_use]
    pub fn new(config: RepoConfig) -> Self {
        Self {
            config,
            policy: UsabilityPolicy::default(),
            pool: None,
            sql_insert: insert_statement(),
            sql_select: select_statement(),
        }
    }

    /// Share an existing pool instead of opening one.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        let mut repo = Self::new(RepoConfig::new(""));
        repo.pool = Some(pool);
        repo
    }

    /// Replace the default usability policy for `get_by_query`.
    #[must_use]
    pub fn with_policy(mut self, policy: UsabilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Connect the pool to the configured target. A repository that already
    /// holds a pool keeps it.
    ///
    /// # Errors
    /// `NoDsnError` if no target is configured; `ConnectionExceptionError`
    /// if the pool cannot connect.
    pub async fn open(&mut self) -> RepoResult<()> {
        if self.pool.is_some() {
            tracing::debug!("postgres repository already open");
            return Ok(());
        }
        if self.config.dsn.is_empty() {
            return Err(ClassifiedError::new(
                ErrorKind::NoDsn,
                ConfigError::NoDsn,
                COMPONENT,
                "open",
            ));
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.acquire_timeout)
            .connect(&self.config.dsn)
            .await
            .map_err(|e| {
                ClassifiedError::new(ErrorKind::ConnectionException, e, COMPONENT, "open")
            })?;

        tracing::info!(
            max_connections = self.config.max_connections,
            "postgres repository opened"
        );
        self.pool = Some(pool);
        Ok(())
    }

    /// Close all pooled connections. No-op if never opened.
    pub async fn close(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            tracing::info!("postgres repository closed");
        }
    }

    /// The pool, if open.
    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    #[track_caller]
    fn open_pool(&self, operation: &'static str) -> RepoResult<&PgPool> {
        match &self.pool {
            Some(pool) => Ok(pool),
            None => Err(not_open(COMPONENT, operation)),
        }
    }

    async fn fetch(
        &self,
        predicate: &Predicate,
        operation: &'static str,
        payload: serde_json::Value,
    ) -> RepoResult<Vec<JobStatusRecord>> {
        let pool = self
            .open_pool(operation)
            .map_err(|e| e.with_data(&payload))?;

        let sql = predicate.apply_to(&self.sql_select);
        let mut query = sqlx::query(&sql);
        for value in predicate.params() {
            query = bind_value(query, value.clone());
        }

        let rows = query
            .fetch_all(pool)
            .await
            .map_err(|e| {
                ClassifiedError::classify(e, COMPONENT, operation).with_data(&payload)
            })?;

        let mut cells = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            let scanned = scan_cells(row).map_err(|e| {
                ClassifiedError::new(ErrorKind::Scan, e, COMPONENT, operation)
                    .with_data(&serde_json::json!({ "query": payload, "row": index }))
            })?;
            cells.push(Ok(scanned));
        }

        let records = records_from_cells(cells, COMPONENT, operation, &payload)?;
        tracing::debug!(operation, count = records.len(), "postgres fetch");
        Ok(records)
    }
}

// =============================================================================
// Binding and Scanning
// =============================================================================

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: ColumnValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        ColumnValue::Text(s) => query.bind(s),
        ColumnValue::NullableText(s) => query.bind(s),
        ColumnValue::Timestamp(t) => query.bind(t),
        ColumnValue::Date(d) => query.bind(d),
    }
}

/// Read a row positionally, in [`Column::ALL`] order.
fn scan_cells(row: &PgRow) -> Result<Vec<ColumnValue>, sqlx::Error> {
    Column::ALL
        .iter()
        .map(|column| -> Result<ColumnValue, sqlx::Error> {
            let i = column.position();
            Ok(match column.kind() {
                ColumnKind::Text => ColumnValue::Text(row.try_get::<String, _>(i)?),
                ColumnKind::NullableText => {
                    ColumnValue::NullableText(row.try_get::<Option<String>, _>(i)?)
                }
                ColumnKind::Timestamp => {
                    ColumnValue::Timestamp(row.try_get::<DateTime<Utc>, _>(i)?)
                }
                ColumnKind::Date => ColumnValue::Date(row.try_get::<NaiveDate, _>(i)?),
            })
        })
        .collect()
}

// =============================================================================
// JobStatusRepo Implementation
// =============================================================================

#[async_trait]
impl JobStatusRepo for PostgresJobStatusRepo {
    async fn add(&self, record: &JobStatusRecord) -> RepoResult<()> {
        let pool = self.open_pool("add").map_err(|e| e.with_data(record))?;

        let mut query = sqlx::query(&self.sql_insert);
        for value in JobStatusRow::from_record(record).into_values() {
            query = bind_value(query, value);
        }

        query
            .execute(pool)
            .await
            .map_err(|e| ClassifiedError::classify(e, COMPONENT, "add").with_data(record))?;

        tracing::debug!(
            job_id = record.job_id(),
            code = %record.job_status_code(),
            "job status added"
        );
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
