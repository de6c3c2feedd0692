//! Row Mapping - Record ↔ Column Tuple
//!
//! The column order is declared exactly once, in [`Column::ALL`]. The insert
//! statement, the select projection, the values bound on insert and the
//! positions read on scan are all derived from it.
//!
//! ```text
//!  $1             $2     $3             $4                  $5            $6     $7
//!  ApplicationId  JobId  JobStatusCode  JobStatusTimestamp  BusinessDate  RunId  HostId
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::constants::{JOB_STATUS_COLUMN_COUNT, JOB_STATUS_TABLE_NAME};
use crate::record::{JobStatusDto, JobStatusRecord, RecordError};

use super::predicate::{placeholder, quote_ident};

// =============================================================================
// Columns
// =============================================================================

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// `TEXT NOT NULL`
    Text,
    /// `TEXT NULL`
    NullableText,
    /// `TIMESTAMPTZ NOT NULL`
    Timestamp,
    /// `DATE NOT NULL`
    Date,
}

/// A column of the job status table. Declaration order is storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    /// Owning application
    ApplicationId,
    /// Job within the application
    JobId,
    /// Status reached
    JobStatusCode,
    /// When the status was reached
    JobStatusTimestamp,
    /// Business day the run belongs to
    BusinessDate,
    /// Run identifier, nullable
    RunId,
    /// Host the run executed on, nullable
    HostId,
}

impl Column {
    /// All columns in storage order.
    pub const ALL: [Column; JOB_STATUS_COLUMN_COUNT] = [
        Self::ApplicationId,
        Self::JobId,
        Self::JobStatusCode,
        Self::JobStatusTimestamp,
        Self::BusinessDate,
        Self::RunId,
        Self::HostId,
    ];

    /// Identifier in storage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApplicationId => "ApplicationId",
            Self::JobId => "JobId",
            Self::JobStatusCode => "JobStatusCode",
            Self::JobStatusTimestamp => "JobStatusTimestamp",
            Self::BusinessDate => "BusinessDate",
            Self::RunId => "RunId",
            Self::HostId => "HostId",
        }
    }

    /// Field name on the wire.
    #[must_use]
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::ApplicationId => "applicationId",
            Self::JobId => "jobId",
            Self::JobStatusCode => "jobStatusCode",
            Self::JobStatusTimestamp => "jobStatusTimestamp",
            Self::BusinessDate => "businessDate",
            Self::RunId => "runId",
            Self::HostId => "hostId",
        }
    }

    /// Storage type.
    #[must_use]
    pub fn kind(&self) -> ColumnKind {
        match self {
            Self::ApplicationId | Self::JobId | Self::JobStatusCode => ColumnKind::Text,
            Self::JobStatusTimestamp => ColumnKind::Timestamp,
            Self::BusinessDate => ColumnKind::Date,
            Self::RunId | Self::HostId => ColumnKind::NullableText,
        }
    }

    /// Zero-based position in [`Column::ALL`].
    #[must_use]
    pub fn position(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Column Values
// =============================================================================

/// A single typed cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    /// Non-null text
    Text(String),
    /// Text or NULL
    NullableText(Option<String>),
    /// UTC instant
    Timestamp(DateTime<Utc>),
    /// Calendar date
    Date(NaiveDate),
}

impl ColumnValue {
    /// Whether this value may be stored in or compared against a column of
    /// `kind`. A plain text value is accepted for nullable text columns.
    #[must_use]
    pub fn fits(&self, kind: ColumnKind) -> bool {
        matches!(
            (self, kind),
            (Self::Text(_), ColumnKind::Text | ColumnKind::NullableText)
                | (Self::NullableText(_), ColumnKind::NullableText)
                | (Self::Timestamp(_), ColumnKind::Timestamp)
                | (Self::Date(_), ColumnKind::Date)
        )
    }

    /// Equality as storage would evaluate `column = value`. NULL never
    /// matches.
    #[must_use]
    pub fn sql_eq(&self, other: &ColumnValue) -> bool {
        match (self.as_text(), other.as_text()) {
            (Some(a), Some(b)) => a == b,
            (None, None) => match (self, other) {
                (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
                (Self::Date(a), Self::Date(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::NullableText(Some(s)) => Some(s),
            _ => None,
        }
    }
}

// =============================================================================
// Scan Failure
// =============================================================================

/// A row whose cells cannot be read back in the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanFailure {
    /// Row is not seven cells wide
    #[error("expected {expected} columns, got {actual}")]
    ColumnCount {
        /// Columns in the table
        expected: usize,
        /// Cells in the row
        actual: usize,
    },

    /// NULL in a non-null column
    #[error("column {column} is NULL but not nullable")]
    UnexpectedNull {
        /// Offending column
        column: Column,
    },

    /// Cell type does not match the column
    #[error("column {column} has the wrong type: expected {expected:?}")]
    WrongType {
        /// Offending column
        column: Column,
        /// Type the column stores
        expected: ColumnKind,
    },
}

// =============================================================================
// Row
// =============================================================================

/// The seven typed columns of a stored job status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusRow {
    /// `ApplicationId`
    pub application_id: String,
    /// `JobId`
    pub job_id: String,
    /// `JobStatusCode`, as stored text
    pub job_status_code: String,
    /// `JobStatusTimestamp`
    pub job_status_timestamp: DateTime<Utc>,
    /// `BusinessDate`
    pub business_date: NaiveDate,
    /// `RunId`, NULL when absent
    pub run_id: Option<String>,
    /// `HostId`, NULL when absent
    pub host_id: Option<String>,
}

impl JobStatusRow {
    /// Domain → row. Total: a record is valid by construction.
    #[must_use]
    pub fn from_record(record: &JobStatusRecord) -> Self {
        Self {
            application_id: record.application_id().to_string(),
            job_id: record.job_id().to_string(),
            job_status_code: record.job_status_code().as_str().to_string(),
            job_status_timestamp: record.job_status_timestamp(),
            business_date: record.business_date(),
            run_id: record.run_id().map(str::to_string),
            host_id: record.host_id().map(str::to_string),
        }
    }

    /// Values in [`Column::ALL`] order, ready to bind as `$1..$7`.
    #[must_use]
    pub fn into_values(self) -> Vec<ColumnValue> {
        vec![
            ColumnValue::Text(self.application_id),
            ColumnValue::Text(self.job_id),
            ColumnValue::Text(self.job_status_code),
            ColumnValue::Timestamp(self.job_status_timestamp),
            ColumnValue::Date(self.business_date),
            ColumnValue::NullableText(self.run_id),
            ColumnValue::NullableText(self.host_id),
        ]
    }

    /// Positional scan of cells read in [`Column::ALL`] order.
    ///
    /// # Errors
    /// Fails on a wrong column count, a NULL in a non-null column, or a cell
    /// of the wrong type.
    pub fn from_values(values: Vec<ColumnValue>) -> Result<Self, ScanFailure> {
        let [app, job, code, ts, date, run, host]: [ColumnValue; JOB_STATUS_COLUMN_COUNT] =
            values
                .try_into()
                .map_err(|v: Vec<ColumnValue>| ScanFailure::ColumnCount {
                    expected: JOB_STATUS_COLUMN_COUNT,
                    actual: v.len(),
                })?;

        let application_id = scan_text(app, Column::ApplicationId)?;
        let job_id = scan_text(job, Column::JobId)?;
        let job_status_code = scan_text(code, Column::JobStatusCode)?;
        let job_status_timestamp = scan_timestamp(ts, Column::JobStatusTimestamp)?;
        let business_date = scan_date(date, Column::BusinessDate)?;
        let run_id = scan_nullable_text(run, Column::RunId)?;
        let host_id = scan_nullable_text(host, Column::HostId)?;

        Ok(Self {
            application_id,
            job_id,
            job_status_code,
            job_status_timestamp,
            business_date,
            run_id,
            host_id,
        })
    }

    /// Row → domain, through the same validation as external input.
    ///
    /// # Errors
    /// Returns the record rule the stored data violates.
    pub fn into_record(self) -> Result<JobStatusRecord, RecordError> {
        JobStatusRecord::new(JobStatusDto {
            application_id: self.application_id,
            job_id: self.job_id,
            job_status_code: self.job_status_code,
            job_status_timestamp: self.job_status_timestamp,
            business_date: self.business_date,
            run_id: self.run_id,
            host_id: self.host_id,
        })
    }
}

fn scan_text(value: ColumnValue, column: Column) -> Result<String, ScanFailure> {
    match value {
        ColumnValue::Text(s) | ColumnValue::NullableText(Some(s)) => Ok(s),
        ColumnValue::NullableText(None) => Err(ScanFailure::UnexpectedNull { column }),
        _ => Err(ScanFailure::WrongType {
            column,
            expected: ColumnKind::Text,
        }),
    }
}

fn scan_nullable_text(value: ColumnValue, column: Column) -> Result<Option<String>, ScanFailure> {
    match value {
        ColumnValue::Text(s) => Ok(Some(s)),
        ColumnValue::NullableText(s) => Ok(s),
        _ => Err(ScanFailure::WrongType {
            column,
            expected: ColumnKind::NullableText,
        }),
    }
}

fn scan_timestamp(value: ColumnValue, column: Column) -> Result<DateTime<Utc>, ScanFailure> {
    match value {
        ColumnValue::Timestamp(t) => Ok(t),
        ColumnValue::NullableText(None) => Err(ScanFailure::UnexpectedNull { column }),
        _ => Err(ScanFailure::WrongType {
            column,
            expected: ColumnKind::Timestamp,
        }),
    }
}

fn scan_date(value: ColumnValue, column: Column) -> Result<NaiveDate, ScanFailure> {
    match value {
        ColumnValue::Date(d) => Ok(d),
        ColumnValue::NullableText(None) => Err(ScanFailure::UnexpectedNull { column }),
        _ => Err(ScanFailure::WrongType {
            column,
            expected: ColumnKind::Date,
        }),
    }
}

// =============================================================================
// Result Sets
// =============================================================================

/// Why a row in a result set could not become a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RowError {
    /// Cells could not be read
    #[error("scan failed: {0}")]
    Scan(#[from] ScanFailure),

    /// Cells were read but break record rules
    #[error("stored row is not a valid job status: {0}")]
    Invalid(#[from] RecordError),
}

/// Convert every scanned row, stopping at the first failure.
///
/// Returns either all records or no records.
///
/// # Errors
/// Returns the first row's failure, with its index in the result set.
pub fn rows_to_records<I>(rows: I) -> Result<Vec<JobStatusRecord>, (usize, RowError)>
where
    I: IntoIterator<Item = Result<Vec<ColumnValue>, ScanFailure>>,
{
    rows.into_iter()
        .enumerate()
        .map(|(i, scanned)| {
            scanned
                .and_then(JobStatusRow::from_values)
                .map_err(RowError::from)
                .and_then(|row| row.into_record().map_err(RowError::from))
                .map_err(|e| (i, e))
        })
        .collect()
}

// =============================================================================
// Statements
// =============================================================================

/// Comma-separated, quoted projection in [`Column::ALL`] order.
#[must_use]
pub fn column_list() -> String {
    Column::ALL
        .iter()
        .map(|c| quote_ident(c.name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `INSERT` with parameters `$1..$7` in [`Column::ALL`] order.
#[must_use]
pub fn insert_statement() -> String {
    let placeholders = (1..=JOB_STATUS_COLUMN_COUNT)
        .map(placeholder)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(JOB_STATUS_TABLE_NAME),
        column_list(),
        placeholders
    )
}

/// Base `SELECT` of all columns in [`Column::ALL`] order, without predicate.
#[must_use]
pub fn select_statement() -> String {
    format!(
        "SELECT {} FROM {}",
        column_list(),
        quote_ident(JOB_STATUS_TABLE_NAME)
    )
}

// =============================================================================
// Tests
// =============================================================================
