//! Job Status Record - Domain Entity and Transfer Object
//!
//! A `JobStatusRecord` can only be obtained through validation, either from
//! external input or from a scanned storage row. Both paths run the same
//! rules, so a row that would be rejected on the way in is also rejected on
//! the way out.

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{
    APPLICATION_ID_BYTES_MAX, HOST_ID_BYTES_MAX, JOB_ID_BYTES_MAX, RUN_ID_BYTES_MAX,
};

// =============================================================================
// Job Status Code
// =============================================================================

/// Status a job can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatusCode {
    /// Job started
    Start,
    /// Job finished successfully
    Succeed,
    /// Job finished with an error
    Fail,
    /// Job run was declared invalid after the fact
    Invalid,
}

impl JobStatusCode {
    /// Get the stored/wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Succeed => "SUCCEED",
            Self::Fail => "FAIL",
            Self::Invalid => "INVALID",
        }
    }

    /// Parse from the stored/wire representation. Exact match only.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "START" => Some(Self::Start),
            "SUCCEED" => Some(Self::Succeed),
            "FAIL" => Some(Self::Fail),
            "INVALID" => Some(Self::Invalid),
            _ => None,
        }
    }

    /// All valid codes.
    #[must_use]
    pub fn all() -> &'static [JobStatusCode] {
        &[Self::Start, Self::Succeed, Self::Fail, Self::Invalid]
    }
}

impl std::fmt::Display for JobStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Transfer Object
// =============================================================================

/// Unvalidated job status data as received from, or sent to, a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusDto {
    /// Owning application
    pub application_id: String,
    /// Job within the application
    pub job_id: String,
    /// One of `START`, `SUCCEED`, `FAIL`, `INVALID`
    pub job_status_code: String,
    /// When the status was reached
    pub job_status_timestamp: DateTime<Utc>,
    /// Business day the run belongs to
    pub business_date: NaiveDate,
    /// Run identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Host the run executed on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

// =============================================================================
// Record
// =============================================================================

/// A job reaching a status at a point in time.
///
/// Immutable once constructed. Use [`JobStatusRecord::new`] to build one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusRecord {
    application_id: String,
    job_id: String,
    job_status_code: JobStatusCode,
    job_status_timestamp: DateTime<Utc>,
    business_date: NaiveDate,
    #[serde(skip_serializing_if = "Option::is_none")]
    run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_id: Option<String>,
}

impl JobStatusRecord {
    /// Validate `dto` against the current time.
    ///
    /// # Errors
    /// Returns the first rule the data violates.
    pub fn new(dto: JobStatusDto) -> Result<Self, RecordError> {
        Self::new_at(dto, Utc::now())
    }

    /// Validate `dto` against an explicit notion of "now".
    ///
    /// The timestamp is truncated to whole seconds before any comparison.
    /// Empty run/host ids are treated as absent.
    ///
    /// # Errors
    /// Returns the first rule the data violates.
    pub fn new_at(dto: JobStatusDto, now: DateTime<Utc>) -> Result<Self, RecordError> {
        check_required("applicationId", &dto.application_id, APPLICATION_ID_BYTES_MAX)?;
        check_required("jobId", &dto.job_id, JOB_ID_BYTES_MAX)?;

        let job_status_code = JobStatusCode::parse(&dto.job_status_code)
            .ok_or_else(|| RecordError::UnknownStatusCode(dto.job_status_code.clone()))?;

        let job_status_timestamp = dto.job_status_timestamp.trunc_subsecs(0);
        if job_status_timestamp > now {
            return Err(RecordError::TimestampInFuture {
                timestamp: job_status_timestamp,
                now,
            });
        }

        let today = now.date_naive();
        if dto.business_date > today {
            return Err(RecordError::BusinessDateInFuture {
                business_date: dto.business_date,
                today,
            });
        }
        if dto.business_date > job_status_timestamp.date_naive() {
            return Err(RecordError::BusinessDateAfterTimestamp {
                business_date: dto.business_date,
                timestamp: job_status_timestamp,
            });
        }

        let run_id = check_optional("runId", dto.run_id, RUN_ID_BYTES_MAX)?;
        let host_id = check_optional("hostId", dto.host_id, HOST_ID_BYTES_MAX)?;

        Ok(Self {
            application_id: dto.application_id,
            job_id: dto.job_id,
            job_status_code,
            job_status_timestamp,
            business_date: dto.business_date,
            run_id,
            host_id,
        })
    }

    /// Owning application.
    #[must_use]
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Job within the application.
    #[must_use]
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Status reached.
    #[must_use]
    pub fn job_status_code(&self) -> JobStatusCode {
        self.job_status_code
    }

    /// When the status was reached, whole seconds.
    #[must_use]
    pub fn job_status_timestamp(&self) -> DateTime<Utc> {
        self.job_status_timestamp
    }

    /// Business day the run belongs to.
    #[must_use]
    pub fn business_date(&self) -> NaiveDate {
        self.business_date
    }

    /// Run identifier, if any.
    #[must_use]
    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Host the run executed on, if any.
    #[must_use]
    pub fn host_id(&self) -> Option<&str> {
        self.host_id.as_deref()
    }

    /// Convert back to the transfer shape.
    #[must_use]
    pub fn to_dto(&self) -> JobStatusDto {
        JobStatusDto {
            application_id: self.application_id.clone(),
            job_id: self.job_id.clone(),
            job_status_code: self.job_status_code.as_str().to_string(),
            job_status_timestamp: self.job_status_timestamp,
            business_date: self.business_date,
            run_id: self.run_id.clone(),
            host_id: self.host_id.clone(),
        }
    }
}

fn check_required(field: &'static str, value: &str, max: usize) -> Result<(), RecordError> {
    if value.is_empty() {
        return Err(RecordError::Empty { field });
    }
    if value.len() > max {
        return Err(RecordError::TooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

fn check_optional(
    field: &'static str,
    value: Option<String>,
    max: usize,
) -> Result<Option<String>, RecordError> {
    match value {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.len() > max => Err(RecordError::TooLong {
            field,
            len: v.len(),
            max,
        }),
        other => Ok(other),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Rule violations raised while constructing a record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    /// A required id is empty
    #[error("{field} cannot be empty")]
    Empty {
        /// Wire name of the field
        field: &'static str,
    },

    /// An id exceeds its byte limit
    #[error("{field} too long: {len} > {max}")]
    TooLong {
        /// Wire name of the field
        field: &'static str,
        /// Actual length in bytes
        len: usize,
        /// Limit in bytes
        max: usize,
    },

    /// Not one of the known status codes
    #[error("unknown job status code: {0:?}")]
    UnknownStatusCode(String),

    /// Timestamp later than the validation clock
    #[error("jobStatusTimestamp {timestamp} is in the future (now {now})")]
    TimestampInFuture {
        /// Offending timestamp
        timestamp: DateTime<Utc>,
        /// Validation clock
        now: DateTime<Utc>,
    },

    /// Business date later than today
    #[error("businessDate {business_date} is in the future (today {today})")]
    BusinessDateInFuture {
        /// Offending date
        business_date: NaiveDate,
        /// Validation date
        today: NaiveDate,
    },

    /// Business date later than the timestamp's date
    #[error("businessDate {business_date} is after jobStatusTimestamp {timestamp}")]
    BusinessDateAfterTimestamp {
        /// Offending date
        business_date: NaiveDate,
        /// Timestamp it was compared against
        timestamp: DateTime<Utc>,
    },
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 7, 2, 12, 0, 0).unwrap()
    }

    fn dto() -> JobStatusDto {
        JobStatusDto {
            application_id: "App1".to_string(),
            job_id: "J1".to_string(),
            job_status_code: "START".to_string(),
            job_status_timestamp: Utc.with_ymd_and_hms(2023, 7, 1, 10, 0, 0).unwrap(),
            business_date: NaiveDate::from_ymd_opt(2023, 7, 1).unwrap(),
            run_id: None,
            host_id: None,
        }
    }

    #[test]
    fn test_status_code_parse() {
        for code in JobStatusCode::all() {
            assert_eq!(JobStatusCode::parse(code.as_str()), Some(*code));
        }
        assert_eq!(JobStatusCode::parse("start"), None);
        assert_eq!(JobStatusCode::parse("BOGUS"), None);
    }

    #[test]
    fn test_valid_record() {
        let record = JobStatusRecord::new_at(dto(), now()).unwrap();
        assert_eq!(record.application_id(), "App1");
        assert_eq!(record.job_id(), "J1");
        assert_eq!(record.job_status_code(), JobStatusCode::Start);
        assert_eq!(record.run_id(), None);
        assert_eq!(record.to_dto(), dto());
    }

    #[test]
    fn test_timestamp_truncated_to_seconds() {
        let mut input = dto();
        input.job_status_timestamp += chrono::Duration::milliseconds(750);
        let record = JobStatusRecord::new_at(input, now()).unwrap();
        assert_eq!(record.job_status_timestamp(), dto().job_status_timestamp);
    }

    #[test]
    fn test_empty_ids_rejected() {
        let mut input = dto();
        input.application_id.clear();
        assert_eq!(
            JobStatusRecord::new_at(input, now()),
            Err(RecordError::Empty {
                field: "applicationId"
            })
        );

        let mut input = dto();
        input.job_id.clear();
        assert_eq!(
            JobStatusRecord::new_at(input, now()),
            Err(RecordError::Empty { field: "jobId" })
        );
    }

    #[test]
    fn test_too_long_rejected() {
        let mut input = dto();
        input.job_id = "x".repeat(JOB_ID_BYTES_MAX + 1);
        assert!(matches!(
            JobStatusRecord::new_at(input, now()),
            Err(RecordError::TooLong { field: "jobId", .. })
        ));

        let mut input = dto();
        input.host_id = Some("h".repeat(HOST_ID_BYTES_MAX + 1));
        assert!(matches!(
            JobStatusRecord::new_at(input, now()),
            Err(RecordError::TooLong { field: "hostId", .. })
        ));
    }

    #[test]
    fn test_unknown_code_rejected() {
        let mut input = dto();
        input.job_status_code = "BOGUS".to_string();
        assert_eq!(
            JobStatusRecord::new_at(input, now()),
            Err(RecordError::UnknownStatusCode("BOGUS".to_string()))
        );
    }

    #[test]
    fn test_future_values_rejected() {
        let mut input = dto();
        input.job_status_timestamp = now() + chrono::Duration::seconds(1);
        assert!(matches!(
            JobStatusRecord::new_at(input, now()),
            Err(RecordError::TimestampInFuture { .. })
        ));

        let mut input = dto();
        input.business_date = NaiveDate::from_ymd_opt(2023, 7, 3).unwrap();
        assert!(matches!(
            JobStatusRecord::new_at(input, now()),
            Err(RecordError::BusinessDateInFuture { .. })
        ));
    }

    #[test]
    fn test_business_date_after_timestamp_rejected() {
        let mut input = dto();
        input.business_date = NaiveDate::from_ymd_opt(2023, 7, 2).unwrap();
        assert!(matches!(
            JobStatusRecord::new_at(input, now()),
            Err(RecordError::BusinessDateAfterTimestamp { .. })
        ));
    }

    #[test]
    fn test_empty_optional_ids_become_absent() {
        let mut input = dto();
        input.run_id = Some(String::new());
        input.host_id = Some("host-a".to_string());
        let record = JobStatusRecord::new_at(input, now()).unwrap();
        assert_eq!(record.run_id(), None);
        assert_eq!(record.host_id(), Some("host-a"));
    }

    #[test]
    fn test_dto_wire_names() {
        let json = serde_json::to_value(dto()).unwrap();
        assert_eq!(json["applicationId"], "App1");
        assert_eq!(json["jobStatusCode"], "START");
        assert_eq!(json["businessDate"], "2023-07-01");
        assert!(json.get("runId").is_none());
    }
}
