//! Job Status Core - Persistence for Job Status Events
//!
//! Stores "application X's job Y reached status Z at time T for business
//! date D" events and answers equality queries over them.
//!
//! # Architecture
//!
//! ```text
//! caller
//!   │
//!   ▼
//! JobStatusRepo ──► Predicate (query paths, usability check first)
//!   │
//!   ├──► storage call (sim or postgres)
//!   │        │ ok                      │ err
//!   │        ▼                         ▼
//!   │   JobStatusRow → JobStatusRecord   Classify → ClassifiedError
//!   ▼
//! caller
//! ```
//!
//! # Usage
//!
//! ```rust
//! use jobstatus_core::{FilterSet, JobStatusRepo, SimJobStatusRepo};
//!
//! # async fn demo() -> jobstatus_core::RepoResult<()> {
//! let mut repo = SimJobStatusRepo::new("sim://local");
//! repo.open().await?;
//! let records = repo.get_by_job_id("J1").await?;
//! assert!(records.is_empty());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod dst;
pub mod error;
pub mod record;
pub mod storage;

// Re-export common types
pub use config::{ConfigError, RepoConfig};
pub use error::{
    classify_sqlstate, Classify, ClassifiedError, ErrorKind, Provenance, RepoResult, WrapErr,
};
pub use record::{JobStatusCode, JobStatusDto, JobStatusRecord, RecordError};
pub use storage::{
    Column, ColumnValue, FilterSet, JobStatusRepo, Predicate, QueryRejection, SimJobStatusRepo,
    UsabilityPolicy,
};

#[cfg(feature = "postgres")]
pub use storage::PostgresJobStatusRepo;
