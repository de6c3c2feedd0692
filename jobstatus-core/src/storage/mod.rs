//! Storage - Repository Trait, Shared Helpers and Backends
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    JobStatusRepo Trait                       │
//! └─────────────────────────────────────────────────────────────┘
//!          ↑                              ↑
//!          │                              │
//! ┌────────┴────────┐           ┌────────┴──────────────┐
//! │SimJobStatusRepo │           │ PostgresJobStatusRepo │
//! │   (testing)     │           │     (production)      │
//! └─────────────────┘           └───────────────────────┘
//!          │                              │
//!          └──────────────┬───────────────┘
//!                         ↓
//!      row (mapper) · predicate (builder) · error (classifier)
//! ```
//!
//! The mapper, the predicate builder and the classifier know nothing about
//! any storage engine. Each backend contributes only how to bind, scan and
//! report driver errors.

mod backend;
mod predicate;
mod row;
mod sim;

#[cfg(feature = "postgres")]
mod postgres;

pub use backend::{JobStatusRepo, RepoStateError};
pub use predicate::{
    field_spec, placeholder, quote_ident, FieldSpec, FilterSet, Predicate, QueryRejection,
    UsabilityPolicy, FIELD_TABLE,
};
pub use row::{
    column_list, insert_statement, rows_to_records, select_statement, Column, ColumnKind,
    ColumnValue, JobStatusRow, RowError, ScanFailure,
};
pub use sim::{SimDriverError, SimJobStatusRepo};

#[cfg(feature = "postgres")]
pub use postgres::PostgresJobStatusRepo;
