//! Error - Classified Errors with Provenance
//!
//! Storage drivers fail in many ways; callers only need to know a handful of
//! them. A [`ClassifiedError`] carries:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ kind        │ closed taxonomy, stable code               │
//! │ source      │ the original driver/domain error           │
//! │ data        │ what was being operated on (JSON)          │
//! │ trail       │ origin + every layer that propagated it    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! The kind is fixed at creation. Wrapping only appends to the trail.

use std::error::Error as StdError;
use std::fmt;
use std::panic::Location;

use serde::Serialize;

// =============================================================================
// Error Kind
// =============================================================================

/// Closed set of failure kinds surfaced by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Could not reach or talk to storage
    ConnectionException,
    /// A result row could not be decoded
    Scan,
    /// Uniqueness constraint violated
    DuplicateRow,
    /// Filter set failed the usability rule or could not be parsed
    InvalidQuery,
    /// Storage failure not otherwise classified
    RepoOther,
    /// Repository opened without a connection target
    NoDsn,
    /// Configuration could not be loaded
    Config,
    /// Data failed domain validation
    Props,
}

impl ErrorKind {
    /// Machine-stable code for this kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionException => "ConnectionExceptionError",
            Self::Scan => "ScanError",
            Self::DuplicateRow => "DuplicateRowError",
            Self::InvalidQuery => "InvalidQueryError",
            Self::RepoOther => "RepoOtherError",
            Self::NoDsn => "NoDsnError",
            Self::Config => "ConfigError",
            Self::Props => "PropsError",
        }
    }

    /// Whether repeating the same call might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionException)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Map a driver-specific error onto an [`ErrorKind`].
///
/// Implemented once per storage technology.
pub trait Classify {
    /// Kind this error maps to.
    fn classify(&self) -> ErrorKind;
}

/// Map a SQLSTATE code onto an [`ErrorKind`].
#[must_use]
pub fn classify_sqlstate(code: &str) -> ErrorKind {
    match code {
        // unique_violation
        "23505" => ErrorKind::DuplicateRow,
        // admin_shutdown, crash_shutdown, cannot_connect_now, too_many_connections
        "57P01" | "57P02" | "57P03" | "53300" => ErrorKind::ConnectionException,
        c if c.starts_with("08") => ErrorKind::ConnectionException,
        _ => ErrorKind::RepoOther,
    }
}

#[cfg(feature = "postgres")]
impl Classify for sqlx::Error {
    fn classify(&self) -> ErrorKind {
        match self {
            sqlx::Error::Database(db) => db
                .code()
                .map_or(ErrorKind::RepoOther, |code| classify_sqlstate(&code)),
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => ErrorKind::ConnectionException,
            sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => ErrorKind::Scan,
            _ => ErrorKind::RepoOther,
        }
    }
}

// =============================================================================
// Provenance
// =============================================================================

/// Where an error was created or propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Provenance {
    /// Layer name, e.g. `repo.postgres`
    pub component: &'static str,
    /// Operation within the layer, e.g. `add`
    pub operation: &'static str,
    /// Source location of the call
    pub location: &'static Location<'static>,
}

impl Provenance {
    /// Record the caller's location.
    #[track_caller]
    #[must_use]
    pub fn here(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            location: Location::caller(),
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}::{}::{}",
            self.component,
            self.operation,
            self.location.line()
        )
    }
}

// =============================================================================
// Classified Error
// =============================================================================

/// Boxed underlying error.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result alias used throughout the repository layer.
pub type RepoResult<T> = Result<T, ClassifiedError>;

/// An error tagged with a stable kind, a payload and a provenance trail.
#[derive(Debug)]
pub struct ClassifiedError {
    kind: ErrorKind,
    source: BoxError,
    data: Option<serde_json::Value>,
    trail: Vec<Provenance>,
}

impl ClassifiedError {
    /// Create an error of an explicit kind.
    #[track_caller]
    pub fn new(
        kind: ErrorKind,
        err: impl Into<BoxError>,
        component: &'static str,
        operation: &'static str,
    ) -> Self {
        Self {
            kind,
            source: err.into(),
            data: None,
            trail: vec![Provenance::here(component, operation)],
        }
    }

    /// Create an error whose kind is decided by the driver classifier.
    #[track_caller]
    pub fn classify<E>(err: E, component: &'static str, operation: &'static str) -> Self
    where
        E: Classify + StdError + Send + Sync + 'static,
    {
        let kind = err.classify();
        Self::new(kind, err, component, operation)
    }

    /// Attach the value being operated on.
    ///
    /// A payload that cannot be serialized is replaced by a description of
    /// the serialization failure.
    #[must_use]
    pub fn with_data(mut self, data: &impl Serialize) -> Self {
        self.data = Some(to_payload(data));
        self
    }

    /// Record that this error passed through another layer.
    #[track_caller]
    #[must_use]
    pub fn wrap(mut self, component: &'static str, operation: &'static str) -> Self {
        self.trail.push(Provenance::here(component, operation));
        self
    }

    /// Kind fixed at creation.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Stable code of [`Self::kind`].
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Payload describing what was being operated on.
    #[must_use]
    pub fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }

    /// Provenance, origin first.
    #[must_use]
    pub fn trail(&self) -> &[Provenance] {
        &self.trail
    }

    /// Where the error was first created.
    #[must_use]
    pub fn origin(&self) -> &Provenance {
        // trail is never empty: every constructor pushes the origin
        &self.trail[0]
    }

    /// The underlying error, downcastable to the concrete type.
    #[must_use]
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }

    /// Trail rendered outermost first, e.g. `cli::get::40 <- repo::get::12`.
    #[must_use]
    pub fn call_stack(&self) -> String {
        self.trail
            .iter()
            .rev()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" <- ")
    }

    /// Emit this error as a structured `tracing` event.
    pub fn log(&self, msg: &str) {
        let origin = self.origin();
        let error_data = self
            .data
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        tracing::error!(
            code = self.code(),
            call_stack = %self.call_stack(),
            file_name = origin.location.file(),
            line_no = origin.location.line(),
            component = origin.component,
            operation = origin.operation,
            error_data = %error_data,
            source = %self.source,
            "{msg}"
        );
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Code {} | {}",
            self.call_stack(),
            self.kind.code(),
            self.source
        )
    }
}

impl StdError for ClassifiedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

/// `data` as JSON, or a description of why it could not be serialized.
pub(crate) fn to_payload(data: &impl Serialize) -> serde_json::Value {
    serde_json::to_value(data).unwrap_or_else(|e| {
        serde_json::Value::String(format!("unserializable payload: {e}"))
    })
}

/// Propagate a [`RepoResult`] through another layer.
pub trait WrapErr<T> {
    /// Append a provenance frame to the error, if any.
    fn wrap_err(self, component: &'static str, operation: &'static str) -> RepoResult<T>;
}

impl<T> WrapErr<T> for RepoResult<T> {
    #[track_caller]
    fn wrap_err(self, component: &'static str, operation: &'static str) -> RepoResult<T> {
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.wrap(component, operation)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
