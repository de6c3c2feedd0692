//! Predicate Builder - Filter Sets to Parameterized WHERE Clauses
//!
//! A [`FilterSet`] is a sparse set of equality filters keyed by [`Column`].
//! Iteration follows column order, never insertion order, so the same set of
//! fields always renders to the same text with the same parameter order.
//!
//! Before anything reaches storage the set is checked against a
//! [`UsabilityPolicy`]: every anchor group must contribute at least one field.
//! The default policy demands an identity anchor (application or job id) and
//! a time anchor (timestamp or business date).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::record::JobStatusCode;

use super::row::{Column, ColumnKind, ColumnValue};

// =============================================================================
// Rendering Helpers
// =============================================================================

/// Quote an identifier so mixed case survives. Embedded quotes are doubled.
#[must_use]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Positional placeholder, 1-based.
#[must_use]
pub fn placeholder(n: usize) -> String {
    assert!(n >= 1, "placeholders start at 1");
    format!("${n}")
}

// =============================================================================
// Field Table
// =============================================================================

/// A filterable field: its wire name, its column, and how to parse a raw
/// value for it.
#[derive(Clone, Copy)]
pub struct FieldSpec {
    /// Name used in query parameters and payloads
    pub field_name: &'static str,
    /// Column the field filters
    pub column: Column,
    /// Raw string → typed value, or a reason it does not parse
    pub parse: fn(&str) -> Result<ColumnValue, String>,
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("field_name", &self.field_name)
            .field("column", &self.column)
            .finish_non_exhaustive()
    }
}

/// Every field a query may filter on.
pub static FIELD_TABLE: [FieldSpec; 7] = [
    FieldSpec {
        field_name: "applicationId",
        column: Column::ApplicationId,
        parse: parse_text,
    },
    FieldSpec {
        field_name: "jobId",
        column: Column::JobId,
        parse: parse_text,
    },
    FieldSpec {
        field_name: "jobStatusCode",
        column: Column::JobStatusCode,
        parse: parse_status_code,
    },
    FieldSpec {
        field_name: "jobStatusTimestamp",
        column: Column::JobStatusTimestamp,
        parse: parse_timestamp,
    },
    FieldSpec {
        field_name: "businessDate",
        column: Column::BusinessDate,
        parse: parse_date,
    },
    FieldSpec {
        field_name: "runId",
        column: Column::RunId,
        parse: parse_text,
    },
    FieldSpec {
        field_name: "hostId",
        column: Column::HostId,
        parse: parse_text,
    },
];

/// Look up a field by wire name.
#[must_use]
pub fn field_spec(field_name: &str) -> Option<&'static FieldSpec> {
    FIELD_TABLE.iter().find(|f| f.field_name == field_name)
}

fn parse_text(raw: &str) -> Result<ColumnValue, String> {
    Ok(ColumnValue::Text(raw.to_string()))
}

fn parse_status_code(raw: &str) -> Result<ColumnValue, String> {
    JobStatusCode::parse(raw)
        .map(|code| ColumnValue::Text(code.as_str().to_string()))
        .ok_or_else(|| format!("unknown job status code {raw:?}"))
}

fn parse_timestamp(raw: &str) -> Result<ColumnValue, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| ColumnValue::Timestamp(t.with_timezone(&Utc).trunc_subsecs(0)))
        .map_err(|e| format!("not an RFC 3339 timestamp: {e}"))
}

fn parse_date(raw: &str) -> Result<ColumnValue, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(ColumnValue::Date)
        .map_err(|e| format!("not a YYYY-MM-DD date: {e}"))
}

// =============================================================================
// Rejection
// =============================================================================

/// Why a filter set cannot be turned into a predicate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryRejection {
    /// No such filter field
    #[error("unknown filter field {0:?}")]
    UnknownField(String),

    /// The raw value does not parse for its field
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Wire name of the field
        field: &'static str,
        /// Parser message
        reason: String,
    },

    /// No field of an anchor group is present
    #[error("filter set needs at least one of {}", field_names(.group))]
    MissingAnchor {
        /// The unsatisfied group
        group: Vec<Column>,
    },
}

fn field_names(columns: &[Column]) -> String {
    columns
        .iter()
        .map(Column::field_name)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Filter Set
// =============================================================================

/// Sparse equality filters, ordered by column.
///
/// Zero values (empty strings) are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    fields: BTreeMap<Column, ColumnValue>,
}

impl FilterSet {
    /// An empty set. It fails the default policy until anchors are added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter a text column. An empty value leaves the set unchanged.
    ///
    /// # Panics
    /// Panics if `column` is not a text column.
    #[must_use]
    pub fn with_text(mut self, column: Column, value: impl Into<String>) -> Self {
        assert!(
            matches!(column.kind(), ColumnKind::Text | ColumnKind::NullableText),
            "{column} is not a text column"
        );
        let value = value.into();
        if !value.is_empty() {
            self.fields.insert(column, ColumnValue::Text(value));
        }
        self
    }

    /// Filter on a status code.
    #[must_use]
    pub fn with_status_code(mut self, code: JobStatusCode) -> Self {
        self.fields.insert(
            Column::JobStatusCode,
            ColumnValue::Text(code.as_str().to_string()),
        );
        self
    }

    /// Filter on a timestamp, truncated to whole seconds like stored records.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.fields.insert(
            Column::JobStatusTimestamp,
            ColumnValue::Timestamp(timestamp.trunc_subsecs(0)),
        );
        self
    }

    /// Filter on a business date.
    #[must_use]
    pub fn with_business_date(mut self, date: NaiveDate) -> Self {
        self.fields.insert(Column::BusinessDate, ColumnValue::Date(date));
        self
    }

    /// Parse `(field name, raw value)` pairs, e.g. from a query string.
    ///
    /// Empty raw values are skipped. A repeated field keeps its last value.
    ///
    /// # Errors
    /// Rejects unknown field names and values that do not parse for their
    /// field.
    pub fn from_params<I, K, V>(params: I) -> Result<Self, QueryRejection>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut set = Self::new();
        for (name, raw) in params {
            let (name, raw) = (name.as_ref(), raw.as_ref());
            let spec =
                field_spec(name).ok_or_else(|| QueryRejection::UnknownField(name.to_string()))?;
            if raw.is_empty() {
                continue;
            }
            let value = (spec.parse)(raw).map_err(|reason| QueryRejection::InvalidValue {
                field: spec.field_name,
                reason,
            })?;
            set.fields.insert(spec.column, value);
        }
        Ok(set)
    }

    /// Whether `column` has a filter value.
    #[must_use]
    pub fn contains(&self, column: Column) -> bool {
        self.fields.contains_key(&column)
    }

    /// The filter value for `column`.
    #[must_use]
    pub fn get(&self, column: Column) -> Option<&ColumnValue> {
        self.fields.get(&column)
    }

    /// Number of filtered columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no column is filtered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Present fields in column order.
    pub fn iter(&self) -> impl Iterator<Item = (Column, &ColumnValue)> {
        self.fields.iter().map(|(c, v)| (*c, v))
    }
}

impl Serialize for FilterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column.field_name(), value)?;
        }
        map.end()
    }
}

// =============================================================================
// Usability Policy
// =============================================================================

/// Which fields a filter set must contain to be safe to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsabilityPolicy {
    anchor_groups: Vec<Vec<Column>>,
}

impl UsabilityPolicy {
    /// Every group in `anchor_groups` must have at least one field present.
    ///
    /// # Panics
    /// Panics if any group is empty; such a group could never be satisfied.
    #[must_use]
    pub fn new(anchor_groups: Vec<Vec<Column>>) -> Self {
        assert!(
            anchor_groups.iter().all(|g| !g.is_empty()),
            "anchor groups cannot be empty"
        );
        Self { anchor_groups }
    }

    /// The groups, in the order they are checked.
    #[must_use]
    pub fn anchor_groups(&self) -> &[Vec<Column>] {
        &self.anchor_groups
    }

    /// Accept `filters` if every anchor group has a field present.
    ///
    /// # Errors
    /// Names the first anchor group with no field present.
    pub fn check(&self, filters: &FilterSet) -> Result<(), QueryRejection> {
        match self
            .anchor_groups
            .iter()
            .find(|group| !group.iter().any(|c| filters.contains(*c)))
        {
            Some(group) => Err(QueryRejection::MissingAnchor {
                group: group.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl Default for UsabilityPolicy {
    fn default() -> Self {
        Self::new(vec![
            vec![Column::ApplicationId, Column::JobId],
            vec![Column::JobStatusTimestamp, Column::BusinessDate],
        ])
    }
}

// =============================================================================
// Predicate
// =============================================================================

/// A conjunctive equality predicate with positional parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    terms: Vec<(Column, ColumnValue)>,
}

impl Predicate {
    /// Build from a filter set after checking it against `policy`.
    ///
    /// # Errors
    /// Returns the policy rejection; nothing is rendered in that case.
    pub fn build(filters: &FilterSet, policy: &UsabilityPolicy) -> Result<Self, QueryRejection> {
        policy.check(filters)?;
        Ok(Self::from_terms(
            filters.iter().map(|(c, v)| (c, v.clone())).collect(),
        ))
    }

    /// `"JobId" = $1`
    #[must_use]
    pub fn job_id(job_id: &str) -> Self {
        Self::from_terms(vec![(Column::JobId, ColumnValue::Text(job_id.to_string()))])
    }

    /// `"JobId" = $1 AND "BusinessDate" = $2`
    #[must_use]
    pub fn job_id_business_date(job_id: &str, business_date: NaiveDate) -> Self {
        Self::from_terms(vec![
            (Column::JobId, ColumnValue::Text(job_id.to_string())),
            (Column::BusinessDate, ColumnValue::Date(business_date)),
        ])
    }

    fn from_terms(terms: Vec<(Column, ColumnValue)>) -> Self {
        debug_assert!(
            terms.iter().all(|(c, v)| v.fits(c.kind())),
            "term value does not fit its column"
        );
        Self { terms }
    }

    /// `(column, value)` pairs in placeholder order.
    #[must_use]
    pub fn terms(&self) -> &[(Column, ColumnValue)] {
        &self.terms
    }

    /// ` WHERE "A" = $1 AND "B" = $2`, or empty when there are no terms.
    #[must_use]
    pub fn clause(&self) -> String {
        if self.terms.is_empty() {
            return String::new();
        }
        let conditions = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = {}", quote_ident(column.name()), placeholder(i + 1)))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(" WHERE {conditions}")
    }

    /// `base` followed by this predicate's clause.
    #[must_use]
    pub fn apply_to(&self, base: &str) -> String {
        format!("{base}{}", self.clause())
    }

    /// Parameter values in placeholder order.
    pub fn params(&self) -> impl Iterator<Item = &ColumnValue> {
        self.terms.iter().map(|(_, v)| v)
    }

    /// Evaluate against a row's cells in column order.
    #[must_use]
    pub fn matches(&self, cells: &[ColumnValue]) -> bool {
        self.terms.iter().all(|(column, value)| {
            cells
                .get(column.position())
                .is_some_and(|cell| cell.sql_eq(value))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
