//! Owned scalar values and type adapters.
//!
//! [`DbValue`] is the positional parameter representation handed to the
//! execution adapter and the cell representation of result rows. It is an
//! owned enum rather than a driver trait object so the core stays
//! dialect-agnostic.

use crate::error::{QueryError, QueryResult};
use crate::value::kind::ValueKind;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::fmt;
use uuid::Uuid;

/// An owned scalar crossing the execution boundary.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// The natural [`ValueKind`] of this scalar, if one applies.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            DbValue::Null => None,
            DbValue::Bool(_) => Some(ValueKind::Boolean),
            DbValue::Int(_) => Some(ValueKind::Int),
            DbValue::Double(_) => Some(ValueKind::Double),
            DbValue::Text(_) => Some(ValueKind::String),
            DbValue::Bytes(_) => None,
            DbValue::Uuid(_) => Some(ValueKind::Uuid),
            DbValue::Date(_) => Some(ValueKind::LocalDate),
            DbValue::Time(_) => Some(ValueKind::LocalTime),
            DbValue::DateTime(_) => Some(ValueKind::LocalDateTime),
            DbValue::Timestamp(_) => Some(ValueKind::DateTime),
            DbValue::Json(_) => Some(ValueKind::AggregatedArray),
        }
    }

    pub fn as_i64(&self) -> QueryResult<i64> {
        match self {
            DbValue::Int(v) => Ok(*v),
            DbValue::Double(v) if v.fract() == 0.0 => Ok(*v as i64),
            DbValue::Text(s) => s
                .parse()
                .map_err(|_| QueryError::decode("<value>", format!("'{s}' is not an integer"))),
            other => Err(QueryError::decode(
                "<value>",
                format!("expected integer, got {other:?}"),
            )),
        }
    }

    pub fn as_f64(&self) -> QueryResult<f64> {
        match self {
            DbValue::Double(v) => Ok(*v),
            DbValue::Int(v) => Ok(*v as f64),
            DbValue::Text(s) => s
                .parse()
                .map_err(|_| QueryError::decode("<value>", format!("'{s}' is not a number"))),
            other => Err(QueryError::decode(
                "<value>",
                format!("expected number, got {other:?}"),
            )),
        }
    }

    pub fn as_bool(&self) -> QueryResult<bool> {
        match self {
            DbValue::Bool(v) => Ok(*v),
            // SQLite and MySQL surface booleans as 0/1 integers
            DbValue::Int(0) => Ok(false),
            DbValue::Int(1) => Ok(true),
            other => Err(QueryError::decode(
                "<value>",
                format!("expected boolean, got {other:?}"),
            )),
        }
    }

    pub fn as_str(&self) -> QueryResult<&str> {
        match self {
            DbValue::Text(s) => Ok(s),
            other => Err(QueryError::decode(
                "<value>",
                format!("expected text, got {other:?}"),
            )),
        }
    }

    pub fn as_uuid(&self) -> QueryResult<Uuid> {
        match self {
            DbValue::Uuid(u) => Ok(*u),
            DbValue::Text(s) => Uuid::parse_str(s)
                .map_err(|e| QueryError::decode("<value>", format!("invalid uuid: {e}"))),
            other => Err(QueryError::decode(
                "<value>",
                format!("expected uuid, got {other:?}"),
            )),
        }
    }

    pub fn as_date(&self) -> QueryResult<NaiveDate> {
        match self {
            DbValue::Date(d) => Ok(*d),
            DbValue::Text(s) => s
                .parse()
                .map_err(|e| QueryError::decode("<value>", format!("invalid date: {e}"))),
            other => Err(QueryError::decode(
                "<value>",
                format!("expected date, got {other:?}"),
            )),
        }
    }

    pub fn as_json(&self) -> QueryResult<serde_json::Value> {
        match self {
            DbValue::Json(v) => Ok(v.clone()),
            DbValue::Text(s) => serde_json::from_str(s)
                .map_err(|e| QueryError::decode("<value>", format!("invalid json: {e}"))),
            other => Err(QueryError::decode(
                "<value>",
                format!("expected json, got {other:?}"),
            )),
        }
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbValue::Null => f.write_str("NULL"),
            DbValue::Bool(v) => write!(f, "{v}"),
            DbValue::Int(v) => write!(f, "{v}"),
            DbValue::Double(v) => write!(f, "{v}"),
            DbValue::Text(v) => write!(f, "{v}"),
            DbValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            DbValue::Uuid(v) => write!(f, "{v}"),
            DbValue::Date(v) => write!(f, "{v}"),
            DbValue::Time(v) => write!(f, "{v}"),
            DbValue::DateTime(v) => write!(f, "{v}"),
            DbValue::Timestamp(v) => write!(f, "{v}"),
            DbValue::Json(v) => write!(f, "{v}"),
        }
    }
}

/// Pluggable two-way conversion between the storage representation and the
/// application-level representation of a value.
///
/// An adapter attached to a column is applied when binding constants
/// compared against that column and when decoding its result cells.
pub trait TypeAdapter: Send + Sync {
    /// Convert an application-level scalar into its storage representation.
    fn to_db(&self, value: DbValue) -> QueryResult<DbValue>;

    /// Convert a storage scalar into its application-level representation.
    fn from_db(&self, value: DbValue) -> QueryResult<DbValue>;
}
