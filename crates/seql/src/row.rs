//! Result rows.
//!
//! A [`Row`] is an insertion-ordered map from result name to scalar cell,
//! matching the projection order of the statement that produced it.

use crate::error::{QueryError, QueryResult};
use crate::value::scalar::{DbValue, TypeAdapter};
use chrono::NaiveDate;
use uuid::Uuid;

/// One result row.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<DbValue>,
}

impl Row {
    /// Build a row from parallel column and value lists.
    pub fn new(columns: Vec<String>, values: Vec<DbValue>) -> QueryResult<Self> {
        if columns.len() != values.len() {
            return Err(QueryError::decode(
                "<row>",
                format!(
                    "{} column names for {} values",
                    columns.len(),
                    values.len()
                ),
            ));
        }
        Ok(Self { columns, values })
    }

    /// Build a row from `(name, value)` pairs.
    pub fn from_pairs(pairs: Vec<(&str, DbValue)>) -> Self {
        let (columns, values) = pairs
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .unzip();
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn index(&self, name: &str) -> QueryResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| QueryError::decode(name, "no such result column"))
    }

    /// The raw cell under `name`.
    pub fn get(&self, name: &str) -> QueryResult<&DbValue> {
        let index = self.index(name)?;
        Ok(&self.values[index])
    }

    /// The single cell of a one-column row.
    pub fn single(&self) -> QueryResult<&DbValue> {
        match self.values.len() {
            1 => Ok(&self.values[0]),
            n => Err(QueryError::decode(
                "<row>",
                format!("expected a one-column row, got {n} columns"),
            )),
        }
    }

    fn required<T>(
        &self,
        name: &str,
        read: impl FnOnce(&DbValue) -> QueryResult<T>,
    ) -> QueryResult<T> {
        let value = self.get(name)?;
        if value.is_null() {
            return Err(QueryError::decode(name, "unexpected NULL"));
        }
        read(value).map_err(|e| rename_decode(e, name))
    }

    fn optional<T>(
        &self,
        name: &str,
        read: impl FnOnce(&DbValue) -> QueryResult<T>,
    ) -> QueryResult<Option<T>> {
        let value = self.get(name)?;
        if value.is_null() {
            return Ok(None);
        }
        read(value).map(Some).map_err(|e| rename_decode(e, name))
    }

    pub fn get_i64(&self, name: &str) -> QueryResult<i64> {
        self.required(name, DbValue::as_i64)
    }

    pub fn get_opt_i64(&self, name: &str) -> QueryResult<Option<i64>> {
        self.optional(name, DbValue::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> QueryResult<f64> {
        self.required(name, DbValue::as_f64)
    }

    pub fn get_opt_f64(&self, name: &str) -> QueryResult<Option<f64>> {
        self.optional(name, DbValue::as_f64)
    }

    pub fn get_bool(&self, name: &str) -> QueryResult<bool> {
        self.required(name, DbValue::as_bool)
    }

    pub fn get_string(&self, name: &str) -> QueryResult<String> {
        self.required(name, |v| v.as_str().map(str::to_string))
    }

    pub fn get_opt_string(&self, name: &str) -> QueryResult<Option<String>> {
        self.optional(name, |v| v.as_str().map(str::to_string))
    }

    pub fn get_uuid(&self, name: &str) -> QueryResult<Uuid> {
        self.required(name, DbValue::as_uuid)
    }

    pub fn get_date(&self, name: &str) -> QueryResult<NaiveDate> {
        self.required(name, DbValue::as_date)
    }

    pub fn get_opt_date(&self, name: &str) -> QueryResult<Option<NaiveDate>> {
        self.optional(name, DbValue::as_date)
    }

    pub fn get_json(&self, name: &str) -> QueryResult<serde_json::Value> {
        self.required(name, DbValue::as_json)
    }

    /// Run one cell through a type adapter, in place. NULL passes through.
    pub(crate) fn adapt_column(
        &mut self,
        name: &str,
        adapter: &dyn TypeAdapter,
    ) -> QueryResult<()> {
        let index = self.index(name)?;
        let value = std::mem::replace(&mut self.values[index], DbValue::Null);
        if value.is_null() {
            return Ok(());
        }
        self.values[index] = adapter
            .from_db(value)
            .map_err(|e| rename_decode(e, name))?;
        Ok(())
    }
}

fn rename_decode(error: QueryError, column: &str) -> QueryError {
    match error {
        QueryError::Decode { message, .. } => QueryError::Decode {
            column: column.to_string(),
            message,
        },
        other => other,
    }
}

/// Map a [`Row`] into an application type.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> QueryResult<Self>;
}

/// One page of a paginated select: the page's rows plus the row count the
/// query would produce without pagination.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Page {
    pub count: u64,
    pub data: Vec<Row>,
}
