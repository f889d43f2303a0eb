//! Error types for seql

use thiserror::Error;

/// Result type alias for seql operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Error types for query building and execution
#[derive(Debug, Clone, Error)]
pub enum QueryError {
    /// Invalid value composition (kind mismatch, poisoned chain)
    #[error("Composition error: {0}")]
    Composition(String),

    /// A value references a table that was never joined or selected
    #[error("Table '{table}' is not part of the statement scope")]
    TableNotInScope { table: String },

    /// Statement-level validation error (missing clause, shape mismatch)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The active dialect does not support the requested feature
    #[error("Unsupported by dialect: {0}")]
    Unsupported(String),

    /// A one-row terminal matched no rows
    #[error("No row found: {0}")]
    NoRow(String),

    /// A one-row terminal matched more than one row
    #[error("Too many rows: expected at most one, got {0}")]
    TooManyRows(usize),

    /// Result cell decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Error bubbled unmodified from the execution adapter
    #[error("Execution error: {0}")]
    Execution(String),

    /// Transaction management error
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl QueryError {
    /// Create a composition error
    pub fn composition(message: impl Into<String>) -> Self {
        Self::Composition(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an unsupported-feature error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Create a no-row cardinality error
    pub fn no_row(message: impl Into<String>) -> Self {
        Self::NoRow(message.into())
    }

    /// Check if this is a no-row cardinality error
    pub fn is_no_row(&self) -> bool {
        matches!(self, Self::NoRow(_))
    }

    /// Check if this is a too-many-rows cardinality error
    pub fn is_too_many_rows(&self) -> bool {
        matches!(self, Self::TooManyRows(_))
    }

    /// Check if this is a composition error
    pub fn is_composition(&self) -> bool {
        matches!(self, Self::Composition(_))
    }

    /// Check if this is an unsupported-dialect-feature error
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported(_))
    }
}
