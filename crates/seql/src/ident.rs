//! Safe SQL identifier handling.
//!
//! [`Ident`] represents a table, column, or alias name. Unquoted names are
//! validated against `[A-Za-z_][A-Za-z0-9_$]*`; anything else is rendered
//! quoted with the active dialect's quoting character.

use crate::dialect::Dialect;
use crate::error::{QueryError, QueryResult};
use std::sync::Arc;

/// A SQL identifier (table, column, or alias name).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ident {
    name: Arc<str>,
    needs_quoting: bool,
}

impl Ident {
    /// Create an identifier, validating it is non-empty and NUL-free.
    ///
    /// Names that don't match the plain-identifier grammar are rendered
    /// quoted rather than rejected, so schema declarations can use any
    /// column name the backend accepts.
    pub fn new(name: &str) -> QueryResult<Self> {
        if name.is_empty() {
            return Err(QueryError::validation("Identifier cannot be empty"));
        }
        if name.contains('\0') {
            return Err(QueryError::validation(
                "Identifier cannot contain NUL character",
            ));
        }
        Ok(Self {
            name: Arc::from(name),
            needs_quoting: !is_plain_identifier(name),
        })
    }

    /// The raw (unquoted) name.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Internal names known to match the plain-identifier grammar.
    pub(crate) fn plain(name: &'static str) -> Self {
        Self {
            name: Arc::from(name),
            needs_quoting: false,
        }
    }

    /// Render the identifier as SQL for the given dialect.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut out = String::with_capacity(self.name.len() + 2);
        self.write_sql(&mut out, dialect);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String, dialect: Dialect) {
        if !self.needs_quoting {
            out.push_str(&self.name);
            return;
        }
        let (open, close) = dialect.identifier_quotes();
        out.push(open);
        for ch in self.name.chars() {
            if ch == close {
                // Escape the closing quote by doubling it
                out.push(close);
            }
            out.push(ch);
        }
        out.push(close);
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c == '$' || c.is_ascii_alphanumeric())
}
