//! The statement scope: which table refs a value may use.
//!
//! Every builder owns one scope. Tables enter it through FROM and JOIN
//! (or as the target of a data-changing statement); a sub-select building
//! against an enclosing statement carries the enclosing tables as its
//! outer set. Accepting a value checks, at that moment, that all of its
//! referenced tables are visible.

use crate::error::{QueryError, QueryResult};
use crate::table::{TableRef, TableSet};
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    known: TableSet,
    outer: TableSet,
}

impl Scope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_outer(outer: TableSet) -> Self {
        Self {
            known: TableSet::new(),
            outer,
        }
    }

    pub(crate) fn add(&mut self, table: &TableRef) {
        self.known.insert(table.clone());
    }

    pub(crate) fn known(&self) -> &TableSet {
        &self.known
    }

    /// Accept a value into this statement: surface its composition error
    /// if it carries one, then require every referenced table to be
    /// visible.
    pub(crate) fn check(&self, value: &Value) -> QueryResult<()> {
        if let Some(message) = value.composition_error() {
            return Err(QueryError::composition(message));
        }
        for table in value.referenced_tables() {
            if !self.known.contains(table) && !self.outer.contains(table) {
                return Err(QueryError::TableNotInScope {
                    table: table.qualifier().as_str().to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use crate::value::kind::ValueKind;

    #[test]
    fn foreign_table_rejected() {
        let a = Table::create("a").column("x", ValueKind::Int).build().unwrap();
        let b = Table::create("b").column("y", ValueKind::Int).build().unwrap();
        let mut scope = Scope::new();
        scope.add(a.table_ref());
        assert!(scope.check(&a.col("x")).is_ok());
        assert!(scope.check(&b.col("y")).is_err());
    }

    #[test]
    fn outer_table_visible_but_not_own() {
        let a = Table::create("a").column("x", ValueKind::Int).build().unwrap();
        let mut outer = TableSet::new();
        outer.insert(a.table_ref().clone());
        let scope = Scope::with_outer(outer);
        assert!(scope.check(&a.col("x")).is_ok());
        assert!(!scope.known().contains(a.table_ref()));
    }

    #[test]
    fn poison_surfaces_first() {
        let a = Table::create("a").column("x", ValueKind::Int).build().unwrap();
        let mut scope = Scope::new();
        scope.add(a.table_ref());
        let bad = a.col("nope");
        let err = scope.check(&bad).unwrap_err();
        assert!(err.is_composition());
    }
}
