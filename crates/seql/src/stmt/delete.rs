//! The DELETE builder.
//!
//! Mirrors the UPDATE builder's safety rule: deleting without a WHERE
//! requires an explicit [`all_rows`](DeleteFrom::all_rows). The RETURNING
//! projection reads the deleted rows, so the
//! [`old_values`](crate::Table::old_values) derivation is redundant here;
//! plain column references already mean the pre-delete values.

use crate::compiler::{self, CompiledQuery};
use crate::connection::Connection;
use crate::error::{QueryError, QueryResult};
use crate::ident::Ident;
use crate::row::Row;
use crate::stmt::scope::Scope;
use crate::stmt::select::ProjEntry;
use crate::stmt::update::{accept_returning_value, require_returning};
use crate::table::{Table, TableKind, TableSet};
use crate::value::Value;
use crate::value::expr::Expr;
use crate::value::kind::ValueKind;

/// Everything the compiler needs to emit one DELETE.
#[derive(Clone)]
pub(crate) struct DeleteCore {
    pub(crate) table: Table,
    pub(crate) using_tables: Vec<Table>,
    pub(crate) where_clause: Option<Expr>,
    pub(crate) all_rows: bool,
    pub(crate) returning: Vec<ProjEntry>,
    pub(crate) old_refs: TableSet,
}

/// Builder for `DELETE FROM`.
pub struct DeleteFrom {
    conn: Connection,
    core: DeleteCore,
    scope: Scope,
    error: Option<QueryError>,
}

impl DeleteFrom {
    pub(crate) fn new(conn: Connection, table: &Table) -> Self {
        let mut scope = Scope::new();
        scope.add(table.table_ref());
        let error = match table.table_ref().kind() {
            TableKind::Table => None,
            _ => Some(QueryError::validation(format!(
                "'{}' is not a deletable table",
                table.table_ref().name().as_str()
            ))),
        };
        Self {
            conn,
            core: DeleteCore {
                table: table.clone(),
                using_tables: Vec::new(),
                where_clause: None,
                all_rows: false,
                returning: Vec::new(),
                old_refs: TableSet::new(),
            },
            scope,
            error,
        }
    }

    fn fail(&mut self, error: QueryError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Bring another table into the statement so the filter may read
    /// from it. Emitted as a USING list on dialects that have one.
    pub fn using(mut self, table: &Table) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.scope.add(table.table_ref());
        self.core.using_tables.push(table.clone());
        self
    }

    /// Add a filter. Repeated calls AND together; no-op filters from
    /// `*_if_value` are skipped.
    pub fn where_(mut self, condition: Value) -> Self {
        if condition.is_no_op() {
            return self;
        }
        if self.error.is_some() {
            return self;
        }
        if let Err(e) = self.scope.check(&condition) {
            self.fail(e);
            return self;
        }
        if condition.kind() != ValueKind::Boolean {
            self.fail(QueryError::composition(format!(
                "WHERE requires a boolean, got {:?}",
                condition.kind()
            )));
            return self;
        }
        self.core.where_clause = Some(match self.core.where_clause.take() {
            Some(existing) => Expr::Binary {
                op: crate::value::expr::BinaryOp::And,
                lhs: Box::new(existing),
                rhs: Box::new(condition.expr),
            },
            None => condition.expr,
        });
        self
    }

    /// Alias of [`where_`](Self::where_) for readable chains.
    pub fn and(self, condition: Value) -> Self {
        self.where_(condition)
    }

    /// OR the condition into the filter built so far.
    pub fn or(mut self, condition: Value) -> Self {
        if condition.is_no_op() {
            return self;
        }
        if self.error.is_some() {
            return self;
        }
        if let Err(e) = self.scope.check(&condition) {
            self.fail(e);
            return self;
        }
        if condition.kind() != ValueKind::Boolean {
            self.fail(QueryError::composition(format!(
                "WHERE requires a boolean, got {:?}",
                condition.kind()
            )));
            return self;
        }
        self.core.where_clause = Some(match self.core.where_clause.take() {
            Some(existing) => Expr::Binary {
                op: crate::value::expr::BinaryOp::Or,
                lhs: Box::new(existing),
                rhs: Box::new(condition.expr),
            },
            None => condition.expr,
        });
        self
    }

    /// Explicitly allow deleting every row of the table.
    pub fn all_rows(mut self) -> Self {
        self.core.all_rows = true;
        self
    }

    /// Project values of the deleted rows back to the caller.
    pub fn returning(mut self, columns: Vec<(&str, Value)>) -> Self {
        if self.error.is_some() {
            return self;
        }
        let mut returning = Vec::with_capacity(columns.len());
        for (name, value) in columns {
            let ident = match Ident::new(name) {
                Ok(ident) => ident,
                Err(e) => {
                    self.fail(e);
                    return self;
                }
            };
            if let Err(e) = accept_returning_value(
                &self.scope,
                &self.core.table,
                &value,
                &mut self.core.old_refs,
            ) {
                self.fail(e);
                return self;
            }
            returning.push(ProjEntry {
                name: ident,
                expr: value.expr,
                kind: value.kind,
                nullability: value.nullability,
                adapter: value.adapter,
            });
        }
        self.core.returning = returning;
        self
    }

    fn finalize(self) -> QueryResult<(Connection, DeleteCore)> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.core.where_clause.is_none() && !self.core.all_rows {
            return Err(QueryError::validation(
                "a delete without WHERE requires all_rows()",
            ));
        }
        Ok((self.conn, self.core))
    }

    /// Compile without executing.
    pub fn compile(self) -> QueryResult<CompiledQuery> {
        let (conn, core) = self.finalize()?;
        compiler::compile_delete(&core, conn.dialect())
    }

    /// Run the delete and return the number of deleted rows.
    pub async fn execute_delete(self) -> QueryResult<u64> {
        let (conn, core) = self.finalize()?;
        let compiled = compiler::compile_delete(&core, conn.dialect())?;
        conn.run_delete(&compiled).await
    }

    /// Run the delete and return its RETURNING projection for the single
    /// deleted row.
    pub async fn execute_delete_returning_one(self) -> QueryResult<Row> {
        let (conn, core) = self.finalize()?;
        require_returning(&core.returning, conn.dialect(), "delete")?;
        let compiled = compiler::compile_delete(&core, conn.dialect())?;
        let mut rows = conn.run_returning(&compiled).await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(QueryError::no_row("the delete matched no row")),
            n => Err(QueryError::TooManyRows(n)),
        }
    }

    /// Run the delete and return its RETURNING projection for every
    /// deleted row.
    pub async fn execute_delete_returning_many(self) -> QueryResult<Vec<Row>> {
        let (conn, core) = self.finalize()?;
        require_returning(&core.returning, conn.dialect(), "delete")?;
        let compiled = compiler::compile_delete(&core, conn.dialect())?;
        conn.run_returning(&compiled).await
    }
}
