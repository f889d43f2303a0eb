//! The UPDATE builder.
//!
//! An update without a WHERE is almost always a bug, so the terminal
//! rejects it unless [`all_rows`](UpdateTable::all_rows) states the intent
//! explicitly. The RETURNING projection may reference the table's
//! post-update columns and, through the
//! [`old_values`](crate::Table::old_values) derivation, the pre-update
//! ones on dialects that can express it.

use crate::compiler::{self, CompiledQuery};
use crate::connection::Connection;
use crate::error::{QueryError, QueryResult};
use crate::ident::Ident;
use crate::row::Row;
use crate::stmt::scope::Scope;
use crate::stmt::select::ProjEntry;
use crate::table::{ColumnRole, Table, TableKind, TableSet};
use crate::value::expr::Expr;
use crate::value::kind::{ValueKind, equality_compatible};
use crate::value::{IntoValue, Value, adapt_const};

/// Everything the compiler needs to emit one UPDATE.
#[derive(Clone)]
pub(crate) struct UpdateCore {
    pub(crate) table: Table,
    pub(crate) sets: Vec<(Ident, Expr)>,
    pub(crate) from_tables: Vec<Table>,
    pub(crate) where_clause: Option<Expr>,
    pub(crate) all_rows: bool,
    pub(crate) returning: Vec<ProjEntry>,
    /// Old-values derivations the returning projection references.
    pub(crate) old_refs: TableSet,
}

/// Builder for `UPDATE`.
pub struct UpdateTable {
    conn: Connection,
    core: UpdateCore,
    scope: Scope,
    /// Tables the SET values reference, resolved against the scope at
    /// finalize so `from` may be chained after `set`.
    set_refs: TableSet,
    error: Option<QueryError>,
}

impl UpdateTable {
    pub(crate) fn new(conn: Connection, table: &Table) -> Self {
        let mut scope = Scope::new();
        scope.add(table.table_ref());
        let error = match table.table_ref().kind() {
            TableKind::Table => None,
            _ => Some(QueryError::validation(format!(
                "'{}' is not an updatable table",
                table.table_ref().name().as_str()
            ))),
        };
        Self {
            conn,
            core: UpdateCore {
                table: table.clone(),
                sets: Vec::new(),
                from_tables: Vec::new(),
                where_clause: None,
                all_rows: false,
                returning: Vec::new(),
                old_refs: TableSet::new(),
            },
            scope,
            set_refs: TableSet::new(),
            error,
        }
    }

    fn fail(&mut self, error: QueryError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Assign a new value to one column. The value may reference the
    /// table's own columns (`SET counter = counter + 1`).
    pub fn set(mut self, column: &str, value: impl IntoValue) -> Self {
        if self.error.is_some() {
            return self;
        }
        let value = value.into_value();
        let def = match self.core.table.column_def(column) {
            Some(def) => def.clone(),
            None => {
                let table = self.core.table.table_ref().name().as_str().to_string();
                self.fail(QueryError::validation(format!(
                    "table '{table}' has no column '{column}'"
                )));
                return self;
            }
        };
        if matches!(def.role(), ColumnRole::Computed(_)) {
            self.fail(QueryError::validation(format!(
                "'{column}' is computed and cannot be updated"
            )));
            return self;
        }
        if let Some(message) = value.composition_error() {
            self.fail(QueryError::composition(message));
            return self;
        }
        self.set_refs
            .extend(value.referenced_tables().iter().cloned());
        if !equality_compatible(def.kind(), value.kind()) {
            self.fail(QueryError::composition(format!(
                "cannot assign {:?} to column '{column}' of kind {:?}",
                value.kind(),
                def.kind()
            )));
            return self;
        }
        if value.nullability().is_optional() && !def.nullability().is_optional() {
            self.fail(QueryError::composition(format!(
                "cannot assign an optional value to required column '{column}'"
            )));
            return self;
        }
        if self.core.sets.iter().any(|(name, _)| name == def.name()) {
            self.fail(QueryError::validation(format!(
                "column '{column}' is set twice"
            )));
            return self;
        }
        let (expr, adapt_error) = adapt_const(value.expr, def.adapter.as_deref(), None);
        if let Some(message) = adapt_error {
            self.fail(QueryError::composition(message));
            return self;
        }
        self.core.sets.push((def.name().clone(), expr));
        self
    }

    /// [`set`](Self::set), leaving the column untouched when the operand
    /// is `None`.
    pub fn set_if_value(self, column: &str, value: Option<impl IntoValue>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Bring another table into the statement so SET values and the
    /// filter may read from it. Emitted as `UPDATE .. FROM` or the
    /// multi-table form, whichever the dialect speaks.
    pub fn from(mut self, table: &Table) -> Self {
        if self.error.is_some() {
            return self;
        }
        self.scope.add(table.table_ref());
        self.core.from_tables.push(table.clone());
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

    /// Explicitly allow updating every row of the table.
    pub fn all_rows(mut self) -> Self {
        self.core.all_rows = true;
        self
    }

    /// Project values of the updated rows back to the caller. Values may
    /// reference the table (post-update) and its
    /// [`old_values`](crate::Table::old_values) derivation (pre-update).
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

    fn finalize(self) -> QueryResult<(Connection, UpdateCore)> {
        if let Some(e) = self.error {
            return Err(e);
        }
        for table in &self.set_refs {
            if !self.scope.known().contains(table) {
                return Err(QueryError::TableNotInScope {
                    table: table.qualifier().as_str().to_string(),
                });
            }
        }
        if self.core.sets.is_empty() {
            return Err(QueryError::validation("the update sets no columns"));
        }
        if self.core.where_clause.is_none() && !self.core.all_rows {
            return Err(QueryError::validation(
                "an update without WHERE requires all_rows()",
            ));
        }
        Ok((self.conn, self.core))
    }

    /// Compile without executing.
    pub fn compile(self) -> QueryResult<CompiledQuery> {
        let (conn, core) = self.finalize()?;
        compiler::compile_update(&core, conn.dialect())
    }

    /// Run the update and return the number of affected rows.
    pub async fn execute_update(self) -> QueryResult<u64> {
        let (conn, core) = self.finalize()?;
        let compiled = compiler::compile_update(&core, conn.dialect())?;
        conn.run_update(&compiled).await
    }

    /// Run the update and return its RETURNING projection for the single
    /// affected row.
    pub async fn execute_update_returning_one(self) -> QueryResult<Row> {
        let (conn, core) = self.finalize()?;
        require_returning(&core.returning, conn.dialect(), "update")?;
        let compiled = compiler::compile_update(&core, conn.dialect())?;
        let mut rows = conn.run_returning(&compiled).await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(QueryError::no_row("the update matched no row")),
            n => Err(QueryError::TooManyRows(n)),
        }
    }

    /// Run the update and return its RETURNING projection for every
    /// affected row.
    pub async fn execute_update_returning_many(self) -> QueryResult<Vec<Row>> {
        let (conn, core) = self.finalize()?;
        require_returning(&core.returning, conn.dialect(), "update")?;
        let compiled = compiler::compile_update(&core, conn.dialect())?;
        conn.run_returning(&compiled).await
    }
}

/// Scope rule for RETURNING projections of data-changing statements: the
/// target table itself, anything already in scope, or an old-values
/// derivation of the target.
pub(crate) fn accept_returning_value(
    scope: &Scope,
    target: &Table,
    value: &Value,
    old_refs: &mut TableSet,
) -> QueryResult<()> {
    if let Some(message) = value.composition_error() {
        return Err(QueryError::composition(message));
    }
    for table in value.referenced_tables() {
        if scope.known().contains(table) {
            continue;
        }
        if table.kind() == TableKind::OldValues && table.name() == target.table_ref().name() {
            old_refs.insert(table.clone());
            continue;
        }
        return Err(QueryError::TableNotInScope {
            table: table.qualifier().as_str().to_string(),
        });
    }
    Ok(())
}

pub(crate) fn require_returning(
    returning: &[ProjEntry],
    dialect: crate::dialect::Dialect,
    what: &str,
) -> QueryResult<()> {
    if returning.is_empty() {
        return Err(QueryError::validation(format!(
            "the {what} has no returning projection"
        )));
    }
    if !dialect.supports_returning() {
        return Err(QueryError::unsupported(format!(
            "{dialect} cannot return values from a {what}"
        )));
    }
    Ok(())
}
