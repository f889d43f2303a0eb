//! The INSERT builder.
//!
//! Rows are described column by column with [`set`](InsertInto::set);
//! [`next_row`](InsertInto::next_row) closes one and starts the next, so a
//! single statement can insert many rows. Alternatively the inserted rows
//! can come from a select ([`from_select`](InsertInto::from_select)) or be
//! all defaults ([`default_values`](InsertInto::default_values)).

use crate::compiler::{self, CompiledQuery};
use crate::connection::Connection;
use crate::error::{QueryError, QueryResult};
use crate::ident::Ident;
use crate::row::Row;
use crate::stmt::scope::Scope;
use crate::stmt::select::{ProjEntry, SelectCore, SelectProjected};
use crate::table::{ColumnRole, Table, TableKind};
use crate::value::expr::Expr;
use crate::value::kind::equality_compatible;
use crate::value::scalar::DbValue;
use crate::value::{IntoValue, Value, adapt_const};

/// Everything the compiler needs to emit one INSERT.
#[derive(Clone)]
pub(crate) struct InsertCore {
    pub(crate) table: Table,
    /// Column list shared by all rows, in first-set order.
    pub(crate) columns: Vec<Ident>,
    /// One entry per row, aligned with `columns`.
    pub(crate) rows: Vec<Vec<Expr>>,
    pub(crate) default_values: bool,
    pub(crate) from_select: Option<Box<SelectCore>>,
    pub(crate) returning: Vec<ProjEntry>,
    /// Column whose database-generated value the statement should hand
    /// back, when the id terminal is used.
    pub(crate) generated_key: Option<Ident>,
}

/// Builder for `INSERT INTO`.
pub struct InsertInto {
    conn: Connection,
    core: InsertCore,
    current: Vec<(Ident, Expr)>,
    scope: Scope,
    error: Option<QueryError>,
}

impl InsertInto {
    pub(crate) fn new(conn: Connection, table: &Table) -> Self {
        let mut scope = Scope::new();
        scope.add(table.table_ref());
        let error = match table.table_ref().kind() {
            TableKind::Table => None,
            _ => Some(QueryError::validation(format!(
                "'{}' is not an insertable table",
                table.table_ref().name().as_str()
            ))),
        };
        Self {
            conn,
            core: InsertCore {
                table: table.clone(),
                columns: Vec::new(),
                rows: Vec::new(),
                default_values: false,
                from_select: None,
                returning: Vec::new(),
                generated_key: None,
            },
            current: Vec::new(),
            scope,
            error,
        }
    }

    fn fail(&mut self, error: QueryError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Set one column of the row being described.
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
                "'{column}' is computed and cannot be inserted"
            )));
            return self;
        }
        if let Some(message) = value.composition_error() {
            self.fail(QueryError::composition(message));
            return self;
        }
        // Inserted values may only reference enclosing-free expressions:
        // constants, inline sub-selects, and the target's own columns.
        if let Err(e) = self.scope.check(&value) {
            self.fail(e);
            return self;
        }
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
        if self.current.iter().any(|(name, _)| name == def.name()) {
            self.fail(QueryError::validation(format!(
                "column '{column}' is set twice in one row"
            )));
            return self;
        }
        let (expr, adapt_error) = adapt_const(value.expr, def.adapter.as_deref(), None);
        if let Some(message) = adapt_error {
            self.fail(QueryError::composition(message));
            return self;
        }
        self.current.push((def.name().clone(), expr));
        self
    }

    /// [`set`](Self::set), skipping the column entirely when the operand
    /// is `None`. The column must then be omittable (optional, defaulted,
    /// or database-generated).
    pub fn set_if_value(self, column: &str, value: Option<impl IntoValue>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Close the row being described and start another one. All rows of
    /// one statement must set the same columns.
    pub fn next_row(mut self) -> Self {
        self.close_row();
        self
    }

    fn close_row(&mut self) {
        if self.error.is_some() || self.current.is_empty() {
            return;
        }
        let row: Vec<(Ident, Expr)> = std::mem::take(&mut self.current);
        if self.core.rows.is_empty() {
            self.core.columns = row.iter().map(|(name, _)| name.clone()).collect();
        } else {
            let names: Vec<&Ident> = row.iter().map(|(name, _)| name).collect();
            let expected: Vec<&Ident> = self.core.columns.iter().collect();
            if names != expected {
                self.fail(QueryError::validation(
                    "all rows of a multi-row insert must set the same columns, in the same order",
                ));
                return;
            }
        }
        self.core.rows.push(row.into_iter().map(|(_, e)| e).collect());
    }

    /// Insert one row of nothing but database defaults.
    pub fn default_values(mut self) -> Self {
        if self.error.is_some() {
            return self;
        }
        if !self.current.is_empty() || !self.core.rows.is_empty() {
            self.fail(QueryError::validation(
                "default_values cannot be combined with set columns",
            ));
            return self;
        }
        self.core.default_values = true;
        self
    }

    /// Insert the rows a query produces. The query's result names must
    /// match columns of the target table, in projection order.
    pub fn from_select(mut self, query: SelectProjected) -> Self {
        if self.error.is_some() {
            return self;
        }
        if !self.current.is_empty() || !self.core.rows.is_empty() || self.core.default_values {
            self.fail(QueryError::validation(
                "from_select cannot be combined with set columns",
            ));
            return self;
        }
        let core = match query.into_core() {
            Ok(core) => core,
            Err(e) => {
                self.fail(e);
                return self;
            }
        };
        let mut columns = Vec::with_capacity(core.projection.len());
        for entry in &core.projection {
            let def = match self.core.table.column_def(entry.name.as_str()) {
                Some(def) => def,
                None => {
                    let table = self.core.table.table_ref().name().as_str().to_string();
                    self.fail(QueryError::validation(format!(
                        "table '{table}' has no column '{}'",
                        entry.name.as_str()
                    )));
                    return self;
                }
            };
            if !equality_compatible(def.kind(), entry.kind) {
                self.fail(QueryError::composition(format!(
                    "cannot insert {:?} into column '{}' of kind {:?}",
                    entry.kind,
                    entry.name.as_str(),
                    def.kind()
                )));
                return self;
            }
            columns.push(entry.name.clone());
        }
        self.core.columns = columns;
        self.core.from_select = Some(Box::new(core));
        self
    }

    /// Project values of the inserted row(s) back to the caller, on
    /// dialects with a RETURNING/OUTPUT clause.
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
            if let Err(e) = self.scope.check(&value) {
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

    fn finalize(mut self) -> QueryResult<(Connection, InsertCore)> {
        self.close_row();
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.core.rows.is_empty() && !self.core.default_values && self.core.from_select.is_none()
        {
            return Err(QueryError::validation("the insert sets no columns"));
        }
        if self.core.from_select.is_none() && !self.core.default_values {
            for def in self.core.table.columns() {
                let provided = self.core.columns.iter().any(|c| c == def.name());
                if !provided && !def.insert_optional() {
                    return Err(QueryError::validation(format!(
                        "required column '{}' is not set",
                        def.name().as_str()
                    )));
                }
            }
        }
        Ok((self.conn, self.core))
    }

    /// Compile without executing.
    pub fn compile(self) -> QueryResult<CompiledQuery> {
        let (conn, core) = self.finalize()?;
        compiler::compile_insert(&core, conn.dialect())
    }

    /// Run the insert and return the number of inserted rows.
    pub async fn execute_insert(self) -> QueryResult<u64> {
        let (conn, core) = self.finalize()?;
        let compiled = compiler::compile_insert(&core, conn.dialect())?;
        conn.run_insert(&compiled).await
    }

    /// Run the insert and return the database-generated primary key of
    /// the single inserted row.
    ///
    /// On RETURNING-capable dialects the key travels in the statement
    /// itself; elsewhere the execution adapter supplies it (for example
    /// MySQL's `LAST_INSERT_ID()`).
    pub async fn execute_insert_returning_last_inserted_id(self) -> QueryResult<DbValue> {
        let (conn, mut core) = self.finalize()?;
        let key = generated_key(&core.table)?;
        if core.rows.len() > 1 {
            return Err(QueryError::validation(
                "the generated-key terminal inserts exactly one row; use the multi-row variant",
            ));
        }
        core.generated_key = Some(key);
        let compiled = compiler::compile_insert(&core, conn.dialect())?;
        conn.run_insert_returning_last_inserted_id(&compiled).await
    }

    /// Multi-row variant of
    /// [`execute_insert_returning_last_inserted_id`](Self::execute_insert_returning_last_inserted_id),
    /// returning one generated key per inserted row.
    pub async fn execute_insert_returning_last_inserted_ids(self) -> QueryResult<Vec<DbValue>> {
        let (conn, mut core) = self.finalize()?;
        let key = generated_key(&core.table)?;
        core.generated_key = Some(key);
        let compiled = compiler::compile_insert(&core, conn.dialect())?;
        conn.run_insert_returning_last_inserted_ids(&compiled).await
    }

    /// Run the insert and return its RETURNING projection for the single
    /// inserted row.
    pub async fn execute_insert_returning_one(self) -> QueryResult<Row> {
        let (conn, core) = self.finalize()?;
        require_returning(&core, conn.dialect())?;
        let compiled = compiler::compile_insert(&core, conn.dialect())?;
        let mut rows = conn.run_returning(&compiled).await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(QueryError::no_row("the insert returned no row")),
            n => Err(QueryError::TooManyRows(n)),
        }
    }

    /// Run the insert and return its RETURNING projection for every
    /// inserted row.
    pub async fn execute_insert_returning_many(self) -> QueryResult<Vec<Row>> {
        let (conn, core) = self.finalize()?;
        require_returning(&core, conn.dialect())?;
        let compiled = compiler::compile_insert(&core, conn.dialect())?;
        conn.run_returning(&compiled).await
    }
}

fn generated_key(table: &Table) -> QueryResult<Ident> {
    table
        .columns()
        .iter()
        .find(|c| {
            matches!(
                c.role(),
                ColumnRole::AutogeneratedPrimaryKey | ColumnRole::PrimaryKeyFromSequence(_)
            )
        })
        .map(|c| c.name().clone())
        .ok_or_else(|| {
            QueryError::validation(format!(
                "table '{}' has no database-generated primary key",
                table.table_ref().name().as_str()
            ))
        })
}

fn require_returning(core: &InsertCore, dialect: crate::dialect::Dialect) -> QueryResult<()> {
    if core.returning.is_empty() {
        return Err(QueryError::validation(
            "the insert has no returning projection",
        ));
    }
    if !dialect.supports_returning() {
        return Err(QueryError::unsupported(format!(
            "{dialect} cannot return values from an insert"
        )));
    }
    Ok(())
}
