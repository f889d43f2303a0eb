//! The connection facade.
//!
//! A [`Connection`] pairs an execution adapter with the statement
//! builders and the logical transaction state. Cloning is cheap and every
//! clone shares the same adapter and transaction nesting, so builders can
//! hold one without borrowing.

use crate::compiler::CompiledQuery;
use crate::dialect::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::row::Row;
use crate::runner::QueryRunner;
use crate::stmt::delete::DeleteFrom;
use crate::stmt::insert::InsertInto;
use crate::stmt::select::SelectFrom;
use crate::stmt::update::UpdateTable;
use crate::table::{Table, TableSet};
use crate::value::kind::ValueKind;
use crate::value::scalar::DbValue;
use crate::value::{IntoValue, Value};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// A database connection bound to one execution adapter.
#[derive(Clone)]
pub struct Connection {
    runner: Arc<dyn QueryRunner>,
    tx_depth: Arc<AtomicU32>,
}

impl Connection {
    pub fn new(runner: Arc<dyn QueryRunner>) -> Self {
        Self {
            runner,
            tx_depth: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.runner.dialect()
    }

    // ─── Statement entry points ─────────────────────────────────────────

    /// Start a SELECT over one table or view.
    pub fn select_from(&self, table: &Table) -> SelectFrom {
        SelectFrom::new(self.clone(), table)
    }

    /// Start a SELECT with no FROM clause (constants, function calls).
    pub fn select_from_no_table(&self) -> SelectFrom {
        SelectFrom::no_table(self.clone())
    }

    /// Start a sub-select that may reference the given tables of an
    /// enclosing statement. Add its own FROM with
    /// [`from`](SelectFrom::from).
    pub fn sub_select_using(&self, tables: &[&Table]) -> SelectFrom {
        let mut outer = TableSet::new();
        for table in tables {
            outer.insert(table.table_ref().clone());
        }
        SelectFrom::using(self.clone(), outer)
    }

    pub fn insert_into(&self, table: &Table) -> InsertInto {
        InsertInto::new(self.clone(), table)
    }

    pub fn update(&self, table: &Table) -> UpdateTable {
        UpdateTable::new(self.clone(), table)
    }

    pub fn delete_from(&self, table: &Table) -> DeleteFrom {
        DeleteFrom::new(self.clone(), table)
    }

    /// A constant value, bound as a parameter.
    pub fn const_value(&self, value: impl IntoValue) -> Value {
        value.into_value()
    }

    /// An optional constant of a stated kind; `None` becomes a typed NULL.
    pub fn optional_const_value(
        &self,
        value: Option<impl IntoValue>,
        kind: ValueKind,
    ) -> Value {
        match value {
            Some(v) => v.into_value(),
            None => Value::null(kind),
        }
    }

    // ─── Transactions ───────────────────────────────────────────────────

    /// Whether a logical transaction is open on this connection.
    pub fn is_transaction_active(&self) -> bool {
        self.tx_depth.load(Ordering::SeqCst) > 0
    }

    /// Open a logical transaction. Nested calls stack: only the outermost
    /// one opens a physical transaction.
    pub async fn begin_transaction(&self) -> QueryResult<()> {
        let depth = self.tx_depth.fetch_add(1, Ordering::SeqCst);
        if depth == 0 {
            if let Err(e) = self.runner.execute_begin_transaction().await {
                self.tx_depth.fetch_sub(1, Ordering::SeqCst);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Close the innermost logical transaction; the outermost close
    /// commits physically.
    pub async fn commit(&self) -> QueryResult<()> {
        let depth = self.tx_depth.load(Ordering::SeqCst);
        if depth == 0 {
            return Err(QueryError::Transaction(
                "commit without an active transaction".to_string(),
            ));
        }
        self.tx_depth.fetch_sub(1, Ordering::SeqCst);
        if depth == 1 {
            self.runner.execute_commit().await?;
        }
        Ok(())
    }

    /// Abort the innermost logical transaction; the outermost abort rolls
    /// back physically.
    pub async fn rollback(&self) -> QueryResult<()> {
        let depth = self.tx_depth.load(Ordering::SeqCst);
        if depth == 0 {
            return Err(QueryError::Transaction(
                "rollback without an active transaction".to_string(),
            ));
        }
        self.tx_depth.fetch_sub(1, Ordering::SeqCst);
        if depth == 1 {
            self.runner.execute_rollback().await?;
        }
        Ok(())
    }

    /// Run `body` inside a transaction: commit on `Ok`, roll back and
    /// propagate on `Err`.
    pub async fn transaction<T, F, Fut>(&self, body: F) -> QueryResult<T>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = QueryResult<T>>,
    {
        self.begin_transaction().await?;
        match body(self.clone()).await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = self.rollback().await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %rollback_error, "rollback failed");
                    let _ = rollback_error;
                }
                Err(error)
            }
        }
    }

    // ─── Escape hatches ─────────────────────────────────────────────────

    /// Call a stored procedure with raw SQL.
    pub async fn execute_procedure(&self, sql: &str, params: &[DbValue]) -> QueryResult<()> {
        self.log(sql, params);
        self.runner.execute_procedure(sql, params).await
    }

    /// Call a scalar database function with raw SQL.
    pub async fn execute_function(&self, sql: &str, params: &[DbValue]) -> QueryResult<DbValue> {
        self.log(sql, params);
        self.runner.execute_function(sql, params).await
    }

    /// Run a schema-changing statement (DDL).
    pub async fn execute_database_schema_modification(&self, sql: &str) -> QueryResult<()> {
        self.log(sql, &[]);
        self.runner.execute_database_schema_modification(sql).await
    }

    // ─── Internal dispatch ──────────────────────────────────────────────

    fn log(&self, sql: &str, params: &[DbValue]) {
        #[cfg(feature = "tracing")]
        tracing::debug!(sql, params = ?params, "executing");
        #[cfg(not(feature = "tracing"))]
        {
            let _ = (sql, params);
        }
    }

    pub(crate) async fn run_select_many(&self, query: &CompiledQuery) -> QueryResult<Vec<Row>> {
        self.log(&query.sql, &query.params);
        self.runner
            .execute_select_many_rows(&query.sql, &query.params)
            .await
    }

    pub(crate) async fn run_select_count(&self, query: &CompiledQuery) -> QueryResult<u64> {
        let rows = self.run_select_many(query).await?;
        let row = rows
            .first()
            .ok_or_else(|| QueryError::no_row("the count query returned no row"))?;
        let count = row.single()?.as_i64()?;
        u64::try_from(count)
            .map_err(|_| QueryError::decode("result", format!("negative count {count}")))
    }

    pub(crate) async fn run_insert(&self, query: &CompiledQuery) -> QueryResult<u64> {
        self.log(&query.sql, &query.params);
        self.runner.execute_mutation(&query.sql, &query.params).await
    }

    pub(crate) async fn run_insert_returning_last_inserted_id(
        &self,
        query: &CompiledQuery,
    ) -> QueryResult<DbValue> {
        self.log(&query.sql, &query.params);
        self.runner
            .execute_insert_returning_last_inserted_id(&query.sql, &query.params)
            .await
    }

    pub(crate) async fn run_insert_returning_last_inserted_ids(
        &self,
        query: &CompiledQuery,
    ) -> QueryResult<Vec<DbValue>> {
        self.log(&query.sql, &query.params);
        self.runner
            .execute_insert_returning_last_inserted_ids(&query.sql, &query.params)
            .await
    }

    pub(crate) async fn run_returning(&self, query: &CompiledQuery) -> QueryResult<Vec<Row>> {
        self.log(&query.sql, &query.params);
        self.runner
            .execute_mutation_returning_rows(&query.sql, &query.params)
            .await
    }

    pub(crate) async fn run_update(&self, query: &CompiledQuery) -> QueryResult<u64> {
        self.log(&query.sql, &query.params);
        self.runner.execute_mutation(&query.sql, &query.params).await
    }

    pub(crate) async fn run_delete(&self, query: &CompiledQuery) -> QueryResult<u64> {
        self.log(&query.sql, &query.params);
        self.runner.execute_mutation(&query.sql, &query.params).await
    }
}
