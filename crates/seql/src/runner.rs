//! The execution contract.
//!
//! [`QueryRunner`] is the seam between the dialect-agnostic core and a
//! concrete database driver. The core compiles statements, decides
//! cardinality, and manages logical transaction nesting; a runner only
//! ships SQL text plus positional parameters to its backend and maps the
//! results back into [`Row`]s.

use crate::dialect::Dialect;
use crate::error::{QueryError, QueryResult};
use crate::row::Row;
use crate::value::scalar::DbValue;
use async_trait::async_trait;

/// Adapter to a concrete database driver.
///
/// Most methods have defaults in terms of
/// [`execute_select_many_rows`](Self::execute_select_many_rows) and
/// [`execute_mutation`](Self::execute_mutation); a driver implements those
/// two plus the transaction verbs and overrides the rest only where the
/// backend has a better native channel (for example a generated-key API
/// on a dialect without RETURNING).
#[async_trait]
pub trait QueryRunner: Send + Sync {
    /// The dialect this runner's backend speaks.
    fn dialect(&self) -> Dialect;

    /// Run a query and return every result row.
    async fn execute_select_many_rows(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> QueryResult<Vec<Row>>;

    /// Run a single-column query and return that column for every row.
    async fn execute_select_one_column_many_rows(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> QueryResult<Vec<DbValue>> {
        let rows = self.execute_select_many_rows(sql, params).await?;
        rows.iter().map(|row| row.single().cloned()).collect()
    }

    /// Run a single-column query expected to produce at most one row.
    async fn execute_select_one_column_one_row(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> QueryResult<Option<DbValue>> {
        let rows = self.execute_select_many_rows(sql, params).await?;
        match rows.as_slice() {
            [row] => Ok(Some(row.single()?.clone())),
            [] => Ok(None),
            many => Err(QueryError::TooManyRows(many.len())),
        }
    }

    /// Run a data-changing statement and return the affected-row count.
    async fn execute_mutation(&self, sql: &str, params: &[DbValue]) -> QueryResult<u64>;

    /// Run a data-changing statement that projects rows back
    /// (RETURNING/OUTPUT).
    async fn execute_mutation_returning_rows(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> QueryResult<Vec<Row>> {
        self.execute_select_many_rows(sql, params).await
    }

    /// Run an insert and return the database-generated key of the one
    /// inserted row.
    ///
    /// The default reads the key from the statement's RETURNING
    /// projection; drivers for dialects without one override this with
    /// their native channel.
    async fn execute_insert_returning_last_inserted_id(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> QueryResult<DbValue> {
        let rows = self.execute_mutation_returning_rows(sql, params).await?;
        match rows.as_slice() {
            [row] => Ok(row.single()?.clone()),
            [] => Err(QueryError::no_row("the insert returned no generated key")),
            many => Err(QueryError::TooManyRows(many.len())),
        }
    }

    /// Multi-row variant of
    /// [`execute_insert_returning_last_inserted_id`](Self::execute_insert_returning_last_inserted_id).
    async fn execute_insert_returning_last_inserted_ids(
        &self,
        sql: &str,
        params: &[DbValue],
    ) -> QueryResult<Vec<DbValue>> {
        let rows = self.execute_mutation_returning_rows(sql, params).await?;
        rows.iter().map(|row| row.single().cloned()).collect()
    }

    /// Call a stored procedure.
    async fn execute_procedure(&self, sql: &str, params: &[DbValue]) -> QueryResult<()> {
        self.execute_mutation(sql, params).await.map(|_| ())
    }

    /// Call a scalar database function.
    async fn execute_function(&self, sql: &str, params: &[DbValue]) -> QueryResult<DbValue> {
        let rows = self.execute_select_many_rows(sql, params).await?;
        match rows.as_slice() {
            [row] => Ok(row.single()?.clone()),
            [] => Err(QueryError::no_row("the function returned no value")),
            many => Err(QueryError::TooManyRows(many.len())),
        }
    }

    /// Open a physical transaction.
    async fn execute_begin_transaction(&self) -> QueryResult<()>;

    /// Commit the physical transaction.
    async fn execute_commit(&self) -> QueryResult<()>;

    /// Roll the physical transaction back.
    async fn execute_rollback(&self) -> QueryResult<()>;

    /// Run a schema-changing statement (DDL).
    async fn execute_database_schema_modification(&self, sql: &str) -> QueryResult<()> {
        self.execute_mutation(sql, &[]).await.map(|_| ())
    }
}
