//! # seql
//!
//! A typed, composable SQL query-building layer for Rust.
//!
//! ## Features
//!
//! - **Typed values**: every expression carries its kind, nullability, and
//!   the set of tables it references; mismatches surface as errors when
//!   the statement is built, never as malformed SQL at the server
//! - **Staged builders**: SELECT/INSERT/UPDATE/DELETE are small state
//!   machines, so illegal orderings are not callable
//! - **Deterministic compiler**: one statement compiles to one SQL string
//!   plus positional parameters, identically every time
//! - **Six dialects**: PostgreSQL, MySQL, MariaDB, SQLite, SQL Server,
//!   and Oracle, differing only inside the compiler
//! - **Pluggable execution**: the [`QueryRunner`] trait is the only thing
//!   a database driver has to implement
//! - **Safe defaults**: UPDATE and DELETE without WHERE require an
//!   explicit `all_rows()`
//!
//! ## Building a query
//!
//! ```ignore
//! use seql::{Connection, Table, ValueKind};
//!
//! let customer = Table::create("customer")
//!     .autogenerated_primary_key("id", ValueKind::Int)
//!     .column("first_name", ValueKind::String)
//!     .optional_column("birthday", ValueKind::LocalDate)
//!     .build()?;
//!
//! let adults = conn
//!     .select_from(&customer)
//!     .where_(customer.col("first_name").starts_with_if_value(name_filter))
//!     .select(vec![
//!         ("id", customer.col("id")),
//!         ("name", customer.col("first_name")),
//!     ])
//!     .order_by("name", seql::OrderByMode::Asc)
//!     .execute_select_page()
//!     .await?;
//! ```

pub mod compiler;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod ident;
pub mod row;
pub mod runner;
pub mod stmt;
pub mod table;
pub mod value;

pub use compiler::CompiledQuery;
pub use connection::Connection;
pub use dialect::Dialect;
pub use error::{QueryError, QueryResult};
pub use ident::Ident;
pub use row::{FromRow, Page, Row};
pub use runner::QueryRunner;
pub use stmt::OrderByMode;
pub use stmt::delete::DeleteFrom;
pub use stmt::insert::InsertInto;
pub use stmt::select::{SelectFrom, SelectJoinOn, SelectProjected};
pub use stmt::update::UpdateTable;
pub use table::{ColumnDef, ColumnRole, Table, TableBuilder, TableKind, TableRef, TableSet};
pub use value::kind::{Nullability, ValueKind};
pub use value::scalar::{DbValue, TypeAdapter};
pub use value::{
    IntoValue, Value, aggregate_as_array, aggregate_as_array_of_one_column, average, count,
    count_all, count_distinct, max_value, min_value, sum,
};
