//! Table and view descriptors.
//!
//! A [`Table`] describes a relation's columns once; every query references
//! it through the typed [`Value`]s its [`col`](Table::col) method hands
//! out. Derivations (`as_alias`, `for_use_in_left_join`, `old_values`)
//! produce new descriptors with a fresh identity, so the same relation can
//! appear several times in one statement without ambiguity.

use crate::error::{QueryError, QueryResult};
use crate::ident::Ident;
use crate::value::Value;
use crate::value::kind::{Nullability, ValueKind};
use crate::value::scalar::TypeAdapter;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_TABLE_ID: AtomicU64 = AtomicU64::new(1);

fn next_table_id() -> u64 {
    NEXT_TABLE_ID.fetch_add(1, AtomicOrdering::Relaxed)
}

/// What a [`TableRef`] points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// A base table.
    Table,
    /// A read-only view.
    View,
    /// A query materialized as a with-view (CTE).
    With,
    /// The pre-modification row image of a data-changing statement.
    OldValues,
}

/// Identity of one appearance of a relation inside a statement.
///
/// Two refs to the same table obtained through different derivations are
/// distinct; identity is the creation id, never the name.
#[derive(Clone)]
pub struct TableRef {
    id: u64,
    name: Ident,
    alias: Option<Ident>,
    kind: TableKind,
}

impl TableRef {
    fn new(name: Ident, alias: Option<Ident>, kind: TableKind) -> Self {
        Self {
            id: next_table_id(),
            name,
            alias,
            kind,
        }
    }

    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn alias(&self) -> Option<&Ident> {
        self.alias.as_ref()
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    /// The identifier columns of this ref are qualified with: the alias
    /// when one is set, otherwise the relation name.
    pub(crate) fn qualifier(&self) -> &Ident {
        self.alias.as_ref().unwrap_or(&self.name)
    }
}

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alias", &self.alias)
            .field("kind", &self.kind)
            .finish()
    }
}

impl PartialEq for TableRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TableRef {}

impl PartialOrd for TableRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TableRef {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::hash::Hash for TableRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Ordered set of table refs; the deterministic order keeps compiled SQL
/// stable across runs.
pub type TableSet = BTreeSet<TableRef>;

/// How a column participates in inserts.
#[derive(Clone)]
pub enum ColumnRole {
    /// Plain column; inserts must provide a value unless it is optional.
    Regular,
    /// The database fills a default when the insert omits it.
    HasDefault,
    /// Primary key produced by the database (serial, identity).
    AutogeneratedPrimaryKey,
    /// Primary key drawn from a named sequence.
    PrimaryKeyFromSequence(String),
    /// Not a stored column: a raw SQL expression evaluated per row.
    Computed(String),
}

impl fmt::Debug for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Regular => f.write_str("Regular"),
            ColumnRole::HasDefault => f.write_str("HasDefault"),
            ColumnRole::AutogeneratedPrimaryKey => f.write_str("AutogeneratedPrimaryKey"),
            ColumnRole::PrimaryKeyFromSequence(s) => write!(f, "PrimaryKeyFromSequence({s})"),
            ColumnRole::Computed(_) => f.write_str("Computed"),
        }
    }
}

/// One column of a [`Table`] or view.
#[derive(Clone)]
pub struct ColumnDef {
    pub(crate) name: Ident,
    pub(crate) kind: ValueKind,
    pub(crate) nullability: Nullability,
    pub(crate) role: ColumnRole,
    pub(crate) adapter: Option<Arc<dyn TypeAdapter>>,
}

impl fmt::Debug for ColumnDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDef")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullability", &self.nullability)
            .field("role", &self.role)
            .field("adapter", &self.adapter.is_some())
            .finish()
    }
}

impl ColumnDef {
    pub fn name(&self) -> &Ident {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn nullability(&self) -> Nullability {
        self.nullability
    }

    pub fn role(&self) -> &ColumnRole {
        &self.role
    }

    /// Whether an insert may leave this column out.
    pub(crate) fn insert_optional(&self) -> bool {
        self.nullability.is_optional()
            || !matches!(self.role, ColumnRole::Regular)
    }
}

/// Descriptor of a relation: its SQL name and typed columns.
///
/// With-views additionally carry the query they materialize, so using one
/// in FROM or JOIN is enough to emit its CTE.
#[derive(Clone, Debug)]
pub struct Table {
    pub(crate) table_ref: TableRef,
    pub(crate) columns: Arc<Vec<ColumnDef>>,
    pub(crate) cte: Option<Arc<crate::stmt::select::SelectCore>>,
}

impl Table {
    /// Start describing a base table.
    pub fn create(name: &str) -> TableBuilder {
        TableBuilder::new(name, TableKind::Table)
    }

    /// Start describing a read-only view. Views carry the same column API
    /// but are rejected as targets of data-changing statements.
    pub fn create_view(name: &str) -> TableBuilder {
        TableBuilder::new(name, TableKind::View)
    }

    pub(crate) fn from_parts(table_ref: TableRef, columns: Arc<Vec<ColumnDef>>) -> Self {
        Self {
            table_ref,
            columns,
            cte: None,
        }
    }

    pub fn table_ref(&self) -> &TableRef {
        &self.table_ref
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub(crate) fn column_def(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name.as_str() == name)
    }

    /// The typed value of one column. Unknown names poison the value, so
    /// the mistake surfaces when the statement is built, with the table
    /// and column named in the error.
    pub fn col(&self, name: &str) -> Value {
        match self.column_def(name) {
            Some(def) => Value::column(
                &self.table_ref,
                &def.name,
                def.kind,
                def.nullability,
                def.adapter.clone(),
            ),
            None => Value::poison(format!(
                "table '{}' has no column '{name}'",
                self.table_ref.name().as_str()
            )),
        }
    }

    /// A second, independently-named appearance of this relation, for
    /// statements that join it with itself.
    pub fn as_alias(&self, alias: &str) -> QueryResult<Table> {
        let alias = Ident::new(alias)?;
        Ok(Table {
            table_ref: TableRef::new(
                self.table_ref.name.clone(),
                Some(alias),
                self.table_ref.kind,
            ),
            columns: self.columns.clone(),
            cte: self.cte.clone(),
        })
    }

    /// A derivation for use on the nullable side of a LEFT JOIN: every
    /// column, whatever it was declared as, becomes optional.
    pub fn for_use_in_left_join(&self) -> Table {
        self.left_join_derivation(None)
    }

    /// [`for_use_in_left_join`](Self::for_use_in_left_join) with an alias.
    pub fn for_use_in_left_join_as(&self, alias: &str) -> QueryResult<Table> {
        let alias = Ident::new(alias)?;
        Ok(self.left_join_derivation(Some(alias)))
    }

    fn left_join_derivation(&self, alias: Option<Ident>) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| ColumnDef {
                name: c.name.clone(),
                kind: c.kind,
                nullability: Nullability::Optional,
                role: c.role.clone(),
                adapter: c.adapter.clone(),
            })
            .collect();
        Table {
            table_ref: TableRef::new(self.table_ref.name.clone(), alias, self.table_ref.kind),
            columns: Arc::new(columns),
            cte: self.cte.clone(),
        }
    }

    /// The pre-modification row image, referenceable from the RETURNING
    /// projection of UPDATE/DELETE on backends that support it.
    pub fn old_values(&self) -> Table {
        Table {
            table_ref: TableRef::new(self.table_ref.name.clone(), None, TableKind::OldValues),
            columns: self.columns.clone(),
            cte: None,
        }
    }
}

/// Staged construction of a [`Table`]. Errors (bad identifiers, duplicate
/// columns) accumulate and surface from [`build`](TableBuilder::build).
pub struct TableBuilder {
    name: QueryResult<Ident>,
    kind: TableKind,
    columns: Vec<ColumnDef>,
    error: Option<QueryError>,
}

impl TableBuilder {
    fn new(name: &str, kind: TableKind) -> Self {
        Self {
            name: Ident::new(name),
            kind,
            columns: Vec::new(),
            error: None,
        }
    }

    /// A required column.
    pub fn column(self, name: &str, kind: ValueKind) -> Self {
        self.push(name, kind, Nullability::Required, ColumnRole::Regular, None)
    }

    /// A column that may be NULL.
    pub fn optional_column(self, name: &str, kind: ValueKind) -> Self {
        self.push(name, kind, Nullability::Optional, ColumnRole::Regular, None)
    }

    /// A required column with a database-side default; inserts may omit it.
    pub fn column_with_default(self, name: &str, kind: ValueKind) -> Self {
        self.push(name, kind, Nullability::Required, ColumnRole::HasDefault, None)
    }

    /// The database-generated primary key.
    pub fn autogenerated_primary_key(self, name: &str, kind: ValueKind) -> Self {
        self.push(
            name,
            kind,
            Nullability::Required,
            ColumnRole::AutogeneratedPrimaryKey,
            None,
        )
    }

    /// A primary key drawn from the named sequence.
    pub fn primary_key_from_sequence(self, name: &str, kind: ValueKind, sequence: &str) -> Self {
        self.push(
            name,
            kind,
            Nullability::Required,
            ColumnRole::PrimaryKeyFromSequence(sequence.to_string()),
            None,
        )
    }

    /// A virtual column computed from a raw SQL expression per row.
    pub fn computed_column(self, name: &str, kind: ValueKind, expression: &str) -> Self {
        self.push(
            name,
            kind,
            Nullability::Required,
            ColumnRole::Computed(expression.to_string()),
            None,
        )
    }

    /// A required column decoded/encoded through a [`TypeAdapter`].
    pub fn adapted_column(
        self,
        name: &str,
        kind: ValueKind,
        adapter: Arc<dyn TypeAdapter>,
    ) -> Self {
        self.push(
            name,
            kind,
            Nullability::Required,
            ColumnRole::Regular,
            Some(adapter),
        )
    }

    fn push(
        mut self,
        name: &str,
        kind: ValueKind,
        nullability: Nullability,
        role: ColumnRole,
        adapter: Option<Arc<dyn TypeAdapter>>,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let ident = match Ident::new(name) {
            Ok(ident) => ident,
            Err(e) => {
                self.error = Some(e);
                return self;
            }
        };
        if self.columns.iter().any(|c| c.name == ident) {
            self.error = Some(QueryError::validation(format!(
                "duplicate column '{name}'"
            )));
            return self;
        }
        self.columns.push(ColumnDef {
            name: ident,
            kind,
            nullability,
            role,
            adapter,
        });
        self
    }

    pub fn build(self) -> QueryResult<Table> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let name = self.name?;
        if self.columns.is_empty() {
            return Err(QueryError::validation(format!(
                "table '{}' has no columns",
                name.as_str()
            )));
        }
        Ok(Table {
            table_ref: TableRef::new(name, None, self.kind),
            columns: Arc::new(self.columns),
            cte: None,
        })
    }
}

/// Build a with-view descriptor for a query materialized under `name`.
pub(crate) fn with_view(
    name: Ident,
    columns: Vec<(Ident, ValueKind, Nullability)>,
    cte: Option<Arc<crate::stmt::select::SelectCore>>,
) -> Table {
    let columns = columns
        .into_iter()
        .map(|(name, kind, nullability)| ColumnDef {
            name,
            kind,
            nullability,
            role: ColumnRole::Regular,
            adapter: None,
        })
        .collect();
    Table {
        table_ref: TableRef::new(name, None, TableKind::With),
        columns: Arc::new(columns),
        cte,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn company() -> Table {
        Table::create("company")
            .autogenerated_primary_key("id", ValueKind::Int)
            .column("name", ValueKind::String)
            .optional_column("parent_id", ValueKind::Int)
            .build()
            .unwrap()
    }

    #[test]
    fn refs_of_same_table_share_identity() {
        let t = company();
        let a = t.col("id");
        let b = t.col("name");
        assert_eq!(a.referenced_tables(), b.referenced_tables());
    }

    #[test]
    fn alias_is_a_distinct_identity() {
        let t = company();
        let aliased = t.as_alias("parent").unwrap();
        assert_ne!(t.table_ref(), aliased.table_ref());
        assert_eq!(aliased.table_ref().alias().unwrap().as_str(), "parent");
    }

    #[test]
    fn left_join_derivation_widens_every_column() {
        let t = company();
        let lj = t.for_use_in_left_join();
        assert_eq!(lj.col("id").nullability(), Nullability::Optional);
        assert_eq!(lj.col("name").nullability(), Nullability::Optional);
        // the original is untouched
        assert_eq!(t.col("name").nullability(), Nullability::Required);
    }

    #[test]
    fn old_values_derivation() {
        let t = company();
        let old = t.old_values();
        assert_eq!(old.table_ref().kind(), TableKind::OldValues);
        assert_eq!(old.col("name").kind(), ValueKind::String);
    }

    #[test]
    fn duplicate_column_rejected() {
        let r = Table::create("t")
            .column("a", ValueKind::Int)
            .column("a", ValueKind::Int)
            .build();
        assert!(r.is_err());
    }

    #[test]
    fn empty_table_rejected() {
        assert!(Table::create("t").build().is_err());
    }

    #[test]
    fn autogenerated_key_is_insert_optional() {
        let t = company();
        assert!(t.column_def("id").unwrap().insert_optional());
        assert!(!t.column_def("name").unwrap().insert_optional());
    }
}
