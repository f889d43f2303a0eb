//! The SELECT builder chain.
//!
//! `select_from` starts a [`SelectFrom`]; joins and filters accumulate
//! there; [`select`](SelectFrom::select) fixes the projection and moves to
//! [`SelectProjected`], where ordering, pagination, compounds, and the
//! terminals live. A projected select can also stop being a statement and
//! become a value again (inline scalar, EXISTS, inline aggregated array)
//! or a with-view for later FROM/JOIN use.

use crate::compiler::{self, CompiledQuery};
use crate::connection::Connection;
use crate::error::{QueryError, QueryResult};
use crate::ident::Ident;
use crate::row::{Page, Row};
use crate::stmt::OrderByMode;
use crate::stmt::scope::Scope;
use crate::table::{Table, TableKind, TableSet, with_view};
use crate::value::Value;
use crate::value::expr::Expr;
use crate::value::kind::{Nullability, ValueKind};
use crate::value::scalar::TypeAdapter;
use std::fmt;
use std::sync::Arc;

/// Result name used when the projection is a single unnamed column.
pub(crate) const SINGLE_COLUMN_NAME: &str = "result";

/// One projected column.
#[derive(Clone)]
pub(crate) struct ProjEntry {
    pub(crate) name: Ident,
    pub(crate) expr: Expr,
    pub(crate) kind: ValueKind,
    pub(crate) nullability: Nullability,
    pub(crate) adapter: Option<Arc<dyn TypeAdapter>>,
}

impl fmt::Debug for ProjEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("nullability", &self.nullability)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JoinKind {
    Inner,
    Left,
}

/// One FROM entry: a relation, optionally joined to the previous ones.
#[derive(Debug, Clone)]
pub(crate) struct FromItem {
    pub(crate) table: Table,
    pub(crate) join: Option<(JoinKind, Expr)>,
}

#[derive(Debug, Clone)]
pub(crate) struct OrderByEntry {
    pub(crate) name: Ident,
    pub(crate) mode: OrderByMode,
}

/// A compound (UNION family) leg appended to the head query.
#[derive(Debug, Clone)]
pub(crate) struct UnionPart {
    pub(crate) core: Box<SelectCore>,
    pub(crate) all: bool,
}

#[derive(Debug, Clone)]
pub(crate) enum RecursiveKind {
    /// The recursive leg is the head query joined to the accumulated view
    /// on this condition.
    On(Expr),
    /// The recursive leg is an explicitly built query.
    Query(Box<SelectCore>),
}

#[derive(Debug, Clone)]
pub(crate) struct RecursivePart {
    pub(crate) view: Table,
    pub(crate) union_all: bool,
    pub(crate) kind: RecursiveKind,
}

/// A CTE the statement must emit before its own text.
#[derive(Debug, Clone)]
pub(crate) struct CteDef {
    pub(crate) table: Table,
    pub(crate) core: Arc<SelectCore>,
}

/// The complete description of one SELECT, ready for the compiler.
#[derive(Debug, Clone, Default)]
pub(crate) struct SelectCore {
    pub(crate) ctes: Vec<CteDef>,
    pub(crate) from: Vec<FromItem>,
    pub(crate) no_table: bool,
    pub(crate) where_clause: Option<Expr>,
    pub(crate) group_by: Vec<Expr>,
    pub(crate) having: Option<Expr>,
    pub(crate) distinct: bool,
    pub(crate) projection: Vec<ProjEntry>,
    pub(crate) order_by: Vec<OrderByEntry>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) unions: Vec<UnionPart>,
    pub(crate) recursive: Option<RecursivePart>,
    /// Enclosing-statement tables this query actually references.
    pub(crate) outer_refs: TableSet,
}

impl SelectCore {
    /// Whether counting the result rows requires wrapping the query in a
    /// sub-select instead of replacing the projection with COUNT(*).
    pub(crate) fn needs_count_wrap(&self) -> bool {
        self.distinct
            || !self.group_by.is_empty()
            || !self.unions.is_empty()
            || self.recursive.is_some()
            || self.projection.iter().any(|p| p.expr.contains_aggregate())
    }
}

/// First stage: the FROM clause is growing.
pub struct SelectFrom {
    conn: Connection,
    core: SelectCore,
    scope: Scope,
    error: Option<QueryError>,
}

/// A join waiting for its ON condition.
#[must_use = "a join does nothing until .on() provides its condition"]
pub struct SelectJoinOn {
    parent: SelectFrom,
    table: Table,
    kind: JoinKind,
}

/// Second stage: the projection is fixed.
pub struct SelectProjected {
    conn: Connection,
    core: SelectCore,
    scope: Scope,
    error: Option<QueryError>,
}

impl SelectFrom {
    pub(crate) fn new(conn: Connection, table: &Table) -> Self {
        let mut s = Self::no_table(conn);
        s.push_from(table, None);
        s
    }

    pub(crate) fn no_table(conn: Connection) -> Self {
        Self {
            conn,
            core: SelectCore {
                no_table: true,
                ..SelectCore::default()
            },
            scope: Scope::new(),
            error: None,
        }
    }

    pub(crate) fn using(conn: Connection, outer: TableSet) -> Self {
        Self {
            conn,
            core: SelectCore {
                no_table: true,
                ..SelectCore::default()
            },
            scope: Scope::with_outer(outer),
            error: None,
        }
    }

    fn push_from(&mut self, table: &Table, join: Option<(JoinKind, Expr)>) {
        if self.error.is_some() {
            return;
        }
        if table.table_ref().kind() == TableKind::OldValues {
            self.error = Some(QueryError::validation(
                "the old-values derivation is only usable in a RETURNING projection",
            ));
            return;
        }
        if let Some(cte) = &table.cte {
            self.core.ctes.push(CteDef {
                table: table.clone(),
                core: cte.clone(),
            });
        }
        self.scope.add(table.table_ref());
        self.core.no_table = false;
        self.core.from.push(FromItem {
            table: table.clone(),
            join,
        });
    }

    fn accept(&mut self, value: &Value) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.scope.check(value) {
            self.error = Some(e);
            return;
        }
        for t in value.referenced_tables() {
            if !self.scope.known().contains(t) {
                self.core.outer_refs.insert(t.clone());
            }
        }
    }

    /// Add another relation to FROM (a cross product refined by WHERE).
    pub fn from(mut self, table: &Table) -> Self {
        self.push_from(table, None);
        self
    }

    /// Inner join. The returned stage only offers [`on`](SelectJoinOn::on).
    pub fn join(self, table: &Table) -> SelectJoinOn {
        SelectJoinOn {
            parent: self,
            table: table.clone(),
            kind: JoinKind::Inner,
        }
    }

    /// Left outer join. Pass a `for_use_in_left_join` derivation so the
    /// joined columns read as optional.
    pub fn left_join(self, table: &Table) -> SelectJoinOn {
        SelectJoinOn {
            parent: self,
            table: table.clone(),
            kind: JoinKind::Left,
        }
    }

    /// Add a filter. Repeated calls AND together; no-op filters from
    /// `*_if_value` are skipped.
    pub fn where_(mut self, condition: Value) -> Self {
        if condition.is_no_op() {
            return self;
        }
        self.accept(&condition);
        if self.error.is_some() {
            return self;
        }
        if condition.kind() != ValueKind::Boolean {
            self.error = Some(QueryError::composition(format!(
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
        self.accept(&condition);
        if self.error.is_some() {
            return self;
        }
        if condition.kind() != ValueKind::Boolean {
            self.error = Some(QueryError::composition(format!(
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

    /// Fix the projection: one result column per `(name, value)` pair.
    pub fn select(mut self, columns: Vec<(&str, Value)>) -> SelectProjected {
        if self.error.is_none() && columns.is_empty() {
            self.error = Some(QueryError::validation("the projection is empty"));
        }
        let mut projection = Vec::with_capacity(columns.len());
        for (name, value) in columns {
            if self.error.is_some() {
                break;
            }
            let ident = match Ident::new(name) {
                Ok(ident) => ident,
                Err(e) => {
                    self.error = Some(e);
                    break;
                }
            };
            if projection.iter().any(|p: &ProjEntry| p.name == ident) {
                self.error = Some(QueryError::validation(format!(
                    "duplicate result name '{name}'"
                )));
                break;
            }
            self.accept(&value);
            projection.push(ProjEntry {
                name: ident,
                expr: value.expr,
                kind: value.kind,
                nullability: value.nullability,
                adapter: value.adapter,
            });
        }
        self.core.projection = projection;
        SelectProjected {
            conn: self.conn,
            core: self.core,
            scope: self.scope,
            error: self.error,
        }
    }

    /// Fix a single-column projection, named `result`.
    pub fn select_one_column(self, value: Value) -> SelectProjected {
        self.select(vec![(SINGLE_COLUMN_NAME, value)])
    }
}

impl SelectJoinOn {
    /// Provide the join condition and return to the FROM stage.
    pub fn on(self, condition: Value) -> SelectFrom {
        let mut parent = self.parent;
        let kind = self.kind;
        // The joined table enters scope before the condition is checked,
        // so the condition may reference it.
        let table = self.table;
        if parent.error.is_some() {
            return parent;
        }
        let join_expr_slot = parent.core.from.len();
        parent.push_from(&table, Some((kind, Expr::Noop)));
        parent.accept(&condition);
        if parent.error.is_none() && condition.kind() != ValueKind::Boolean {
            parent.error = Some(QueryError::composition(format!(
                "JOIN ... ON requires a boolean, got {:?}",
                condition.kind()
            )));
        }
        if parent.error.is_none() {
            if let Some(item) = parent.core.from.get_mut(join_expr_slot) {
                item.join = Some((kind, condition.expr));
            }
        }
        parent
    }
}

impl SelectProjected {
    fn accept(&mut self, value: &Value) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.scope.check(value) {
            self.error = Some(e);
            return;
        }
        for t in value.referenced_tables() {
            if !self.scope.known().contains(t) {
                self.core.outer_refs.insert(t.clone());
            }
        }
    }

    fn fail(&mut self, error: QueryError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn find_projection(&self, name: &str) -> Option<&ProjEntry> {
        self.core.projection.iter().find(|p| p.name.as_str() == name)
    }

    /// Deduplicate result rows.
    pub fn distinct(mut self) -> Self {
        self.core.distinct = true;
        self
    }

    /// Group by the named result columns. Aggregated projection entries
    /// cannot be grouping keys.
    pub fn group_by(mut self, names: &[&str]) -> Self {
        for name in names {
            let entry = match self.find_projection(name) {
                Some(e) => e.clone(),
                None => {
                    self.fail(QueryError::validation(format!(
                        "group_by references unknown result '{name}'"
                    )));
                    return self;
                }
            };
            if entry.expr.contains_aggregate() {
                self.fail(QueryError::validation(format!(
                    "group_by key '{name}' is an aggregate"
                )));
                return self;
            }
            self.core.group_by.push(entry.expr);
        }
        self
    }

    /// Filter the grouped rows.
    pub fn having(mut self, condition: Value) -> Self {
        if condition.is_no_op() {
            return self;
        }
        self.accept(&condition);
        if self.error.is_some() {
            return self;
        }
        if condition.kind() != ValueKind::Boolean {
            self.fail(QueryError::composition(format!(
                "HAVING requires a boolean, got {:?}",
                condition.kind()
            )));
            return self;
        }
        self.core.having = Some(match self.core.having.take() {
            Some(existing) => Expr::Binary {
                op: crate::value::expr::BinaryOp::And,
                lhs: Box::new(existing),
                rhs: Box::new(condition.expr),
            },
            None => condition.expr,
        });
        self
    }

    /// Order by a named result column.
    pub fn order_by(mut self, name: &str, mode: OrderByMode) -> Self {
        let ident = match self.find_projection(name) {
            Some(e) => e.name.clone(),
            None => {
                self.fail(QueryError::validation(format!(
                    "order_by references unknown result '{name}'"
                )));
                return self;
            }
        };
        self.core.order_by.push(OrderByEntry { name: ident, mode });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.core.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.core.offset = Some(offset);
        self
    }

    fn compound(mut self, other: SelectProjected, all: bool) -> Self {
        if self.error.is_none() {
            if let Some(e) = other.error {
                self.error = Some(e);
                return self;
            }
            if other.core.projection.len() != self.core.projection.len() {
                self.fail(QueryError::validation(format!(
                    "compound legs project {} and {} columns",
                    self.core.projection.len(),
                    other.core.projection.len()
                )));
                return self;
            }
            self.core.outer_refs.extend(other.core.outer_refs.iter().cloned());
            let mut leg = other.core;
            // Flatten: a leg that is itself a compound contributes its
            // own legs in order.
            let nested = std::mem::take(&mut leg.unions);
            self.core.unions.push(UnionPart {
                core: Box::new(leg),
                all,
            });
            self.core.unions.extend(nested);
        }
        self
    }

    /// Append a `UNION` (distinct) leg.
    pub fn union(self, other: SelectProjected) -> Self {
        self.compound(other, false)
    }

    /// Append a `UNION ALL` leg.
    pub fn union_all(self, other: SelectProjected) -> Self {
        self.compound(other, true)
    }

    fn recursive_view(&self) -> Table {
        let columns = self
            .core
            .projection
            .iter()
            .map(|p| (p.name.clone(), p.kind, p.nullability))
            .collect();
        with_view(Ident::plain("recursive_select_1"), columns, None)
    }

    fn recursive_on(
        mut self,
        union_all: bool,
        condition: impl FnOnce(&Table) -> Value,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.core.recursive.is_some() {
            self.fail(QueryError::validation("the query is already recursive"));
            return self;
        }
        let view = self.recursive_view();
        let condition = condition(&view);
        let mut scope = self.scope.clone();
        scope.add(view.table_ref());
        if let Err(e) = scope.check(&condition) {
            self.fail(e);
            return self;
        }
        if condition.kind() != ValueKind::Boolean {
            self.fail(QueryError::composition(format!(
                "recursive join condition must be a boolean, got {:?}",
                condition.kind()
            )));
            return self;
        }
        for t in condition.referenced_tables() {
            if !self.scope.known().contains(t) && t != view.table_ref() {
                self.core.outer_refs.insert(t.clone());
            }
        }
        self.core.recursive = Some(RecursivePart {
            view,
            union_all,
            kind: RecursiveKind::On(condition.expr),
        });
        self
    }

    /// Make the query recursive: the head is the seed, and each round
    /// re-runs the head joined to the rows found so far on `condition`.
    /// The closure receives the accumulated view, whose columns mirror the
    /// projection.
    pub fn recursive_union_all_on(self, condition: impl FnOnce(&Table) -> Value) -> Self {
        self.recursive_on(true, condition)
    }

    /// [`recursive_union_all_on`](Self::recursive_union_all_on) with
    /// duplicate elimination between rounds.
    pub fn recursive_union_on(self, condition: impl FnOnce(&Table) -> Value) -> Self {
        self.recursive_on(false, condition)
    }

    fn recursive_query(mut self, union_all: bool, step: impl FnOnce(&Table) -> SelectProjected) -> Self {
        if self.error.is_some() {
            return self;
        }
        if self.core.recursive.is_some() {
            self.fail(QueryError::validation("the query is already recursive"));
            return self;
        }
        let view = self.recursive_view();
        let step = step(&view);
        if let Some(e) = step.error {
            self.fail(e);
            return self;
        }
        if step.core.projection.len() != self.core.projection.len() {
            self.fail(QueryError::validation(format!(
                "recursive leg projects {} columns, the seed projects {}",
                step.core.projection.len(),
                self.core.projection.len()
            )));
            return self;
        }
        for t in &step.core.outer_refs {
            if t != view.table_ref() {
                self.core.outer_refs.insert(t.clone());
            }
        }
        self.core.recursive = Some(RecursivePart {
            view,
            union_all,
            kind: RecursiveKind::Query(Box::new(step.core)),
        });
        self
    }

    /// Make the query recursive with an explicitly built recursive leg.
    /// The closure receives the accumulated view and must return a query
    /// with the same projection arity.
    pub fn recursive_union_all(self, step: impl FnOnce(&Table) -> SelectProjected) -> Self {
        self.recursive_query(true, step)
    }

    /// [`recursive_union_all`](Self::recursive_union_all) with duplicate
    /// elimination between rounds.
    pub fn recursive_union(self, step: impl FnOnce(&Table) -> SelectProjected) -> Self {
        self.recursive_query(false, step)
    }

    // ─── Back to value land ─────────────────────────────────────────────

    fn finalize(self) -> QueryResult<SelectCore> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.core),
        }
    }

    /// Hand the finished description to another statement family.
    pub(crate) fn into_core(self) -> QueryResult<SelectCore> {
        self.finalize()
    }

    /// Materialize this query as a with-view usable in FROM/JOIN of a
    /// later statement on the same connection.
    pub fn for_use_in_query_as(self, name: &str) -> QueryResult<Table> {
        let name = Ident::new(name)?;
        let core = self.finalize()?;
        let columns = core
            .projection
            .iter()
            .map(|p| (p.name.clone(), p.kind, p.nullability))
            .collect();
        Ok(with_view(name, columns, Some(Arc::new(core))))
    }

    /// Use this one-column query as an inline scalar value of an
    /// enclosing statement. The result is optional: a scalar sub-select
    /// yields NULL when it finds no row.
    pub fn for_use_as_inline_query_value(self) -> Value {
        let core = match self.finalize() {
            Ok(core) => core,
            Err(e) => return Value::poison(e.to_string()),
        };
        if core.projection.len() != 1 {
            return Value::poison(format!(
                "an inline query value must project exactly one column, got {}",
                core.projection.len()
            ));
        }
        let kind = core.projection[0].kind;
        let tables = core.outer_refs.clone();
        Value::from_parts(
            Expr::ScalarSubquery(Box::new(core)),
            kind,
            Nullability::Optional,
            tables,
        )
    }

    /// Collapse this query's whole row set into one JSON-array value of an
    /// enclosing statement.
    pub fn for_use_as_inline_aggregated_array_value(self) -> Value {
        let core = match self.finalize() {
            Ok(core) => core,
            Err(e) => return Value::poison(e.to_string()),
        };
        let tables = core.outer_refs.clone();
        Value::from_parts(
            Expr::InlineAggregatedArray {
                query: Box::new(core),
                empty_as_array: false,
            },
            ValueKind::AggregatedArray,
            Nullability::Optional,
            tables,
        )
    }

    /// Use this query as an `EXISTS` predicate.
    pub fn for_use_as_exists_value(self) -> Value {
        self.exists_value(false)
    }

    /// Use this query as a `NOT EXISTS` predicate.
    pub fn for_use_as_not_exists_value(self) -> Value {
        self.exists_value(true)
    }

    fn exists_value(self, negated: bool) -> Value {
        let core = match self.finalize() {
            Ok(core) => core,
            Err(e) => return Value::poison(e.to_string()),
        };
        let tables = core.outer_refs.clone();
        Value::from_parts(
            Expr::Exists {
                query: Box::new(core),
                negated,
            },
            ValueKind::Boolean,
            Nullability::Required,
            tables,
        )
    }

    // ─── Terminals ──────────────────────────────────────────────────────

    /// Compile without executing. Deterministic: the same statement
    /// compiles to the same SQL and parameter list every time.
    pub fn compile(&self) -> QueryResult<CompiledQuery> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        compiler::compile_select(&self.core, self.conn.dialect())
    }

    fn decode_rows(&self, rows: Vec<Row>) -> QueryResult<Vec<Row>> {
        let adapters: Vec<(&str, &Arc<dyn TypeAdapter>)> = self
            .core
            .projection
            .iter()
            .filter_map(|p| p.adapter.as_ref().map(|a| (p.name.as_str(), a)))
            .collect();
        if adapters.is_empty() {
            return Ok(rows);
        }
        rows.into_iter()
            .map(|row| {
                let mut row = row;
                for (name, adapter) in &adapters {
                    row.adapt_column(name, adapter.as_ref())?;
                }
                Ok(row)
            })
            .collect()
    }

    /// Run the query and return all rows.
    pub async fn execute_select_many(self) -> QueryResult<Vec<Row>> {
        let compiled = self.compile()?;
        let rows = self.conn.run_select_many(&compiled).await?;
        self.decode_rows(rows)
    }

    /// Run the query expecting exactly one row.
    pub async fn execute_select_one(self) -> QueryResult<Row> {
        let mut rows = self.execute_select_many_checked(Some(2)).await?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(QueryError::no_row("the query returned no row")),
            n => Err(QueryError::TooManyRows(n)),
        }
    }

    /// Run the query expecting zero or one row.
    pub async fn execute_select_none_or_one(self) -> QueryResult<Option<Row>> {
        let mut rows = self.execute_select_many_checked(Some(2)).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(Some(rows.remove(0))),
            n => Err(QueryError::TooManyRows(n)),
        }
    }

    async fn execute_select_many_checked(self, probe_limit: Option<u64>) -> QueryResult<Vec<Row>> {
        // The probe limit caps what a miscounted query can drag in while
        // keeping the 2+ rows needed to tell "one" from "many".
        let mut this = self;
        if let (Some(probe), None) = (probe_limit, this.core.limit) {
            this.core.limit = Some(probe);
        }
        let compiled = this.compile()?;
        let rows = this.conn.run_select_many(&compiled).await?;
        this.decode_rows(rows)
    }

    /// Run the query and return one page plus the unpaginated row count.
    pub async fn execute_select_page(self) -> QueryResult<Page> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let count_compiled = compiler::compile_select_count(&self.core, self.conn.dialect())?;
        let data_compiled = compiler::compile_select(&self.core, self.conn.dialect())?;
        let count = self.conn.run_select_count(&count_compiled).await?;
        let rows = self.conn.run_select_many(&data_compiled).await?;
        let data = self.decode_rows(rows)?;
        Ok(Page { count, data })
    }

    /// Run only the count side of [`execute_select_page`](Self::execute_select_page).
    pub async fn execute_select_count(self) -> QueryResult<u64> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let compiled = compiler::compile_select_count(&self.core, self.conn.dialect())?;
        self.conn.run_select_count(&compiled).await
    }
}
