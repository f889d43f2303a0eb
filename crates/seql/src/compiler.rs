//! The query compiler.
//!
//! Statement descriptions compile to one SQL string plus a positional
//! parameter list. Compilation is deterministic and side-effect free: the
//! same description and dialect always produce the same text and the same
//! parameter order, which keeps statements cacheable by their SQL.

use crate::dialect::{ConcatStyle, Dialect};
use crate::error::{QueryError, QueryResult};
use crate::ident::Ident;
use crate::stmt::OrderByMode;
use crate::stmt::delete::DeleteCore;
use crate::stmt::insert::InsertCore;
use crate::stmt::select::{
    CteDef, JoinKind, OrderByEntry, ProjEntry, RecursiveKind, RecursivePart, SelectCore,
};
use crate::stmt::update::UpdateCore;
use crate::table::{ColumnRole, Table, TableKind, TableRef};
use crate::value::expr::{
    AggArrayShape, AggFunc, BinaryOp, Expr, PatternWrap, SqlFunc, TemporalField,
};
use crate::value::scalar::DbValue;

/// A compiled statement: SQL text and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<DbValue>,
}

/// How column references of the statement's target table are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetStyle {
    /// Bare column name (INSERT/UPDATE/DELETE bodies, RETURNING).
    Bare,
    /// `INSERTED.column` (SQL Server OUTPUT, post-change image).
    Inserted,
    /// `DELETED.column` (SQL Server OUTPUT, pre-change image).
    Deleted,
}

struct Emitter {
    dialect: Dialect,
    sql: String,
    params: Vec<DbValue>,
    target: Option<(TableRef, TargetStyle)>,
    allow_old_values: bool,
}

impl Emitter {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
            target: None,
            allow_old_values: false,
        }
    }

    fn finish(self) -> CompiledQuery {
        CompiledQuery {
            sql: self.sql,
            params: self.params,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn ident(&mut self, ident: &Ident) {
        ident.write_sql(&mut self.sql, self.dialect);
    }

    fn param(&mut self, value: DbValue) {
        self.params.push(value);
        let token = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&token);
    }

    /// `name [AS alias]` as it appears in FROM/JOIN.
    fn table_factor(&mut self, table: &Table) -> QueryResult<()> {
        let r = table.table_ref();
        self.ident(r.name());
        if let Some(alias) = r.alias() {
            if self.dialect == Dialect::Oracle {
                self.push(" ");
            } else {
                self.push(" AS ");
            }
            self.ident(alias);
        }
        Ok(())
    }

    fn column_ref(&mut self, table: &TableRef, name: &Ident) -> QueryResult<()> {
        if let Some((target, style)) = self.target.clone() {
            if *table == target {
                match style {
                    TargetStyle::Bare => {}
                    TargetStyle::Inserted => self.push("INSERTED."),
                    TargetStyle::Deleted => self.push("DELETED."),
                }
                self.ident(name);
                return Ok(());
            }
        }
        if table.kind() == TableKind::OldValues {
            if !self.allow_old_values {
                return Err(QueryError::unsupported(format!(
                    "{} cannot reference pre-change values in a returning projection",
                    self.dialect
                )));
            }
            self.push("DELETED.");
            self.ident(name);
            return Ok(());
        }
        self.ident(table.qualifier());
        self.push(".");
        self.ident(name);
        Ok(())
    }

    // ─── Expressions ────────────────────────────────────────────────────

    fn expr(&mut self, expr: &Expr) -> QueryResult<()> {
        match expr {
            Expr::Column { table, name } => self.column_ref(table, name),
            Expr::Const(DbValue::Null) => {
                self.push("NULL");
                Ok(())
            }
            Expr::Const(value) => {
                self.param(value.clone());
                Ok(())
            }
            Expr::BoolLiteral(value) => {
                // Spelled as a trivial comparison; SQL Server has no
                // boolean literals.
                self.push(if *value { "1=1" } else { "1=0" });
                Ok(())
            }
            Expr::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs),
            Expr::Not(inner) => {
                self.push("NOT (");
                self.expr(inner)?;
                self.push(")");
                Ok(())
            }
            Expr::Negate(inner) => {
                self.push("-(");
                self.expr(inner)?;
                self.push(")");
                Ok(())
            }
            Expr::NullCheck { operand, negated } => {
                self.push("(");
                self.expr(operand)?;
                self.push(if *negated { " IS NOT NULL)" } else { " IS NULL)" });
                Ok(())
            }
            Expr::InList {
                operand,
                items,
                negated,
            } => {
                self.push("(");
                self.expr(operand)?;
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.expr(item)?;
                }
                self.push("))");
                Ok(())
            }
            Expr::Between {
                operand,
                low,
                high,
                negated,
            } => {
                self.push("(");
                self.expr(operand)?;
                self.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " });
                self.expr(low)?;
                self.push(" AND ");
                self.expr(high)?;
                self.push(")");
                Ok(())
            }
            Expr::Like {
                operand,
                pattern,
                insensitive,
                negated,
                wrap,
            } => self.like(operand, pattern, *insensitive, *negated, *wrap),
            Expr::Func { func, args } => self.func(*func, args),
            Expr::Extract { field, operand } => self.extract(*field, operand),
            Expr::Aggregate { func, arg } => self.aggregate(*func, arg.as_deref()),
            Expr::AggregateArray { shape } => self.aggregate_array(shape),
            Expr::ScalarSubquery(core) => {
                self.push("(");
                self.select(core)?;
                self.push(")");
                Ok(())
            }
            Expr::Exists { query, negated } => {
                self.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.select(query)?;
                self.push(")");
                Ok(())
            }
            Expr::InlineAggregatedArray {
                query,
                empty_as_array,
            } => self.inline_aggregated_array(query, *empty_as_array),
            Expr::Noop => Err(QueryError::composition(
                "an omitted optional filter escaped into the statement body",
            )),
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> QueryResult<()> {
        if op == BinaryOp::Concat && self.dialect.concat_style() == ConcatStyle::Function {
            self.push("CONCAT(");
            self.expr(lhs)?;
            self.push(", ");
            self.expr(rhs)?;
            self.push(")");
            return Ok(());
        }
        self.push("(");
        self.expr(lhs)?;
        self.push(" ");
        self.push(op.token());
        self.push(" ");
        self.expr(rhs)?;
        self.push(")");
        Ok(())
    }

    fn like(
        &mut self,
        operand: &Expr,
        pattern: &Expr,
        insensitive: bool,
        negated: bool,
        wrap: PatternWrap,
    ) -> QueryResult<()> {
        let fold = insensitive && !self.dialect.supports_ilike();
        self.push("(");
        if fold {
            self.push("LOWER(");
            self.expr(operand)?;
            self.push(")");
        } else {
            self.expr(operand)?;
        }
        let token = match (insensitive && self.dialect.supports_ilike(), negated) {
            (true, false) => " ILIKE ",
            (true, true) => " NOT ILIKE ",
            (false, false) => " LIKE ",
            (false, true) => " NOT LIKE ",
        };
        self.push(token);
        if fold {
            self.push("LOWER(");
            self.pattern(pattern, wrap)?;
            self.push(")");
        } else {
            self.pattern(pattern, wrap)?;
        }
        self.push(")");
        Ok(())
    }

    /// The LIKE pattern with contains/starts/ends wildcards applied.
    /// Constant text patterns wrap at bind time; anything else becomes a
    /// concatenation.
    fn pattern(&mut self, pattern: &Expr, wrap: PatternWrap) -> QueryResult<()> {
        let (before, after) = match wrap {
            PatternWrap::None => return self.expr(pattern),
            PatternWrap::Both => (true, true),
            PatternWrap::Suffix => (false, true),
            PatternWrap::Prefix => (true, false),
        };
        if let Expr::Const(DbValue::Text(text)) = pattern {
            let mut wrapped = String::with_capacity(text.len() + 2);
            if before {
                wrapped.push('%');
            }
            wrapped.push_str(text);
            if after {
                wrapped.push('%');
            }
            self.param(DbValue::Text(wrapped));
            return Ok(());
        }
        match self.dialect.concat_style() {
            ConcatStyle::Function => {
                self.push("CONCAT(");
                if before {
                    self.push("'%', ");
                }
                self.expr(pattern)?;
                if after {
                    self.push(", '%'");
                }
                self.push(")");
            }
            ConcatStyle::Operator => {
                self.push("(");
                if before {
                    self.push("'%' || ");
                }
                self.expr(pattern)?;
                if after {
                    self.push(" || '%'");
                }
                self.push(")");
            }
        }
        Ok(())
    }

    fn func(&mut self, func: SqlFunc, args: &[Expr]) -> QueryResult<()> {
        if func == SqlFunc::CastToString {
            return self.cast_to_string(&args[0]);
        }
        let name = match func {
            SqlFunc::Lower => "LOWER",
            SqlFunc::Upper => "UPPER",
            SqlFunc::Trim => "TRIM",
            SqlFunc::Ltrim => "LTRIM",
            SqlFunc::Rtrim => "RTRIM",
            SqlFunc::Length => match self.dialect {
                Dialect::SqlServer => "LEN",
                _ => "LENGTH",
            },
            SqlFunc::Substr => match self.dialect {
                Dialect::SqlServer => "SUBSTRING",
                _ => "SUBSTR",
            },
            SqlFunc::Replace => "REPLACE",
            SqlFunc::Coalesce => "COALESCE",
            SqlFunc::Abs => "ABS",
            SqlFunc::Ceil => match self.dialect {
                Dialect::SqlServer => "CEILING",
                _ => "CEIL",
            },
            SqlFunc::Floor => "FLOOR",
            SqlFunc::Round => "ROUND",
            SqlFunc::Sin => "SIN",
            SqlFunc::Cos => "COS",
            SqlFunc::Tan => "TAN",
            SqlFunc::Asin => "ASIN",
            SqlFunc::Acos => "ACOS",
            SqlFunc::Atan => "ATAN",
            SqlFunc::CastToString => unreachable!(),
        };
        self.push(name);
        self.push("(");
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(arg)?;
        }
        self.push(")");
        Ok(())
    }

    fn cast_to_string(&mut self, operand: &Expr) -> QueryResult<()> {
        match self.dialect {
            Dialect::Oracle => {
                self.push("TO_CHAR(");
                self.expr(operand)?;
                self.push(")");
            }
            dialect => {
                let sql_type = match dialect {
                    Dialect::MySql | Dialect::MariaDb => "CHAR",
                    Dialect::SqlServer => "NVARCHAR(MAX)",
                    _ => "TEXT",
                };
                self.push("CAST(");
                self.expr(operand)?;
                self.push(" AS ");
                self.push(sql_type);
                self.push(")");
            }
        }
        Ok(())
    }

    fn extract(&mut self, field: TemporalField, operand: &Expr) -> QueryResult<()> {
        use TemporalField::*;
        match self.dialect {
            Dialect::SqlServer => {
                if field == EpochMillis {
                    self.push("DATEDIFF_BIG(millisecond, '1970-01-01', ");
                    self.expr(operand)?;
                    self.push(")");
                    return Ok(());
                }
                let part = match field {
                    Year => "year",
                    Month => "month",
                    Day => "day",
                    DayOfWeek => "weekday",
                    Hours => "hour",
                    Minutes => "minute",
                    Seconds => "second",
                    Milliseconds => "millisecond",
                    EpochMillis => unreachable!(),
                };
                self.push("DATEPART(");
                self.push(part);
                self.push(", ");
                self.expr(operand)?;
                self.push(")");
            }
            Dialect::Sqlite => {
                match field {
                    Milliseconds => {
                        // %f yields SS.SSS
                        self.push("MOD(CAST(strftime('%f', ");
                        self.expr(operand)?;
                        self.push(") * 1000 AS INTEGER), 1000)");
                    }
                    EpochMillis => {
                        self.push("(CAST(strftime('%s', ");
                        self.expr(operand)?;
                        self.push(") AS INTEGER) * 1000)");
                    }
                    _ => {
                        let format = match field {
                            Year => "%Y",
                            Month => "%m",
                            Day => "%d",
                            DayOfWeek => "%w",
                            Hours => "%H",
                            Minutes => "%M",
                            Seconds => "%S",
                            Milliseconds | EpochMillis => unreachable!(),
                        };
                        self.push("CAST(strftime('");
                        self.push(format);
                        self.push("', ");
                        self.expr(operand)?;
                        self.push(") AS INTEGER)");
                    }
                }
            }
            Dialect::MySql | Dialect::MariaDb => match field {
                DayOfWeek => {
                    self.push("DAYOFWEEK(");
                    self.expr(operand)?;
                    self.push(")");
                }
                Milliseconds => {
                    self.push("FLOOR(MICROSECOND(");
                    self.expr(operand)?;
                    self.push(") / 1000)");
                }
                EpochMillis => {
                    self.push("(UNIX_TIMESTAMP(");
                    self.expr(operand)?;
                    self.push(") * 1000)");
                }
                _ => {
                    let part = match field {
                        Year => "YEAR",
                        Month => "MONTH",
                        Day => "DAY",
                        Hours => "HOUR",
                        Minutes => "MINUTE",
                        Seconds => "SECOND",
                        DayOfWeek | Milliseconds | EpochMillis => unreachable!(),
                    };
                    self.push("EXTRACT(");
                    self.push(part);
                    self.push(" FROM ");
                    self.expr(operand)?;
                    self.push(")");
                }
            },
            Dialect::Oracle => match field {
                Milliseconds | EpochMillis => {
                    return Err(QueryError::unsupported(format!(
                        "{} cannot extract {field:?}",
                        self.dialect
                    )));
                }
                DayOfWeek => {
                    self.push("TO_NUMBER(TO_CHAR(");
                    self.expr(operand)?;
                    self.push(", 'D'))");
                }
                _ => {
                    let part = match field {
                        Year => "YEAR",
                        Month => "MONTH",
                        Day => "DAY",
                        Hours => "HOUR",
                        Minutes => "MINUTE",
                        Seconds => "SECOND",
                        DayOfWeek | Milliseconds | EpochMillis => unreachable!(),
                    };
                    self.push("EXTRACT(");
                    self.push(part);
                    self.push(" FROM ");
                    self.expr(operand)?;
                    self.push(")");
                }
            },
            Dialect::PostgreSql => match field {
                EpochMillis => {
                    self.push("CAST(EXTRACT(EPOCH FROM ");
                    self.expr(operand)?;
                    self.push(") * 1000 AS BIGINT)");
                }
                Milliseconds => {
                    // EXTRACT(MILLISECONDS) includes whole seconds
                    self.push("MOD(CAST(EXTRACT(MILLISECONDS FROM ");
                    self.expr(operand)?;
                    self.push(") AS INTEGER), 1000)");
                }
                _ => {
                    let part = match field {
                        Year => "YEAR",
                        Month => "MONTH",
                        Day => "DAY",
                        DayOfWeek => "DOW",
                        Hours => "HOUR",
                        Minutes => "MINUTE",
                        Seconds => "SECOND",
                        Milliseconds | EpochMillis => unreachable!(),
                    };
                    self.push("CAST(EXTRACT(");
                    self.push(part);
                    self.push(" FROM ");
                    self.expr(operand)?;
                    self.push(") AS INTEGER)");
                }
            },
        }
        Ok(())
    }

    fn aggregate(&mut self, func: AggFunc, arg: Option<&Expr>) -> QueryResult<()> {
        match func {
            AggFunc::CountAll => {
                self.push("COUNT(*)");
                return Ok(());
            }
            AggFunc::Count => self.push("COUNT("),
            AggFunc::CountDistinct => self.push("COUNT(DISTINCT "),
            AggFunc::Sum => self.push("SUM("),
            AggFunc::Average => self.push("AVG("),
            AggFunc::Min => self.push("MIN("),
            AggFunc::Max => self.push("MAX("),
        }
        if let Some(arg) = arg {
            self.expr(arg)?;
        }
        self.push(")");
        Ok(())
    }

    fn json_fns(&self) -> QueryResult<(&'static str, &'static str)> {
        match (
            self.dialect.json_array_agg(),
            self.dialect.json_object_fn(),
        ) {
            (Some(agg), Some(obj)) => Ok((agg, obj)),
            _ => Err(QueryError::unsupported(format!(
                "{} cannot aggregate rows into a JSON array",
                self.dialect
            ))),
        }
    }

    /// JSON object key as a single-quoted SQL string, embedded quotes
    /// doubled.
    fn json_key(&mut self, name: &str) {
        self.sql.push('\'');
        for c in name.chars() {
            if c == '\'' {
                self.sql.push('\'');
            }
            self.sql.push(c);
        }
        self.sql.push('\'');
    }

    fn aggregate_array(&mut self, shape: &AggArrayShape) -> QueryResult<()> {
        let (agg, obj) = self.json_fns()?;
        self.push(agg);
        self.push("(");
        match shape {
            AggArrayShape::OneColumn(inner) => self.expr(inner)?,
            AggArrayShape::Columns(columns) => {
                self.push(obj);
                self.push("(");
                for (i, (name, value)) in columns.iter().enumerate() {
                    if i > 0 {
                        self.push(", ");
                    }
                    self.json_key(name);
                    self.push(", ");
                    self.expr(value)?;
                }
                self.push(")");
            }
        }
        self.push(")");
        Ok(())
    }

    fn inline_aggregated_array(
        &mut self,
        query: &SelectCore,
        empty_as_array: bool,
    ) -> QueryResult<()> {
        let (agg, obj) = self.json_fns()?;
        self.push("(SELECT ");
        if empty_as_array {
            self.push("COALESCE(");
        }
        self.push(agg);
        self.push("(");
        let source = Ident::plain("inline_agg_source");
        if query.projection.len() == 1 {
            self.ident(&source);
            self.push(".");
            self.ident(&query.projection[0].name);
        } else {
            self.push(obj);
            self.push("(");
            for (i, entry) in query.projection.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.json_key(entry.name.as_str());
                self.push(", ");
                self.ident(&source);
                self.push(".");
                self.ident(&entry.name);
            }
            self.push(")");
        }
        self.push(")");
        if empty_as_array {
            self.push(", ");
            self.push(self.dialect.empty_json_array());
            self.push(")");
        }
        self.push(" FROM (");
        self.select(query)?;
        self.push(") AS ");
        self.ident(&source);
        self.push(")");
        Ok(())
    }

    // ─── SELECT ─────────────────────────────────────────────────────────

    fn select(&mut self, core: &SelectCore) -> QueryResult<()> {
        if let Some(recursive) = &core.recursive {
            return self.recursive_select(core, recursive);
        }
        self.with_clause(core, false)?;
        self.select_body(core, None)?;
        for union in &core.unions {
            self.push(if union.all { " UNION ALL " } else { " UNION " });
            self.select_body(&union.core, None)?;
        }
        self.order_by_clause(&core.order_by, &core.projection)?;
        self.dialect
            .write_limit_offset(&mut self.sql, core.limit, core.offset);
        Ok(())
    }

    /// The WITH clause covering the head's and every compound leg's
    /// with-views, deduplicated by identity.
    fn with_clause(&mut self, core: &SelectCore, recursive: bool) -> QueryResult<()> {
        let mut ctes: Vec<&CteDef> = Vec::new();
        collect_ctes(core, &mut ctes);
        if ctes.is_empty() && !recursive {
            return Ok(());
        }
        self.push(if recursive {
            self.dialect.recursive_cte_keyword()
        } else {
            "WITH"
        });
        self.push(" ");
        for (i, cte) in ctes.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(cte.table.table_ref().name());
            self.push(" AS (");
            self.select(&cte.core)?;
            self.push(")");
        }
        if recursive && !ctes.is_empty() {
            self.push(", ");
        }
        Ok(())
    }

    fn select_body(
        &mut self,
        core: &SelectCore,
        extra_join: Option<(&Table, &Expr)>,
    ) -> QueryResult<()> {
        self.push("SELECT ");
        if core.distinct {
            self.push("DISTINCT ");
        }
        for (i, entry) in core.projection.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(&entry.expr)?;
            self.push(" AS ");
            self.ident(&entry.name);
        }
        if core.from.is_empty() {
            if self.dialect == Dialect::Oracle {
                self.push(" FROM dual");
            }
        } else {
            self.push(" FROM ");
            for (i, item) in core.from.iter().enumerate() {
                match (&item.join, i) {
                    (None, 0) => {}
                    (None, _) => self.push(", "),
                    (Some((JoinKind::Inner, _)), _) => self.push(" INNER JOIN "),
                    (Some((JoinKind::Left, _)), _) => self.push(" LEFT JOIN "),
                }
                self.table_factor(&item.table)?;
                if let Some((_, on)) = &item.join {
                    self.push(" ON ");
                    self.expr(on)?;
                }
            }
            if let Some((table, on)) = extra_join {
                self.push(" INNER JOIN ");
                self.table_factor(table)?;
                self.push(" ON ");
                self.expr(on)?;
            }
        }
        if let Some(where_clause) = &core.where_clause {
            self.push(" WHERE ");
            self.expr(where_clause)?;
        }
        let group_by = effective_group_by(core)?;
        if !group_by.is_empty() {
            self.push(" GROUP BY ");
            for (i, key) in group_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(key)?;
            }
        }
        if let Some(having) = &core.having {
            self.push(" HAVING ");
            self.expr(having)?;
        }
        Ok(())
    }

    fn recursive_select(
        &mut self,
        core: &SelectCore,
        recursive: &RecursivePart,
    ) -> QueryResult<()> {
        if !core.outer_refs.is_empty() && !self.dialect.supports_correlated_recursive_cte() {
            return Err(QueryError::unsupported(format!(
                "{} cannot correlate a recursive query with an enclosing statement",
                self.dialect
            )));
        }
        self.with_clause(core, true)?;
        let view = &recursive.view;
        self.ident(view.table_ref().name());
        self.push("(");
        for (i, column) in view.columns().iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(column.name());
        }
        self.push(") AS (");
        self.select_body(core, None)?;
        self.push(if recursive.union_all {
            " UNION ALL "
        } else {
            " UNION "
        });
        match &recursive.kind {
            RecursiveKind::On(condition) => {
                // The seed's filter selects the roots; the recursive step
                // follows the join condition alone.
                let mut step = core.clone();
                step.where_clause = None;
                self.select_body(&step, Some((view, condition)))?;
            }
            RecursiveKind::Query(step) => {
                self.select_body(step, None)?;
            }
        }
        self.push(") SELECT ");
        for (i, column) in view.columns().iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(column.name());
        }
        self.push(" FROM ");
        self.ident(view.table_ref().name());
        self.order_by_clause(&core.order_by, &core.projection)?;
        self.dialect
            .write_limit_offset(&mut self.sql, core.limit, core.offset);
        Ok(())
    }

    fn order_by_clause(
        &mut self,
        order_by: &[OrderByEntry],
        projection: &[ProjEntry],
    ) -> QueryResult<()> {
        if order_by.is_empty() {
            return Ok(());
        }
        self.push(" ORDER BY ");
        for (i, entry) in order_by.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.order_by_entry(entry, projection)?;
        }
        Ok(())
    }

    fn order_by_entry(
        &mut self,
        entry: &OrderByEntry,
        projection: &[ProjEntry],
    ) -> QueryResult<()> {
        use OrderByMode::*;
        let projected = projection.iter().find(|p| p.name == entry.name);
        let nulls_native = matches!(
            self.dialect,
            Dialect::PostgreSql | Dialect::Sqlite | Dialect::Oracle
        );
        let (descending, nulls) = match entry.mode {
            Asc | AscInsensitive => (false, None),
            Desc | DescInsensitive => (true, None),
            AscNullsFirst => (false, Some(true)),
            AscNullsLast => (false, Some(false)),
            DescNullsFirst => (true, Some(true)),
            DescNullsLast => (true, Some(false)),
        };
        if let (Some(nulls_first), false) = (nulls, nulls_native) {
            // No NULLS FIRST/LAST here: sort on an is-null key first
            if let Some(projected) = projected {
                self.push("CASE WHEN ");
                self.expr(&projected.expr)?;
                self.push(if nulls_first {
                    " IS NULL THEN 0 ELSE 1 END, "
                } else {
                    " IS NULL THEN 1 ELSE 0 END, "
                });
            }
        }
        match (entry.mode, projected) {
            (AscInsensitive | DescInsensitive, Some(projected)) => {
                self.push("LOWER(");
                self.expr(&projected.expr)?;
                self.push(")");
            }
            _ => self.ident(&entry.name),
        }
        self.push(if descending { " DESC" } else { " ASC" });
        if let (Some(nulls_first), true) = (nulls, nulls_native) {
            self.push(if nulls_first {
                " NULLS FIRST"
            } else {
                " NULLS LAST"
            });
        }
        Ok(())
    }

    // ─── Data-changing statements ───────────────────────────────────────

    fn returning_clause(&mut self, target: &TableRef, returning: &[ProjEntry]) -> QueryResult<()> {
        self.push(" RETURNING ");
        self.target = Some((target.clone(), TargetStyle::Bare));
        for (i, entry) in returning.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(&entry.expr)?;
            self.push(" AS ");
            self.ident(&entry.name);
        }
        self.target = None;
        Ok(())
    }

    fn output_clause(
        &mut self,
        target: &TableRef,
        style: TargetStyle,
        returning: &[ProjEntry],
    ) -> QueryResult<()> {
        self.push(" OUTPUT ");
        self.target = Some((target.clone(), style));
        self.allow_old_values = true;
        for (i, entry) in returning.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(&entry.expr)?;
            self.push(" AS ");
            self.ident(&entry.name);
        }
        self.target = None;
        self.allow_old_values = false;
        Ok(())
    }
}

fn collect_ctes<'a>(core: &'a SelectCore, out: &mut Vec<&'a CteDef>) {
    for cte in &core.ctes {
        if !out
            .iter()
            .any(|c| c.table.table_ref() == cte.table.table_ref())
        {
            out.push(cte);
        }
    }
    for union in &core.unions {
        collect_ctes(&union.core, out);
    }
}

/// The explicit grouping keys. A projection mixing aggregated and plain
/// values must name its grouping keys itself; guessing them would change
/// the query's row set silently.
fn effective_group_by(core: &SelectCore) -> QueryResult<Vec<Expr>> {
    if !core.group_by.is_empty() {
        return Ok(core.group_by.clone());
    }
    let has_aggregate = core
        .projection
        .iter()
        .any(|p| p.expr.contains_aggregate());
    let has_plain = core
        .projection
        .iter()
        .any(|p| !p.expr.contains_aggregate());
    if has_aggregate && has_plain {
        return Err(QueryError::validation(
            "the projection mixes aggregated and plain values; group_by is required",
        ));
    }
    Ok(Vec::new())
}

pub(crate) fn compile_select(core: &SelectCore, dialect: Dialect) -> QueryResult<CompiledQuery> {
    let mut emitter = Emitter::new(dialect);
    emitter.select(core)?;
    Ok(emitter.finish())
}

/// The count side of pagination: the number of rows the same query would
/// produce without LIMIT/OFFSET.
pub(crate) fn compile_select_count(
    core: &SelectCore,
    dialect: Dialect,
) -> QueryResult<CompiledQuery> {
    let mut emitter = Emitter::new(dialect);
    if core.needs_count_wrap() {
        let mut inner = core.clone();
        inner.order_by.clear();
        inner.limit = None;
        inner.offset = None;
        emitter.push("SELECT COUNT(*) AS ");
        emitter.ident(&Ident::plain("result"));
        emitter.push(" FROM (");
        emitter.select(&inner)?;
        emitter.push(if dialect == Dialect::Oracle {
            ") count_source"
        } else {
            ") AS count_source"
        });
    } else {
        let mut inner = core.clone();
        inner.order_by.clear();
        inner.limit = None;
        inner.offset = None;
        inner.projection = vec![ProjEntry {
            name: Ident::plain("result"),
            expr: Expr::Aggregate {
                func: AggFunc::CountAll,
                arg: None,
            },
            kind: crate::value::kind::ValueKind::Int,
            nullability: crate::value::kind::Nullability::Required,
            adapter: None,
        }];
        emitter.select(&inner)?;
    }
    Ok(emitter.finish())
}

pub(crate) fn compile_insert(core: &InsertCore, dialect: Dialect) -> QueryResult<CompiledQuery> {
    let mut emitter = Emitter::new(dialect);
    let target = core.table.table_ref().clone();
    emitter.push("INSERT INTO ");
    emitter.ident(target.name());
    emitter.target = Some((target.clone(), TargetStyle::Bare));

    // Sequence-backed keys are filled in when the insert omits them.
    let mut seq_columns: Vec<(&Ident, &str)> = Vec::new();
    if !core.default_values && matches!(dialect, Dialect::PostgreSql | Dialect::Oracle) {
        for def in core.table.columns() {
            if let ColumnRole::PrimaryKeyFromSequence(sequence) = def.role() {
                if !core.columns.iter().any(|c| c == def.name()) {
                    seq_columns.push((def.name(), sequence));
                }
            }
        }
    }

    let returning = returning_with_key(core);
    if core.default_values {
        match dialect {
            Dialect::MySql | Dialect::MariaDb => emitter.push(" () VALUES ()"),
            Dialect::Oracle => {
                return Err(QueryError::unsupported(
                    "oracle cannot insert an all-defaults row",
                ));
            }
            Dialect::SqlServer => {
                if !returning.is_empty() {
                    emitter.output_clause(&target, TargetStyle::Inserted, &returning)?;
                }
                emitter.push(" DEFAULT VALUES");
            }
            _ => emitter.push(" DEFAULT VALUES"),
        }
        if !returning.is_empty() && dialect != Dialect::SqlServer {
            emit_insert_returning(&mut emitter, dialect, &target, &returning)?;
        }
        emitter.target = None;
        return Ok(emitter.finish());
    }

    emitter.push(" (");
    for (i, column) in core.columns.iter().enumerate() {
        if i > 0 {
            emitter.push(", ");
        }
        emitter.ident(column);
    }
    for (i, (name, _)) in seq_columns.iter().enumerate() {
        if !core.columns.is_empty() || i > 0 {
            emitter.push(", ");
        }
        emitter.ident(name);
    }
    emitter.push(")");

    if dialect == Dialect::SqlServer && !returning.is_empty() {
        emitter.output_clause(&target, TargetStyle::Inserted, &returning)?;
        emitter.target = Some((target.clone(), TargetStyle::Bare));
    }

    if let Some(from_select) = &core.from_select {
        emitter.push(" ");
        emitter.select(from_select)?;
    } else {
        emitter.push(" VALUES ");
        for (i, row) in core.rows.iter().enumerate() {
            if i > 0 {
                emitter.push(", ");
            }
            emitter.push("(");
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    emitter.push(", ");
                }
                emitter.expr(value)?;
            }
            for (k, (_, sequence)) in seq_columns.iter().enumerate() {
                if !row.is_empty() || k > 0 {
                    emitter.push(", ");
                }
                match dialect {
                    Dialect::Oracle => {
                        emitter.push(sequence);
                        emitter.push(".NEXTVAL");
                    }
                    _ => {
                        emitter.push("nextval('");
                        emitter.push(sequence);
                        emitter.push("')");
                    }
                }
            }
            emitter.push(")");
        }
    }

    if !returning.is_empty() && dialect != Dialect::SqlServer {
        emit_insert_returning(&mut emitter, dialect, &target, &returning)?;
    }
    emitter.target = None;
    Ok(emitter.finish())
}

/// The effective RETURNING projection of an insert: the explicit one, or
/// a synthesized projection of the generated key for the id terminals.
fn returning_with_key(core: &InsertCore) -> Vec<ProjEntry> {
    if !core.returning.is_empty() {
        return core.returning.clone();
    }
    match &core.generated_key {
        Some(key) => vec![ProjEntry {
            name: key.clone(),
            expr: Expr::Column {
                table: core.table.table_ref().clone(),
                name: key.clone(),
            },
            kind: crate::value::kind::ValueKind::Int,
            nullability: crate::value::kind::Nullability::Required,
            adapter: None,
        }],
        None => Vec::new(),
    }
}

fn emit_insert_returning(
    emitter: &mut Emitter,
    dialect: Dialect,
    target: &TableRef,
    returning: &[ProjEntry],
) -> QueryResult<()> {
    if dialect.supports_returning() {
        emitter.returning_clause(target, returning)?;
    }
    // Dialects without RETURNING fall back to the execution adapter's
    // generated-key channel (e.g. LAST_INSERT_ID on MySQL).
    Ok(())
}

pub(crate) fn compile_update(core: &UpdateCore, dialect: Dialect) -> QueryResult<CompiledQuery> {
    if !core.old_refs.is_empty() && !dialect.supports_old_values_in_returning() {
        return Err(QueryError::unsupported(format!(
            "{dialect} cannot reference pre-update values in a returning projection"
        )));
    }
    let multi_table = !core.from_tables.is_empty();
    if multi_table && !dialect.supports_update_from() {
        return Err(QueryError::unsupported(format!(
            "{dialect} cannot update from another table"
        )));
    }
    let mysql_style = multi_table && matches!(dialect, Dialect::MySql | Dialect::MariaDb);
    let mut emitter = Emitter::new(dialect);
    let target = core.table.table_ref().clone();
    // With a second table in play, bare target columns turn ambiguous,
    // so everything stays qualified.
    if !multi_table {
        emitter.target = Some((target.clone(), TargetStyle::Bare));
    }
    emitter.push("UPDATE ");
    emitter.ident(target.name());
    if mysql_style {
        for table in &core.from_tables {
            emitter.push(", ");
            emitter.table_factor(table)?;
        }
    }
    emitter.push(" SET ");
    for (i, (column, value)) in core.sets.iter().enumerate() {
        if i > 0 {
            emitter.push(", ");
        }
        if mysql_style {
            emitter.ident(target.qualifier());
            emitter.push(".");
        }
        emitter.ident(column);
        emitter.push(" = ");
        emitter.expr(value)?;
    }
    if dialect == Dialect::SqlServer && !core.returning.is_empty() {
        emitter.output_clause(&target, TargetStyle::Inserted, &core.returning)?;
        if !multi_table {
            emitter.target = Some((target.clone(), TargetStyle::Bare));
        }
    }
    if multi_table && !mysql_style {
        emitter.push(" FROM ");
        for (i, table) in core.from_tables.iter().enumerate() {
            if i > 0 {
                emitter.push(", ");
            }
            emitter.table_factor(table)?;
        }
    }
    if let Some(where_clause) = &core.where_clause {
        emitter.push(" WHERE ");
        emitter.expr(where_clause)?;
    }
    if dialect != Dialect::SqlServer && !core.returning.is_empty() && dialect.supports_returning() {
        emitter.returning_clause(&target, &core.returning)?;
    }
    emitter.target = None;
    Ok(emitter.finish())
}

pub(crate) fn compile_delete(core: &DeleteCore, dialect: Dialect) -> QueryResult<CompiledQuery> {
    let multi_table = !core.using_tables.is_empty();
    if multi_table && !dialect.supports_delete_using() {
        return Err(QueryError::unsupported(format!(
            "{dialect} cannot delete using another table"
        )));
    }
    let mut emitter = Emitter::new(dialect);
    let target = core.table.table_ref().clone();
    if !multi_table {
        emitter.target = Some((target.clone(), TargetStyle::Bare));
    }
    emitter.push("DELETE FROM ");
    emitter.ident(target.name());
    if dialect == Dialect::SqlServer && !core.returning.is_empty() {
        // Deleted rows only have a pre-change image
        emitter.output_clause(&target, TargetStyle::Deleted, &core.returning)?;
        emitter.target = Some((target.clone(), TargetStyle::Bare));
    }
    if multi_table {
        emitter.push(" USING ");
        // MySQL wants the target named in the USING list as well
        if matches!(dialect, Dialect::MySql | Dialect::MariaDb) {
            emitter.ident(target.name());
            emitter.push(", ");
        }
        for (i, table) in core.using_tables.iter().enumerate() {
            if i > 0 {
                emitter.push(", ");
            }
            emitter.table_factor(table)?;
        }
    }
    if let Some(where_clause) = &core.where_clause {
        emitter.push(" WHERE ");
        emitter.expr(where_clause)?;
    }
    if dialect != Dialect::SqlServer && !core.returning.is_empty() && dialect.supports_returning() {
        emitter.returning_clause(&target, &core.returning)?;
    }
    emitter.target = None;
    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;
    use crate::value::kind::ValueKind;

    fn emitter(dialect: Dialect) -> Emitter {
        Emitter::new(dialect)
    }

    fn customer() -> Table {
        Table::create("customer")
            .column("id", ValueKind::Int)
            .column("first_name", ValueKind::String)
            .build()
            .unwrap()
    }

    #[test]
    fn column_qualified_by_table_name() {
        let t = customer();
        let v = t.col("id").equals(10);
        let mut em = emitter(Dialect::PostgreSql);
        em.expr(&v.expr).unwrap();
        assert_eq!(em.sql, "(customer.id = $1)");
        assert_eq!(em.params, vec![DbValue::Int(10)]);
    }

    #[test]
    fn alias_qualifies_columns() {
        let t = customer().as_alias("c").unwrap();
        let v = t.col("id").is_null();
        let mut em = emitter(Dialect::PostgreSql);
        em.expr(&v.expr).unwrap();
        assert_eq!(em.sql, "(c.id IS NULL)");
    }

    #[test]
    fn contains_wraps_constant_pattern_at_bind_time() {
        let t = customer();
        let v = t.col("first_name").contains("smith");
        let mut em = emitter(Dialect::PostgreSql);
        em.expr(&v.expr).unwrap();
        assert_eq!(em.sql, "(customer.first_name LIKE $1)");
        assert_eq!(em.params, vec![DbValue::Text("%smith%".into())]);
    }

    #[test]
    fn insensitive_contains_uses_ilike_on_postgres() {
        let t = customer();
        let v = t.col("first_name").contains_insensitive("smith");
        let mut em = emitter(Dialect::PostgreSql);
        em.expr(&v.expr).unwrap();
        assert_eq!(em.sql, "(customer.first_name ILIKE $1)");
    }

    #[test]
    fn insensitive_contains_folds_on_sqlite() {
        let t = customer();
        let v = t.col("first_name").contains_insensitive("smith");
        let mut em = emitter(Dialect::Sqlite);
        em.expr(&v.expr).unwrap();
        assert_eq!(em.sql, "(LOWER(customer.first_name) LIKE LOWER(?))");
        assert_eq!(em.params, vec![DbValue::Text("%smith%".into())]);
    }

    #[test]
    fn concat_is_a_function_on_mysql() {
        let t = customer();
        let v = t.col("first_name").concat(" x");
        let mut em = emitter(Dialect::MySql);
        em.expr(&v.expr).unwrap();
        assert_eq!(em.sql, "CONCAT(customer.first_name, ?)");
    }

    #[test]
    fn empty_in_list_is_inline_false() {
        let t = customer();
        let v = t.col("id").is_in(Vec::<i64>::new());
        let mut em = emitter(Dialect::PostgreSql);
        em.expr(&v.expr).unwrap();
        assert_eq!(em.sql, "1=0");
        assert!(em.params.is_empty());
    }

    #[test]
    fn params_number_sequentially() {
        let t = customer();
        let v = t.col("id").equals(1).and(t.col("first_name").equals("a"));
        let mut em = emitter(Dialect::PostgreSql);
        em.expr(&v.expr).unwrap();
        assert_eq!(em.sql, "((customer.id = $1) AND (customer.first_name = $2))");
        assert_eq!(
            em.params,
            vec![DbValue::Int(1), DbValue::Text("a".into())]
        );
    }

    #[test]
    fn noop_in_statement_body_is_an_error() {
        let mut em = emitter(Dialect::PostgreSql);
        assert!(em.expr(&Expr::Noop).is_err());
    }
}
