//! The closed expression tree behind [`Value`](crate::Value).
//!
//! A small set of tagged variants replaces the per-overload explosion of
//! typed wrappers: the typed layer lives in `Value` (kind × nullability ×
//! table set), while this tree only records structure for the compiler.

use crate::stmt::select::SelectCore;
use crate::table::TableRef;
use crate::value::scalar::DbValue;
use crate::ident::Ident;

/// Expression node.
#[derive(Clone, Debug)]
pub(crate) enum Expr {
    /// A column of a table, view, or with-view.
    Column { table: TableRef, name: Ident },
    /// A literal bound as a positional parameter.
    Const(DbValue),
    /// A boolean literal emitted inline (`1=1` / `1=0`), used where a
    /// parameterized boolean would not be portable.
    BoolLiteral(bool),
    /// Binary operation.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Logical negation.
    Not(Box<Expr>),
    /// Arithmetic negation.
    Negate(Box<Expr>),
    /// `IS NULL` / `IS NOT NULL`.
    NullCheck { operand: Box<Expr>, negated: bool },
    /// `IN (...)` / `NOT IN (...)`.
    InList {
        operand: Box<Expr>,
        items: Vec<Expr>,
        negated: bool,
    },
    /// `BETWEEN low AND high`.
    Between {
        operand: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    /// Pattern test. `wrap` adds wildcards around the pattern at emission
    /// so `contains`/`starts_with`/`ends_with` bind the raw needle.
    Like {
        operand: Box<Expr>,
        pattern: Box<Expr>,
        insensitive: bool,
        negated: bool,
        wrap: PatternWrap,
    },
    /// Scalar SQL function call.
    Func { func: SqlFunc, args: Vec<Expr> },
    /// Temporal field extraction.
    Extract {
        field: TemporalField,
        operand: Box<Expr>,
    },
    /// Aggregate function over the grouped rows.
    Aggregate {
        func: AggFunc,
        arg: Option<Box<Expr>>,
    },
    /// JSON array aggregation over the grouped rows.
    AggregateArray { shape: AggArrayShape },
    /// A sub-select used as a scalar value.
    ScalarSubquery(Box<SelectCore>),
    /// `EXISTS (...)` / `NOT EXISTS (...)`.
    Exists { query: Box<SelectCore>, negated: bool },
    /// A sub-select whose whole row set becomes one JSON array value.
    InlineAggregatedArray {
        query: Box<SelectCore>,
        empty_as_array: bool,
    },
    /// An omitted optional filter. Treated as always-true and skipped by
    /// WHERE/HAVING assembly; identity element for `and`/`or`.
    Noop,
}

/// Wildcard placement applied to a LIKE pattern at emission time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PatternWrap {
    None,
    /// `'%' || pattern || '%'`
    Both,
    /// `pattern || '%'`
    Suffix,
    /// `'%' || pattern`
    Prefix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Concat,
}

impl BinaryOp {
    /// Plain operator token, where one exists for every dialect.
    pub(crate) fn token(self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Concat => "||",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SqlFunc {
    Lower,
    Upper,
    Trim,
    Ltrim,
    Rtrim,
    Length,
    Substr,
    Replace,
    Coalesce,
    Abs,
    Ceil,
    Floor,
    Round,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    CastToString,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TemporalField {
    Year,
    Month,
    Day,
    DayOfWeek,
    Hours,
    Minutes,
    Seconds,
    Milliseconds,
    EpochMillis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AggFunc {
    CountAll,
    Count,
    CountDistinct,
    Sum,
    Average,
    Min,
    Max,
}

/// Shape of a JSON array aggregation.
#[derive(Clone, Debug)]
pub(crate) enum AggArrayShape {
    /// One JSON object per row, keyed by result names.
    Columns(Vec<(String, Expr)>),
    /// One plain scalar per row.
    OneColumn(Box<Expr>),
}

impl Expr {
    /// Whether this node or any descendant is an aggregate.
    ///
    /// Sub-selects are opaque: aggregates inside them belong to the inner
    /// statement and do not force a GROUP BY on the outer one.
    pub(crate) fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } | Expr::AggregateArray { .. } => true,
            Expr::Column { .. }
            | Expr::Const(_)
            | Expr::BoolLiteral(_)
            | Expr::Noop
            | Expr::ScalarSubquery(_)
            | Expr::Exists { .. }
            | Expr::InlineAggregatedArray { .. } => false,
            Expr::Binary { lhs, rhs, .. } => lhs.contains_aggregate() || rhs.contains_aggregate(),
            Expr::Not(e) | Expr::Negate(e) => e.contains_aggregate(),
            Expr::NullCheck { operand, .. } => operand.contains_aggregate(),
            Expr::InList { operand, items, .. } => {
                operand.contains_aggregate() || items.iter().any(Expr::contains_aggregate)
            }
            Expr::Between {
                operand, low, high, ..
            } => {
                operand.contains_aggregate()
                    || low.contains_aggregate()
                    || high.contains_aggregate()
            }
            Expr::Like {
                operand, pattern, ..
            } => operand.contains_aggregate() || pattern.contains_aggregate(),
            Expr::Func { args, .. } => args.iter().any(Expr::contains_aggregate),
            Expr::Extract { operand, .. } => operand.contains_aggregate(),
        }
    }

    pub(crate) fn is_noop(&self) -> bool {
        matches!(self, Expr::Noop)
    }
}
