//! The typed value model.
//!
//! A [`Value`] represents "a thing that produces a scalar when the query
//! runs": a column, a literal, a computed expression, an aggregate, or a
//! scalar sub-select. Every transformation returns a *new* `Value` whose
//! kind and nullability are a pure function of the inputs and the
//! operation's promotion rule (see [`kind`]), and whose referenced-table
//! set is the union of the operands' sets.
//!
//! Kind mismatches do not panic and are never silently dropped: they
//! poison the value, and the first poison in a chain surfaces as a
//! [`QueryError::Composition`](crate::QueryError) when the enclosing
//! statement is built.

pub(crate) mod expr;
pub mod kind;
pub mod scalar;

use crate::ident::Ident;
use crate::table::{TableRef, TableSet};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use expr::{AggArrayShape, AggFunc, BinaryOp, Expr, PatternWrap, SqlFunc, TemporalField};
use kind::{ArithOp, Nullability, ValueKind, arithmetic_result, equality_compatible, ordering_compatible};
use scalar::{DbValue, TypeAdapter};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A typed, composable scalar expression.
#[derive(Clone)]
pub struct Value {
    pub(crate) expr: Expr,
    pub(crate) kind: ValueKind,
    pub(crate) nullability: Nullability,
    pub(crate) tables: TableSet,
    pub(crate) adapter: Option<Arc<dyn TypeAdapter>>,
    pub(crate) error: Option<String>,
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("expr", &self.expr)
            .field("kind", &self.kind)
            .field("nullability", &self.nullability)
            .field("tables", &self.tables)
            .field("adapter", &self.adapter.is_some())
            .field("error", &self.error)
            .finish()
    }
}

/// Conversion of Rust literals (and values) into operand [`Value`]s.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl Value {
    // ─── Construction ───────────────────────────────────────────────────

    pub(crate) fn column(
        table: &TableRef,
        name: &Ident,
        kind: ValueKind,
        nullability: Nullability,
        adapter: Option<Arc<dyn TypeAdapter>>,
    ) -> Self {
        let mut tables = TableSet::new();
        tables.insert(table.clone());
        Self {
            expr: Expr::Column {
                table: table.clone(),
                name: name.clone(),
            },
            kind,
            nullability,
            tables,
            adapter,
            error: None,
        }
    }

    pub(crate) fn constant(value: DbValue, kind: ValueKind) -> Self {
        Self {
            expr: Expr::Const(value),
            kind,
            nullability: Nullability::Required,
            tables: TableSet::new(),
            adapter: None,
            error: None,
        }
    }

    /// A NULL literal of the given kind.
    pub fn null(kind: ValueKind) -> Self {
        Self {
            expr: Expr::Const(DbValue::Null),
            kind,
            nullability: Nullability::Optional,
            tables: TableSet::new(),
            adapter: None,
            error: None,
        }
    }

    /// A constant with an explicitly declared kind, for kinds that cannot
    /// be inferred from the Rust literal (e.g. `StringInt`).
    pub fn constant_of_kind(value: DbValue, kind: ValueKind) -> Self {
        Self::constant(value, kind)
    }

    pub(crate) fn poison(message: impl Into<String>) -> Self {
        Self {
            expr: Expr::Noop,
            kind: ValueKind::Boolean,
            nullability: Nullability::Required,
            tables: TableSet::new(),
            adapter: None,
            error: Some(message.into()),
        }
    }

    /// The always-true/omitted predicate produced by `*_if_value` with an
    /// absent operand.
    pub(crate) fn no_op_predicate() -> Self {
        Self {
            expr: Expr::Noop,
            kind: ValueKind::Boolean,
            nullability: Nullability::Required,
            tables: TableSet::new(),
            adapter: None,
            error: None,
        }
    }

    pub(crate) fn from_parts(
        expr: Expr,
        kind: ValueKind,
        nullability: Nullability,
        tables: TableSet,
    ) -> Self {
        Self {
            expr,
            kind,
            nullability,
            tables,
            adapter: None,
            error: None,
        }
    }

    // ─── Inspection ─────────────────────────────────────────────────────

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn nullability(&self) -> Nullability {
        self.nullability
    }

    /// The set of tables/views this value depends on.
    pub fn referenced_tables(&self) -> &TableSet {
        &self.tables
    }

    /// Composition error accumulated along the chain, if any.
    pub fn composition_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether this is an omitted optional filter.
    pub fn is_no_op(&self) -> bool {
        self.error.is_none() && self.expr.is_noop()
    }

    /// Attach a type adapter applied when binding constants compared
    /// against this value and when decoding its result cells.
    pub fn with_adapter(mut self, adapter: Arc<dyn TypeAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    // ─── Internal combination helpers ───────────────────────────────────

    fn first_error(&self, other: &Value) -> Option<String> {
        self.error.clone().or_else(|| other.error.clone())
    }

    fn union_tables(&self, other: &Value) -> TableSet {
        let mut tables = self.tables.clone();
        tables.extend(other.tables.iter().cloned());
        tables
    }

    fn derive(self, expr: Expr, kind: ValueKind, nullability: Nullability) -> Value {
        Value {
            expr,
            kind,
            nullability,
            tables: self.tables,
            adapter: None,
            error: self.error,
        }
    }

    fn comparison(self, other: Value, op: BinaryOp) -> Value {
        let error = self.first_error(&other).or_else(|| {
            let compatible = match op {
                BinaryOp::Eq | BinaryOp::Ne => equality_compatible(self.kind, other.kind),
                _ => ordering_compatible(self.kind, other.kind),
            };
            if compatible {
                None
            } else {
                Some(format!(
                    "cannot compare {:?} with {:?}",
                    self.kind, other.kind
                ))
            }
        });
        let nullability = self.nullability.combine(other.nullability);
        // A constant compared against an adapted column goes through the
        // column's adapter when bound. The boolean result itself is not
        // adapted.
        let adapter = self.adapter.clone().or_else(|| other.adapter.clone());
        let (rhs, error) = adapt_const(other.expr.clone(), adapter.as_deref(), error);
        Value {
            expr: Expr::Binary {
                op,
                lhs: Box::new(self.expr.clone()),
                rhs: Box::new(rhs),
            },
            kind: ValueKind::Boolean,
            nullability,
            tables: self.union_tables(&other),
            adapter: None,
            error,
        }
    }

    fn arithmetic(self, other: Value, op: ArithOp, token: BinaryOp) -> Value {
        let error = self.first_error(&other);
        let (kind, error) = match arithmetic_result(op, self.kind, other.kind) {
            Some(kind) => (kind, error),
            None => (
                self.kind,
                error.or_else(|| {
                    Some(format!(
                        "cannot apply {op:?} to {:?} and {:?}",
                        self.kind, other.kind
                    ))
                }),
            ),
        };
        Value {
            expr: Expr::Binary {
                op: token,
                lhs: Box::new(self.expr.clone()),
                rhs: Box::new(other.expr.clone()),
            },
            kind,
            nullability: self.nullability.combine(other.nullability),
            tables: self.union_tables(&other),
            adapter: None,
            error,
        }
    }

    fn unary_fn(self, func: SqlFunc, kind: ValueKind) -> Value {
        let nullability = self.nullability;
        let expr = Expr::Func {
            func,
            args: vec![self.expr.clone()],
        };
        self.derive(expr, kind, nullability)
    }

    fn require_kind(mut self, check: bool, message: impl Into<String>) -> Value {
        if self.error.is_none() && !check {
            self.error = Some(message.into());
        }
        self
    }

    // ─── Null tests and coalescing ──────────────────────────────────────

    /// `IS NULL` test. Always a required boolean.
    pub fn is_null(self) -> Value {
        let expr = Expr::NullCheck {
            operand: Box::new(self.expr.clone()),
            negated: false,
        };
        self.derive(expr, ValueKind::Boolean, Nullability::Required)
    }

    /// `IS NOT NULL` test. Always a required boolean.
    pub fn is_not_null(self) -> Value {
        let expr = Expr::NullCheck {
            operand: Box::new(self.expr.clone()),
            negated: true,
        };
        self.derive(expr, ValueKind::Boolean, Nullability::Required)
    }

    /// Null coalescing: this value, or `fallback` when NULL. The result's
    /// nullability is the fallback's (a required fallback guarantees a
    /// present result).
    pub fn value_when_null(self, fallback: impl IntoValue) -> Value {
        let fallback = fallback.into_value();
        let error = self.first_error(&fallback).or_else(|| {
            if equality_compatible(self.kind, fallback.kind) {
                None
            } else {
                Some(format!(
                    "valueWhenNull fallback kind {:?} does not match {:?}",
                    fallback.kind, self.kind
                ))
            }
        });
        Value {
            expr: Expr::Func {
                func: SqlFunc::Coalesce,
                args: vec![self.expr.clone(), fallback.expr.clone()],
            },
            kind: self.kind,
            nullability: fallback.nullability,
            tables: self.union_tables(&fallback),
            adapter: self.adapter.clone(),
            error,
        }
    }

    // ─── Equality and membership ────────────────────────────────────────

    pub fn equals(self, other: impl IntoValue) -> Value {
        self.comparison(other.into_value(), BinaryOp::Eq)
    }

    pub fn not_equals(self, other: impl IntoValue) -> Value {
        self.comparison(other.into_value(), BinaryOp::Ne)
    }

    /// `equals`, degrading to a no-op filter when the operand is `None`.
    pub fn equals_if_value(self, other: Option<impl IntoValue>) -> Value {
        match other {
            Some(v) => self.equals(v),
            None => Value::no_op_predicate(),
        }
    }

    /// `not_equals`, degrading to a no-op filter when the operand is `None`.
    pub fn not_equals_if_value(self, other: Option<impl IntoValue>) -> Value {
        match other {
            Some(v) => self.not_equals(v),
            None => Value::no_op_predicate(),
        }
    }

    /// Membership test. An empty list compiles to an always-false filter.
    pub fn is_in<T: IntoValue>(self, values: Vec<T>) -> Value {
        self.membership(values, false)
    }

    /// Negated membership test. An empty list compiles to always-true.
    pub fn not_in<T: IntoValue>(self, values: Vec<T>) -> Value {
        self.membership(values, true)
    }

    /// `is_in`, degrading to a no-op filter when the list is `None`.
    pub fn is_in_if_value<T: IntoValue>(self, values: Option<Vec<T>>) -> Value {
        match values {
            Some(v) => self.is_in(v),
            None => Value::no_op_predicate(),
        }
    }

    /// `not_in`, degrading to a no-op filter when the list is `None`.
    pub fn not_in_if_value<T: IntoValue>(self, values: Option<Vec<T>>) -> Value {
        match values {
            Some(v) => self.not_in(v),
            None => Value::no_op_predicate(),
        }
    }

    fn membership<T: IntoValue>(self, values: Vec<T>, negated: bool) -> Value {
        if values.is_empty() {
            let expr = Expr::BoolLiteral(negated);
            return self.derive(expr, ValueKind::Boolean, Nullability::Required);
        }
        let mut error = self.error.clone();
        let mut tables = self.tables.clone();
        let mut nullability = self.nullability;
        let mut items = Vec::with_capacity(values.len());
        for v in values {
            let v = v.into_value();
            if error.is_none() {
                error = v.error.clone().or_else(|| {
                    if equality_compatible(self.kind, v.kind) {
                        None
                    } else {
                        Some(format!("IN list item kind {:?} does not match {:?}", v.kind, self.kind))
                    }
                });
            }
            nullability = nullability.combine(v.nullability);
            tables.extend(v.tables.iter().cloned());
            let (item, e) = adapt_const(v.expr, self.adapter.as_deref(), error.take());
            error = e;
            items.push(item);
        }
        Value {
            expr: Expr::InList {
                operand: Box::new(self.expr.clone()),
                items,
                negated,
            },
            kind: ValueKind::Boolean,
            nullability,
            tables,
            adapter: None,
            error,
        }
    }

    // ─── Ordering ───────────────────────────────────────────────────────

    pub fn smaller(self, other: impl IntoValue) -> Value {
        self.comparison(other.into_value(), BinaryOp::Lt)
    }

    pub fn smaller_or_equals(self, other: impl IntoValue) -> Value {
        self.comparison(other.into_value(), BinaryOp::Le)
    }

    pub fn larger(self, other: impl IntoValue) -> Value {
        self.comparison(other.into_value(), BinaryOp::Gt)
    }

    pub fn larger_or_equals(self, other: impl IntoValue) -> Value {
        self.comparison(other.into_value(), BinaryOp::Ge)
    }

    pub fn smaller_if_value(self, other: Option<impl IntoValue>) -> Value {
        match other {
            Some(v) => self.smaller(v),
            None => Value::no_op_predicate(),
        }
    }

    pub fn larger_if_value(self, other: Option<impl IntoValue>) -> Value {
        match other {
            Some(v) => self.larger(v),
            None => Value::no_op_predicate(),
        }
    }

    pub fn between(self, low: impl IntoValue, high: impl IntoValue) -> Value {
        self.range_test(low.into_value(), high.into_value(), false)
    }

    pub fn not_between(self, low: impl IntoValue, high: impl IntoValue) -> Value {
        self.range_test(low.into_value(), high.into_value(), true)
    }

    fn range_test(self, low: Value, high: Value, negated: bool) -> Value {
        let error = self
            .first_error(&low)
            .or_else(|| high.error.clone())
            .or_else(|| {
                if ordering_compatible(self.kind, low.kind) && ordering_compatible(self.kind, high.kind)
                {
                    None
                } else {
                    Some(format!(
                        "BETWEEN bounds {:?}/{:?} do not match {:?}",
                        low.kind, high.kind, self.kind
                    ))
                }
            });
        let mut tables = self.union_tables(&low);
        tables.extend(high.tables.iter().cloned());
        Value {
            expr: Expr::Between {
                operand: Box::new(self.expr.clone()),
                low: Box::new(low.expr),
                high: Box::new(high.expr),
                negated,
            },
            kind: ValueKind::Boolean,
            nullability: self
                .nullability
                .combine(low.nullability)
                .combine(high.nullability),
            tables,
            adapter: None,
            error,
        }
    }

    // ─── Boolean logic ──────────────────────────────────────────────────

    /// Logical AND. No-op predicates are identity elements, so optional
    /// filters chain without manual branching.
    pub fn and(self, other: impl IntoValue) -> Value {
        let other = other.into_value();
        if other.is_no_op() {
            return self;
        }
        if self.is_no_op() {
            return other;
        }
        self.logical(other, BinaryOp::And)
    }

    /// Logical OR. No-op predicates are identity elements.
    pub fn or(self, other: impl IntoValue) -> Value {
        let other = other.into_value();
        if other.is_no_op() {
            return self;
        }
        if self.is_no_op() {
            return other;
        }
        self.logical(other, BinaryOp::Or)
    }

    fn logical(self, other: Value, op: BinaryOp) -> Value {
        let error = self.first_error(&other).or_else(|| {
            if self.kind == ValueKind::Boolean && other.kind == ValueKind::Boolean {
                None
            } else {
                Some(format!(
                    "logical {op:?} requires booleans, got {:?} and {:?}",
                    self.kind, other.kind
                ))
            }
        });
        Value {
            expr: Expr::Binary {
                op,
                lhs: Box::new(self.expr.clone()),
                rhs: Box::new(other.expr.clone()),
            },
            kind: ValueKind::Boolean,
            nullability: self.nullability.combine(other.nullability),
            tables: self.union_tables(&other),
            adapter: None,
            error,
        }
    }

    /// Logical negation. Negating an omitted filter stays omitted.
    pub fn negate(self) -> Value {
        if self.is_no_op() {
            return self;
        }
        let checked = self.require_kind_is(ValueKind::Boolean, "negate requires a boolean");
        let nullability = checked.nullability;
        let expr = Expr::Not(Box::new(checked.expr.clone()));
        checked.derive(expr, ValueKind::Boolean, nullability)
    }

    fn require_kind_is(mut self, kind: ValueKind, message: &str) -> Value {
        if self.error.is_none() && self.kind != kind {
            self.error = Some(format!("{message}, got {:?}", self.kind));
        }
        self
    }

    // ─── Arithmetic ─────────────────────────────────────────────────────

    pub fn add(self, other: impl IntoValue) -> Value {
        self.arithmetic(other.into_value(), ArithOp::Add, BinaryOp::Add)
    }

    pub fn substract(self, other: impl IntoValue) -> Value {
        self.arithmetic(other.into_value(), ArithOp::Substract, BinaryOp::Sub)
    }

    pub fn multiply(self, other: impl IntoValue) -> Value {
        self.arithmetic(other.into_value(), ArithOp::Multiply, BinaryOp::Mul)
    }

    /// Division always produces a floating result: `Int / Int` promotes to
    /// `Double`, `StringInt / StringInt` to `StringDouble`.
    pub fn divide(self, other: impl IntoValue) -> Value {
        self.arithmetic(other.into_value(), ArithOp::Divide, BinaryOp::Div)
    }

    pub fn modulo(self, other: impl IntoValue) -> Value {
        self.arithmetic(other.into_value(), ArithOp::Modulo, BinaryOp::Mod)
    }

    pub fn negated_value(self) -> Value {
        let checked = self.require_kind_numeric("unary minus");
        let kind = checked.kind;
        let nullability = checked.nullability;
        let expr = Expr::Negate(Box::new(checked.expr.clone()));
        checked.derive(expr, kind, nullability)
    }

    fn require_kind_numeric(self, what: &str) -> Value {
        let is_numeric = self.kind.is_numeric();
        self.require_kind(is_numeric, format!("{what} requires a numeric value"))
    }

    pub fn abs(self) -> Value {
        let checked = self.require_kind_numeric("abs");
        let kind = checked.kind;
        checked.unary_fn(SqlFunc::Abs, kind)
    }

    pub fn ceil(self) -> Value {
        let checked = self.require_kind_numeric("ceil");
        checked.unary_fn(SqlFunc::Ceil, ValueKind::Int)
    }

    pub fn floor(self) -> Value {
        let checked = self.require_kind_numeric("floor");
        checked.unary_fn(SqlFunc::Floor, ValueKind::Int)
    }

    pub fn round(self) -> Value {
        let checked = self.require_kind_numeric("round");
        let kind = checked.kind;
        checked.unary_fn(SqlFunc::Round, kind)
    }

    pub fn sin(self) -> Value {
        self.trig(SqlFunc::Sin)
    }

    pub fn cos(self) -> Value {
        self.trig(SqlFunc::Cos)
    }

    pub fn tan(self) -> Value {
        self.trig(SqlFunc::Tan)
    }

    pub fn asin(self) -> Value {
        self.trig(SqlFunc::Asin)
    }

    pub fn acos(self) -> Value {
        self.trig(SqlFunc::Acos)
    }

    pub fn atan(self) -> Value {
        self.trig(SqlFunc::Atan)
    }

    fn trig(self, func: SqlFunc) -> Value {
        let checked = self.require_kind_numeric("trigonometric function");
        checked.unary_fn(func, ValueKind::Double)
    }

    // ─── Text operations ────────────────────────────────────────────────

    pub fn concat(self, other: impl IntoValue) -> Value {
        let other = other.into_value();
        let error = self.first_error(&other).or_else(|| {
            if self.kind.is_textual() && other.kind.is_textual() {
                None
            } else {
                Some(format!(
                    "concat requires strings, got {:?} and {:?}",
                    self.kind, other.kind
                ))
            }
        });
        Value {
            expr: Expr::Binary {
                op: BinaryOp::Concat,
                lhs: Box::new(self.expr.clone()),
                rhs: Box::new(other.expr.clone()),
            },
            kind: ValueKind::String,
            nullability: self.nullability.combine(other.nullability),
            tables: self.union_tables(&other),
            adapter: None,
            error,
        }
    }

    pub fn length(self) -> Value {
        let is_textual = self.kind.is_textual();
        let checked = self.require_kind(is_textual, "length requires a string value");
        checked.unary_fn(SqlFunc::Length, ValueKind::Int)
    }

    pub fn to_lower_case(self) -> Value {
        self.text_transform(SqlFunc::Lower)
    }

    pub fn to_upper_case(self) -> Value {
        self.text_transform(SqlFunc::Upper)
    }

    pub fn trim(self) -> Value {
        self.text_transform(SqlFunc::Trim)
    }

    pub fn ltrim(self) -> Value {
        self.text_transform(SqlFunc::Ltrim)
    }

    pub fn rtrim(self) -> Value {
        self.text_transform(SqlFunc::Rtrim)
    }

    fn text_transform(self, func: SqlFunc) -> Value {
        let is_textual = self.kind.is_textual();
        let checked = self.require_kind(is_textual, "text transform requires a string value");
        checked.unary_fn(func, ValueKind::String)
    }

    /// Substring starting at 1-based `start` spanning `count` characters.
    pub fn substr(self, start: impl IntoValue, count: impl IntoValue) -> Value {
        let start = start.into_value();
        let count = count.into_value();
        let error = self
            .first_error(&start)
            .or_else(|| count.error.clone())
            .or_else(|| {
                if self.kind.is_textual() && start.kind == ValueKind::Int && count.kind == ValueKind::Int {
                    None
                } else {
                    Some("substr requires a string value and integer bounds".to_string())
                }
            });
        let mut tables = self.union_tables(&start);
        tables.extend(count.tables.iter().cloned());
        Value {
            expr: Expr::Func {
                func: SqlFunc::Substr,
                args: vec![self.expr.clone(), start.expr, count.expr],
            },
            kind: ValueKind::String,
            nullability: self.nullability,
            tables,
            adapter: None,
            error,
        }
    }

    pub fn replace(self, find: impl IntoValue, replacement: impl IntoValue) -> Value {
        let find = find.into_value();
        let replacement = replacement.into_value();
        let error = self
            .first_error(&find)
            .or_else(|| replacement.error.clone())
            .or_else(|| {
                if self.kind.is_textual() && find.kind.is_textual() && replacement.kind.is_textual() {
                    None
                } else {
                    Some("replace requires string arguments".to_string())
                }
            });
        let mut tables = self.union_tables(&find);
        tables.extend(replacement.tables.iter().cloned());
        Value {
            expr: Expr::Func {
                func: SqlFunc::Replace,
                args: vec![self.expr.clone(), find.expr, replacement.expr],
            },
            kind: ValueKind::String,
            nullability: self.nullability,
            tables,
            adapter: None,
            error,
        }
    }

    /// Reinterpret this value as its string representation.
    pub fn as_string(self) -> Value {
        let nullability = self.nullability;
        let expr = Expr::Func {
            func: SqlFunc::CastToString,
            args: vec![self.expr.clone()],
        };
        self.derive(expr, ValueKind::String, nullability)
    }

    // ─── Pattern tests ──────────────────────────────────────────────────

    pub fn like(self, pattern: impl IntoValue) -> Value {
        self.pattern_test(pattern.into_value(), false, false, PatternWrap::None)
    }

    pub fn not_like(self, pattern: impl IntoValue) -> Value {
        self.pattern_test(pattern.into_value(), false, true, PatternWrap::None)
    }

    pub fn like_insensitive(self, pattern: impl IntoValue) -> Value {
        self.pattern_test(pattern.into_value(), true, false, PatternWrap::None)
    }

    pub fn not_like_insensitive(self, pattern: impl IntoValue) -> Value {
        self.pattern_test(pattern.into_value(), true, true, PatternWrap::None)
    }

    pub fn contains(self, needle: impl IntoValue) -> Value {
        self.pattern_test(needle.into_value(), false, false, PatternWrap::Both)
    }

    pub fn not_contains(self, needle: impl IntoValue) -> Value {
        self.pattern_test(needle.into_value(), false, true, PatternWrap::Both)
    }

    pub fn contains_insensitive(self, needle: impl IntoValue) -> Value {
        self.pattern_test(needle.into_value(), true, false, PatternWrap::Both)
    }

    pub fn starts_with(self, prefix: impl IntoValue) -> Value {
        self.pattern_test(prefix.into_value(), false, false, PatternWrap::Suffix)
    }

    pub fn starts_with_insensitive(self, prefix: impl IntoValue) -> Value {
        self.pattern_test(prefix.into_value(), true, false, PatternWrap::Suffix)
    }

    pub fn ends_with(self, suffix: impl IntoValue) -> Value {
        self.pattern_test(suffix.into_value(), false, false, PatternWrap::Prefix)
    }

    pub fn ends_with_insensitive(self, suffix: impl IntoValue) -> Value {
        self.pattern_test(suffix.into_value(), true, false, PatternWrap::Prefix)
    }

    pub fn like_if_value(self, pattern: Option<impl IntoValue>) -> Value {
        match pattern {
            Some(p) => self.like(p),
            None => Value::no_op_predicate(),
        }
    }

    pub fn contains_if_value(self, needle: Option<impl IntoValue>) -> Value {
        match needle {
            Some(n) => self.contains(n),
            None => Value::no_op_predicate(),
        }
    }

    pub fn contains_insensitive_if_value(self, needle: Option<impl IntoValue>) -> Value {
        match needle {
            Some(n) => self.contains_insensitive(n),
            None => Value::no_op_predicate(),
        }
    }

    pub fn starts_with_if_value(self, prefix: Option<impl IntoValue>) -> Value {
        match prefix {
            Some(p) => self.starts_with(p),
            None => Value::no_op_predicate(),
        }
    }

    pub fn ends_with_if_value(self, suffix: Option<impl IntoValue>) -> Value {
        match suffix {
            Some(s) => self.ends_with(s),
            None => Value::no_op_predicate(),
        }
    }

    fn pattern_test(
        self,
        pattern: Value,
        insensitive: bool,
        negated: bool,
        wrap: PatternWrap,
    ) -> Value {
        let error = self.first_error(&pattern).or_else(|| {
            if self.kind.is_textual() && pattern.kind.is_textual() {
                None
            } else {
                Some(format!(
                    "pattern test requires strings, got {:?} and {:?}",
                    self.kind, pattern.kind
                ))
            }
        });
        Value {
            expr: Expr::Like {
                operand: Box::new(self.expr.clone()),
                pattern: Box::new(pattern.expr.clone()),
                insensitive,
                negated,
                wrap,
            },
            kind: ValueKind::Boolean,
            nullability: self.nullability.combine(pattern.nullability),
            tables: self.union_tables(&pattern),
            adapter: None,
            error,
        }
    }

    // ─── Temporal field extraction ──────────────────────────────────────

    pub fn get_year(self) -> Value {
        self.extract(TemporalField::Year)
    }

    pub fn get_month(self) -> Value {
        self.extract(TemporalField::Month)
    }

    pub fn get_day(self) -> Value {
        self.extract(TemporalField::Day)
    }

    pub fn get_day_of_week(self) -> Value {
        self.extract(TemporalField::DayOfWeek)
    }

    pub fn get_hours(self) -> Value {
        self.extract(TemporalField::Hours)
    }

    pub fn get_minutes(self) -> Value {
        self.extract(TemporalField::Minutes)
    }

    pub fn get_seconds(self) -> Value {
        self.extract(TemporalField::Seconds)
    }

    pub fn get_milliseconds(self) -> Value {
        self.extract(TemporalField::Milliseconds)
    }

    pub fn get_epoch_millis(self) -> Value {
        self.extract(TemporalField::EpochMillis)
    }

    fn extract(self, field: TemporalField) -> Value {
        let is_temporal = self.kind.is_temporal();
        let checked = self.require_kind(
            is_temporal,
            format!("{field:?} extraction requires a date/time value"),
        );
        let nullability = checked.nullability;
        let expr = Expr::Extract {
            field,
            operand: Box::new(checked.expr.clone()),
        };
        checked.derive(expr, ValueKind::Int, nullability)
    }

    // ─── Aggregated arrays ──────────────────────────────────────────────

    /// Replace the NULL an aggregation produces over zero rows with an
    /// empty array, making the result guaranteed-present.
    pub fn use_empty_array_for_no_value(mut self) -> Value {
        if self.error.is_some() {
            return self;
        }
        if self.kind != ValueKind::AggregatedArray {
            self.error = Some(format!(
                "useEmptyArrayForNoValue requires an aggregated array, got {:?}",
                self.kind
            ));
            return self;
        }
        self.expr = match self.expr {
            Expr::InlineAggregatedArray { query, .. } => Expr::InlineAggregatedArray {
                query,
                empty_as_array: true,
            },
            other => Expr::Func {
                func: SqlFunc::Coalesce,
                args: vec![other, Expr::Const(DbValue::Json(serde_json::json!([])))],
            },
        };
        self.nullability = Nullability::Required;
        self
    }
}

/// Run a constant through the column's type adapter, when both apply.
/// Non-constant expressions pass through untouched.
pub(crate) fn adapt_const(
    expr: Expr,
    adapter: Option<&dyn TypeAdapter>,
    error: Option<String>,
) -> (Expr, Option<String>) {
    match (adapter, expr) {
        (Some(adapter), Expr::Const(v)) if !v.is_null() => match adapter.to_db(v) {
            Ok(adapted) => (Expr::Const(adapted), error),
            Err(e) => (
                Expr::Noop,
                error.or_else(|| Some(format!("type adapter rejected the value: {e}"))),
            ),
        },
        (_, expr) => (expr, error),
    }
}

// ─── Aggregate constructors ─────────────────────────────────────────────

/// `COUNT(*)` over the grouped rows.
pub fn count_all() -> Value {
    Value::from_parts(
        Expr::Aggregate {
            func: AggFunc::CountAll,
            arg: None,
        },
        ValueKind::Int,
        Nullability::Required,
        TableSet::new(),
    )
}

/// `COUNT(value)`.
pub fn count(value: Value) -> Value {
    aggregate(value, AggFunc::Count, Some(ValueKind::Int), Nullability::Required)
}

/// `COUNT(DISTINCT value)`.
pub fn count_distinct(value: Value) -> Value {
    aggregate(
        value,
        AggFunc::CountDistinct,
        Some(ValueKind::Int),
        Nullability::Required,
    )
}

/// `SUM(value)`. NULL over zero rows, so the result is optional.
pub fn sum(value: Value) -> Value {
    let value = value.require_kind_numeric("sum");
    aggregate(value, AggFunc::Sum, None, Nullability::Optional)
}

/// `AVG(value)`. Integer inputs promote to a floating result.
pub fn average(value: Value) -> Value {
    let value = value.require_kind_numeric("average");
    let kind = match value.kind {
        ValueKind::Int => ValueKind::Double,
        ValueKind::StringInt => ValueKind::StringDouble,
        other => other,
    };
    aggregate(value, AggFunc::Average, Some(kind), Nullability::Optional)
}

/// `MIN(value)`.
pub fn min_value(value: Value) -> Value {
    aggregate(value, AggFunc::Min, None, Nullability::Optional)
}

/// `MAX(value)`.
pub fn max_value(value: Value) -> Value {
    aggregate(value, AggFunc::Max, None, Nullability::Optional)
}

fn aggregate(
    value: Value,
    func: AggFunc,
    kind: Option<ValueKind>,
    nullability: Nullability,
) -> Value {
    let kind = kind.unwrap_or(value.kind);
    Value {
        expr: Expr::Aggregate {
            func,
            arg: Some(Box::new(value.expr.clone())),
        },
        kind,
        nullability,
        tables: value.tables,
        adapter: None,
        error: value.error,
    }
}

/// Aggregate the grouped rows into one JSON array of objects, keyed by the
/// given result names. Avoids N+1 sub-queries for nested list shapes.
pub fn aggregate_as_array(shape: Vec<(&str, Value)>) -> Value {
    let mut error = None;
    let mut tables = TableSet::new();
    let mut columns = Vec::with_capacity(shape.len());
    if shape.is_empty() {
        error = Some("aggregate_as_array requires at least one column".to_string());
    }
    for (name, value) in shape {
        if error.is_none() {
            error = value.error.clone();
        }
        tables.extend(value.tables.iter().cloned());
        columns.push((name.to_string(), value.expr));
    }
    Value {
        expr: Expr::AggregateArray {
            shape: AggArrayShape::Columns(columns),
        },
        kind: ValueKind::AggregatedArray,
        nullability: Nullability::Optional,
        tables,
        adapter: None,
        error,
    }
}

/// Aggregate one scalar per row into a JSON array.
pub fn aggregate_as_array_of_one_column(value: Value) -> Value {
    Value {
        expr: Expr::AggregateArray {
            shape: AggArrayShape::OneColumn(Box::new(value.expr.clone())),
        },
        kind: ValueKind::AggregatedArray,
        nullability: Nullability::Optional,
        tables: value.tables,
        adapter: None,
        error: value.error,
    }
}

// ─── IntoValue implementations ──────────────────────────────────────────

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for &Value {
    fn into_value(self) -> Value {
        self.clone()
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Bool(self), ValueKind::Boolean)
    }
}

impl IntoValue for i16 {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Int(self as i64), ValueKind::Int)
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Int(self as i64), ValueKind::Int)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Int(self), ValueKind::Int)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Double(self), ValueKind::Double)
    }
}

impl IntoValue for f32 {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Double(self as f64), ValueKind::Double)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Text(self.to_string()), ValueKind::String)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Text(self), ValueKind::String)
    }
}

impl IntoValue for Uuid {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Uuid(self), ValueKind::Uuid)
    }
}

impl IntoValue for NaiveDate {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Date(self), ValueKind::LocalDate)
    }
}

impl IntoValue for NaiveTime {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Time(self), ValueKind::LocalTime)
    }
}

impl IntoValue for NaiveDateTime {
    fn into_value(self) -> Value {
        Value::constant(DbValue::DateTime(self), ValueKind::LocalDateTime)
    }
}

impl IntoValue for DateTime<Utc> {
    fn into_value(self) -> Value {
        Value::constant(DbValue::Timestamp(self), ValueKind::DateTime)
    }
}

impl IntoValue for DbValue {
    fn into_value(self) -> Value {
        match self.kind() {
            Some(kind) => Value::constant(self, kind),
            None => Value::poison("cannot infer the kind of this scalar; use Value::constant_of_kind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    fn sample_table() -> Table {
        Table::create("customer")
            .autogenerated_primary_key("id", ValueKind::Int)
            .column("first_name", ValueKind::String)
            .optional_column("birthday", ValueKind::LocalDate)
            .column("company_id", ValueKind::Int)
            .build()
            .unwrap()
    }

    #[test]
    fn required_operands_stay_required() {
        let t = sample_table();
        let v = t.col("id").add(t.col("company_id"));
        assert_eq!(v.nullability(), Nullability::Required);
    }

    #[test]
    fn optional_operand_widens_result() {
        let t = sample_table();
        let v = t.col("birthday").get_year().add(t.col("id"));
        assert_eq!(v.nullability(), Nullability::Optional);
    }

    #[test]
    fn coalesce_with_required_fallback_is_required() {
        let t = sample_table();
        let v = t.col("birthday").value_when_null(NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        assert_eq!(v.nullability(), Nullability::Required);
    }

    #[test]
    fn int_division_promotes() {
        let t = sample_table();
        let v = t.col("id").divide(t.col("company_id"));
        assert_eq!(v.kind(), ValueKind::Double);
    }

    #[test]
    fn kind_mismatch_poisons() {
        let t = sample_table();
        let v = t.col("first_name").add(1);
        assert!(v.composition_error().is_some());
    }

    #[test]
    fn poison_propagates_through_chain() {
        let t = sample_table();
        let v = t.col("first_name").add(1).equals(2).and(t.col("id").equals(1));
        assert!(v.composition_error().is_some());
    }

    #[test]
    fn if_value_none_is_noop() {
        let t = sample_table();
        let v = t.col("first_name").equals_if_value(None::<&str>);
        assert!(v.is_no_op());
    }

    #[test]
    fn noop_is_identity_for_and() {
        let t = sample_table();
        let real = t.col("id").equals(1);
        let combined = real.clone().and(t.col("first_name").equals_if_value(None::<&str>));
        // The no-op side disappears entirely
        assert!(matches!(combined.expr, Expr::Binary { op: BinaryOp::Eq, .. }));
        assert!(combined.composition_error().is_none());
        let _ = real;
    }

    #[test]
    fn binary_op_unions_tables() {
        let t = sample_table();
        let other = sample_table().as_alias("other").unwrap();
        let v = t.col("id").equals(other.col("id"));
        assert_eq!(v.referenced_tables().len(), 2);
    }

    #[test]
    fn empty_in_list_is_always_false() {
        let t = sample_table();
        let v = t.col("id").is_in(Vec::<i64>::new());
        assert!(matches!(v.expr, Expr::BoolLiteral(false)));
    }

    #[test]
    fn empty_not_in_list_is_always_true() {
        let t = sample_table();
        let v = t.col("id").not_in(Vec::<i64>::new());
        assert!(matches!(v.expr, Expr::BoolLiteral(true)));
    }

    #[test]
    fn unknown_column_poisons() {
        let t = sample_table();
        let v = t.col("no_such_column");
        assert!(v.composition_error().is_some());
    }

    #[test]
    fn count_is_required_int() {
        let t = sample_table();
        let v = count(t.col("id"));
        assert_eq!(v.kind(), ValueKind::Int);
        assert_eq!(v.nullability(), Nullability::Required);
    }

    #[test]
    fn average_of_int_is_double() {
        let t = sample_table();
        let v = average(t.col("id"));
        assert_eq!(v.kind(), ValueKind::Double);
    }

    #[test]
    fn empty_array_coalesce_is_required() {
        let t = sample_table();
        let v = aggregate_as_array(vec![("id", t.col("id"))]).use_empty_array_for_no_value();
        assert_eq!(v.nullability(), Nullability::Required);
    }
}
