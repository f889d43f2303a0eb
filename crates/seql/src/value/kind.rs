//! Value kinds, nullability, and the operation promotion table.
//!
//! Instead of encoding type promotion in combinatorial method overloads,
//! the result kind of every operation is computed from data: a promotion
//! function keyed by the operand kinds.

/// The runtime kind of a [`Value`](crate::Value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Boolean,
    /// Exact integer.
    Int,
    /// Floating point number.
    Double,
    /// Integer stored/transferred as a string (exceeds native int range).
    StringInt,
    /// Decimal stored/transferred as a string.
    StringDouble,
    String,
    Uuid,
    /// Zone-naive calendar date.
    LocalDate,
    /// Zone-naive time of day.
    LocalTime,
    /// Zone-naive date and time.
    LocalDateTime,
    /// Zone-aware calendar date.
    Date,
    /// Zone-aware time of day.
    Time,
    /// Zone-aware instant.
    DateTime,
    /// JSON array of structured rows produced by array aggregation.
    AggregatedArray,
    /// Backend-specific type handled through a type adapter.
    Custom(&'static str),
}

impl ValueKind {
    /// Whether this kind participates in arithmetic.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ValueKind::Int | ValueKind::Double | ValueKind::StringInt | ValueKind::StringDouble
        )
    }

    /// Whether this kind supports text operations.
    pub fn is_textual(self) -> bool {
        matches!(self, ValueKind::String | ValueKind::Uuid)
    }

    /// Whether this kind supports field extraction (year, month, ...).
    pub fn is_temporal(self) -> bool {
        matches!(
            self,
            ValueKind::LocalDate
                | ValueKind::LocalTime
                | ValueKind::LocalDateTime
                | ValueKind::Date
                | ValueKind::Time
                | ValueKind::DateTime
        )
    }

    /// Whether values of this kind have a defined ordering.
    pub fn is_comparable(self) -> bool {
        self.is_numeric() || self.is_textual() || self.is_temporal()
    }
}

/// Whether a value is guaranteed present or may be NULL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nullability {
    Required,
    Optional,
}

impl Nullability {
    /// Binary-operation propagation: the result is required only when
    /// both operands are required.
    pub fn combine(self, other: Nullability) -> Nullability {
        match (self, other) {
            (Nullability::Required, Nullability::Required) => Nullability::Required,
            _ => Nullability::Optional,
        }
    }

    pub fn is_optional(self) -> bool {
        matches!(self, Nullability::Optional)
    }
}

/// Arithmetic operations covered by the promotion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Substract,
    Multiply,
    Divide,
    Modulo,
}

/// Result kind of an arithmetic operation, or `None` when the operand
/// kinds cannot combine.
///
/// Promotion rules:
/// - integer ÷ integer promotes to `Double` (division is never truncating)
/// - mixing an exact kind with a floating kind promotes to the floating kind
/// - mixing a native kind with a string-encoded kind promotes to the
///   string-encoded side (`StringInt` + `StringDouble` = `StringDouble`)
pub fn arithmetic_result(op: ArithOp, lhs: ValueKind, rhs: ValueKind) -> Option<ValueKind> {
    use ValueKind::*;
    if !lhs.is_numeric() || !rhs.is_numeric() {
        return None;
    }
    let merged = match (lhs, rhs) {
        (Int, Int) => Int,
        (Int, Double) | (Double, Int) | (Double, Double) => Double,
        (StringInt, Int) | (Int, StringInt) | (StringInt, StringInt) => StringInt,
        (StringDouble, _) | (_, StringDouble) => StringDouble,
        (StringInt, Double) | (Double, StringInt) => StringDouble,
        _ => return None,
    };
    let result = match op {
        ArithOp::Divide => match merged {
            Int => Double,
            StringInt => StringDouble,
            other => other,
        },
        _ => merged,
    };
    Some(result)
}

/// Whether two kinds can be compared with equality operators.
pub fn equality_compatible(lhs: ValueKind, rhs: ValueKind) -> bool {
    if lhs == rhs {
        return true;
    }
    // Numerics of any representation compare with each other
    lhs.is_numeric() && rhs.is_numeric()
}

/// Whether two kinds can be compared with ordering operators.
pub fn ordering_compatible(lhs: ValueKind, rhs: ValueKind) -> bool {
    lhs.is_comparable() && rhs.is_comparable() && equality_compatible(lhs, rhs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ValueKind::*;

    #[test]
    fn int_division_promotes_to_double() {
        assert_eq!(arithmetic_result(ArithOp::Divide, Int, Int), Some(Double));
    }

    #[test]
    fn string_int_plus_string_double() {
        assert_eq!(
            arithmetic_result(ArithOp::Add, StringInt, StringDouble),
            Some(StringDouble)
        );
    }

    #[test]
    fn int_plus_int_stays_int() {
        assert_eq!(arithmetic_result(ArithOp::Add, Int, Int), Some(Int));
    }

    #[test]
    fn string_int_division_stays_string_encoded() {
        assert_eq!(
            arithmetic_result(ArithOp::Divide, StringInt, StringInt),
            Some(StringDouble)
        );
    }

    #[test]
    fn text_arithmetic_rejected() {
        assert_eq!(arithmetic_result(ArithOp::Add, String, Int), None);
    }

    #[test]
    fn nullability_combine() {
        assert_eq!(
            Nullability::Required.combine(Nullability::Required),
            Nullability::Required
        );
        assert_eq!(
            Nullability::Required.combine(Nullability::Optional),
            Nullability::Optional
        );
        assert_eq!(
            Nullability::Optional.combine(Nullability::Optional),
            Nullability::Optional
        );
    }

    #[test]
    fn zone_aware_temporals_order_within_their_kind() {
        assert!(Date.is_temporal());
        assert!(Time.is_temporal());
        assert!(ordering_compatible(Date, Date));
        assert!(ordering_compatible(Time, Time));
        assert!(!equality_compatible(Date, LocalDate));
        assert!(!equality_compatible(Time, DateTime));
    }

    #[test]
    fn uuid_not_equality_compatible_with_int() {
        assert!(!equality_compatible(Uuid, Int));
        assert!(equality_compatible(Uuid, Uuid));
        assert!(equality_compatible(Int, Double));
    }
}
