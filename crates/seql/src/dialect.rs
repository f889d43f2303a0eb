//! SQL dialect rules.
//!
//! The query compiler consults the active [`Dialect`] for everything that
//! differs between backend families: parameter placeholder syntax, the
//! string concatenation operator, case-insensitive pattern matching,
//! LIMIT/OFFSET spelling, recursive CTE keywords, JSON array aggregation,
//! and capability flags for features that not every backend can express.

use std::fmt;

/// The SQL-syntax rule set for a specific backend family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    PostgreSql,
    MySql,
    MariaDb,
    Sqlite,
    SqlServer,
    Oracle,
}

/// How string concatenation is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatStyle {
    /// `a || b`
    Operator,
    /// `CONCAT(a, b)`
    Function,
}

impl Dialect {
    /// Parameter placeholder token for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::PostgreSql => format!("${index}"),
            Dialect::MySql | Dialect::MariaDb | Dialect::Sqlite => "?".to_string(),
            Dialect::SqlServer => format!("@p{index}"),
            Dialect::Oracle => format!(":{index}"),
        }
    }

    /// Identifier quoting characters (open, close).
    pub fn identifier_quotes(self) -> (char, char) {
        match self {
            Dialect::MySql | Dialect::MariaDb => ('`', '`'),
            Dialect::SqlServer => ('[', ']'),
            _ => ('"', '"'),
        }
    }

    /// How string concatenation is spelled.
    pub fn concat_style(self) -> ConcatStyle {
        match self {
            Dialect::MySql | Dialect::MariaDb | Dialect::SqlServer => ConcatStyle::Function,
            _ => ConcatStyle::Operator,
        }
    }

    /// Whether the dialect has a native case-insensitive LIKE operator.
    ///
    /// Dialects without one get `LOWER(x) LIKE LOWER(y)`.
    pub fn supports_ilike(self) -> bool {
        matches!(self, Dialect::PostgreSql)
    }

    /// Keyword introducing a recursive CTE.
    pub fn recursive_cte_keyword(self) -> &'static str {
        match self {
            Dialect::SqlServer | Dialect::Oracle => "WITH",
            _ => "WITH RECURSIVE",
        }
    }

    /// Whether INSERT/UPDATE/DELETE can project modified rows back to the
    /// caller (RETURNING, or OUTPUT on SQL Server).
    pub fn supports_returning(self) -> bool {
        !matches!(self, Dialect::MySql | Dialect::Oracle)
    }

    /// Whether a recursive CTE may correlate with an outer table.
    ///
    /// MariaDB rejects recursive queries that depend on tables of an
    /// enclosing statement; builders gate on this flag instead of emitting
    /// SQL the backend would refuse.
    pub fn supports_correlated_recursive_cte(self) -> bool {
        !matches!(self, Dialect::MariaDb)
    }

    /// Whether a RETURNING/OUTPUT clause can reference pre-update values.
    pub fn supports_old_values_in_returning(self) -> bool {
        matches!(self, Dialect::SqlServer)
    }

    /// Whether an UPDATE may draw values from additional tables, either
    /// through an UPDATE .. FROM clause or the MySQL multi-table form.
    pub fn supports_update_from(self) -> bool {
        !matches!(self, Dialect::Oracle)
    }

    /// Whether a DELETE may filter against additional tables through a
    /// USING list.
    pub fn supports_delete_using(self) -> bool {
        matches!(self, Dialect::PostgreSql | Dialect::MySql | Dialect::MariaDb)
    }

    /// Append the LIMIT/OFFSET clause for this dialect.
    pub(crate) fn write_limit_offset(
        self,
        out: &mut String,
        limit: Option<u64>,
        offset: Option<u64>,
    ) {
        if limit.is_none() && offset.is_none() {
            return;
        }
        match self {
            Dialect::SqlServer | Dialect::Oracle => {
                let offset = offset.unwrap_or(0);
                out.push_str(&format!(" OFFSET {offset} ROWS"));
                if let Some(limit) = limit {
                    out.push_str(&format!(" FETCH NEXT {limit} ROWS ONLY"));
                }
            }
            Dialect::MySql | Dialect::MariaDb => {
                // MySQL requires LIMIT when OFFSET is present
                match (limit, offset) {
                    (Some(l), Some(o)) => out.push_str(&format!(" LIMIT {l} OFFSET {o}")),
                    (Some(l), None) => out.push_str(&format!(" LIMIT {l}")),
                    (None, Some(o)) => out.push_str(&format!(" LIMIT 18446744073709551615 OFFSET {o}")),
                    (None, None) => {}
                }
            }
            _ => {
                if let Some(l) = limit {
                    out.push_str(&format!(" LIMIT {l}"));
                }
                if let Some(o) = offset {
                    out.push_str(&format!(" OFFSET {o}"));
                }
            }
        }
    }

    /// JSON array-aggregation function over a per-row expression, when
    /// the dialect has one.
    pub(crate) fn json_array_agg(self) -> Option<&'static str> {
        match self {
            Dialect::PostgreSql => Some("json_agg"),
            Dialect::Sqlite => Some("json_group_array"),
            Dialect::MySql | Dialect::MariaDb => Some("json_arrayagg"),
            Dialect::SqlServer | Dialect::Oracle => None,
        }
    }

    /// JSON object constructor taking alternating key/value arguments.
    pub(crate) fn json_object_fn(self) -> Option<&'static str> {
        match self {
            Dialect::PostgreSql => Some("json_build_object"),
            Dialect::Sqlite | Dialect::MySql | Dialect::MariaDb => Some("json_object"),
            Dialect::SqlServer | Dialect::Oracle => None,
        }
    }

    /// The empty-JSON-array literal used when coalescing a zero-row
    /// aggregation.
    pub(crate) fn empty_json_array(self) -> &'static str {
        match self {
            Dialect::PostgreSql => "'[]'::json",
            _ => "json_array()",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::PostgreSql => "postgreSql",
            Dialect::MySql => "mySql",
            Dialect::MariaDb => "mariaDB",
            Dialect::Sqlite => "sqlite",
            Dialect::SqlServer => "sqlServer",
            Dialect::Oracle => "oracle",
        };
        f.write_str(name)
    }
}
