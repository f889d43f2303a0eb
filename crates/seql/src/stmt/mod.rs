//! Staged statement builders.
//!
//! Each statement family is a small state machine of builder types: a
//! method that changes what is legal next returns the next stage's type,
//! so illegal orderings (ordering before projecting, a second ON for one
//! join) do not exist as callable paths. Anything the stages cannot rule
//! out statically is validated when the statement is compiled.

pub mod delete;
pub mod insert;
pub(crate) mod scope;
pub mod select;
pub mod update;

/// Sort direction and NULL placement for one ORDER BY entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByMode {
    Asc,
    Desc,
    AscNullsFirst,
    AscNullsLast,
    DescNullsFirst,
    DescNullsLast,
    /// Case-insensitive ascending.
    AscInsensitive,
    /// Case-insensitive descending.
    DescInsensitive,
}
