//! Typed, ordered query parameters.
//!
//! Every predicate fragment binds its values through [`QueryParams`]; no
//! user-controlled value is ever interpolated into query text. List values
//! bind as Postgres arrays and are matched with `= ANY($n)`.

use crate::types::{DbId, Timestamp};

/// A single bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    BigInt(DbId),
    BigIntList(Vec<DbId>),
    Float(f64),
    Text(String),
    Timestamp(Timestamp),
}

/// Ordered parameter list; `push` hands back the `$n` placeholder to splice
/// into the fragment text.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    values: Vec<SqlParam>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value and return its positional placeholder.
    pub fn push(&mut self, value: SqlParam) -> String {
        self.values.push(value);
        format!("${}", self.values.len())
    }

    pub fn values(&self) -> &[SqlParam] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
