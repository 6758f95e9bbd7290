//! Typed SQL composition.
//!
//! A [`Fragment`] carries SQL text together with the values it binds, so
//! independently written predicates can be combined freely. A [`Query`] is the
//! single accumulator that assigns the final `$N` placeholders as fragments are
//! appended, which keeps parameter numbering correct no matter how many
//! fragments are concatenated or in which order.

use chrono::{DateTime, Utc};
use std::fmt::Write;

/// A value bound to a positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    BigInt(i64),
    Text(String),
    TextArray(Vec<String>),
    Timestamp(DateTime<Utc>),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::BigInt(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<String>> for SqlValue {
    fn from(v: Vec<String>) -> Self {
        SqlValue::TextArray(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

/// Ordered list of bound values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlParams {
    values: Vec<SqlValue>,
}

impl SqlParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value and return its 1-based position.
    pub fn push(&mut self, value: impl Into<SqlValue>) -> usize {
        self.values.push(value.into());
        self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SqlValue> {
        self.values.iter()
    }

    pub fn get(&self, position: usize) -> Option<&SqlValue> {
        position.checked_sub(1).and_then(|i| self.values.get(i))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Sql(String),
    Bind(SqlValue),
}

/// SQL text with its bound values, not yet numbered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pieces: Vec<Piece>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sql(text: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push(text);
        fragment
    }

    pub fn push(&mut self, text: impl Into<String>) -> &mut Self {
        self.pieces.push(Piece::Sql(text.into()));
        self
    }

    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        self.pieces.push(Piece::Bind(value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Join fragments with `AND`. An empty list yields an empty fragment.
    pub fn and_all(parts: impl IntoIterator<Item = Fragment>) -> Fragment {
        let mut out = Fragment::new();
        for part in parts.into_iter().filter(|p| !p.is_empty()) {
            if !out.is_empty() {
                out.push(" AND ");
            }
            out.pieces.extend(part.pieces);
        }
        out
    }
}

/// A fully numbered statement ready to execute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    sql: String,
    params: SqlParams,
}

impl Query {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: SqlParams::new(),
        }
    }

    pub fn push(&mut self, text: &str) -> &mut Self {
        self.sql.push_str(text);
        self
    }

    pub fn push_bind(&mut self, value: impl Into<SqlValue>) -> &mut Self {
        let position = self.params.push(value);
        // Writing to a String cannot fail.
        let _ = write!(self.sql, "${}", position);
        self
    }

    pub fn push_fragment(&mut self, fragment: &Fragment) -> &mut Self {
        for piece in &fragment.pieces {
            match piece {
                Piece::Sql(text) => {
                    self.sql.push_str(text);
                }
                Piece::Bind(value) => {
                    self.push_bind(value.clone());
                }
            }
        }
        self
    }

    /// Append ` AND <fragment>` unless the fragment is empty.
    pub fn and(&mut self, fragment: &Fragment) -> &mut Self {
        if !fragment.is_empty() {
            self.push(" AND ");
            self.push_fragment(fragment);
        }
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &SqlParams {
        &self.params
    }
}
