//! Raw report results as they come out of a store and go into the cache

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One result row, keyed by column name
pub type Row = Map<String, Value>;

/// How a statement's result is collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    /// Every row as a column-name map
    Rows,
    /// First column of the first row
    Scalar,
    /// First column of every row
    Column,
}

/// Unshaped result of one report statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ReportValue {
    Rows(Vec<Row>),
    Scalar(Value),
    Column(Vec<Value>),
}

impl ReportValue {
    /// Rows of a row-set result; any other kind yields no rows
    pub fn into_rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    /// First row of a row-set result
    pub fn first_row(self) -> Option<Row> {
        self.into_rows().into_iter().next()
    }

    /// Scalar result; `Null` for other kinds
    pub fn into_scalar(self) -> Value {
        match self {
            Self::Scalar(value) => value,
            _ => Value::Null,
        }
    }

    /// Column result; empty for other kinds
    pub fn into_column(self) -> Vec<Value> {
        match self {
            Self::Column(values) => values,
            _ => Vec::new(),
        }
    }
}

/// Numeric view of a cell. Nulls and non-numeric text count as zero.
pub fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// Integer view of a cell, truncating reals
pub fn as_i64(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .unwrap_or_else(|| n.as_f64().map(|f| f as i64).unwrap_or(0)),
        other => as_f64(other) as i64,
    }
}

/// Numeric cell of a row by column name, zero when missing
pub fn row_f64(row: &Row, column: &str) -> f64 {
    row.get(column).map(as_f64).unwrap_or(0.0)
}

/// Integer cell of a row by column name, zero when missing
pub fn row_i64(row: &Row, column: &str) -> i64 {
    row.get(column).map(as_i64).unwrap_or(0)
}
