use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VigilError};

/// Column-named, row-oriented table. Time-series tables carry a timestamp
/// column (epoch millis) plus numeric value columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    /// Free-form table metadata (e.g. `timeColumn`, `granularity`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl DataTable {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| VigilError::ColumnNotFound(name.to_string()))
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(VigilError::ShapeMismatch(format!(
                "row has {} values, table has {} columns",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn f64_at(&self, row: usize, col: usize) -> Option<f64> {
        self.rows.get(row)?.get(col)?.as_f64()
    }

    pub fn i64_at(&self, row: usize, col: usize) -> Option<i64> {
        let v = self.rows.get(row)?.get(col)?;
        v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
    }

    pub fn bool_at(&self, row: usize, col: usize) -> Option<bool> {
        self.rows.get(row)?.get(col)?.as_bool()
    }

    /// Append the rows of `other`. Columns must match by name and order.
    pub fn append(&mut self, other: DataTable) -> Result<()> {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return Ok(());
        }
        if self.columns != other.columns {
            return Err(VigilError::ShapeMismatch(format!(
                "cannot append table with columns {:?} to {:?}",
                other.columns, self.columns
            )));
        }
        self.rows.extend(other.rows);
        for (k, v) in other.properties {
            self.properties.entry(k).or_insert(v);
        }
        Ok(())
    }

    /// Stable sort of rows by an integer column (timestamps).
    pub fn sort_by_column(&mut self, col: usize) {
        self.rows.sort_by_key(|r| {
            r.get(col)
                .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
                .unwrap_or(i64::MAX)
        });
    }
}
