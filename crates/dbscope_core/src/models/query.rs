//! Query result models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Column metadata from a prepared statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// PostgreSQL type OID
    pub type_oid: u32,
    /// Human-readable type name
    pub type_name: String,
}

/// One named column of a result and its values, top to bottom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultColumn {
    /// Column metadata
    #[serde(flatten)]
    pub info: ColumnInfo,
    /// Values in row order
    pub values: Vec<Value>,
}

impl ResultColumn {
    /// Column name.
    pub fn name(&self) -> &str {
        &self.info.name
    }
}

/// Column-oriented results from query execution.
///
/// Values can only be added one full row at a time, so every column always
/// holds the same number of values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    columns: Vec<ResultColumn>,
    row_count: usize,
    /// Rows affected, for statements that return no columns
    pub rows_affected: Option<u64>,
    /// Time to execute in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create an empty result with the given columns.
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|info| ResultColumn { info, values: Vec::new() })
                .collect(),
            row_count: 0,
            rows_affected: None,
            execution_time_ms: 0,
        }
    }

    /// Append one row. Fails if the row width does not match the columns.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), String> {
        if row.len() != self.columns.len() {
            return Err(format!(
                "Row has {} values but the result has {} columns",
                row.len(),
                self.columns.len()
            ));
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
        self.row_count += 1;
        Ok(())
    }

    /// Get the number of rows returned.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// All columns in result order.
    pub fn columns(&self) -> &[ResultColumn] {
        &self.columns
    }

    /// Get column names.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name()).collect()
    }

    /// Find a column by name. The first match wins when names repeat.
    pub fn column(&self, name: &str) -> Option<&ResultColumn> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Get a single value by row index and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column).and_then(|c| c.values.get(row))
    }

    /// Iterate row by row, for consumers that write rows out.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&Value>> + '_ {
        (0..self.row_count).map(move |i| self.columns.iter().map(|c| &c.values[i]).collect())
    }
}
