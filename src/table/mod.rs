//! Column-major tables for the portfolio and template sheets
//!
//! Columns are ordered and uniquely named (trimmed, upper-cased). Pipeline
//! stages add or replace columns; rows are never dropped or reordered.

mod loader;
mod matrix;
mod template;
mod value;

pub use loader::{load_table, load_table_from_reader, write_table, write_table_to_writer};
pub use matrix::{step_columns, StepMatrix};
pub use template::{normalize_field_name, Template};
pub use value::{format_number, parse_date, parse_number, Value};

use crate::error::{EclError, EclResult};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Canonical column name
pub fn column_key(name: &str) -> String {
    name.trim().to_uppercase()
}

/// In-memory table: ordered named columns of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    index: HashMap<String, usize>,
    columns: Vec<Vec<Value>>,
    n_rows: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from named columns
    pub fn from_columns<S: AsRef<str>>(columns: Vec<(S, Vec<Value>)>) -> EclResult<Self> {
        let mut table = Self::new();
        for (name, values) in columns {
            table.set_column(name.as_ref(), values)?;
        }
        Ok(table)
    }

    /// Build a table from a header and row-major cells
    pub fn from_rows<S: AsRef<str>>(headers: &[S], rows: Vec<Vec<Value>>) -> EclResult<Self> {
        let mut columns: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); headers.len()];
        for row in rows {
            for (col, cell) in row.into_iter().enumerate().take(headers.len()) {
                columns[col].push(cell);
            }
        }
        let n_rows = columns.iter().map(Vec::len).max().unwrap_or(0);
        for col in columns.iter_mut() {
            col.resize(n_rows, Value::Null);
        }
        let mut table = Self::new();
        table.n_rows = n_rows;
        for (name, values) in headers.iter().zip(columns) {
            table.set_column(name.as_ref(), values)?;
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(&column_key(name))
    }

    /// Names from `required` that this table lacks
    pub fn missing_columns<S: AsRef<str>>(&self, required: &[S]) -> Vec<String> {
        required
            .iter()
            .map(|c| column_key(c.as_ref()))
            .filter(|c| !self.index.contains_key(c))
            .collect()
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.index
            .get(&column_key(name))
            .map(|&i| self.columns[i].as_slice())
    }

    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        self.column(name).and_then(|c| c.get(row))
    }

    /// Add or replace a column
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> EclResult<()> {
        let key = column_key(name);
        if self.names.is_empty() && self.n_rows == 0 {
            self.n_rows = values.len();
        } else if values.len() != self.n_rows {
            return Err(EclError::ColumnLength {
                column: key,
                expected: self.n_rows,
                actual: values.len(),
            });
        }
        match self.index.get(&key) {
            Some(&i) => self.columns[i] = values,
            None => {
                self.index.insert(key.clone(), self.names.len());
                self.names.push(key);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    /// Add or replace a numeric column (NaN is stored as null)
    pub fn set_numbers(&mut self, name: &str, values: Vec<f64>) -> EclResult<()> {
        self.set_column(name, values.into_iter().map(Value::from).collect())
    }

    /// Rename a column in place; no-op if `from` is absent or `to` already exists
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        let from_key = column_key(from);
        let to_key = column_key(to);
        if from_key == to_key || self.index.contains_key(&to_key) {
            return false;
        }
        match self.index.remove(&from_key) {
            Some(i) => {
                self.names[i] = to_key.clone();
                self.index.insert(to_key, i);
                true
            }
            None => false,
        }
    }

    /// Column coerced to numbers, NaN where missing
    pub fn numbers(&self, name: &str) -> Option<Vec<f64>> {
        self.column(name)
            .map(|c| c.iter().map(|v| v.as_number().unwrap_or(f64::NAN)).collect())
    }

    pub fn dates(&self, name: &str) -> Option<Vec<Option<NaiveDate>>> {
        self.column(name)
            .map(|c| c.iter().map(Value::as_date).collect())
    }

    /// Column rendered as normalized join keys
    pub fn keys(&self, name: &str) -> Option<Vec<Option<String>>> {
        self.column(name)
            .map(|c| c.iter().map(Value::as_key).collect())
    }

    /// Rows where `mask` is true, in original order
    pub fn filter_rows(&self, mask: &[bool]) -> Table {
        let keep: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &m)| if m { Some(i) } else { None })
            .collect();
        self.take_rows(&keep)
    }

    /// Rows at the given positions, in the given order
    pub fn take_rows(&self, rows: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            index: self.index.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| rows.iter().map(|&r| c[r].clone()).collect())
                .collect(),
            n_rows: rows.len(),
        }
    }
}
