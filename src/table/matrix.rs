//! Dense per-step matrices (rows = exposures, columns = time steps)
//!
//! Step `i` (1-based) lives at column `i - 1`. Missing cells are NaN.

use super::{column_key, Table, Value};
use crate::error::EclResult;

/// Columns named `{PREFIX}_{n}`, sorted by the numeric suffix `n`
///
/// `_10` sorts after `_2`. Suffixes that are not positive integers are ignored.
pub fn step_columns(names: &[String], prefix: &str) -> Vec<(usize, String)> {
    let head = format!("{}_", column_key(prefix));
    let mut found: Vec<(usize, String)> = names
        .iter()
        .filter_map(|name| {
            let key = column_key(name);
            let suffix = key.strip_prefix(&head)?;
            let step = suffix.parse::<usize>().ok().filter(|&s| s >= 1)?;
            Some((step, name.clone()))
        })
        .collect();
    found.sort_by_key(|(step, _)| *step);
    found.dedup_by_key(|(step, _)| *step);
    found
}

/// Rows x steps matrix of f64
#[derive(Debug, Clone, PartialEq)]
pub struct StepMatrix {
    n_rows: usize,
    n_steps: usize,
    data: Vec<f64>,
}

impl StepMatrix {
    pub fn new(n_rows: usize, n_steps: usize, fill: f64) -> Self {
        Self {
            n_rows,
            n_steps,
            data: vec![fill; n_rows * n_steps],
        }
    }

    /// Build from ragged rows; short rows are padded with NaN
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Self {
        let n_steps = rows.iter().map(Vec::len).max().unwrap_or(0);
        Self::from_rows_with_width(rows, n_steps)
    }

    /// Build from ragged rows with a fixed width (extra cells are dropped)
    pub fn from_rows_with_width(rows: Vec<Vec<f64>>, n_steps: usize) -> Self {
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * n_steps);
        for mut row in rows {
            row.resize(n_steps, f64::NAN);
            data.extend(row);
        }
        Self { n_rows, n_steps, data }
    }

    /// Extract `{PREFIX}_{n}` columns of a table into a matrix
    ///
    /// Width is the largest suffix found; absent suffixes are NaN.
    pub fn from_table(table: &Table, prefix: &str) -> Self {
        let cols = step_columns(table.column_names(), prefix);
        let n_steps = cols.last().map(|(s, _)| *s).unwrap_or(0);
        let mut m = Self::new(table.n_rows(), n_steps, f64::NAN);
        for (step, name) in &cols {
            if let Some(values) = table.numbers(name) {
                for (r, v) in values.into_iter().enumerate() {
                    m.set(r, step - 1, v);
                }
            }
        }
        m
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn get(&self, row: usize, step: usize) -> f64 {
        self.data[row * self.n_steps + step]
    }

    pub fn set(&mut self, row: usize, step: usize, value: f64) {
        self.data[row * self.n_steps + step] = value;
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.n_steps..(row + 1) * self.n_steps]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        let n = self.n_steps;
        &mut self.data[row * n..(row + 1) * n]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.n_rows).map(move |r| self.row(r))
    }

    /// Copy into a new width, padding with `fill`
    pub fn with_width(&self, n_steps: usize, fill: f64) -> Self {
        let mut m = Self::new(self.n_rows, n_steps, fill);
        let keep = n_steps.min(self.n_steps);
        for r in 0..self.n_rows {
            m.row_mut(r)[..keep].copy_from_slice(&self.row(r)[..keep]);
        }
        m
    }

    /// Round every cell half-to-even at `decimals` places
    pub fn rounded(&self, decimals: i32) -> Self {
        let scale = 10f64.powi(decimals);
        Self {
            n_rows: self.n_rows,
            n_steps: self.n_steps,
            data: self
                .data
                .iter()
                .map(|v| (v * scale).round_ties_even() / scale)
                .collect(),
        }
    }

    /// Write as `{PREFIX}_1..{PREFIX}_N` columns
    pub fn write_columns(&self, table: &mut Table, prefix: &str) -> EclResult<()> {
        for step in 0..self.n_steps {
            let values: Vec<Value> = (0..self.n_rows).map(|r| Value::from(self.get(r, step))).collect();
            table.set_column(&format!("{}_{}", prefix, step + 1), values)?;
        }
        Ok(())
    }
}
