//! Residual maturity and time-step grids
//!
//! A step ladder (STEP, NB_MONTHS) buckets residual maturities into a number
//! of steps. Beyond the last rung the ladder is extended with a constant gap
//! equal to the distance between its last two rungs.

use crate::config::{PortfolioColumns, TimeStepsSource};
use crate::error::{EclError, EclResult};
use crate::table::{Table, Value};
use chrono::{Datelike, NaiveDate};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

pub const RESIDUAL_MATURITY_COLUMN: &str = "RESIDUAL_MATURITY_MONTHS";
pub const NB_TIME_STEPS_COLUMN: &str = "NB_TIME_STEPS";

/// Residual maturity in months, floored at zero
///
/// Calendar-month difference plus `(end_day - as_of_day) * 12 / 365`.
pub fn maturity(end_date: NaiveDate, as_of_date: NaiveDate) -> f64 {
    let months = (end_date.year() - as_of_date.year()) * 12 + end_date.month() as i32 - as_of_date.month() as i32;
    let day_fraction = (end_date.day() as f64 - as_of_date.day() as f64) * 12.0 / 365.0;
    (months as f64 + day_fraction).max(0.0)
}

/// Ordered step ladder, strictly increasing in months
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepLadder {
    months: Vec<u32>,
}

impl StepLadder {
    pub fn new(months: Vec<u32>) -> EclResult<Self> {
        if months.is_empty() {
            return Err(EclError::InvalidStepLadder {
                reason: "no step defined".into(),
            });
        }
        if months[0] == 0 {
            return Err(EclError::InvalidStepLadder {
                reason: "first step must be at least one month".into(),
            });
        }
        if let Some(w) = months.windows(2).find(|w| w[1] <= w[0]) {
            return Err(EclError::InvalidStepLadder {
                reason: format!("NB_MONTHS not strictly increasing ({} then {})", w[0], w[1]),
            });
        }
        Ok(Self { months })
    }

    /// Read the ladder sheet, ordered by STEP when present
    pub fn from_table(sheet: &Table, source: &TimeStepsSource) -> EclResult<Self> {
        let months = sheet.numbers(&source.months_column).ok_or_else(|| {
            EclError::missing_columns(source.sheet.clone(), vec![source.months_column.clone()])
        })?;
        let steps = sheet
            .numbers(&source.step_column)
            .unwrap_or_else(|| (1..=months.len()).map(|s| s as f64).collect());

        let mut rungs: Vec<(f64, f64)> = steps
            .into_iter()
            .zip(months)
            .filter(|(_, m)| m.is_finite())
            .collect();
        rungs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut months = Vec::with_capacity(rungs.len());
        for (_, m) in rungs {
            if m < 0.0 || m.fract() != 0.0 {
                return Err(EclError::InvalidStepLadder {
                    reason: format!("NB_MONTHS must be a whole number of months, got {}", m),
                });
            }
            months.push(m as u32);
        }
        Self::new(months)
    }

    pub fn months(&self) -> &[u32] {
        &self.months
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    pub fn last_month(&self) -> u32 {
        self.months.last().copied().unwrap_or(0)
    }

    /// Gap used beyond the ladder (the last rung itself for a one-rung ladder)
    pub fn gap(&self) -> u32 {
        match self.months.len() {
            0 => 0,
            1 => self.months[0],
            n => self.months[n - 1] - self.months[n - 2],
        }
    }

    /// Number of steps covering `residual_months`
    pub fn nb_time_steps(&self, residual_months: f64) -> usize {
        if !residual_months.is_finite() || residual_months <= 0.0 {
            return 0;
        }
        let last = self.last_month() as f64;
        if residual_months <= last {
            return self.months.partition_point(|&m| (m as f64) < residual_months) + 1;
        }
        let extra = ((residual_months - last) / self.gap() as f64).ceil() as usize;
        self.months.len() + extra
    }

    /// Month boundary of each of the first `nb_steps` steps, extending past the ladder
    pub fn step_months(&self, nb_steps: usize) -> Vec<u32> {
        let last = self.last_month();
        let gap = self.gap();
        (0..nb_steps)
            .map(|i| match self.months.get(i) {
                Some(&m) => m,
                None => last + gap * (i + 1 - self.months.len()) as u32,
            })
            .collect()
    }
}

/// Per-row maturity and step count
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSteps {
    /// NaN when a date is missing
    pub residual_months: Vec<f64>,
    pub nb_steps: Vec<usize>,
    /// Shared month grid covering the longest exposure
    pub step_months: Vec<u32>,
}

impl TimeSteps {
    pub fn max_steps(&self) -> usize {
        self.step_months.len()
    }
}

/// Compute residual maturity and step counts, and add both columns to the portfolio
///
/// Residual maturities above `max_maturity_months` (e.g. a 9999-12-31
/// sentinel) are capped there, which bounds the width of every step matrix.
pub fn apply_time_steps(
    portfolio: &mut Table,
    ladder: &StepLadder,
    columns: &PortfolioColumns,
    max_maturity_months: u32,
) -> EclResult<TimeSteps> {
    let n = portfolio.n_rows();
    let ends = portfolio
        .dates(&columns.maturity_date)
        .unwrap_or_else(|| vec![None; n]);
    let as_ofs = portfolio
        .dates(&columns.as_of_date)
        .unwrap_or_else(|| vec![None; n]);

    let cap = max_maturity_months as f64;
    let raw_months: Vec<f64> = ends
        .par_iter()
        .zip(as_ofs.par_iter())
        .map(|(end, as_of)| match (end, as_of) {
            (Some(e), Some(a)) => maturity(*e, *a),
            _ => f64::NAN,
        })
        .collect();
    let capped = raw_months.iter().filter(|m| **m > cap).count();
    if capped > 0 {
        warn!(
            "{} row(s) with residual maturity above {} months capped",
            capped, max_maturity_months
        );
    }
    let residual_months: Vec<f64> = raw_months
        .into_iter()
        .map(|m| if m > cap { cap } else { m })
        .collect();
    let nb_steps: Vec<usize> = residual_months
        .par_iter()
        .map(|&m| ladder.nb_time_steps(m))
        .collect();

    let max_steps = nb_steps.iter().copied().max().unwrap_or(0);
    let step_months = ladder.step_months(max_steps);
    let missing = residual_months.iter().filter(|m| m.is_nan()).count();

    portfolio.set_numbers(RESIDUAL_MATURITY_COLUMN, residual_months.clone())?;
    portfolio.set_column(
        NB_TIME_STEPS_COLUMN,
        nb_steps.iter().map(|&s| Value::Number(s as f64)).collect(),
    )?;

    info!(
        "Time steps: {} row(s), up to {} step(s) ({} months), {} row(s) without dates",
        n,
        max_steps,
        step_months.last().copied().unwrap_or(0),
        missing
    );
    Ok(TimeSteps {
        residual_months,
        nb_steps,
        step_months,
    })
}
