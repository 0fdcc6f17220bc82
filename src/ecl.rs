//! ECL aggregation per scenario
//!
//! `ECL_i = max(EAD_i * PD_i * LGD_i * DF_i, 0)` per row and step, then
//! summed over steps whose boundary is within one year (1Y) and over all
//! steps (lifetime). Cells with a missing term are skipped in the sums.

use crate::error::EclResult;
use crate::table::{StepMatrix, Table};
use rayon::prelude::*;
use serde::Serialize;

pub fn ecl_1y_column(scenario: &str) -> String {
    format!("ECL_1Y_{}", scenario)
}

pub fn ecl_lt_column(scenario: &str) -> String {
    format!("ECL_LT_{}", scenario)
}

pub fn cumulative_pd_1y_column(scenario: &str) -> String {
    format!("CUMULATIVE_PD_1Y_{}", scenario)
}

pub fn lgd_1y_column(scenario: &str) -> String {
    format!("LGD_1Y_{}", scenario)
}

/// Sum ignoring NaN (an all-NaN row sums to 0)
fn nan_sum<I: Iterator<Item = f64>>(values: I) -> f64 {
    values.filter(|v| !v.is_nan()).sum()
}

/// Portfolio totals of one scenario
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EclTotals {
    pub scenario: String,
    pub ecl_1y: f64,
    pub ecl_lt: f64,
}

/// Per-row ECL results of one scenario
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioEcl {
    pub scenario: String,
    /// ECL per row and step
    pub ecl: StepMatrix,
    pub ecl_1y: Vec<f64>,
    pub ecl_lt: Vec<f64>,
    /// Sum of PD over steps within one year
    pub cumulative_pd_1y: Vec<f64>,
    /// LGD at the one-year step (mean if several, NaN if none)
    pub lgd_1y: Vec<f64>,
}

impl ScenarioEcl {
    pub fn totals(&self) -> EclTotals {
        EclTotals {
            scenario: self.scenario.clone(),
            ecl_1y: nan_sum(self.ecl_1y.iter().copied()),
            ecl_lt: nan_sum(self.ecl_lt.iter().copied()),
        }
    }

    /// Add ECL_1Y / ECL_LT and the 1Y PD/LGD reporting columns
    pub fn write_columns(&self, table: &mut Table) -> EclResult<()> {
        table.set_numbers(&ecl_1y_column(&self.scenario), self.ecl_1y.clone())?;
        table.set_numbers(&ecl_lt_column(&self.scenario), self.ecl_lt.clone())?;
        table.set_numbers(&cumulative_pd_1y_column(&self.scenario), self.cumulative_pd_1y.clone())?;
        table.set_numbers(&lgd_1y_column(&self.scenario), self.lgd_1y.clone())?;
        Ok(())
    }
}

/// Step grid and conventions shared by every scenario of a run
#[derive(Debug, Clone, PartialEq)]
pub struct EclAggregator {
    pub step_months: Vec<u32>,
    pub one_year_months: u32,
    pub rounding_decimals: i32,
}

impl EclAggregator {
    pub fn new(step_months: Vec<u32>, one_year_months: u32, rounding_decimals: i32) -> Self {
        Self {
            step_months,
            one_year_months,
            rounding_decimals,
        }
    }

    pub fn n_steps(&self) -> usize {
        self.step_months.len()
    }

    /// PD/LGD/CCF rounding applied before any multiplication
    pub fn round_terms(&self, terms: &StepMatrix) -> StepMatrix {
        terms.rounded(self.rounding_decimals)
    }

    fn within_one_year(&self) -> Vec<bool> {
        self.step_months.iter().map(|&m| m <= self.one_year_months).collect()
    }

    /// Aggregate one scenario; `pd` and `lgd` are rounded here
    pub fn aggregate(
        &self,
        scenario: &str,
        ead: &StepMatrix,
        pd: &StepMatrix,
        lgd: &StepMatrix,
        df: &StepMatrix,
    ) -> ScenarioEcl {
        let n_steps = self.n_steps();
        let pd = self.round_terms(&pd.with_width(n_steps, f64::NAN));
        let lgd = self.round_terms(&lgd.with_width(n_steps, f64::NAN));
        let ead = ead.with_width(n_steps, f64::NAN);
        let df = df.with_width(n_steps, f64::NAN);
        let one_year = self.within_one_year();
        let at_one_year: Vec<usize> = self
            .step_months
            .iter()
            .enumerate()
            .filter(|(_, &m)| m == self.one_year_months)
            .map(|(i, _)| i)
            .collect();

        let rows: Vec<(Vec<f64>, f64, f64, f64, f64)> = (0..ead.n_rows())
            .into_par_iter()
            .map(|r| {
                let ecl: Vec<f64> = (0..n_steps)
                    .map(|i| {
                        let v = ead.get(r, i) * pd.get(r, i) * lgd.get(r, i) * df.get(r, i);
                        if v.is_nan() {
                            v
                        } else {
                            v.max(0.0)
                        }
                    })
                    .collect();
                let lt = nan_sum(ecl.iter().copied());
                let y1 = nan_sum(ecl.iter().zip(&one_year).filter(|(_, &y)| y).map(|(v, _)| *v));
                let pd_1y = nan_sum(pd.row(r).iter().zip(&one_year).filter(|(_, &y)| y).map(|(v, _)| *v));
                let lgd_values: Vec<f64> = at_one_year
                    .iter()
                    .map(|&i| lgd.get(r, i))
                    .filter(|v| !v.is_nan())
                    .collect();
                let lgd_1y = if lgd_values.is_empty() {
                    f64::NAN
                } else {
                    lgd_values.iter().sum::<f64>() / lgd_values.len() as f64
                };
                (ecl, y1, lt, pd_1y, lgd_1y)
            })
            .collect();

        let mut ecl_rows = Vec::with_capacity(rows.len());
        let mut ecl_1y = Vec::with_capacity(rows.len());
        let mut ecl_lt = Vec::with_capacity(rows.len());
        let mut cumulative_pd_1y = Vec::with_capacity(rows.len());
        let mut lgd_1y = Vec::with_capacity(rows.len());
        for (ecl, y1, lt, pd1, lgd1) in rows {
            ecl_rows.push(ecl);
            ecl_1y.push(y1);
            ecl_lt.push(lt);
            cumulative_pd_1y.push(pd1);
            lgd_1y.push(lgd1);
        }

        ScenarioEcl {
            scenario: scenario.to_string(),
            ecl: StepMatrix::from_rows_with_width(ecl_rows, n_steps),
            ecl_1y,
            ecl_lt,
            cumulative_pd_1y,
            lgd_1y,
        }
    }
}
