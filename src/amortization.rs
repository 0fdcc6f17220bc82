//! Amortization categories and EAD profiles per time step
//!
//! Every profile is zero beyond the row's own number of steps.

use crate::config::PortfolioColumns;
use crate::error::EclResult;
use crate::table::{StepMatrix, Table, Value};
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const AMORTIZATION_CATEGORY_COLUMN: &str = "AMORTIZATION_CATEGORY";

/// Balance-sheet treatment of an exposure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmortizationCategory {
    OffBalance,
    #[default]
    OnBalanceInfine,
    OnBalanceLinear,
}

impl AmortizationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmortizationCategory::OffBalance => "OFF_BALANCE",
            AmortizationCategory::OnBalanceInfine => "ON_BALANCE_INFINE",
            AmortizationCategory::OnBalanceLinear => "ON_BALANCE_LINEAR",
        }
    }
}

impl fmt::Display for AmortizationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// EAD profile shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmortizationType {
    /// Full basis until maturity
    InFine,
    /// Basis times CCF
    OffBalance,
    /// Straight-line repayment over the residual maturity
    Constant,
    /// Constant annual payment, monthly-compounded interest
    Annuity,
}

const OFF_BALANCE_CODES: &[&str] = &["H", "OFF_BALANCE", "OFF-BALANCE", "OFF BALANCE"];
const ON_BALANCE_CODES: &[&str] = &["B", "ON_BALANCE", "ON-BALANCE", "ON BALANCE"];
const INFINE_CODES: &[&str] = &["IN FINE", "I_FINE", "I FINE", "IN_FINE"];
const LINEAR_CODES: &[&str] = &["LINEAR", "M-LINEAR"];

/// Category from accounting and amortization type codes
pub fn amortization_category(accounting_type: Option<&str>, amortization_type: Option<&str>) -> AmortizationCategory {
    let accounting = accounting_type.map(|s| s.trim().to_uppercase()).unwrap_or_default();
    let amortization = amortization_type.map(|s| s.trim().to_uppercase()).unwrap_or_default();

    if OFF_BALANCE_CODES.contains(&accounting.as_str()) {
        return AmortizationCategory::OffBalance;
    }
    if ON_BALANCE_CODES.contains(&accounting.as_str()) {
        if LINEAR_CODES.contains(&amortization.as_str()) {
            return AmortizationCategory::OnBalanceLinear;
        }
        if INFINE_CODES.contains(&amortization.as_str()) {
            return AmortizationCategory::OnBalanceInfine;
        }
    }
    AmortizationCategory::default()
}

/// Categorize every row and add the AMORTIZATION_CATEGORY column
pub fn assign_categories(portfolio: &mut Table, columns: &PortfolioColumns) -> EclResult<Vec<AmortizationCategory>> {
    let n = portfolio.n_rows();
    let accounting: Vec<Option<String>> = portfolio
        .column(&columns.accounting_type)
        .map(|c| c.iter().map(Value::as_text).collect())
        .unwrap_or_else(|| vec![None; n]);
    let amortization: Vec<Option<String>> = portfolio
        .column(&columns.amortization_type)
        .map(|c| c.iter().map(Value::as_text).collect())
        .unwrap_or_else(|| vec![None; n]);

    let categories: Vec<AmortizationCategory> = accounting
        .iter()
        .zip(&amortization)
        .map(|(acc, amo)| amortization_category(acc.as_deref(), amo.as_deref()))
        .collect();

    let mut counts: BTreeMap<AmortizationCategory, usize> = BTreeMap::new();
    for c in &categories {
        *counts.entry(*c).or_insert(0) += 1;
    }
    info!(
        "Amortization categories: {}",
        counts
            .iter()
            .map(|(c, n)| format!("{}={}", c, n))
            .collect::<Vec<_>>()
            .join(", ")
    );

    portfolio.set_column(
        AMORTIZATION_CATEGORY_COLUMN,
        categories.iter().map(|c| Value::Text(c.as_str().to_string())).collect(),
    )?;
    Ok(categories)
}

/// Per-row inputs of an EAD profile
#[derive(Debug, Clone, Copy)]
pub struct EadRow<'a> {
    pub basis: f64,
    pub residual_months: f64,
    pub nb_steps: usize,
    /// Annual rate; NaN is read as 0
    pub rate: f64,
    pub ccf: &'a [f64],
}

/// EAD at each step of `step_months` for one row
pub fn ead_profile(kind: AmortizationType, row: &EadRow<'_>, step_months: &[u32]) -> Vec<f64> {
    let n = step_months.len();
    let active = row.nb_steps.min(n);
    let mut ead = vec![0.0; n];
    if active == 0 {
        return ead;
    }
    let basis = row.basis;

    match kind {
        AmortizationType::InFine => {
            ead[..active].fill(basis);
        }
        AmortizationType::OffBalance => {
            for (i, e) in ead.iter_mut().enumerate().take(active) {
                *e = basis * row.ccf.get(i).copied().unwrap_or(f64::NAN);
            }
        }
        AmortizationType::Constant => {
            // EAD_{i+1} = basis - basis / T * m_i
            let monthly = basis / row.residual_months;
            ead[0] = basis;
            for i in 1..active {
                ead[i] = (basis - monthly * step_months[i - 1] as f64).max(0.0);
            }
        }
        AmortizationType::Annuity => {
            let rate = if row.rate.is_nan() { 0.0 } else { row.rate };
            let years = row.residual_months / 12.0;
            let annual_payment = if rate == 0.0 {
                basis / years
            } else {
                basis * rate / (1.0 - (1.0 + rate).powf(-years))
            };
            ead[0] = basis;
            for i in 1..active {
                let months = if i == 1 {
                    step_months[0]
                } else {
                    step_months[i - 1] - step_months[i - 2]
                } as f64;
                let interest = ead[i - 1] * ((1.0 + rate / 12.0).powf(months) - 1.0);
                let payment = months * annual_payment / 12.0;
                ead[i] = (ead[i - 1] - (payment - interest)).max(0.0);
            }
        }
    }
    ead
}

/// EAD matrix for the whole portfolio
///
/// Categories missing from `map` use the in-fine profile.
#[allow(clippy::too_many_arguments)]
pub fn compute_ead(
    categories: &[AmortizationCategory],
    map: &BTreeMap<AmortizationCategory, AmortizationType>,
    basis: &[f64],
    residual_months: &[f64],
    nb_steps: &[usize],
    rates: &[f64],
    ccf: &StepMatrix,
    step_months: &[u32],
) -> StepMatrix {
    let rows: Vec<Vec<f64>> = (0..categories.len())
        .into_par_iter()
        .map(|r| {
            let kind = map.get(&categories[r]).copied().unwrap_or(AmortizationType::InFine);
            let ccf_row: &[f64] = if r < ccf.n_rows() { ccf.row(r) } else { &[] };
            let row = EadRow {
                basis: basis[r],
                residual_months: residual_months[r],
                nb_steps: nb_steps[r],
                rate: rates[r],
                ccf: ccf_row,
            };
            ead_profile(kind, &row, step_months)
        })
        .collect();
    StepMatrix::from_rows_with_width(rows, step_months.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const STEPS: [u32; 5] = [3, 6, 9, 12, 24];

    fn row(nb_steps: usize) -> EadRow<'static> {
        EadRow {
            basis: 1200.0,
            residual_months: 24.0,
            nb_steps,
            rate: f64::NAN,
            ccf: &[],
        }
    }

    #[test]
    fn test_category_rules() {
        assert_eq!(amortization_category(Some(" h "), None), AmortizationCategory::OffBalance);
        assert_eq!(amortization_category(Some("Off-Balance"), Some("LINEAR")), AmortizationCategory::OffBalance);
        assert_eq!(amortization_category(Some("B"), Some("m-linear")), AmortizationCategory::OnBalanceLinear);
        assert_eq!(amortization_category(Some("B"), Some("IN FINE")), AmortizationCategory::OnBalanceInfine);
        assert_eq!(amortization_category(Some("X"), Some("LINEAR")), AmortizationCategory::OnBalanceInfine);
        assert_eq!(amortization_category(None, None), AmortizationCategory::OnBalanceInfine);
    }

    #[test]
    fn test_infine_zero_beyond_steps() {
        let ead = ead_profile(AmortizationType::InFine, &row(3), &STEPS);
        assert_eq!(ead, vec![1200.0, 1200.0, 1200.0, 0.0, 0.0]);
        assert_eq!(ead_profile(AmortizationType::InFine, &row(0), &STEPS), vec![0.0; 5]);
    }

    #[test]
    fn test_off_balance_uses_ccf() {
        let ccf = [0.5, 0.4, 0.3, 0.2, 0.1];
        let r = EadRow { ccf: &ccf, ..row(2) };
        let ead = ead_profile(AmortizationType::OffBalance, &r, &STEPS);
        assert_eq!(ead, vec![600.0, 480.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_constant_amortization() {
        let ead = ead_profile(AmortizationType::Constant, &row(5), &STEPS);
        // 50 per month
        assert_eq!(ead, vec![1200.0, 1050.0, 900.0, 750.0, 600.0]);
    }

    #[test]
    fn test_annuity_zero_rate_matches_straight_line() {
        let ead = ead_profile(AmortizationType::Annuity, &row(5), &STEPS);
        assert_relative_eq!(ead[1], 1050.0, epsilon = 1e-9);
        assert_relative_eq!(ead[4], 150.0, epsilon = 1e-9);
    }

    #[test]
    fn test_annuity_with_interest_amortizes_slower() {
        let r = EadRow { rate: 0.06, ..row(5) };
        let ead = ead_profile(AmortizationType::Annuity, &r, &STEPS);
        let annual = 1200.0 * 0.06 / (1.0 - 1.06f64.powf(-2.0));
        let interest = 1200.0 * (1.005f64.powf(3.0) - 1.0);
        assert_relative_eq!(ead[1], 1200.0 - (3.0 * annual / 12.0 - interest), epsilon = 1e-9);
        assert!(ead[4] > 0.0 && ead[4] < ead[3]);
    }

    #[test]
    fn test_compute_ead_uses_map_and_default() {
        let mut map = BTreeMap::new();
        map.insert(AmortizationCategory::OnBalanceLinear, AmortizationType::Constant);
        let cats = [AmortizationCategory::OnBalanceLinear, AmortizationCategory::OffBalance];
        let ccf = StepMatrix::new(2, 5, 0.5);
        let m = compute_ead(
            &cats,
            &map,
            &[1200.0, 1000.0],
            &[24.0, 24.0],
            &[5, 2],
            &[0.0, 0.0],
            &ccf,
            &STEPS,
        );
        assert_eq!(m.row(0)[1], 1050.0);
        assert_eq!(m.row(1), &[1000.0, 1000.0, 0.0, 0.0, 0.0]);
    }
}
