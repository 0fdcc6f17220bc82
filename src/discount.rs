//! Discount factors per exposure and time step
//!
//! Two conventions, chosen by amortization category:
//! - Quarterly: 1.0 up to 3 months, then `(1 + r/4)^(-q/4)` with `q` the
//!   previous step boundary in quarters
//! - Daily: 1.0 up to 12 months, then `(1 + r)^(-days/365)` where `days` runs
//!   from the as-of month end to the middle of the step window, the window
//!   being cut at the exposure's maturity

use crate::amortization::AmortizationCategory;
use crate::table::StepMatrix;
use chrono::{Datelike, Months, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Discounting convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountConvention {
    Quarterly,
    Daily,
}

/// Last day of the date's month
pub fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    date.with_day(1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()
}

fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(months))
}

/// Quarterly convention for one row
pub fn quarterly_factors(annual_rate: f64, step_months: &[u32]) -> Vec<f64> {
    let rate = if annual_rate.is_nan() { 0.0 } else { annual_rate };
    step_months
        .iter()
        .enumerate()
        .map(|(i, &m)| {
            if m <= 3 {
                return 1.0;
            }
            let previous = if i == 0 { 0 } else { step_months[i - 1] };
            let n_quarters = previous as f64 / 3.0;
            (1.0 + rate / 4.0).powf(-n_quarters / 4.0)
        })
        .collect()
}

/// Daily convention for one row
///
/// A missing as-of date leaves discounted steps at NaN; a missing maturity
/// leaves the window uncut.
pub fn daily_factors(
    annual_rate: f64,
    as_of_date: Option<NaiveDate>,
    maturity_date: Option<NaiveDate>,
    step_months: &[u32],
) -> Vec<f64> {
    let rate = if annual_rate.is_nan() { 0.0 } else { annual_rate };
    let as_of = as_of_date.and_then(month_end);
    step_months
        .iter()
        .enumerate()
        .map(|(i, &m)| {
            if m <= 12 {
                return 1.0;
            }
            let previous = if i == 0 { 0 } else { step_months[i - 1] };
            let Some(as_of) = as_of else {
                return f64::NAN;
            };
            let (Some(start), Some(step_end)) = (add_months(as_of, previous), add_months(as_of, m)) else {
                return f64::NAN;
            };
            let Some(mut end) = step_end.pred_opt() else {
                return f64::NAN;
            };
            if let Some(maturity) = maturity_date {
                end = end.min(maturity);
            }
            let to_start = (start - as_of).num_days() as f64;
            let window = (end - start).num_days().max(0) as f64;
            let days = to_start + window / 2.0;
            (1.0 + rate).powf(-days / 365.0)
        })
        .collect()
}

/// Discount factor matrix for the whole portfolio, in row order
///
/// Categories missing from `map` use the daily convention.
pub fn compute_discount_factors(
    categories: &[AmortizationCategory],
    map: &BTreeMap<AmortizationCategory, DiscountConvention>,
    rates: &[f64],
    as_of_dates: &[Option<NaiveDate>],
    maturity_dates: &[Option<NaiveDate>],
    step_months: &[u32],
) -> StepMatrix {
    let rows: Vec<Vec<f64>> = (0..categories.len())
        .into_par_iter()
        .map(|r| match map.get(&categories[r]).copied().unwrap_or(DiscountConvention::Daily) {
            DiscountConvention::Quarterly => quarterly_factors(rates[r], step_months),
            DiscountConvention::Daily => daily_factors(rates[r], as_of_dates[r], maturity_dates[r], step_months),
        })
        .collect();
    StepMatrix::from_rows_with_width(rows, step_months.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(date(2024, 2, 10)), Some(date(2024, 2, 29)));
        assert_eq!(month_end(date(2024, 12, 31)), Some(date(2024, 12, 31)));
    }

    #[test]
    fn test_quarterly_boundary_and_formula() {
        let df = quarterly_factors(0.04, &[3, 6, 12]);
        assert_eq!(df[0], 1.0);
        assert_eq!(df[1], (1.0 + 0.04 / 4.0f64).powf(-(3.0 / 3.0) / 4.0));
        assert_eq!(df[2], (1.0 + 0.04 / 4.0f64).powf(-(6.0 / 3.0) / 4.0));
    }

    #[test]
    fn test_quarterly_missing_rate_is_zero() {
        assert_eq!(quarterly_factors(f64::NAN, &[3, 6, 9]), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_daily_first_year_undiscounted() {
        let df = daily_factors(0.05, Some(date(2024, 12, 15)), Some(date(2030, 1, 1)), &[3, 6, 12]);
        assert_eq!(df, vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_daily_midpoint_day_count() {
        let as_of = date(2024, 12, 31);
        let df = daily_factors(0.05, Some(as_of), Some(date(2030, 1, 1)), &[12, 24]);
        // window 2025-12-31 .. 2026-12-30
        let start = date(2025, 12, 31);
        let end = date(2026, 12, 30);
        let days = (start - as_of).num_days() as f64 + (end - start).num_days() as f64 / 2.0;
        assert_eq!(df[1], 1.05f64.powf(-days / 365.0));
    }

    #[test]
    fn test_daily_window_cut_at_maturity() {
        let as_of = date(2024, 12, 31);
        let maturity = date(2026, 3, 31);
        let df = daily_factors(0.05, Some(as_of), Some(maturity), &[12, 24]);
        let start = date(2025, 12, 31);
        let days = (start - as_of).num_days() as f64 + (maturity - start).num_days() as f64 / 2.0;
        assert_eq!(df[1], 1.05f64.powf(-days / 365.0));

        // maturity before the window start: no half-window
        let df = daily_factors(0.05, Some(as_of), Some(date(2025, 6, 30)), &[12, 24]);
        assert_eq!(df[1], 1.05f64.powf(-365.0 / 365.0));
    }

    #[test]
    fn test_daily_missing_as_of() {
        let df = daily_factors(0.05, None, None, &[12, 24]);
        assert_eq!(df[0], 1.0);
        assert!(df[1].is_nan());
    }

    #[test]
    fn test_compute_by_category_keeps_order() {
        let mut map = BTreeMap::new();
        map.insert(AmortizationCategory::OnBalanceLinear, DiscountConvention::Quarterly);
        let cats = [
            AmortizationCategory::OffBalance,
            AmortizationCategory::OnBalanceLinear,
            AmortizationCategory::OnBalanceInfine,
        ];
        let as_of = Some(date(2024, 12, 31));
        let m = compute_discount_factors(
            &cats,
            &map,
            &[0.04, 0.04, 0.04],
            &[as_of, as_of, as_of],
            &[None, None, None],
            &[6, 24],
        );
        assert_eq!(m.row(1)[1], quarterly_factors(0.04, &[6, 24])[1]);
        assert_eq!(m.row(0), m.row(2));
        assert_eq!(m.row(0)[0], 1.0);
    }
}
