//! Extend and fill looked-up term structures to the required number of steps

use crate::table::StepMatrix;
use rayon::prelude::*;

/// Widen each row to `width` steps by carrying forward its last available value
///
/// Only steps beyond the curve's own columns are synthesized; blanks inside
/// the curve stay blank. A row with no value at all stays NaN.
pub fn extend_terms(terms: &StepMatrix, width: usize) -> StepMatrix {
    let present = terms.n_steps();
    let rows: Vec<Vec<f64>> = (0..terms.n_rows())
        .into_par_iter()
        .map(|r| {
            let source = terms.row(r);
            let mut row: Vec<f64> = source.iter().take(width).copied().collect();
            if width > present {
                let carry = source.iter().rev().copied().find(|v| !v.is_nan()).unwrap_or(f64::NAN);
                row.resize(width, carry);
            }
            row
        })
        .collect();
    StepMatrix::from_rows_with_width(rows, width)
}

/// Fill blank steps of LGD/CCF rows with a single rate
///
/// The rate is the curve's flat column when set, else the portfolio fallback
/// column; it is replicated across every blank step of the row. Curve values
/// that are present take precedence and are never overwritten, so a row with
/// no time-dependent curve gets the flat rate on all of its steps.
pub fn fill_terms_for_lgd_ccf(terms: &StepMatrix, flat: Option<&[f64]>, fallback: Option<&[f64]>) -> StepMatrix {
    let mut filled = terms.clone();
    for r in 0..filled.n_rows() {
        let rate = flat
            .and_then(|f| f.get(r).copied())
            .filter(|v| !v.is_nan())
            .or_else(|| fallback.and_then(|f| f.get(r).copied()).filter(|v| !v.is_nan()));
        if let Some(rate) = rate {
            for v in filled.row_mut(r).iter_mut().filter(|v| v.is_nan()) {
                *v = rate;
            }
        }
    }
    filled
}
