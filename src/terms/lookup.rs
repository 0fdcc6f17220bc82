//! Join portfolio rows to a curve sheet for one scenario

use crate::config::TermSource;
use crate::error::{EclError, EclResult};
use crate::table::{column_key, step_columns, StepMatrix, Table};
use log::{debug, warn};
use std::collections::HashMap;

/// Step columns may also be written `TIME_STEP_N`
pub const GENERIC_STEP_PREFIX: &str = "TIME_STEP";

/// Curve values found for each portfolio row
#[derive(Debug, Clone, PartialEq)]
pub struct TermLookup {
    /// Rows x curve steps; NaN for unmatched rows and blank cells
    pub values: StepMatrix,
    /// Whether the row found a curve row
    pub matched: Vec<bool>,
    /// Joined flat-rate column, when the source has one
    pub flat: Option<Vec<f64>>,
}

impl TermLookup {
    pub fn unmatched(&self) -> usize {
        self.matched.iter().filter(|m| !**m).count()
    }
}

/// Curve step columns: `{PREFIX}_N` first, `TIME_STEP_N` for steps it lacks
fn curve_step_columns(curve: &Table, prefix: &str) -> Vec<(usize, String)> {
    let mut cols = step_columns(curve.column_names(), prefix);
    for (step, name) in step_columns(curve.column_names(), GENERIC_STEP_PREFIX) {
        if !cols.iter().any(|(s, _)| *s == step) {
            cols.push((step, name));
        }
    }
    cols.sort_by_key(|(s, _)| *s);
    cols
}

/// Curve rows whose scenario matches (trimmed, case-insensitive)
pub fn filter_scenario(curve: &Table, scenario_column: &str, scenario: &str) -> Table {
    let wanted = column_key(scenario);
    match curve.keys(scenario_column) {
        Some(keys) => {
            let mask: Vec<bool> = keys.iter().map(|k| k.as_deref() == Some(wanted.as_str())).collect();
            curve.filter_rows(&mask)
        }
        None => curve.clone(),
    }
}

/// Look up curve values per portfolio row
///
/// Keys are normalized (trimmed, upper-cased) on both sides. Curve rows with a
/// null key are dropped and duplicate keys keep the last row. Unmatched
/// portfolio rows get NaN: a missing curve is a data gap, not a failure.
pub fn get_terms(portfolio: &Table, curve: &Table, scenario: &str, source: &TermSource) -> EclResult<TermLookup> {
    let curve_keys: Vec<String> = source.join_keys.iter().map(|k| k.curve.clone()).collect();
    let missing = curve.missing_columns(&curve_keys);
    if !missing.is_empty() {
        return Err(EclError::missing_columns(source.sheet.clone(), missing));
    }

    let filtered = filter_scenario(curve, &source.scenario_column, scenario);
    let value_columns = curve_step_columns(&filtered, &source.prefix);
    let n_steps = value_columns.last().map(|(s, _)| *s).unwrap_or(0);

    let key_columns: Vec<Vec<Option<String>>> = curve_keys
        .iter()
        .map(|k| filtered.keys(k).unwrap_or_default())
        .collect();
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut dropped = 0;
    for r in 0..filtered.n_rows() {
        let key: Option<Vec<String>> = key_columns.iter().map(|col| col[r].clone()).collect();
        match key {
            Some(key) => {
                index.insert(key, r);
            }
            None => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!("{}: {} curve row(s) with a null key dropped", source.sheet, dropped);
    }

    let curve_values: Vec<(usize, Vec<f64>)> = value_columns
        .iter()
        .filter_map(|(step, name)| filtered.numbers(name).map(|v| (*step, v)))
        .collect();
    let curve_flat = source
        .flat_rate_column
        .as_deref()
        .and_then(|c| filtered.numbers(c));

    let n = portfolio.n_rows();
    let portfolio_keys: Vec<Vec<Option<String>>> = source
        .join_keys
        .iter()
        .map(|k| match portfolio.keys(&k.portfolio) {
            Some(keys) => keys,
            None => {
                warn!(
                    "{}: join column {} not in portfolio, no row can match",
                    source.sheet, k.portfolio
                );
                vec![None; n]
            }
        })
        .collect();

    let mut values = StepMatrix::new(n, n_steps, f64::NAN);
    let mut matched = vec![false; n];
    let mut flat = curve_flat.as_ref().map(|_| vec![f64::NAN; n]);

    for row in 0..n {
        let key: Option<Vec<String>> = portfolio_keys.iter().map(|col| col[row].clone()).collect();
        let Some(&curve_row) = key.as_ref().and_then(|k| index.get(k)) else {
            continue;
        };
        matched[row] = true;
        for (step, column) in &curve_values {
            values.set(row, step - 1, column[curve_row]);
        }
        if let (Some(out), Some(src)) = (flat.as_mut(), curve_flat.as_ref()) {
            out[row] = src[curve_row];
        }
    }

    let lookup = TermLookup { values, matched, flat };
    debug!(
        "{} [{}]: {} curve key(s), {} step(s), {} unmatched row(s)",
        source.sheet,
        column_key(scenario),
        index.len(),
        n_steps,
        lookup.unmatched()
    );
    Ok(lookup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationConfig;
    use crate::table::Value;

    fn pd_curve() -> Table {
        Table::from_rows(
            &["SEGMENT", "SCENARIO", "RATING", "PD_1", "PD_2", "PD_10"],
            vec![
                vec!["corp".into(), " base ".into(), "A".into(), 0.01.into(), 0.02.into(), 0.1.into()],
                vec!["CORP".into(), "BASE".into(), "A".into(), 0.011.into(), 0.021.into(), 0.11.into()],
                vec!["CORP".into(), "ADVERSE".into(), "A".into(), 0.05.into(), 0.06.into(), 0.2.into()],
                vec![Value::Null, "BASE".into(), "A".into(), 0.9.into(), 0.9.into(), 0.9.into()],
                vec!["SME".into(), "BASE".into(), 3.0.into(), 0.03.into(), Value::Null, 0.3.into()],
            ],
        )
        .unwrap()
    }

    fn portfolio() -> Table {
        Table::from_rows(
            &["CONTRACT_ID", "SEGMENT_PD", "CALCULATION_RATING"],
            vec![
                vec!["C1".into(), "Corp ".into(), "a".into()],
                vec!["C2".into(), "SME".into(), "3".into()],
                vec!["C3".into(), "UNKNOWN".into(), "A".into()],
                vec!["C4".into(), Value::Null, "A".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_get_terms_joins_and_keeps_last_duplicate() {
        let op = OperationConfig::non_retail_performing();
        let t = get_terms(&portfolio(), &pd_curve(), "Base", &op.pd).unwrap();
        assert_eq!(t.values.n_steps(), 10);
        assert_eq!(t.values.get(0, 0), 0.011);
        assert_eq!(t.values.get(0, 9), 0.11);
        assert!(t.values.get(0, 2).is_nan());
        assert_eq!(t.matched, vec![true, true, false, false]);
    }

    #[test]
    fn test_numeric_keys_match_text_keys() {
        let op = OperationConfig::non_retail_performing();
        let t = get_terms(&portfolio(), &pd_curve(), "BASE", &op.pd).unwrap();
        assert_eq!(t.values.get(1, 0), 0.03);
        assert!(t.values.get(1, 1).is_nan());
    }

    #[test]
    fn test_unmapped_rows_get_nan() {
        let op = OperationConfig::non_retail_performing();
        let t = get_terms(&portfolio(), &pd_curve(), "ADVERSE", &op.pd).unwrap();
        assert_eq!(t.values.get(0, 0), 0.05);
        assert!(t.values.row(2).iter().all(|v| v.is_nan()));
        assert_eq!(t.unmatched(), 3);
    }

    #[test]
    fn test_missing_curve_key_column_is_fatal() {
        let op = OperationConfig::non_retail_performing();
        let curve = Table::from_rows(&["SEGMENT", "SCENARIO", "PD_1"], vec![vec!["CORP".into(), "BASE".into(), 0.1.into()]]).unwrap();
        let err = get_terms(&portfolio(), &curve, "BASE", &op.pd).unwrap_err();
        assert!(matches!(err, EclError::MissingColumns { .. }));
    }

    #[test]
    fn test_time_step_columns_and_flat_rate() {
        let op = OperationConfig::non_retail_performing();
        let curve = Table::from_rows(
            &["IFRS9_MODEL_CODE", "SCENARIO", "TIME_STEP_1", "TIME_STEP_2", "LGD_WITHOUT_TIME"],
            vec![vec!["M1".into(), "BASE".into(), 0.4.into(), 0.45.into(), 0.5.into()]],
        )
        .unwrap();
        let p = Table::from_rows(&["SEGMENT_LGD"], vec![vec!["m1".into()], vec!["M2".into()]]).unwrap();
        let t = get_terms(&p, &curve, "BASE", &op.lgd).unwrap();
        assert_eq!(t.values.row(0), &[0.4, 0.45]);
        let flat = t.flat.unwrap();
        assert_eq!(flat[0], 0.5);
        assert!(flat[1].is_nan());
    }
}
