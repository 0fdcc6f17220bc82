//! Scenario weights and probability-weighted ECL
//!
//! Weights are validated in full before any column is written: every
//! computed scenario needs a weight, no unknown scenario may carry one, no
//! weight is negative and the weights sum to 1.

use crate::ecl::{ecl_1y_column, ecl_lt_column};
use crate::error::{EclError, EclResult, WeightError};
use crate::table::Table;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ECL_1Y_MULTI: &str = "ECL_1Y_MULTI";
pub const ECL_LT_MULTI: &str = "ECL_LT_MULTI";

const SUM_RTOL: f64 = 1e-5;
const SUM_ATOL: f64 = 1e-8;

/// Tolerant float equality used for the weight sum
pub fn is_close(a: f64, b: f64) -> bool {
    (a - b).abs() <= SUM_ATOL + SUM_RTOL * b.abs()
}

/// Weight per scenario name (names upper-cased)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioWeights {
    weights: BTreeMap<String, f64>,
}

impl ScenarioWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<S: AsRef<str>>(pairs: &[(S, f64)]) -> Self {
        let mut w = Self::new();
        for (name, weight) in pairs {
            w.insert(name.as_ref(), *weight);
        }
        w
    }

    /// Parse a `NAME=WEIGHT` argument
    pub fn parse_pair(arg: &str) -> Result<(String, f64), String> {
        let (name, weight) = arg
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=WEIGHT, got '{}'", arg))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("empty scenario name in '{}'", arg));
        }
        let weight: f64 = weight
            .trim()
            .parse()
            .map_err(|_| format!("invalid weight in '{}'", arg))?;
        Ok((name.to_uppercase(), weight))
    }

    pub fn insert(&mut self, scenario: &str, weight: f64) {
        self.weights.insert(scenario.trim().to_uppercase(), weight);
    }

    pub fn get(&self, scenario: &str) -> Option<f64> {
        self.weights.get(&scenario.trim().to_uppercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Check the weights against the computed scenarios
    pub fn validate(&self, scenarios: &[String]) -> Result<(), WeightError> {
        let wanted: Vec<String> = scenarios.iter().map(|s| s.trim().to_uppercase()).collect();

        let missing: Vec<String> = wanted
            .iter()
            .filter(|s| !self.weights.contains_key(*s))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(WeightError::Missing(missing));
        }

        let extra: Vec<String> = self
            .weights
            .keys()
            .filter(|k| !wanted.contains(k))
            .cloned()
            .collect();
        if !extra.is_empty() {
            return Err(WeightError::Extra(extra));
        }

        if let Some((scenario, weight)) = self.weights.iter().find(|(_, w)| **w < 0.0 || w.is_nan()) {
            return Err(WeightError::Negative {
                scenario: scenario.clone(),
                weight: *weight,
            });
        }

        let sum = self.sum();
        if !is_close(sum, 1.0) {
            return Err(WeightError::BadSum { sum });
        }
        Ok(())
    }
}

/// Weighted ECL per row
#[derive(Debug, Clone, PartialEq)]
pub struct MultiEcl {
    pub ecl_1y: Vec<f64>,
    pub ecl_lt: Vec<f64>,
}

impl MultiEcl {
    pub fn total_1y(&self) -> f64 {
        self.ecl_1y.iter().filter(|v| !v.is_nan()).sum()
    }

    pub fn total_lt(&self) -> f64 {
        self.ecl_lt.iter().filter(|v| !v.is_nan()).sum()
    }
}

fn ecl_column(portfolio: &Table, column: &str, scenario: &str) -> EclResult<Vec<f64>> {
    portfolio.numbers(column).ok_or_else(|| EclError::UnknownScenario {
        scenario: scenario.to_string(),
    })
}

/// Add ECL_1Y_MULTI / ECL_LT_MULTI as the weighted sum of the per-scenario
/// ECL columns
pub fn calcul_ecl_multi(portfolio: &mut Table, scenarios: &[String], weights: &ScenarioWeights) -> EclResult<MultiEcl> {
    weights.validate(scenarios)?;

    let n = portfolio.n_rows();
    let mut ecl_1y = vec![0.0; n];
    let mut ecl_lt = vec![0.0; n];
    for scenario in scenarios {
        let w = weights.get(scenario).unwrap_or(0.0);
        let y1 = ecl_column(portfolio, &ecl_1y_column(scenario), scenario)?;
        let lt = ecl_column(portfolio, &ecl_lt_column(scenario), scenario)?;
        for r in 0..n {
            ecl_1y[r] += w * y1[r];
            ecl_lt[r] += w * lt[r];
        }
    }

    portfolio.set_numbers(ECL_1Y_MULTI, ecl_1y.clone())?;
    portfolio.set_numbers(ECL_LT_MULTI, ecl_lt.clone())?;
    let multi = MultiEcl { ecl_1y, ecl_lt };
    info!(
        "Weighted ECL over {} scenario(s): 1Y={:.2} LT={:.2}",
        scenarios.len(),
        multi.total_1y(),
        multi.total_lt()
    );
    Ok(multi)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;
    use approx::assert_relative_eq;

    fn scenarios() -> Vec<String> {
        vec!["BASE".into(), "ADVERSE".into(), "SEVERE".into()]
    }

    fn portfolio() -> Table {
        let names = [
            "CONTRACT_ID",
            "ECL_1Y_BASE",
            "ECL_LT_BASE",
            "ECL_1Y_ADVERSE",
            "ECL_LT_ADVERSE",
            "ECL_1Y_SEVERE",
            "ECL_LT_SEVERE",
        ];
        let rows: Vec<Vec<Value>> = vec![
            vec!["A".into(), 10.0.into(), 20.0.into(), 20.0.into(), 40.0.into(), 30.0.into(), 60.0.into()],
            vec!["B".into(), 1.0.into(), 2.0.into(), 2.0.into(), 3.0.into(), 4.0.into(), 5.0.into()],
        ];
        Table::from_rows(&names, rows).unwrap()
    }

    #[test]
    fn test_missing_weight_rejected() {
        let mut t = portfolio();
        let w = ScenarioWeights::from_pairs(&[("BASE", 0.5), ("ADVERSE", 0.3)]);
        let err = calcul_ecl_multi(&mut t, &scenarios(), &w).unwrap_err();
        assert!(matches!(
            err,
            EclError::InvalidWeights(WeightError::Missing(ref m)) if m == &vec!["SEVERE".to_string()]
        ));
        assert!(!t.has_column(ECL_1Y_MULTI));
    }

    #[test]
    fn test_weighted_sum() {
        let mut t = portfolio();
        let w = ScenarioWeights::from_pairs(&[("BASE", 0.4), ("ADVERSE", 0.3), ("SEVERE", 0.3)]);
        let multi = calcul_ecl_multi(&mut t, &scenarios(), &w).unwrap();
        assert_relative_eq!(multi.ecl_1y[0], 0.4 * 10.0 + 0.3 * 20.0 + 0.3 * 30.0, epsilon = 1e-12);
        assert_relative_eq!(multi.ecl_lt[1], 0.4 * 2.0 + 0.3 * 3.0 + 0.3 * 5.0, epsilon = 1e-12);
        let col = t.numbers(ECL_LT_MULTI).unwrap();
        assert_relative_eq!(col[0], 0.4 * 20.0 + 0.3 * 40.0 + 0.3 * 60.0, epsilon = 1e-12);
    }

    #[test]
    fn test_extra_negative_and_sum_checks() {
        let s = scenarios();
        let extra = ScenarioWeights::from_pairs(&[("BASE", 0.4), ("ADVERSE", 0.3), ("SEVERE", 0.3), ("UP", 0.0)]);
        assert_eq!(extra.validate(&s), Err(WeightError::Extra(vec!["UP".to_string()])));

        let negative = ScenarioWeights::from_pairs(&[("BASE", 1.2), ("ADVERSE", -0.5), ("SEVERE", 0.3)]);
        assert!(matches!(negative.validate(&s), Err(WeightError::Negative { .. })));

        let bad_sum = ScenarioWeights::from_pairs(&[("BASE", 0.4), ("ADVERSE", 0.3), ("SEVERE", 0.2)]);
        assert!(matches!(bad_sum.validate(&s), Err(WeightError::BadSum { .. })));
    }

    #[test]
    fn test_sum_tolerance() {
        let w = ScenarioWeights::from_pairs(&[("BASE", 0.1), ("ADVERSE", 0.2), ("SEVERE", 0.7)]);
        assert!(w.validate(&scenarios()).is_ok());
        assert!(is_close(1.0 + 1e-9, 1.0));
        assert!(!is_close(1.001, 1.0));
    }

    #[test]
    fn test_names_are_case_insensitive() {
        let w = ScenarioWeights::from_pairs(&[("base", 0.5), (" Adverse", 0.25), ("severe", 0.25)]);
        assert!(w.validate(&scenarios()).is_ok());
        assert_eq!(w.get("Base"), Some(0.5));
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(ScenarioWeights::parse_pair("base=0.4"), Ok(("BASE".to_string(), 0.4)));
        assert!(ScenarioWeights::parse_pair("base").is_err());
        assert!(ScenarioWeights::parse_pair("=0.4").is_err());
        assert!(ScenarioWeights::parse_pair("base=x").is_err());
    }

    #[test]
    fn test_missing_scenario_column() {
        let mut t = Table::from_rows(&["ECL_1Y_BASE", "ECL_LT_BASE"], vec![vec![1.0.into(), 1.0.into()]]).unwrap();
        let w = ScenarioWeights::from_pairs(&[("BASE", 0.5), ("OTHER", 0.5)]);
        let err = calcul_ecl_multi(&mut t, &["BASE".into(), "OTHER".into()], &w).unwrap_err();
        assert!(matches!(err, EclError::UnknownScenario { .. }));
    }
}
