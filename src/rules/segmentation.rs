//! Segmentation engine: apply rules to the portfolio
//!
//! For each model, a row collects the set of segments of every rule whose
//! conditions all hold:
//! - one segment: written to the target column
//! - several: sorted labels joined by ", " and the multi-match flag set to 1
//! - none: the target keeps its seeded value

use super::builder::{Rule, RuleSet};
use crate::config::{SegmentationSource, TypeModel};
use crate::error::EclResult;
use crate::table::{Table, Value};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Separator between labels of a multi-matched row
pub const MULTI_MATCH_SEPARATOR: &str = ", ";

/// Reconciliation of declared vs matched segments for one model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentationSummary {
    pub type_model: Option<TypeModel>,
    pub target_column: String,
    /// Segments declared by the rules, in declaration order
    pub declared: Vec<String>,
    /// Rows matched per segment (multi-matched rows count for each label)
    pub matched: BTreeMap<String, usize>,
    /// Declared segments that matched no row
    pub dead: Vec<String>,
    /// Segments involved in at least one multi-match
    pub multi_matched: Vec<String>,
    pub multi_match_rows: usize,
    /// Rows left on their seeded value
    pub unmatched_rows: usize,
}

/// Initialize each target column from its seed column
///
/// Existing target columns are left as they are; a missing seed gives nulls.
pub fn seed_targets(portfolio: &mut Table, source: &SegmentationSource) -> EclResult<()> {
    for target in &source.targets {
        if portfolio.has_column(&target.target_column) {
            continue;
        }
        let seeded = target
            .seed_column
            .as_deref()
            .and_then(|seed| portfolio.column(seed))
            .map(|c| c.to_vec())
            .unwrap_or_else(|| vec![Value::Null; portfolio.n_rows()]);
        portfolio.set_column(&target.target_column, seeded)?;
    }
    Ok(())
}

/// Rows where every condition of the rule holds
fn rule_mask(portfolio: &Table, rule: &Rule<'_>) -> Vec<bool> {
    let mut mask = vec![true; portfolio.n_rows()];
    for (driver, condition) in &rule.conditions {
        let Some(column) = portfolio.column(driver) else {
            warn!(
                "{}: driver column {} not in portfolio, rule matches no row",
                rule.rule_id, driver
            );
            return vec![false; portfolio.n_rows()];
        };
        for (m, hit) in mask.iter_mut().zip(condition.evaluate(column)) {
            *m = *m && hit;
        }
    }
    mask
}

/// Apply one model's rules; returns its summary
pub fn segment_model(
    portfolio: &mut Table,
    rules: &RuleSet,
    model: TypeModel,
    source: &SegmentationSource,
) -> EclResult<SegmentationSummary> {
    let model_rules = rules.rules(model);
    let target = match (source.target(model), model_rules.first()) {
        (Some(t), _) => t.target_column.clone(),
        (None, Some(r)) => rules
            .rows
            .iter()
            .find(|row| row.rule_id == r.rule_id)
            .map(|row| row.target_column.clone())
            .unwrap_or_else(|| format!("SEGMENT_{}", model)),
        (None, None) => format!("SEGMENT_{}", model),
    };
    let flag_column = source
        .target(model)
        .map(|t| t.multi_match_column.clone())
        .unwrap_or_else(|| format!("MULTI_MATCH_{}", model));

    let masks: Vec<Vec<bool>> = {
        let view: &Table = portfolio;
        model_rules.par_iter().map(|rule| rule_mask(view, rule)).collect()
    };

    let n = portfolio.n_rows();
    let mut current: Vec<Value> = portfolio
        .column(&target)
        .map(|c| c.to_vec())
        .unwrap_or_else(|| vec![Value::Null; n]);
    let mut flags = vec![0.0; n];

    let mut summary = SegmentationSummary {
        type_model: Some(model),
        target_column: target.clone(),
        declared: rules.segments(model),
        ..Default::default()
    };
    let mut multi: BTreeSet<String> = BTreeSet::new();

    for row in 0..n {
        let hits: BTreeSet<&str> = model_rules
            .iter()
            .zip(&masks)
            .filter(|(_, mask)| mask[row])
            .map(|(rule, _)| rule.segment)
            .collect();
        for seg in &hits {
            *summary.matched.entry(seg.to_string()).or_insert(0) += 1;
        }
        match hits.len() {
            0 => summary.unmatched_rows += 1,
            1 => {
                if let Some(seg) = hits.iter().next() {
                    current[row] = Value::Text(seg.to_string());
                }
            }
            _ => {
                let labels: Vec<&str> = hits.iter().copied().collect();
                current[row] = Value::Text(labels.join(MULTI_MATCH_SEPARATOR));
                flags[row] = 1.0;
                summary.multi_match_rows += 1;
                multi.extend(labels.iter().map(|s| s.to_string()));
            }
        }
    }

    summary.dead = summary
        .declared
        .iter()
        .filter(|s| !summary.matched.contains_key(*s))
        .cloned()
        .collect();
    summary.multi_matched = multi.into_iter().collect();

    portfolio.set_column(&target, current)?;
    portfolio.set_numbers(&flag_column, flags)?;

    info!(
        "Segmentation {}: {} rule(s), {} segment(s) matched, {} row(s) left on seed",
        model,
        model_rules.len(),
        summary.matched.len(),
        summary.unmatched_rows
    );
    if !summary.dead.is_empty() {
        info!("Segmentation {}: no row matched {}", model, summary.dead.join(", "));
    }
    if summary.multi_match_rows > 0 {
        warn!(
            "Segmentation {}: {} row(s) matched several segments ({})",
            model,
            summary.multi_match_rows,
            summary.multi_matched.join(", ")
        );
    }
    Ok(summary)
}

/// Seed targets then apply the rules of every model present in the rule set
pub fn apply_segmentation(
    portfolio: &mut Table,
    rules: &RuleSet,
    source: &SegmentationSource,
) -> EclResult<Vec<SegmentationSummary>> {
    seed_targets(portfolio, source)?;
    rules
        .type_models()
        .into_iter()
        .map(|model| segment_model(portfolio, rules, model, source))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationConfig;
    use crate::rules::build_rules;
    use std::collections::HashMap;

    fn portfolio() -> Table {
        Table::from_rows(
            &["CONTRACT_ID", "COUNTERPARTY_TYPE", "EXPOSURE_AMOUNT", "IFRS9_PD_MODEL_AFTER_CRM"],
            vec![
                vec!["C1".into(), "CORPORATE".into(), 2_000_000.0.into(), "SEED_1".into()],
                vec!["C2".into(), "CORPORATE".into(), 500.0.into(), "SEED_2".into()],
                vec!["C3".into(), "RETAIL".into(), 100.0.into(), "SEED_3".into()],
            ],
        )
        .unwrap()
    }

    fn sheet(rows: Vec<Vec<Value>>) -> Table {
        Table::from_rows(&["SEGMENT", "TYPE_MODEL", "COUNTERPARTY_TYPE", "EXPOSURE_AMOUNT"], rows).unwrap()
    }

    #[test]
    fn test_single_match_and_seed_fallback() {
        let op = OperationConfig::non_retail_performing();
        let rules = build_rules(
            &sheet(vec![
                vec!["B".into(), "PD".into(), "EQ: CORPORATE".into(), "GE: 1000".into()],
                vec!["A".into(), "PD".into(), "EQ: CORPORATE".into(), "LT: 1000".into()],
            ]),
            &op.segmentation,
            &HashMap::new(),
            None,
        );
        let mut p = portfolio();
        let summaries = apply_segmentation(&mut p, &rules, &op.segmentation).unwrap();

        let seg = p.keys("SEGMENT_PD").unwrap();
        assert_eq!(seg, vec![Some("B".into()), Some("A".into()), Some("SEED_3".into())]);
        assert_eq!(p.numbers("MULTI_MATCH_PD").unwrap(), vec![0.0, 0.0, 0.0]);

        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].unmatched_rows, 1);
        assert!(summaries[0].dead.is_empty());
    }

    #[test]
    fn test_multi_match_reports_all_labels() {
        let op = OperationConfig::non_retail_performing();
        let rules = build_rules(
            &sheet(vec![
                vec!["B".into(), "PD".into(), "EQ: CORPORATE".into(), Value::Null],
                vec!["A".into(), "PD".into(), Value::Null, "GT: 0".into()],
                vec!["A".into(), "PD".into(), "EQ: CORPORATE".into(), Value::Null],
            ]),
            &op.segmentation,
            &HashMap::new(),
            None,
        );
        let mut p = portfolio();
        let summaries = apply_segmentation(&mut p, &rules, &op.segmentation).unwrap();

        let seg = p.keys("SEGMENT_PD").unwrap();
        assert_eq!(seg[0].as_deref(), Some("A, B"));
        assert_eq!(seg[2].as_deref(), Some("A"));
        assert_eq!(p.numbers("MULTI_MATCH_PD").unwrap(), vec![1.0, 1.0, 0.0]);
        assert_eq!(summaries[0].multi_match_rows, 2);
        assert_eq!(summaries[0].multi_matched, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_missing_driver_never_matches() {
        let op = OperationConfig::non_retail_performing();
        let s = Table::from_rows(
            &["SEGMENT", "TYPE_MODEL", "SECTOR"],
            vec![vec!["X".into(), "PD".into(), "EQ: BANK".into()]],
        )
        .unwrap();
        let rules = build_rules(&s, &op.segmentation, &HashMap::new(), None);
        let mut p = portfolio();
        let summaries = apply_segmentation(&mut p, &rules, &op.segmentation).unwrap();
        assert_eq!(summaries[0].dead, vec!["X".to_string()]);
        assert_eq!(p.keys("SEGMENT_PD").unwrap()[0].as_deref(), Some("SEED_1"));
    }

    #[test]
    fn test_unseeded_target_is_null() {
        let op = OperationConfig::non_retail_performing();
        let mut p = portfolio();
        seed_targets(&mut p, &op.segmentation).unwrap();
        assert_eq!(p.value(0, "SEGMENT_LGD"), Some(&Value::Null));
        assert_eq!(p.value(0, "SEGMENT_PD"), Some(&Value::Text("SEED_1".into())));
    }

    #[test]
    fn test_rerun_is_deterministic() {
        let op = OperationConfig::non_retail_performing();
        let rules = build_rules(
            &sheet(vec![
                vec!["Z".into(), "PD".into(), "IN: CORPORATE,RETAIL".into(), Value::Null],
                vec!["Y".into(), "PD".into(), Value::Null, "BETWEEN: 100..600".into()],
            ]),
            &op.segmentation,
            &HashMap::new(),
            None,
        );
        let mut a = portfolio();
        let mut b = portfolio();
        apply_segmentation(&mut a, &rules, &op.segmentation).unwrap();
        apply_segmentation(&mut b, &rules, &op.segmentation).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.keys("SEGMENT_PD").unwrap()[1].as_deref(), Some("Y, Z"));
    }
}
