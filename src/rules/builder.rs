//! Build long-format rules from a drivers-in-columns sheet
//!
//! One sheet row is one candidate rule: a `SEGMENT` label, an optional
//! `TYPE_MODEL` and one column per driver holding an operator cell. The
//! output has one row per (rule, driver) condition.

use super::condition::{Condition, ValueType};
use super::parser::parse_cell;
use crate::config::{SegmentationSource, TypeModel};
use crate::error::EclResult;
use crate::table::{column_key, Table, Value};
use crate::table::Template;
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};

/// Sheet columns that never hold driver conditions
const RESERVED_COLUMNS: &[&str] = &["RULE_ID", "PRIORITY", "COMMENT", "COMMENTS", "DESCRIPTION"];

/// Segment labels each curve sheet defines, per model
pub type CurveSegments = HashMap<TypeModel, HashSet<String>>;

/// One (rule, driver) condition
#[derive(Debug, Clone, PartialEq)]
pub struct RuleRow {
    pub rule_id: String,
    /// Declaration order; lower runs first
    pub priority: usize,
    pub driver: String,
    pub condition: Condition,
    pub segment: String,
    pub type_model: TypeModel,
    pub target_column: String,
}

impl RuleRow {
    pub fn operator(&self) -> &str {
        self.condition.comparison.operator()
    }

    /// Operand(s) as written in the long-format table, lists joined by `|`
    pub fn value(&self) -> String {
        use super::condition::Comparison::*;
        match &self.condition.comparison {
            Eq(v) | Ne(v) | Gt(v) | Ge(v) | Lt(v) | Le(v) | Regex(v) => v.clone(),
            In(l) | NotIn(l) | Contains(l) | NotContains(l) | StartsWith(l) | EndsWith(l) => l.join("|"),
            Between(lo, _) | NotBetween(lo, _) => lo.clone(),
            IsNull | IsNotNull | Unknown(_) => String::new(),
        }
    }

    pub fn value_to(&self) -> Option<String> {
        use super::condition::Comparison::*;
        match &self.condition.comparison {
            Between(_, hi) | NotBetween(_, hi) => Some(hi.clone()),
            _ => None,
        }
    }
}

/// A rule: AND of its driver conditions
#[derive(Debug, Clone, PartialEq)]
pub struct Rule<'a> {
    pub rule_id: &'a str,
    pub priority: usize,
    pub segment: &'a str,
    pub conditions: Vec<(&'a str, &'a Condition)>,
}

/// Normalized rule table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    pub rows: Vec<RuleRow>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Models that have at least one rule
    pub fn type_models(&self) -> Vec<TypeModel> {
        let mut models: Vec<TypeModel> = self.rows.iter().map(|r| r.type_model).collect();
        models.sort();
        models.dedup();
        models
    }

    /// Segment labels declared for a model, in declaration order
    pub fn segments(&self, model: TypeModel) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|r| r.type_model == model)
            .filter(|r| seen.insert(r.segment.clone()))
            .map(|r| r.segment.clone())
            .collect()
    }

    /// Rules for a model, ordered by priority
    pub fn rules(&self, model: TypeModel) -> Vec<Rule<'_>> {
        let mut rules: Vec<Rule<'_>> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        for row in self.rows.iter().filter(|r| r.type_model == model) {
            let i = *index.entry(row.rule_id.as_str()).or_insert_with(|| {
                rules.push(Rule {
                    rule_id: &row.rule_id,
                    priority: row.priority,
                    segment: &row.segment,
                    conditions: Vec::new(),
                });
                rules.len() - 1
            });
            rules[i].conditions.push((&row.driver, &row.condition));
        }
        rules.sort_by_key(|r| r.priority);
        rules
    }

    /// Long-format export: RULE_ID, PRIORITY, DRIVER, OPERATOR, VALUE, VALUE_TO, ...
    pub fn to_table(&self) -> EclResult<Table> {
        let mut cols: Vec<(&str, Vec<Value>)> = vec![
            ("RULE_ID", Vec::new()),
            ("PRIORITY", Vec::new()),
            ("DRIVER", Vec::new()),
            ("OPERATOR", Vec::new()),
            ("VALUE", Vec::new()),
            ("VALUE_TO", Vec::new()),
            ("VALUE_TYPE", Vec::new()),
            ("CASE_SENSITIVE", Vec::new()),
            ("SEGMENT", Vec::new()),
            ("TYPE_MODEL", Vec::new()),
            ("TARGET_COLUMN", Vec::new()),
        ];
        for r in &self.rows {
            let cells: [Value; 11] = [
                r.rule_id.clone().into(),
                (r.priority as f64).into(),
                r.driver.clone().into(),
                r.operator().to_string().into(),
                r.value().into(),
                r.value_to().into(),
                r.condition.value_type.map(|t| format!("{:?}", t).to_uppercase()).into(),
                (if r.condition.case_sensitive { 1.0 } else { 0.0 }).into(),
                r.segment.clone().into(),
                r.type_model.as_str().into(),
                r.target_column.clone().into(),
            ];
            for ((_, col), cell) in cols.iter_mut().zip(cells) {
                col.push(cell);
            }
        }
        Table::from_columns(cols)
    }
}

/// Segment labels defined by each target's curve sheet (upper-cased)
pub fn curve_segments(template: &Template, source: &SegmentationSource) -> CurveSegments {
    source
        .targets
        .iter()
        .map(|t| {
            let labels: HashSet<String> = template
                .sheet(&t.curve_sheet)
                .and_then(|s| s.keys(&t.curve_segment_column))
                .map(|keys| keys.into_iter().flatten().collect())
                .unwrap_or_default();
            (t.type_model, labels)
        })
        .collect()
}

/// Models listed in a TYPE_MODEL cell, in order of first appearance
///
/// A blank cell means every configured target. Unknown tokens are skipped
/// with a warning naming the sheet row.
fn parse_models(cell: Option<&Value>, source: &SegmentationSource, row: usize) -> Vec<TypeModel> {
    let Some(text) = cell.and_then(Value::as_text) else {
        return source.targets.iter().map(|t| t.type_model).collect();
    };
    let mut models: Vec<TypeModel> = Vec::new();
    for token in text.split([',', '|', ';']).map(str::trim).filter(|t| !t.is_empty()) {
        match TypeModel::parse(token) {
            Some(model) if !models.contains(&model) => models.push(model),
            Some(_) => {}
            None => warn!("Rule row {}: unknown TYPE_MODEL '{}' ignored", row + 1, token),
        }
    }
    if models.is_empty() {
        warn!("Rule row {}: no usable TYPE_MODEL in '{}', rule skipped", row + 1, text);
    }
    models
}

/// Turn the wide rule sheet into long-format rules
///
/// `value_types` supplies a declared type per driver when the cell does not
/// set one. With `curves`, a rule is kept for a model only if that model's
/// curve sheet defines the segment.
pub fn build_rules(
    sheet: &Table,
    source: &SegmentationSource,
    value_types: &HashMap<String, ValueType>,
    curves: Option<&CurveSegments>,
) -> RuleSet {
    let segment_key = column_key(&source.segment_column);
    let model_key = column_key(&source.type_model_column);
    let drivers: Vec<&String> = sheet
        .column_names()
        .iter()
        .filter(|c| **c != segment_key && **c != model_key && !RESERVED_COLUMNS.contains(&c.as_str()))
        .collect();

    let mut rows = Vec::new();
    for r in 0..sheet.n_rows() {
        let Some(segment) = sheet.value(r, &segment_key).and_then(Value::as_text) else {
            debug!("Rule row {} has no segment, skipped", r + 1);
            continue;
        };

        let conditions: Vec<(String, Condition)> = drivers
            .iter()
            .filter_map(|d| {
                let cell = sheet.value(r, d)?.as_text()?;
                let mut condition = parse_cell(&cell)?;
                if condition.value_type.is_none() {
                    condition.value_type = value_types.get(d.as_str()).copied();
                }
                Some(((*d).clone(), condition))
            })
            .collect();
        if conditions.is_empty() {
            debug!("Rule row {} ({}) has no condition, skipped", r + 1, segment);
            continue;
        }

        let models = parse_models(sheet.value(r, &model_key), source, r);
        for model in &models {
            let Some(target) = source.target(*model) else {
                debug!("No segment target configured for {}, rule row {} skipped", model, r + 1);
                continue;
            };
            if let Some(curves) = curves {
                let defined = curves
                    .get(model)
                    .map(|set| set.contains(&segment.to_uppercase()))
                    .unwrap_or(false);
                if !defined {
                    info!(
                        "Segment {} has no {} curve in {}, rule dropped",
                        segment, model, target.curve_sheet
                    );
                    continue;
                }
            }
            let rule_id = if models.len() == 1 {
                format!("RULE_{}", r + 1)
            } else {
                format!("RULE_{}_{}", r + 1, model)
            };
            for (driver, condition) in &conditions {
                rows.push(RuleRow {
                    rule_id: rule_id.clone(),
                    priority: r,
                    driver: driver.clone(),
                    condition: condition.clone(),
                    segment: segment.clone(),
                    type_model: *model,
                    target_column: column_key(&target.target_column),
                });
            }
        }
    }

    info!("Built {} rule condition(s) from {} rule row(s)", rows.len(), sheet.n_rows());
    RuleSet { rows }
}
