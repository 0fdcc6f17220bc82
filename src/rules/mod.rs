//! Rule-driven segmentation
//!
//! - `condition`: operator evaluation over a column
//! - `parser`: `OPERATOR: value|flags` cell syntax
//! - `builder`: drivers-in-columns sheet to long-format rules
//! - `segmentation`: rules applied to the portfolio, per model

mod builder;
mod condition;
mod parser;
mod segmentation;

pub use builder::{build_rules, curve_segments, CurveSegments, Rule, RuleRow, RuleSet};
pub use condition::{canonical_operator, evaluate, split_list, Comparison, Condition, ValueType};
pub use parser::parse_cell;
pub use segmentation::{
    apply_segmentation, seed_targets, segment_model, SegmentationSummary, MULTI_MATCH_SEPARATOR,
};

use crate::table::Table;

/// Boolean mask for a single long-format condition, looked up by driver name
///
/// A driver absent from the table gives an all-false mask.
pub fn build_condition_mask(table: &Table, row: &RuleRow) -> Vec<bool> {
    match table.column(&row.driver) {
        Some(column) => row.condition.evaluate(column),
        None => vec![false; table.n_rows()],
    }
}
