//! Condition evaluator: one operator applied to a portfolio column
//!
//! A condition never drops or reorders rows: the mask has exactly one entry
//! per input cell. Missing or unparseable cells match only `IS NULL`; every
//! other operator (negated ones included) yields `false` for them, so a
//! malformed cell can never falsely place an exposure in a segment.

use crate::table::{parse_date, parse_number, Value};
use chrono::NaiveDate;
use log::warn;
use rayon::prelude::*;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Explicit coercion applied to both sides of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValueType {
    Number,
    Date,
    String,
}

impl ValueType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "num" | "number" | "numeric" | "float" | "int" | "integer" => Some(ValueType::Number),
            "date" | "datetime" => Some(ValueType::Date),
            "str" | "string" | "text" => Some(ValueType::String),
            _ => None,
        }
    }
}

/// Operator with its operands, still string-encoded
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(String),
    Ne(String),
    In(Vec<String>),
    NotIn(Vec<String>),
    Gt(String),
    Ge(String),
    Lt(String),
    Le(String),
    /// `[low, high)`
    Between(String, String),
    NotBetween(String, String),
    Contains(Vec<String>),
    NotContains(Vec<String>),
    StartsWith(Vec<String>),
    EndsWith(Vec<String>),
    /// First list value is the pattern
    Regex(String),
    IsNull,
    IsNotNull,
    /// Unrecognized operator token; matches nothing
    Unknown(String),
}

/// Operator token normalized to its canonical spelling
pub fn canonical_operator(token: &str) -> String {
    let upper = token.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    let canonical = match upper.as_str() {
        "=" | "==" | "EQUAL" | "EQUALS" => "EQ",
        "!=" | "<>" | "NOT EQUAL" => "NE",
        ">" => "GT",
        ">=" => "GE",
        "<" => "LT",
        "<=" => "LE",
        "NOT_IN" | "NIN" => "NOT IN",
        "NOT_BETWEEN" => "NOT BETWEEN",
        "NOT_CONTAINS" => "NOT CONTAINS",
        "STARTS_WITH" | "STARTSWITH" => "STARTS WITH",
        "ENDS_WITH" | "ENDSWITH" => "ENDS WITH",
        "IS_NULL" | "ISNULL" => "IS NULL",
        "IS_NOT_NULL" | "NOTNULL" => "IS NOT NULL",
        other => other,
    };
    canonical.to_string()
}

impl Comparison {
    /// Build from an operator token and operands
    pub fn from_parts(operator: &str, values: Vec<String>, value_to: Option<String>) -> Self {
        let first = values.first().cloned().unwrap_or_default();
        match canonical_operator(operator).as_str() {
            "EQ" => Comparison::Eq(first),
            "NE" => Comparison::Ne(first),
            "IN" => Comparison::In(values),
            "NOT IN" => Comparison::NotIn(values),
            "GT" => Comparison::Gt(first),
            "GE" => Comparison::Ge(first),
            "LT" => Comparison::Lt(first),
            "LE" => Comparison::Le(first),
            "BETWEEN" => {
                let (lo, hi) = bounds(&values, value_to);
                Comparison::Between(lo, hi)
            }
            "NOT BETWEEN" => {
                let (lo, hi) = bounds(&values, value_to);
                Comparison::NotBetween(lo, hi)
            }
            "CONTAINS" => Comparison::Contains(values),
            "NOT CONTAINS" => Comparison::NotContains(values),
            "STARTS WITH" => Comparison::StartsWith(values),
            "ENDS WITH" => Comparison::EndsWith(values),
            "REGEX" => Comparison::Regex(first),
            "IS NULL" => Comparison::IsNull,
            "IS NOT NULL" => Comparison::IsNotNull,
            other => Comparison::Unknown(other.to_string()),
        }
    }

    pub fn operator(&self) -> &str {
        match self {
            Comparison::Eq(_) => "EQ",
            Comparison::Ne(_) => "NE",
            Comparison::In(_) => "IN",
            Comparison::NotIn(_) => "NOT IN",
            Comparison::Gt(_) => "GT",
            Comparison::Ge(_) => "GE",
            Comparison::Lt(_) => "LT",
            Comparison::Le(_) => "LE",
            Comparison::Between(..) => "BETWEEN",
            Comparison::NotBetween(..) => "NOT BETWEEN",
            Comparison::Contains(_) => "CONTAINS",
            Comparison::NotContains(_) => "NOT CONTAINS",
            Comparison::StartsWith(_) => "STARTS WITH",
            Comparison::EndsWith(_) => "ENDS WITH",
            Comparison::Regex(_) => "REGEX",
            Comparison::IsNull => "IS NULL",
            Comparison::IsNotNull => "IS NOT NULL",
            Comparison::Unknown(op) => op,
        }
    }
}

fn bounds(values: &[String], value_to: Option<String>) -> (String, String) {
    let lo = values.first().cloned().unwrap_or_default();
    let hi = value_to.or_else(|| values.get(1).cloned()).unwrap_or_default();
    (lo, hi)
}

/// A comparison plus the coercion options it is evaluated with
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub comparison: Comparison,
    pub value_type: Option<ValueType>,
    pub case_sensitive: bool,
}

/// One side of a comparison after coercion
#[derive(Debug, Clone, Default)]
struct Scalar {
    text: Option<String>,
    number: Option<f64>,
    date: Option<NaiveDate>,
}

impl Condition {
    pub fn new(comparison: Comparison) -> Self {
        Self {
            comparison,
            value_type: None,
            case_sensitive: false,
        }
    }

    pub fn with_value_type(mut self, value_type: Option<ValueType>) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Build from the long-format rule fields
    pub fn from_parts(
        operator: &str,
        value: &str,
        value_to: Option<&str>,
        value_type: Option<ValueType>,
        case_sensitive: bool,
    ) -> Self {
        let values = if canonical_operator(operator) == "REGEX" {
            vec![strip_quotes(value)]
        } else {
            split_list(value)
        };
        let comparison = Comparison::from_parts(operator, values, value_to.map(str::to_string));
        Self {
            comparison,
            value_type,
            case_sensitive,
        }
    }

    fn fold(&self, s: &str) -> String {
        if self.case_sensitive {
            s.to_string()
        } else {
            s.to_uppercase()
        }
    }

    fn cell(&self, v: &Value) -> Option<Scalar> {
        match self.value_type {
            Some(ValueType::Number) => v.as_number().map(|n| Scalar {
                number: Some(n),
                ..Default::default()
            }),
            Some(ValueType::Date) => v.as_date().map(|d| Scalar {
                date: Some(d),
                ..Default::default()
            }),
            Some(ValueType::String) => v.as_text().map(|t| Scalar {
                text: Some(self.fold(&t)),
                ..Default::default()
            }),
            None => {
                if v.is_null() {
                    return None;
                }
                Some(Scalar {
                    text: v.as_text().map(|t| self.fold(&t)),
                    number: v.as_number(),
                    date: v.as_date(),
                })
            }
        }
    }

    fn operand(&self, raw: &str) -> Scalar {
        let raw = raw.trim();
        match self.value_type {
            Some(ValueType::Number) => Scalar {
                number: parse_number(raw),
                ..Default::default()
            },
            Some(ValueType::Date) => Scalar {
                date: parse_date(raw),
                ..Default::default()
            },
            Some(ValueType::String) => Scalar {
                text: Some(self.fold(raw)),
                ..Default::default()
            },
            None => Scalar {
                text: Some(self.fold(raw)),
                number: parse_number(raw),
                date: parse_date(raw),
            },
        }
    }

    /// Boolean mask over `column`
    pub fn evaluate(&self, column: &[Value]) -> Vec<bool> {
        match &self.comparison {
            Comparison::IsNull => return column.par_iter().map(|v| self.cell(v).is_none()).collect(),
            Comparison::IsNotNull => return column.par_iter().map(|v| self.cell(v).is_some()).collect(),
            Comparison::Unknown(op) => {
                warn!("Unknown operator '{}': condition matches no row", op);
                return vec![false; column.len()];
            }
            Comparison::Regex(pattern) => return self.evaluate_regex(column, pattern),
            _ => {}
        }

        let test = self.compile();
        column
            .par_iter()
            .map(|v| match self.cell(v) {
                Some(cell) => test.matches(&cell),
                None => false,
            })
            .collect()
    }

    fn evaluate_regex(&self, column: &[Value], pattern: &str) -> Vec<bool> {
        let re = match RegexBuilder::new(pattern.trim())
            .case_insensitive(!self.case_sensitive)
            .build()
        {
            Ok(re) => re,
            Err(e) => {
                warn!("Invalid REGEX pattern '{}': {}", pattern, e);
                return vec![false; column.len()];
            }
        };
        column
            .par_iter()
            .map(|v| v.as_text().map(|t| re.is_match(&t)).unwrap_or(false))
            .collect()
    }

    fn compile(&self) -> Compiled {
        let one = |s: &String| self.operand(s);
        let many = |list: &Vec<String>| list.iter().map(|s| self.operand(s)).collect::<Vec<_>>();
        let texts = |list: &Vec<String>| list.iter().map(|s| self.fold(s.trim())).collect::<Vec<_>>();
        match &self.comparison {
            Comparison::Eq(v) => Compiled::Eq(one(v)),
            Comparison::Ne(v) => Compiled::Ne(one(v)),
            Comparison::In(l) => Compiled::In(many(l), false),
            Comparison::NotIn(l) => Compiled::In(many(l), true),
            Comparison::Gt(v) => Compiled::Order(one(v), |o| o == Ordering::Greater),
            Comparison::Ge(v) => Compiled::Order(one(v), |o| o != Ordering::Less),
            Comparison::Lt(v) => Compiled::Order(one(v), |o| o == Ordering::Less),
            Comparison::Le(v) => Compiled::Order(one(v), |o| o != Ordering::Greater),
            Comparison::Between(lo, hi) => Compiled::Between(one(lo), one(hi), false),
            Comparison::NotBetween(lo, hi) => Compiled::Between(one(lo), one(hi), true),
            Comparison::Contains(l) => Compiled::Text(texts(l), TextTest::Contains, false),
            Comparison::NotContains(l) => Compiled::Text(texts(l), TextTest::Contains, true),
            Comparison::StartsWith(l) => Compiled::Text(texts(l), TextTest::StartsWith, false),
            Comparison::EndsWith(l) => Compiled::Text(texts(l), TextTest::EndsWith, false),
            Comparison::Regex(_) | Comparison::IsNull | Comparison::IsNotNull | Comparison::Unknown(_) => {
                Compiled::Never
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TextTest {
    Contains,
    StartsWith,
    EndsWith,
}

/// Operands resolved once per evaluation
enum Compiled {
    Eq(Scalar),
    Ne(Scalar),
    In(Vec<Scalar>, bool),
    Order(Scalar, fn(Ordering) -> bool),
    Between(Scalar, Scalar, bool),
    Text(Vec<String>, TextTest, bool),
    Never,
}

/// Numbers first, then dates, then text (text only for equality)
fn compare(cell: &Scalar, operand: &Scalar, allow_text: bool) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (cell.number, operand.number) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (cell.date, operand.date) {
        return Some(a.cmp(&b));
    }
    if allow_text {
        if let (Some(a), Some(b)) = (&cell.text, &operand.text) {
            return Some(a.cmp(b));
        }
    }
    None
}

impl Compiled {
    fn matches(&self, cell: &Scalar) -> bool {
        match self {
            Compiled::Eq(op) => compare(cell, op, true) == Some(Ordering::Equal),
            Compiled::Ne(op) => matches!(compare(cell, op, true), Some(o) if o != Ordering::Equal),
            Compiled::In(list, negate) => {
                let valid: Vec<&Scalar> = list
                    .iter()
                    .filter(|op| op.number.is_some() || op.date.is_some() || op.text.is_some())
                    .collect();
                let hit = valid.iter().any(|op| compare(cell, op, true) == Some(Ordering::Equal));
                if *negate {
                    !hit
                } else {
                    hit
                }
            }
            Compiled::Order(op, accept) => compare(cell, op, false).map(accept).unwrap_or(false),
            Compiled::Between(lo, hi, negate) => {
                match (compare(cell, lo, false), compare(cell, hi, false)) {
                    (Some(l), Some(h)) => {
                        let inside = l != Ordering::Less && h == Ordering::Less;
                        inside != *negate
                    }
                    _ => false,
                }
            }
            Compiled::Text(needles, test, negate) => {
                let Some(text) = &cell.text else {
                    return false;
                };
                let hit = needles.iter().any(|n| match test {
                    TextTest::Contains => text.contains(n.as_str()),
                    TextTest::StartsWith => text.starts_with(n.as_str()),
                    TextTest::EndsWith => text.ends_with(n.as_str()),
                });
                hit != *negate
            }
            Compiled::Never => false,
        }
    }
}

/// Split a comma/pipe separated operand list, stripping quotes
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', '|'])
        .map(strip_quotes)
        .filter(|s| !s.is_empty())
        .collect()
}

pub(crate) fn strip_quotes(s: &str) -> String {
    s.trim().trim_matches(|c: char| c == '"' || c == '\'').trim().to_string()
}

/// Evaluate one operator against a column
pub fn evaluate(
    column: &[Value],
    operator: &str,
    value: &str,
    value_to: Option<&str>,
    value_type: Option<ValueType>,
    case_sensitive: bool,
) -> Vec<bool> {
    Condition::from_parts(operator, value, value_to, value_type, case_sensitive).evaluate(column)
}
