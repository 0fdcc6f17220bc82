//! Cell syntax for drivers-in-columns rule sheets
//!
//! A cell reads `OPERATOR: value[|flag...]`, e.g. `GT: 100`, `IN: A,B,C|cs`,
//! `BETWEEN: 01/01/2020..01/01/2025|date`, or a bare `IS NULL`.
//! Flags: `cs`/`case` (case-sensitive), `num`/`number`, `date`, `str`/`string`.

use super::condition::{canonical_operator, strip_quotes, Comparison, Condition, ValueType};

enum Flag {
    CaseSensitive,
    Type(ValueType),
}

fn parse_flag(raw: &str) -> Option<Flag> {
    match raw.trim().to_lowercase().as_str() {
        "cs" | "case" => Some(Flag::CaseSensitive),
        "num" | "number" => Some(Flag::Type(ValueType::Number)),
        "date" => Some(Flag::Type(ValueType::Date)),
        "str" | "string" => Some(Flag::Type(ValueType::String)),
        _ => None,
    }
}

fn split_values(raw: &str, separators: &[char]) -> Vec<String> {
    raw.split(separators)
        .map(strip_quotes)
        .filter(|s| !s.is_empty())
        .collect()
}

fn split_range(raw: &str) -> Vec<String> {
    if raw.contains("..") {
        raw.split("..").map(strip_quotes).collect()
    } else if raw.contains(',') {
        split_values(raw, &[','])
    } else {
        split_values(raw, &[';'])
    }
}

/// Parse one rule cell; `None` means the cell carries no condition
pub fn parse_cell(cell: &str) -> Option<Condition> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    // Trailing `|` segments are flags only when recognized; otherwise they
    // belong to a pipe-delimited value list.
    let mut parts: Vec<&str> = cell.split('|').collect();
    let mut case_sensitive = false;
    let mut value_type = None;
    while parts.len() > 1 {
        let Some(flag) = parts.last().and_then(|p| parse_flag(p)) else {
            break;
        };
        match flag {
            Flag::CaseSensitive => case_sensitive = true,
            Flag::Type(t) => value_type = value_type.or(Some(t)),
        }
        parts.pop();
    }
    let expr = parts.join("|");
    let expr = expr.trim();

    let (op, raw_value) = match expr.split_once(':') {
        Some((op, value)) => (canonical_operator(op), value.trim()),
        None => {
            let op = canonical_operator(expr);
            if op == "IS NULL" || op == "IS NOT NULL" {
                (op, "")
            } else {
                return None;
            }
        }
    };
    if op.is_empty() {
        return None;
    }

    let values = match op.as_str() {
        "BETWEEN" | "NOT BETWEEN" => split_range(raw_value),
        "REGEX" => vec![strip_quotes(raw_value)],
        "IN" | "NOT IN" | "CONTAINS" | "NOT CONTAINS" | "STARTS WITH" | "ENDS WITH" => {
            split_values(raw_value, &[',', '|'])
        }
        _ => vec![strip_quotes(raw_value)],
    };

    Some(Condition {
        comparison: Comparison::from_parts(&op, values, None),
        value_type,
        case_sensitive,
    })
}
