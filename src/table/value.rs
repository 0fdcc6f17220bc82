//! Cell values and the type-coercion layer
//!
//! Every coercion is lossy in the same direction: anything that cannot be
//! read as the requested type becomes missing (`None` / NaN), never an error.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single portfolio or template cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

/// Day-first and ISO layouts accepted for dates
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Parse a number, accepting `,` as decimal separator
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a date in any of the accepted layouts
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Render a number the way key columns expect it: `12.0` becomes `"12"`
pub fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

impl Value {
    /// Build a cell from raw text: empty means missing
    pub fn from_raw(raw: &str) -> Self {
        if raw.trim().is_empty() {
            Value::Null
        } else {
            Value::Text(raw.to_string())
        }
    }

    /// Null, NaN and blank strings all count as missing
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(v) => v.is_nan(),
            Value::Text(s) => s.trim().is_empty(),
            Value::Date(_) => false,
        }
    }

    /// NUMBER coercion
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(v) if v.is_finite() => Some(*v),
            Value::Text(s) => parse_number(s),
            _ => None,
        }
    }

    /// DATE coercion
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Text(s) => parse_date(s),
            _ => None,
        }
    }

    /// Trimmed text rendering; integral numbers lose their fractional part
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Number(v) if v.is_nan() => None,
            Value::Number(v) => Some(format_number(*v)),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            Value::Text(s) => {
                let t = s.trim();
                if t.is_empty() {
                    None
                } else {
                    Some(t.to_string())
                }
            }
        }
    }

    /// Join-key normalization: trimmed, upper-cased text
    pub fn as_key(&self) -> Option<String> {
        self.as_text().map(|s| s.to_uppercase())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(v) if v.is_nan() => Ok(()),
            Value::Number(v) => write!(f, "{}", v),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        if v.is_nan() {
            Value::Null
        } else {
            Value::Number(v)
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::from_raw(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        if s.trim().is_empty() {
            Value::Null
        } else {
            Value::Text(s)
        }
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_comma_decimal() {
        assert_eq!(parse_number("1,5"), Some(1.5));
        assert_eq!(parse_number(" 42 "), Some(42.0));
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_parse_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(parse_date("2024-03-31"), Some(expected));
        assert_eq!(parse_date("31/03/2024"), Some(expected));
        assert_eq!(parse_date("31.03.2024"), Some(expected));
        assert_eq!(parse_date("2024-03-31 00:00:00"), Some(expected));
        assert_eq!(parse_date("not a date"), None);
    }

    #[test]
    fn test_text_rendering_of_integral_numbers() {
        assert_eq!(Value::Number(12.0).as_text().as_deref(), Some("12"));
        assert_eq!(Value::Number(1.25).as_text().as_deref(), Some("1.25"));
        assert_eq!(Value::Text("  ab ".into()).as_key().as_deref(), Some("AB"));
    }

    #[test]
    fn test_nulls() {
        assert!(Value::Null.is_null());
        assert!(Value::Text("   ".into()).is_null());
        assert!(Value::Number(f64::NAN).is_null());
        assert!(!Value::Number(0.0).is_null());
    }
}
