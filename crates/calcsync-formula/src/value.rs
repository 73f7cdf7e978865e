//! Values produced by expression evaluation.

use std::cmp::Ordering;
use std::fmt;

use serde::{Serialize, Serializer};

/// Result of evaluating an expression.
///
/// Integers and floats are kept apart so that rendering matches what REDCap
/// users expect from their formulas: literals such as `0` stay `0`,
/// while anything derived from a record value (always coerced to a float)
/// renders with a fractional part, e.g. `5.0`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl Value {
    /// Numeric view of the value. Booleans count as `1`/`0`; text never does.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(_) => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Bool(b) => *b,
            Self::Text(s) => !s.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Bool(_) => "bool",
            Self::Text(_) => "text",
        }
    }

    /// Compare two values. Numbers (and booleans) compare numerically, text
    /// compares lexicographically; mixing the two has no ordering.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Text(_), _) | (_, Self::Text(_)) => None,
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            _ => {
                let a = self.as_f64()?;
                let b = other.as_f64()?;
                a.partial_cmp(&b)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => f.write_str(&format_float(*v)),
            Self::Bool(b) => f.write_str(if *b { "1" } else { "0" }),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Render a float so that it always reads back as a float (`5.0`, `0.25`, `1e21`).
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}

/// Parse text that looks like a finite number (sign, decimal point and
/// exponent allowed, surrounding whitespace ignored).
pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    // `f64::from_str` also accepts "inf"/"NaN"; those are not numbers here.
    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'))
    {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_keeps_int_float_distinction() {
        assert_eq!(Value::Float(5.0).to_string(), "5.0");
        assert_eq!(Value::Float(-0.5).to_string(), "-0.5");
        assert_eq!(Value::Int(0).to_string(), "0");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Text("high".into()).to_string(), "high");
    }

    #[test]
    fn parse_number_accepts_signed_and_exponent_forms() {
        assert_eq!(parse_number("-5"), Some(-5.0));
        assert_eq!(parse_number(" 2.50 "), Some(2.5));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number(".5"), Some(0.5));
    }

    #[test]
    fn parse_number_rejects_non_numbers() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("1.2.3"), None);
        assert_eq!(parse_number("2020-01-01"), None);
    }

    #[test]
    fn compare_mixed_numbers() {
        assert_eq!(Value::Int(2).compare(&Value::Float(2.0)), Some(Ordering::Equal));
        assert_eq!(Value::Bool(true).compare(&Value::Int(0)), Some(Ordering::Greater));
        assert_eq!(Value::Text("a".into()).compare(&Value::Int(1)), None);
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Value::Float(5.0)).unwrap();
        assert_eq!(json, "\"5.0\"");
    }
}
