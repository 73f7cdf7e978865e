//! Formula data model and error types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A formula rewritten into the evaluator's expression language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslatedFormula {
    /// The formula exactly as it appeared in the field metadata.
    pub source: String,

    /// Evaluable expression. Still contains `[field]` references.
    pub expression: String,

    /// Whether the field was tagged `@CALCTEXT`.
    pub calctext: bool,
}

impl TranslatedFormula {
    /// Field names referenced by the expression, in order of first use.
    pub fn variables(&self) -> Vec<String> {
        crate::translate::referenced_variables(&self.expression)
    }
}

/// How a referenced field holding a blank value is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlankPolicy {
    /// Blank values are non-numeric and fail the record.
    #[default]
    Error,
    /// Blank values evaluate as `0`.
    Zero,
}

impl BlankPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Zero => "zero",
        }
    }
}

impl fmt::Display for BlankPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlankPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "zero" => Ok(Self::Zero),
            other => Err(format!("unknown blank policy '{other}' (expected error or zero)")),
        }
    }
}

/// Errors raised while translating vendor syntax.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error("field has no calculation formula")]
    Empty,

    #[error("translate error: {0}")]
    Translate(String),
}

/// Per-record evaluation failures.
///
/// The `Display` form of each variant is the descriptive string reported in
/// place of a computed value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("Error: Non-numeric value in [{variable}]")]
    NonNumeric {
        /// The referenced field.
        variable: String,
        /// The offending stored value.
        value: String,
    },

    #[error("Error: Invalid syntax in formula ({0})")]
    Syntax(String),

    #[error("Error: Division by zero")]
    DivisionByZero,

    #[error("Error: {0}")]
    Evaluation(String),
}

impl EvalError {
    pub(crate) fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation(message.into())
    }
}
