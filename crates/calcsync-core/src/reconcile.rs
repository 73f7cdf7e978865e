//! Compare stored calculated values against freshly computed ones.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use calcsync_formula::value::parse_number;
use calcsync_formula::{BlankPolicy, Evaluator, TranslatedFormula, Value};

use crate::types::{Record, RowLocator, UpdateEntry, record_field};

/// Placeholder for a stored value that is missing from the record.
pub const MISSING_VALUE: &str = "N/A";

/// How a stored value is compared with a computed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonMode {
    /// Exact string comparison of the rendered forms; `"5"` differs from `5.0`.
    Strict,
    /// Numeric comparison when both sides are numbers, string otherwise.
    #[default]
    Numeric,
}

impl ComparisonMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Numeric => "numeric",
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "numeric" => Ok(Self::Numeric),
            other => Err(format!(
                "unknown comparison mode '{other}' (expected strict or numeric)"
            )),
        }
    }
}

/// Settings for a reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Field holding the record identifier.
    pub record_id_field: String,
    pub comparison: ComparisonMode,
    pub blank_values: BlankPolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            record_id_field: "record_id".to_string(),
            comparison: ComparisonMode::default(),
            blank_values: BlankPolicy::default(),
        }
    }
}

/// A record whose formula could not be evaluated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationFailure {
    pub record_id: String,
    /// Descriptive failure string, e.g. `Error: Division by zero`.
    pub message: String,
    #[serde(skip_serializing_if = "RowLocator::is_empty")]
    pub locator: RowLocator,
}

/// Outcome of comparing every record.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Reconciliation {
    /// Records examined (including failures and skips).
    pub checked: usize,
    /// Records whose stored value differs from the computed one.
    pub updates: Vec<UpdateEntry>,
    /// Records whose evaluation failed; never submitted.
    pub failures: Vec<EvaluationFailure>,
    /// Records without a record identifier.
    pub skipped: usize,
}

impl Reconciliation {
    /// Records whose stored value already matches.
    pub fn unchanged(&self) -> usize {
        self.checked - self.updates.len() - self.failures.len() - self.skipped
    }
}

/// Recompute `field_name` for every record and collect the differences.
pub fn reconcile(
    records: &[Record],
    field_name: &str,
    formula: &TranslatedFormula,
    options: &ReconcileOptions,
) -> Reconciliation {
    let evaluator = Evaluator::new().with_blank_policy(options.blank_values);
    let mut result = Reconciliation::default();

    for record in records {
        result.checked += 1;
        let Some(record_id) = record_field(record, &options.record_id_field).filter(|id| !id.is_empty())
        else {
            debug!(field = %options.record_id_field, "record without identifier skipped");
            result.skipped += 1;
            continue;
        };
        let locator = RowLocator::from_record(record);

        let computed = match evaluator.evaluate(&formula.expression, record) {
            Ok(value) => value,
            Err(e) => {
                debug!(record_id = %record_id, error = %e, "evaluation failed");
                result.failures.push(EvaluationFailure {
                    record_id,
                    message: e.to_string(),
                    locator,
                });
                continue;
            }
        };

        let stored = record_field(record, field_name).unwrap_or_else(|| MISSING_VALUE.to_string());
        if values_match(&stored, &computed, options.comparison) {
            continue;
        }

        debug!(record_id = %record_id, stored = %stored, computed = %computed, "mismatch");
        result.updates.push(UpdateEntry {
            record_id,
            field_name: field_name.to_string(),
            previous_value: stored,
            computed_value: computed,
            locator,
        });
    }

    info!(
        checked = result.checked,
        updates = result.updates.len(),
        failures = result.failures.len(),
        skipped = result.skipped,
        "reconciliation finished"
    );
    result
}

/// Whether a stored value agrees with a computed one under `mode`.
pub fn values_match(stored: &str, computed: &Value, mode: ComparisonMode) -> bool {
    let rendered = computed.to_string();
    match mode {
        ComparisonMode::Strict => stored == rendered,
        ComparisonMode::Numeric => {
            let computed_number = match computed {
                Value::Text(s) => parse_number(s),
                other => other.as_f64(),
            };
            match (parse_number(stored), computed_number) {
                (Some(a), Some(b)) => numbers_equal(a, b),
                _ => stored == rendered,
            }
        }
    }
}

fn numbers_equal(a: f64, b: f64) -> bool {
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= 1e-9 * scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcsync_formula::translate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn records(value: serde_json::Value) -> Vec<Record> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().unwrap().clone())
            .collect()
    }

    #[test]
    fn strict_mode_treats_5_and_5_0_as_different() {
        assert!(!values_match("5", &Value::Float(5.0), ComparisonMode::Strict));
        assert!(values_match("5.0", &Value::Float(5.0), ComparisonMode::Strict));
    }

    #[test]
    fn numeric_mode_treats_5_and_5_0_as_equal() {
        assert!(values_match("5", &Value::Float(5.0), ComparisonMode::Numeric));
        assert!(values_match("0.30000000000000004", &Value::Float(0.3), ComparisonMode::Numeric));
        assert!(!values_match("5.1", &Value::Float(5.0), ComparisonMode::Numeric));
        assert!(!values_match("", &Value::Int(0), ComparisonMode::Numeric));
        assert!(values_match("high", &Value::Text("high".into()), ComparisonMode::Numeric));
    }

    #[test]
    fn collects_only_mismatches() {
        let formula = translate("[a] + [b]", None).unwrap();
        let recs = records(json!([
            {"record_id": "1", "a": "2", "b": "3", "total": "5"},
            {"record_id": "2", "a": "1", "b": "1", "total": "3"},
            {"record_id": "3", "a": "1", "b": "1"},
        ]));
        let result = reconcile(&recs, "total", &formula, &ReconcileOptions::default());

        assert_eq!(result.checked, 3);
        assert_eq!(result.unchanged(), 1);
        let ids: Vec<&str> = result.updates.iter().map(|u| u.record_id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(result.updates[0].previous_value, "3");
        assert_eq!(result.updates[0].computed_value, Value::Float(2.0));
        assert_eq!(result.updates[1].previous_value, MISSING_VALUE);
    }

    #[test]
    fn strict_mode_flags_formatting_differences() {
        let formula = translate("[a] + [b]", None).unwrap();
        let recs = records(json!([{"record_id": "1", "a": "2", "b": "3", "total": "5"}]));
        let options = ReconcileOptions {
            comparison: ComparisonMode::Strict,
            ..ReconcileOptions::default()
        };
        let result = reconcile(&recs, "total", &formula, &options);
        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates[0].computed_value.to_string(), "5.0");
    }

    #[test]
    fn failures_are_reported_not_submitted() {
        let formula = translate("[a] / [b]", None).unwrap();
        let recs = records(json!([
            {"record_id": "1", "a": "x", "b": "1", "ratio": ""},
            {"record_id": "2", "a": "1", "b": "0", "ratio": ""},
            {"record_id": "3", "a": "1", "b": "2", "ratio": "0.5"},
        ]));
        let result = reconcile(&recs, "ratio", &formula, &ReconcileOptions::default());
        assert!(result.updates.is_empty());
        assert_eq!(
            result.failures,
            vec![
                EvaluationFailure {
                    record_id: "1".into(),
                    message: "Error: Non-numeric value in [a]".into(),
                    locator: RowLocator::default(),
                },
                EvaluationFailure {
                    record_id: "2".into(),
                    message: "Error: Division by zero".into(),
                    locator: RowLocator::default(),
                },
            ]
        );
        assert_eq!(result.unchanged(), 1);
    }

    #[test]
    fn custom_record_id_field_and_skips() {
        let formula = translate("[a] * 2", None).unwrap();
        let recs = records(json!([
            {"study_id": "S-1", "a": "2", "double": "1"},
            {"a": "2", "double": "1"},
        ]));
        let options = ReconcileOptions {
            record_id_field: "study_id".into(),
            ..ReconcileOptions::default()
        };
        let result = reconcile(&recs, "double", &formula, &options);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.updates.len(), 1);
        assert_eq!(result.updates[0].record_id, "S-1");
    }

    #[test]
    fn longitudinal_rows_keep_their_event() {
        let formula = translate("[a] + 1", None).unwrap();
        let recs = records(json!([
            {"record_id": "1", "redcap_event_name": "baseline_arm_1", "a": "1", "b": "2"},
            {"record_id": "1", "redcap_event_name": "followup_arm_1", "a": "4", "b": "0"},
        ]));
        let result = reconcile(&recs, "b", &formula, &ReconcileOptions::default());
        assert_eq!(result.updates.len(), 1);
        assert_eq!(
            result.updates[0].locator.event_name.as_deref(),
            Some("followup_arm_1")
        );
    }

    #[test]
    fn comparison_mode_parses() {
        assert_eq!("Strict".parse::<ComparisonMode>(), Ok(ComparisonMode::Strict));
        assert!("loose".parse::<ComparisonMode>().is_err());
    }
}
