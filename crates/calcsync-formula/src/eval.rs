//! Substitute record values into a translated formula and evaluate it.

use serde_json::{Map, Value as Json};
use tracing::{debug, warn};

use crate::parser::{BinaryOp, Expr, UnaryOp, parse};
use crate::translate::referenced_variables;
use crate::types::{BlankPolicy, EvalError};
use crate::value::{Value, format_float, parse_number};

/// Evaluates translated formulas against records.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    blanks: BlankPolicy,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blank_policy(mut self, blanks: BlankPolicy) -> Self {
        self.blanks = blanks;
        self
    }

    /// Resolve every `[field]` reference against `record`, substitute the
    /// values into the expression, and evaluate the result.
    pub fn evaluate(&self, expression: &str, record: &Map<String, Json>) -> Result<Value, EvalError> {
        let mut values = Vec::new();
        for name in referenced_variables(expression) {
            let value = resolve_variable(&name, record, self.blanks)?;
            values.push((name, value));
        }
        let substituted = substitute_values(expression, &values);
        debug!(expression = %substituted, "evaluating");

        let tree = parse(&substituted).map_err(EvalError::Syntax)?;
        match eval_expr(&tree)? {
            Value::Float(f) if !f.is_finite() => {
                Err(EvalError::evaluation("result is not a finite number"))
            }
            value => Ok(value),
        }
    }

    /// Like [`Evaluator::evaluate`], but failures come back as their
    /// descriptive message instead of an error.
    pub fn evaluate_to_string(&self, expression: &str, record: &Map<String, Json>) -> String {
        match self.evaluate(expression, record) {
            Ok(value) => value.to_string(),
            Err(e) => e.to_string(),
        }
    }
}

/// Evaluate with the default blank policy.
pub fn evaluate(expression: &str, record: &Map<String, Json>) -> Result<Value, EvalError> {
    Evaluator::new().evaluate(expression, record)
}

/// Evaluate with the default blank policy, rendering failures as strings.
pub fn evaluate_to_string(expression: &str, record: &Map<String, Json>) -> String {
    Evaluator::new().evaluate_to_string(expression, record)
}

/// Look up a referenced field and coerce it to a float.
///
/// Missing fields count as `0`.
fn resolve_variable(
    name: &str,
    record: &Map<String, Json>,
    blanks: BlankPolicy,
) -> Result<f64, EvalError> {
    let non_numeric = |value: String| {
        warn!(variable = name, value = %value, "non-numeric value");
        EvalError::NonNumeric {
            variable: name.to_string(),
            value,
        }
    };

    match record.get(name) {
        None => Ok(0.0),
        Some(Json::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| non_numeric(n.to_string())),
        Some(Json::String(s)) if s.trim().is_empty() => match blanks {
            BlankPolicy::Zero => Ok(0.0),
            BlankPolicy::Error => Err(non_numeric(s.clone())),
        },
        Some(Json::String(s)) => parse_number(s).ok_or_else(|| non_numeric(s.clone())),
        Some(Json::Null) => match blanks {
            BlankPolicy::Zero => Ok(0.0),
            BlankPolicy::Error => Err(non_numeric("null".to_string())),
        },
        Some(other) => Err(non_numeric(other.to_string())),
    }
}

/// Replace `[name]` tokens with float literals. Negative values, `-0.0`
/// included, are parenthesized so that `[a]^2` keeps meaning `(a)^2`.
fn substitute_values(expression: &str, values: &[(String, f64)]) -> String {
    let mut result = String::with_capacity(expression.len());
    let bytes = expression.as_bytes();
    let len = bytes.len();
    let mut i = 0;
    while i < len {
        if bytes[i] == b'[' {
            let start = i + 1;
            let mut end = start;
            while end < len && is_name_byte(bytes[end]) {
                end += 1;
            }
            if end > start && end < len && bytes[end] == b']' {
                let name = &expression[start..end];
                if let Some((_, value)) = values.iter().find(|(n, _)| n == name) {
                    if value.is_sign_negative() {
                        result.push('(');
                        result.push_str(&format_float(*value));
                        result.push(')');
                    } else {
                        result.push_str(&format_float(*value));
                    }
                    i = end + 1;
                    continue;
                }
            }
        }
        let ch_len = utf8_len(bytes[i]);
        result.push_str(&expression[i..i + ch_len]);
        i += ch_len;
    }
    result
}

pub(crate) fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        _ => 4,
    }
}

// ---------------------------------------------------------------------------
// Tree evaluation
// ---------------------------------------------------------------------------

fn eval_expr(expr: &Expr) -> Result<Value, EvalError> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Unary { op, operand } => {
            let value = eval_expr(operand)?;
            eval_unary(*op, value)
        }
        Expr::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } => {
            if !eval_expr(lhs)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(eval_expr(rhs)?.is_truthy()))
        }
        Expr::Binary {
            op: BinaryOp::Or,
            lhs,
            rhs,
        } => {
            if eval_expr(lhs)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(eval_expr(rhs)?.is_truthy()))
        }
        Expr::Binary { op, lhs, rhs } => {
            let l = eval_expr(lhs)?;
            let r = eval_expr(rhs)?;
            eval_binary(*op, l, r)
        }
        Expr::Conditional {
            condition,
            then_branch,
            else_branch,
        } => {
            if eval_expr(condition)?.is_truthy() {
                eval_expr(then_branch)
            } else {
                eval_expr(else_branch)
            }
        }
        Expr::Call { name, args } => {
            let values = args.iter().map(eval_expr).collect::<Result<Vec<_>, _>>()?;
            call_function(name, &values)
        }
    }
}

fn eval_unary(op: UnaryOp, value: Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
        UnaryOp::Pos => match value {
            Value::Text(_) => Err(bad_operand("unary +", &value)),
            Value::Bool(b) => Ok(Value::Int(b as i64)),
            other => Ok(other),
        },
        UnaryOp::Neg => match value {
            Value::Int(i) => Ok(i
                .checked_neg()
                .map(Value::Int)
                .unwrap_or(Value::Float(-(i as f64)))),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Bool(b) => Ok(Value::Int(-(b as i64))),
            Value::Text(_) => Err(bad_operand("unary -", &value)),
        },
    }
}

fn eval_binary(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    match op {
        BinaryOp::Eq => Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = lhs.compare(&rhs).ok_or_else(|| {
                EvalError::evaluation(format!(
                    "'{}' not supported between {} and {}",
                    op.symbol(),
                    lhs.type_name(),
                    rhs.type_name()
                ))
            })?;
            let result = match op {
                BinaryOp::Lt => ordering.is_lt(),
                BinaryOp::Le => ordering.is_le(),
                BinaryOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => {
            if let (Value::Text(a), Value::Text(b)) = (&lhs, &rhs) {
                return Ok(Value::Text(format!("{a}{b}")));
            }
            arithmetic(op, lhs, rhs, i64::checked_add, |a, b| a + b)
        }
        BinaryOp::Sub => arithmetic(op, lhs, rhs, i64::checked_sub, |a, b| a - b),
        BinaryOp::Mul => arithmetic(op, lhs, rhs, i64::checked_mul, |a, b| a * b),
        BinaryOp::Div => {
            let (a, b) = numeric_pair(op, &lhs, &rhs)?;
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            Ok(Value::Float(a / b))
        }
        BinaryOp::Pow => power(lhs, rhs),
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators short-circuit in eval_expr"),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Text(a), Value::Text(b)) => a == b,
        (Value::Text(_), _) | (_, Value::Text(_)) => false,
        _ => lhs.compare(rhs).is_some_and(|o| o.is_eq()),
    }
}

/// Integer arithmetic when both sides are integers (or booleans) and the
/// result fits; float arithmetic otherwise.
fn arithmetic(
    op: BinaryOp,
    lhs: Value,
    rhs: Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (as_int(&lhs), as_int(&rhs)) {
        if let Some(result) = int_op(a, b) {
            return Ok(Value::Int(result));
        }
    }
    let (a, b) = numeric_pair(op, &lhs, &rhs)?;
    Ok(Value::Float(float_op(a, b)))
}

fn power(lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    if let (Some(base), Some(exp)) = (as_int(&lhs), as_int(&rhs)) {
        if let Ok(exp) = u32::try_from(exp) {
            if let Some(result) = base.checked_pow(exp) {
                return Ok(Value::Int(result));
            }
        }
    }
    let (base, exp) = numeric_pair(BinaryOp::Pow, &lhs, &rhs)?;
    if base == 0.0 && exp < 0.0 {
        return Err(EvalError::DivisionByZero);
    }
    let result = base.powf(exp);
    if result.is_nan() {
        return Err(EvalError::evaluation("math domain error"));
    }
    Ok(Value::Float(result))
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

fn numeric_pair(op: BinaryOp, lhs: &Value, rhs: &Value) -> Result<(f64, f64), EvalError> {
    match (lhs.as_f64(), rhs.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(EvalError::evaluation(format!(
            "unsupported operand types for {}: {} and {}",
            op.symbol(),
            lhs.type_name(),
            rhs.type_name()
        ))),
    }
}

fn bad_operand(op: &str, value: &Value) -> EvalError {
    EvalError::evaluation(format!("bad operand type for {op}: {}", value.type_name()))
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

fn call_function(name: &str, args: &[Value]) -> Result<Value, EvalError> {
    match name {
        "abs" => {
            let [x] = expect_args::<1>(name, args)?;
            match x {
                Value::Int(i) => Ok(i
                    .checked_abs()
                    .map(Value::Int)
                    .unwrap_or(Value::Float((*i as f64).abs()))),
                other => Ok(Value::Float(number_arg(name, other)?.abs())),
            }
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(EvalError::evaluation(format!("{name}() expects at least 1 argument")));
            }
            let mut best = &args[0];
            number_arg(name, best)?;
            for candidate in &args[1..] {
                number_arg(name, candidate)?;
                let ordering = candidate.compare(best).unwrap_or(std::cmp::Ordering::Equal);
                let better = if name == "min" {
                    ordering.is_lt()
                } else {
                    ordering.is_gt()
                };
                if better {
                    best = candidate;
                }
            }
            Ok(best.clone())
        }
        "round" | "roundup" | "rounddown" => {
            if args.is_empty() || args.len() > 2 {
                return Err(EvalError::evaluation(format!("{name}() expects 1 or 2 arguments")));
            }
            let x = number_arg(name, &args[0])?;
            let digits = match args.get(1) {
                Some(d) => number_arg(name, d)? as i32,
                None => 0,
            };
            let scale = 10f64.powi(digits);
            let scaled = x * scale;
            let rounded = match name {
                "round" => scaled.round(),
                // Away from zero.
                "roundup" => scaled.abs().ceil().copysign(scaled),
                // Toward zero.
                _ => scaled.trunc(),
            } / scale;
            if args.len() == 1 && rounded.abs() < i64::MAX as f64 {
                Ok(Value::Int(rounded as i64))
            } else {
                Ok(Value::Float(rounded))
            }
        }
        "sqrt" => {
            let [x] = expect_args::<1>(name, args)?;
            let x = number_arg(name, x)?;
            if x < 0.0 {
                return Err(EvalError::evaluation("math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        }
        "isnumeric" => {
            let [x] = expect_args::<1>(name, args)?;
            let numeric = match x {
                Value::Int(_) | Value::Float(_) => true,
                Value::Bool(_) => false,
                Value::Text(s) => parse_number(s).is_some(),
            };
            Ok(Value::Bool(numeric))
        }
        other => Err(EvalError::evaluation(format!("unknown function '{other}'"))),
    }
}

fn expect_args<'a, const N: usize>(name: &str, args: &'a [Value]) -> Result<&'a [Value; N], EvalError> {
    args.try_into().map_err(|_| {
        EvalError::evaluation(format!(
            "{name}() expects {N} argument{}, got {}",
            if N == 1 { "" } else { "s" },
            args.len()
        ))
    })
}

fn number_arg(name: &str, value: &Value) -> Result<f64, EvalError> {
    value.as_f64().ok_or_else(|| {
        EvalError::evaluation(format!("{name}() expects a number, got {}", value.type_name()))
    })
}
