//! Formula engine for calcsync.
//!
//! REDCap calculated fields carry their formula in vendor syntax. This crate
//! rewrites that syntax into a small expression language ([`translate`]),
//! substitutes record values for `[field]` references, and evaluates the
//! result with a restricted parser/evaluator ([`eval`]) that only knows
//! arithmetic, comparisons, logic, inline conditionals and a handful of
//! numeric functions.

pub mod eval;
mod lexer;
mod parser;
pub mod translate;
pub mod types;
pub mod value;

pub use eval::{Evaluator, evaluate, evaluate_to_string};
pub use translate::{referenced_variables, translate};
pub use types::{BlankPolicy, EvalError, FormulaError, TranslatedFormula};
pub use value::Value;
