//! `calcsync eval` -- evaluate a formula locally.

use anyhow::{Result, bail};
use calcsync_core::Record;
use calcsync_formula::{Evaluator, translate};
use serde_json::Value as Json;

use crate::cli::EvalArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

/// Execute the `calcsync eval` command.
pub fn run(ctx: &RuntimeContext, args: &EvalArgs) -> Result<()> {
    let config = ctx.config()?;
    let record = parse_var_flags(&args.vars)?;
    let formula = translate(&args.formula, args.action_tag.as_deref())?;
    let evaluator = Evaluator::new().with_blank_policy(config.blank_values);

    let value = evaluator.evaluate(&formula.expression, &record)?;
    if ctx.json {
        output_json(&serde_json::json!({
            "expression": formula.expression,
            "result": value,
            "type": value.type_name(),
        }));
    } else {
        println!("{}", value);
    }
    Ok(())
}

/// Parse `--var key=value` flags into a record. Values stay strings, as
/// they would arrive from a REDCap export.
pub(crate) fn parse_var_flags(vars: &[String]) -> Result<Record> {
    let mut record = Record::new();
    for v in vars {
        let Some((key, value)) = v.split_once('=') else {
            bail!("invalid variable format '{}': expected key=value", v);
        };
        let key = key.trim();
        if key.is_empty() {
            bail!("invalid variable format '{}': empty key", v);
        }
        record.insert(key.to_string(), Json::String(value.to_string()));
    }
    Ok(record)
}
