//! `calcsync translate` -- show a formula in evaluator syntax.

use anyhow::{Context, Result, bail};
use calcsync_formula::{TranslatedFormula, translate};
use calcsync_redcap::{RedcapApi, find_field};
use calcsync_ui::styles;
use serde::Serialize;

use crate::cli::TranslateArgs;
use crate::context::RuntimeContext;
use crate::output::output_json;

#[derive(Debug, Serialize)]
struct TranslationView {
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    source: String,
    expression: String,
    calctext: bool,
    variables: Vec<String>,
}

impl TranslationView {
    fn new(field: Option<String>, formula: TranslatedFormula) -> Self {
        let variables = formula.variables();
        Self {
            field,
            source: formula.source,
            expression: formula.expression,
            calctext: formula.calctext,
            variables,
        }
    }
}

/// Execute the `calcsync translate` command.
pub fn run(ctx: &RuntimeContext, args: &TranslateArgs) -> Result<()> {
    let view = match (&args.formula, &args.field) {
        (Some(formula), _) => {
            TranslationView::new(None, translate(formula, args.action_tag.as_deref())?)
        }
        (None, Some(field)) => {
            let config = ctx.config()?;
            let client = ctx.client(&config)?;
            let formula = translate_field(&client, field, args.action_tag.as_deref())?;
            TranslationView::new(Some(field.clone()), formula)
        }
        (None, None) => bail!("either a FIELD or --formula is required"),
    };

    if ctx.json {
        output_json(&view);
        return Ok(());
    }

    if !ctx.quiet {
        if let Some(ref field) = view.field {
            println!("{}: {}", styles::render_bold("Field"), styles::render_accent(field));
        }
        println!("{}: {}", styles::render_bold("Source"), view.source);
    }
    println!("{}", view.expression);
    if !ctx.quiet {
        if view.calctext {
            println!("{}", styles::render_muted("@CALCTEXT: result is kept as text"));
        }
        let variables = if view.variables.is_empty() {
            styles::render_muted("(none)")
        } else {
            view.variables.join(", ")
        };
        println!("{}: {}", styles::render_bold("Variables"), variables);
    }
    Ok(())
}

/// Translate the formula stored for `field_name`. An explicit action tag
/// replaces the field's own annotation.
pub fn translate_field<A: RedcapApi>(
    api: &A,
    field_name: &str,
    action_tag: Option<&str>,
) -> Result<TranslatedFormula> {
    let metadata = api.export_metadata().context("failed to export metadata")?;
    let field = find_field(&metadata, field_name)?;
    let tag = action_tag.or(field.action_tag.as_deref());
    translate(field.formula_text(), tag)
        .with_context(|| format!("cannot translate the formula of '{field_name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calcsync_core::{FieldMetadata, Record};
    use pretty_assertions::assert_eq;

    struct Dictionary(Vec<FieldMetadata>);

    impl RedcapApi for Dictionary {
        fn export_metadata(&self) -> calcsync_redcap::Result<Vec<FieldMetadata>> {
            Ok(self.0.clone())
        }

        fn export_records(&self, _fields: &[String]) -> calcsync_redcap::Result<Vec<Record>> {
            Ok(Vec::new())
        }

        fn import_records(&self, rows: &[Record]) -> calcsync_redcap::Result<usize> {
            Ok(rows.len())
        }
    }

    fn dictionary() -> Dictionary {
        Dictionary(vec![
            FieldMetadata {
                field_name: "status".into(),
                form_name: "visit".into(),
                field_type: "text".into(),
                field_label: "Status".into(),
                formula_source: String::new(),
                action_tag: Some(r#"@CALCTEXT(if([score] >= 10, "high", "low"))"#.into()),
            },
            FieldMetadata {
                field_name: "double".into(),
                form_name: "visit".into(),
                field_type: "calc".into(),
                field_label: "Double".into(),
                formula_source: "[score] * 2".into(),
                action_tag: None,
            },
        ])
    }

    #[test]
    fn calctext_field_uses_annotation() {
        let formula = translate_field(&dictionary(), "status", None).unwrap();
        assert!(formula.calctext);
        assert_eq!(formula.expression, r#"([score] >= 10 ?  "high" :  "low")"#);
        assert_eq!(formula.variables(), vec!["score"]);
    }

    #[test]
    fn plain_calc_field() {
        let formula = translate_field(&dictionary(), "double", None).unwrap();
        assert!(!formula.calctext);
        assert_eq!(formula.expression, "[score] * 2");
    }

    #[test]
    fn view_lists_variables() {
        let view = TranslationView::new(None, translate("[a] + [b] - [a]", None).unwrap());
        assert_eq!(view.variables, vec!["a", "b"]);
        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("field").is_none());
    }
}
