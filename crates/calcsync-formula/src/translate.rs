//! Rewrite REDCap formula syntax into the evaluator's expression language.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::eval::is_name_byte;
use crate::types::{FormulaError, TranslatedFormula};

/// Action tag marking a computed-text field.
pub const CALCTEXT_TAG: &str = "@CALCTEXT";

/// REDCap function names and their evaluator equivalents.
const FUNCTION_RENAMES: &[(&str, &str)] = &[("isnumber", "isnumeric")];

/// `if(cond, a, b)` with no commas inside `cond` or `a`. The last group runs
/// to the final `)`, so nested conditionals are not handled.
static IF_CALL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bif\s*\(([^,]+),([^,]+),(.+)\)").expect("regex for if() calls")
});

static RENAMES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    FUNCTION_RENAMES
        .iter()
        .map(|(from, to)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(from));
            (Regex::new(&pattern).expect("regex for function rename"), *to)
        })
        .collect()
});

/// Translate a formula from field metadata.
///
/// When `action_tag` contains `@CALCTEXT`, the expression inside the
/// `@CALCTEXT(...)` wrapper is extracted and REDCap function names are
/// renamed. In every case `if(c, a, b)` calls become `(c ? a : b)`.
pub fn translate(source: &str, action_tag: Option<&str>) -> Result<TranslatedFormula, FormulaError> {
    if source.trim().is_empty() {
        return Err(FormulaError::Empty);
    }

    let calctext = action_tag.is_some_and(|tag| tag.contains(CALCTEXT_TAG));
    let mut expression = source.to_string();
    if calctext {
        expression = extract_calctext(&expression)?;
        expression = rename_functions(&expression);
    }
    expression = rewrite_conditionals(&expression);

    debug!(source, expression = %expression, calctext, "translated formula");
    Ok(TranslatedFormula {
        source: source.to_string(),
        expression,
        calctext,
    })
}

/// Return the body of the first `@CALCTEXT( ... )` wrapper, or the input
/// unchanged when there is no wrapper.
pub fn extract_calctext(formula: &str) -> Result<String, FormulaError> {
    let Some(tag_pos) = formula.find(CALCTEXT_TAG) else {
        return Ok(formula.to_string());
    };
    let after_tag = &formula[tag_pos + CALCTEXT_TAG.len()..];
    let open = after_tag
        .find(|c: char| !c.is_whitespace())
        .filter(|&i| after_tag[i..].starts_with('('))
        .ok_or_else(|| FormulaError::Translate(format!("expected '(' after {CALCTEXT_TAG}")))?;

    let body_start = open + 1;
    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    for (offset, ch) in after_tag[body_start..].char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    let body = &after_tag[body_start..body_start + offset];
                    return Ok(body.trim().to_string());
                }
            }
            _ => {}
        }
    }
    Err(FormulaError::Translate(format!(
        "unbalanced parentheses in {CALCTEXT_TAG}(...)"
    )))
}

/// Rename REDCap functions to their evaluator equivalents.
pub fn rename_functions(expression: &str) -> String {
    RENAMES
        .iter()
        .fold(expression.to_string(), |acc, (pattern, to)| {
            pattern.replace_all(&acc, *to).into_owned()
        })
}

/// Rewrite a single-level `if(cond, a, b)` into `(cond ? a : b)`.
pub fn rewrite_conditionals(expression: &str) -> String {
    IF_CALL
        .replace_all(expression, "(${1} ? ${2} : ${3})")
        .into_owned()
}

/// Field names referenced as `[name]`, in order of first appearance.
pub fn referenced_variables(expression: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
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
                if !names.iter().any(|n| n == name) {
                    names.push(name.to_string());
                }
                i = end + 1;
                continue;
            }
        }
        i += 1;
    }
    names
}
