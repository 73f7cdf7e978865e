//! Output helpers for the `calcsync` CLI.

use calcsync_formula::EvalError;
use serde::Serialize;
use std::io::{self, Write};

/// Print a value as pretty-printed JSON to stdout.
///
/// Terminates the process with exit code 1 if serialization fails.
pub fn output_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            // Ignore broken pipe errors (e.g., piped to `head`)
            let _ = writeln!(handle, "{}", json);
        }
        Err(e) => {
            eprintln!("Error: failed to serialize JSON: {}", e);
            std::process::exit(1);
        }
    }
}

/// Text `main` prints for a failed command. Evaluation errors already read
/// `Error: ...`, so they are not prefixed again.
pub fn error_message(json: bool, err: &anyhow::Error) -> String {
    if json || err.downcast_ref::<EvalError>().is_some() {
        format!("{:#}", err)
    } else {
        format!("Error: {:#}", err)
    }
}

/// Print an error the way `main` does: JSON on stderr with `--json`,
/// otherwise the bare message.
pub fn output_error(json: bool, message: &str) {
    if json {
        let err_json = serde_json::json!({ "error": message });
        if let Ok(s) = serde_json::to_string_pretty(&err_json) {
            eprintln!("{}", s);
        }
    } else {
        eprintln!("{}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_message_prefixes_plain_errors() {
        let err = anyhow::anyhow!("missing API URL");
        assert_eq!(error_message(false, &err), "Error: missing API URL");
        assert_eq!(error_message(true, &err), "missing API URL");
    }

    #[test]
    fn error_message_keeps_evaluation_wording() {
        let err = anyhow::Error::new(EvalError::DivisionByZero);
        assert_eq!(error_message(false, &err), "Error: Division by zero");
        assert_eq!(error_message(true, &err), "Error: Division by zero");
    }
}
