//! Line-oriented prompts.
//!
//! Generic over the reader and writer so the sync workflow can be driven
//! from tests.

use std::io::{self, BufRead, Write};

/// Write `question`, read one line and return it trimmed. EOF yields an
/// empty string.
pub fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Ask a `(y/n)` question. Only `y` / `yes` (any case) confirm.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    let answer = ask(input, output, &format!("{question} (y/n) "))?;
    Ok(is_yes(&answer))
}

pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
