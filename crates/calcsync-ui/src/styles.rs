//! Ayu-themed styling for calcsync reports.
//!
//! Only lines that need attention get color: pending updates in yellow,
//! evaluation failures in red, a clean field in green. Everything else is
//! plain or muted.

use calcsync_core::{EvaluationFailure, Reconciliation, UpdateEntry};
use owo_colors::OwoColorize;

use crate::terminal::{should_use_icons, supports_color};

// ---------------------------------------------------------------------------
// Ayu Dark palette (RGB)
// ---------------------------------------------------------------------------

const PASS: (u8, u8, u8) = (0xc2, 0xd9, 0x4c); // #c2d94c
const WARN: (u8, u8, u8) = (0xff, 0xb4, 0x54); // #ffb454
const FAIL: (u8, u8, u8) = (0xf0, 0x71, 0x78); // #f07178
const MUTED: (u8, u8, u8) = (0x6c, 0x76, 0x80); // #6c7680
const ACCENT: (u8, u8, u8) = (0x59, 0xc2, 0xff); // #59c2ff

pub const ICON_PASS: &str = "\u{2713}";
pub const ICON_WARN: &str = "\u{26A0}";
pub const ICON_FAIL: &str = "\u{2716}";
pub const ICON_ARROW: &str = "\u{2192}";

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

fn color_str(s: &str, rgb: (u8, u8, u8)) -> String {
    if supports_color() {
        s.truecolor(rgb.0, rgb.1, rgb.2).to_string()
    } else {
        s.to_string()
    }
}

pub fn render_warn(s: &str) -> String {
    color_str(s, WARN)
}

pub fn render_fail(s: &str) -> String {
    color_str(s, FAIL)
}

pub fn render_muted(s: &str) -> String {
    color_str(s, MUTED)
}

pub fn render_accent(s: &str) -> String {
    color_str(s, ACCENT)
}

pub fn render_bold(s: &str) -> String {
    if supports_color() {
        s.bold().to_string()
    } else {
        s.to_string()
    }
}

/// Prefix `text` with a colored icon when icons are enabled.
fn with_icon(icon: &str, rgb: (u8, u8, u8), text: String) -> String {
    if should_use_icons() {
        format!("{} {text}", color_str(icon, rgb))
    } else {
        text
    }
}

// ---------------------------------------------------------------------------
// Report lines
// ---------------------------------------------------------------------------

/// `12 (visit_1_arm_1): 21.9 -> 22.5`
pub fn render_update(entry: &UpdateEntry) -> String {
    format!(
        "{}{}: {} {} {}",
        render_bold(&entry.record_id),
        render_muted(&entry.locator.describe()),
        render_muted(&entry.previous_value),
        ICON_ARROW,
        render_warn(&entry.computed_value.to_string()),
    )
}

/// `12: Error: Non-numeric value in [weight]`
pub fn render_failure(failure: &EvaluationFailure) -> String {
    with_icon(
        ICON_FAIL,
        FAIL,
        format!(
            "{}{}: {}",
            render_bold(&failure.record_id),
            render_muted(&failure.locator.describe()),
            render_fail(&failure.message),
        ),
    )
}

/// One-line summary printed after the per-record lines.
pub fn render_summary(field: &str, result: &Reconciliation) -> String {
    let mut line = format!(
        "{}: {} checked, {} to update, {} unchanged",
        render_accent(field),
        result.checked,
        result.updates.len(),
        result.unchanged(),
    );
    if !result.failures.is_empty() {
        line.push_str(&format!(", {}", render_fail(&format!("{} failed", result.failures.len()))));
    }
    if result.skipped > 0 {
        line.push_str(&format!(", {} skipped", result.skipped));
    }
    line
}

pub fn render_all_correct(field: &str) -> String {
    with_icon(
        ICON_PASS,
        PASS,
        format!("All records already have the correct values for {}", render_accent(field)),
    )
}

pub fn render_mismatch_header(field: &str, count: usize) -> String {
    with_icon(
        ICON_WARN,
        WARN,
        format!(
            "{} record(s) with mismatched values for {}:",
            render_bold(&count.to_string()),
            render_accent(field)
        ),
    )
}

pub fn render_updated(count: usize) -> String {
    with_icon(ICON_PASS, PASS, format!("Updated {count} record(s)"))
}
