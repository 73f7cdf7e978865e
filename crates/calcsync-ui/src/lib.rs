//! Terminal output for calcsync.
//!
//! Color and icon decisions live in [`terminal`]; [`styles`] turns
//! reconciliation results into the lines the CLI prints.

pub mod styles;
pub mod terminal;
