//! Core types and record reconciliation for calcsync.
//!
//! [`types`] holds the REDCap data model (field metadata, records, update
//! entries); [`reconcile`] compares stored calculated values against freshly
//! computed ones.

pub mod reconcile;
pub mod types;

pub use reconcile::{ComparisonMode, EvaluationFailure, ReconcileOptions, Reconciliation, reconcile};
pub use types::{FieldMetadata, Record, RowLocator, UpdateEntry};
