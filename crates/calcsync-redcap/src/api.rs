//! The [`RedcapApi`] trait -- the three project calls calcsync needs.
//!
//! Commands depend on this trait rather than on [`crate::client::RedcapClient`]
//! so that an in-memory project can stand in for a real server.

use calcsync_core::{FieldMetadata, Record};

use crate::error::{RedcapError, Result};

/// Export/import operations against one REDCap project.
pub trait RedcapApi {
    /// Export the data dictionary (`content=metadata`).
    fn export_metadata(&self) -> Result<Vec<FieldMetadata>>;

    /// Export records in flat format (`content=record`).
    ///
    /// When `fields` is non-empty only those fields are requested; REDCap
    /// still adds the row locator columns on its own.
    fn export_records(&self, fields: &[String]) -> Result<Vec<Record>>;

    /// Import partial records (`content=record` with `data=...`) and return
    /// the number of records REDCap reports as updated.
    fn import_records(&self, rows: &[Record]) -> Result<usize>;
}

/// Look up a field in the data dictionary.
pub fn find_field<'a>(metadata: &'a [FieldMetadata], field_name: &str) -> Result<&'a FieldMetadata> {
    metadata
        .iter()
        .find(|f| f.field_name == field_name)
        .ok_or_else(|| RedcapError::UnknownField(field_name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> FieldMetadata {
        FieldMetadata {
            field_name: name.into(),
            form_name: "form".into(),
            field_type: "calc".into(),
            field_label: String::new(),
            formula_source: "[a] + 1".into(),
            action_tag: None,
        }
    }

    #[test]
    fn find_field_by_name() {
        let metadata = vec![field("a"), field("total")];
        assert_eq!(find_field(&metadata, "total").unwrap().field_name, "total");
    }

    #[test]
    fn find_field_unknown() {
        let metadata = vec![field("a")];
        let err = find_field(&metadata, "Total").unwrap_err();
        assert!(matches!(err, RedcapError::UnknownField(ref name) if name == "Total"));
    }
}
