//! REDCap data model: field metadata, records and update entries.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as Json};

use calcsync_formula::Value;
use calcsync_formula::translate::CALCTEXT_TAG;

/// A record as exported by REDCap: field name to value (flat format).
pub type Record = Map<String, Json>;

/// Row locator keys REDCap adds for longitudinal and repeating projects.
pub const EVENT_NAME_FIELD: &str = "redcap_event_name";
pub const REPEAT_INSTRUMENT_FIELD: &str = "redcap_repeat_instrument";
pub const REPEAT_INSTANCE_FIELD: &str = "redcap_repeat_instance";

/// One entry of the data dictionary (`content=metadata`).
///
/// Only the columns calcsync uses are kept; the rest of the dictionary is
/// ignored on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMetadata {
    /// Variable name, unique within the project.
    pub field_name: String,

    /// Instrument the field belongs to.
    #[serde(default)]
    pub form_name: String,

    /// REDCap field type (`calc`, `text`, ...).
    #[serde(default)]
    pub field_type: String,

    #[serde(default)]
    pub field_label: String,

    /// Formula in REDCap syntax (for calc fields).
    #[serde(default, rename = "select_choices_or_calculations")]
    pub formula_source: String,

    /// Action tags / field annotation, e.g. `@CALCTEXT`.
    #[serde(
        default,
        rename = "field_annotation",
        alias = "action_tag",
        deserialize_with = "blank_as_none"
    )]
    pub action_tag: Option<String>,
}

impl FieldMetadata {
    /// Whether REDCap computes this field: a `calc` field, or a text field
    /// tagged `@CALCTEXT`.
    pub fn is_calculated(&self) -> bool {
        self.field_type == "calc"
            || self
                .action_tag
                .as_deref()
                .is_some_and(|tag| tag.contains(CALCTEXT_TAG))
    }

    /// The formula text to translate. REDCap keeps `@CALCTEXT(...)` in the
    /// field annotation, so that is used when the calculation column is empty.
    pub fn formula_text(&self) -> &str {
        if !self.formula_source.trim().is_empty() {
            return &self.formula_source;
        }
        match self.action_tag.as_deref() {
            Some(tag) if tag.contains(CALCTEXT_TAG) => tag,
            _ => &self.formula_source,
        }
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}

/// Render a stored record value the way it is compared and displayed.
///
/// Strings are returned as-is, numbers and booleans in JSON form; `null`
/// renders as an empty string.
pub fn render_json_value(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        Json::Null => String::new(),
        other => other.to_string(),
    }
}

/// Read a field from a record as a display string.
pub fn record_field(record: &Record, name: &str) -> Option<String> {
    record.get(name).map(render_json_value)
}

/// Event / repeat-instance keys identifying a row within a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowLocator {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_instrument: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_instance: Option<String>,
}

impl RowLocator {
    /// Pick up the locator keys present (and non-blank) on a record.
    pub fn from_record(record: &Record) -> Self {
        let get = |key: &str| record_field(record, key).filter(|v| !v.is_empty());
        Self {
            event_name: get(EVENT_NAME_FIELD),
            repeat_instrument: get(REPEAT_INSTRUMENT_FIELD),
            repeat_instance: get(REPEAT_INSTANCE_FIELD),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.event_name.is_none() && self.repeat_instrument.is_none() && self.repeat_instance.is_none()
    }

    /// Human-readable suffix such as ` (visit_1_arm_1, survey #2)`.
    pub fn describe(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        let mut parts = Vec::new();
        if let Some(ref event) = self.event_name {
            parts.push(event.clone());
        }
        match (&self.repeat_instrument, &self.repeat_instance) {
            (Some(instrument), Some(instance)) => parts.push(format!("{instrument} #{instance}")),
            (None, Some(instance)) => parts.push(format!("#{instance}")),
            (Some(instrument), None) => parts.push(instrument.clone()),
            (None, None) => {}
        }
        format!(" ({})", parts.join(", "))
    }
}

/// A calculated value that differs from what REDCap has stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateEntry {
    pub record_id: String,
    pub field_name: String,
    /// Stored value before the update (`N/A` when the field was missing).
    pub previous_value: String,
    pub computed_value: Value,
    #[serde(skip_serializing_if = "RowLocator::is_empty")]
    pub locator: RowLocator,
}

impl UpdateEntry {
    /// Build the partial record REDCap expects on import:
    /// `{"<record id field>": id, "<field>": value, ...locator keys}`.
    pub fn to_import_row(&self, record_id_field: &str) -> Record {
        let mut row = Record::new();
        row.insert(record_id_field.to_string(), Json::String(self.record_id.clone()));
        if let Some(ref event) = self.locator.event_name {
            row.insert(EVENT_NAME_FIELD.to_string(), Json::String(event.clone()));
        }
        if let Some(ref instrument) = self.locator.repeat_instrument {
            row.insert(REPEAT_INSTRUMENT_FIELD.to_string(), Json::String(instrument.clone()));
        }
        if let Some(ref instance) = self.locator.repeat_instance {
            row.insert(REPEAT_INSTANCE_FIELD.to_string(), Json::String(instance.clone()));
        }
        row.insert(
            self.field_name.clone(),
            Json::String(self.computed_value.to_string()),
        );
        row
    }
}

/// Build the `data` payload for a batch of updates.
pub fn import_rows(entries: &[UpdateEntry], record_id_field: &str) -> Vec<Record> {
    entries
        .iter()
        .map(|e| e.to_import_row(record_id_field))
        .collect()
}
