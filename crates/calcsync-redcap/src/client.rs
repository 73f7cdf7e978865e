//! Blocking REDCap API client built on `ureq`.
//!
//! Every call is a form-encoded POST to the project's API endpoint. The token
//! is added to each request and never logged.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use calcsync_core::{FieldMetadata, Record};

use crate::api::RedcapApi;
use crate::error::{RedcapError, Result};

/// Record exports of large projects easily exceed ureq's 10 MB default.
const MAX_RESPONSE_BYTES: u64 = 512 * 1024 * 1024;

/// Form parameters for a single request (token excluded).
pub type Params = Vec<(String, String)>;

/// REDCap client bound to one project (URL + token).
pub struct RedcapClient {
    agent: ureq::Agent,
    url: String,
    token: String,
}

impl std::fmt::Debug for RedcapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedcapClient")
            .field("url", &self.url)
            .field("token", &"***")
            .finish()
    }
}

impl RedcapClient {
    /// Create a client. Non-200 responses are turned into
    /// [`RedcapError::Status`] with the body preserved.
    pub fn new(url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            url: url.into(),
            token: token.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST the form and return the body of a 200 response.
    fn post(&self, params: &Params) -> Result<String> {
        let content = params
            .iter()
            .find(|(k, _)| k == "content")
            .map(|(_, v)| v.as_str())
            .unwrap_or("?");
        debug!(url = %self.url, content, "POST");

        let form = std::iter::once(("token", self.token.as_str()))
            .chain(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        let mut response = self
            .agent
            .post(&self.url)
            .send_form(form)
            .map_err(|e| RedcapError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .with_config()
            .limit(MAX_RESPONSE_BYTES)
            .read_to_string()
            .map_err(|e| RedcapError::Transport(e.to_string()))?;
        debug!(status, bytes = body.len(), "response");

        if status != 200 {
            return Err(RedcapError::Status { status, body });
        }
        Ok(body)
    }
}

impl RedcapApi for RedcapClient {
    fn export_metadata(&self) -> Result<Vec<FieldMetadata>> {
        let body = self.post(&metadata_params())?;
        let metadata = parse_metadata(&body)?;
        info!(fields = metadata.len(), "exported metadata");
        Ok(metadata)
    }

    fn export_records(&self, fields: &[String]) -> Result<Vec<Record>> {
        let body = self.post(&record_export_params(fields))?;
        let records = parse_records(&body)?;
        info!(records = records.len(), "exported records");
        Ok(records)
    }

    fn import_records(&self, rows: &[Record]) -> Result<usize> {
        let data = serde_json::to_string(rows).map_err(|e| RedcapError::decode("import data", e))?;
        let body = self.post(&record_import_params(data))?;
        let count = parse_import_count(&body, rows.len());
        info!(submitted = rows.len(), updated = count, "imported records");
        Ok(count)
    }
}

// ---------------------------------------------------------------------------
// Request parameters
// ---------------------------------------------------------------------------

fn param(key: &str, value: &str) -> (String, String) {
    (key.to_string(), value.to_string())
}

pub fn metadata_params() -> Params {
    vec![param("content", "metadata"), param("format", "json")]
}

pub fn record_export_params(fields: &[String]) -> Params {
    let mut params = vec![
        param("content", "record"),
        param("format", "json"),
        param("type", "flat"),
        param("rawOrLabel", "raw"),
    ];
    for (i, field) in fields.iter().enumerate() {
        params.push((format!("fields[{i}]"), field.clone()));
    }
    params
}

pub fn record_import_params(data: String) -> Params {
    vec![
        param("content", "record"),
        param("format", "json"),
        param("type", "flat"),
        param("overwriteBehavior", "normal"),
        param("returnContent", "count"),
        param("returnFormat", "json"),
        ("data".to_string(), data),
    ]
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

pub fn parse_metadata(body: &str) -> Result<Vec<FieldMetadata>> {
    serde_json::from_str(body).map_err(|e| RedcapError::decode("metadata", e))
}

pub fn parse_records(body: &str) -> Result<Vec<Record>> {
    serde_json::from_str(body).map_err(|e| RedcapError::decode("records", e))
}

#[derive(Deserialize)]
struct ImportCount {
    count: serde_json::Value,
}

/// Read `{"count": n}` from an import response. Falls back to the number of
/// submitted rows when the body has another shape.
pub fn parse_import_count(body: &str, submitted: usize) -> usize {
    let Ok(parsed) = serde_json::from_str::<ImportCount>(body) else {
        return submitted;
    };
    match parsed.count {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize).unwrap_or(submitted),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or(submitted),
        _ => submitted,
    }
}
