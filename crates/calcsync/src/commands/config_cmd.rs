//! `calcsync config` -- show the resolved configuration.

use anyhow::Result;
use calcsync_config::CalcsyncConfig;
use serde::Serialize;

use crate::context::RuntimeContext;
use crate::output::output_json;

/// Configuration as shown to the user; the token is never printed in full.
#[derive(Debug, Serialize)]
struct ConfigView<'a> {
    api_url: Option<&'a str>,
    api_token: Option<String>,
    record_id_field: &'a str,
    comparison: &'static str,
    blank_values: &'static str,
    timeout_secs: u64,
}

impl<'a> ConfigView<'a> {
    fn new(config: &'a CalcsyncConfig) -> Self {
        Self {
            api_url: config.api_url.as_deref(),
            api_token: config.masked_token(),
            record_id_field: &config.record_id_field,
            comparison: config.comparison.as_str(),
            blank_values: config.blank_values.as_str(),
            timeout_secs: config.timeout_secs,
        }
    }
}

/// Execute the `calcsync config` command.
pub fn run(ctx: &RuntimeContext) -> Result<()> {
    let config = ctx.config()?;
    let view = ConfigView::new(&config);

    if ctx.json {
        output_json(&view);
        return Ok(());
    }

    let unset = "(not set)";
    println!("api_url = {}", view.api_url.unwrap_or(unset));
    println!("api_token = {}", view.api_token.as_deref().unwrap_or(unset));
    println!("record_id_field = {}", view.record_id_field);
    println!("comparison = {}", view.comparison);
    println!("blank_values = {}", view.blank_values);
    println!("timeout_secs = {}", view.timeout_secs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_masks_token() {
        let config = CalcsyncConfig {
            api_token: Some("0123456789ABCDEF".into()),
            ..CalcsyncConfig::default()
        };
        let json = serde_json::to_value(ConfigView::new(&config)).unwrap();
        assert_eq!(json["api_token"], "************CDEF");
        assert_eq!(json["comparison"], "numeric");
        assert_eq!(json["api_url"], serde_json::Value::Null);
    }
}
