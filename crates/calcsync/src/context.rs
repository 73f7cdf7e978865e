//! Runtime context for command execution.
//!
//! The [`RuntimeContext`] holds the global flags and the configuration
//! sources. Configuration is resolved on demand so that commands which never
//! touch REDCap (`eval`, `completion`) work without credentials.

use std::time::Duration;

use anyhow::Result;
use calcsync_config::{CalcsyncConfig, ConfigOverrides, ConfigSources, load_config};
use calcsync_redcap::RedcapClient;

use crate::cli::GlobalArgs;

/// Runtime context passed to every command handler.
#[derive(Debug)]
pub struct RuntimeContext {
    /// Whether to produce JSON output.
    pub json: bool,

    /// Verbose output.
    pub verbose: bool,

    /// Quiet mode: suppress non-essential output.
    pub quiet: bool,

    sources: ConfigSources,
}

impl RuntimeContext {
    /// Build a `RuntimeContext` from parsed global arguments.
    pub fn from_global_args(global: &GlobalArgs) -> Self {
        let overrides = ConfigOverrides {
            api_url: global.url.clone(),
            api_token: global.token.clone(),
            record_id_field: global.record_id_field.clone(),
            comparison: global.comparison,
            blank_values: global.blank_values,
        };
        Self {
            json: global.json,
            verbose: global.verbose,
            quiet: global.quiet,
            sources: ConfigSources {
                file: global.config.clone(),
                overrides,
            },
        }
    }

    /// Resolve the layered configuration.
    pub fn config(&self) -> Result<CalcsyncConfig> {
        Ok(load_config(&self.sources)?)
    }

    /// Build an API client; fails when credentials are missing.
    pub fn client(&self, config: &CalcsyncConfig) -> Result<RedcapClient> {
        let credentials = config.credentials()?;
        Ok(RedcapClient::new(
            credentials.api_url,
            credentials.api_token,
            Duration::from_secs(config.timeout_secs),
        ))
    }
}
