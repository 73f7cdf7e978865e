//! Configuration types and loading for calcsync.
//!
//! The main entry point is [`load_config`], which layers (lowest precedence
//! first):
//!
//! 1. built-in defaults,
//! 2. `calcsync.yaml` (or the file named with `--config`),
//! 3. `REDCAP_*` assignments in a `.env` file in the working directory,
//! 4. `REDCAP_*` environment variables (`REDCAP_API_URL`, `REDCAP_API_TOKEN`, ...),
//! 5. command-line overrides.

use std::path::PathBuf;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::value::{Dict, Map, Value};
use figment::{Figment, Metadata, Profile, Provider};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use calcsync_core::{ComparisonMode, ReconcileOptions};
use calcsync_formula::BlankPolicy;

/// File looked up in the working directory (and its parents) when no
/// `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "calcsync.yaml";

/// Prefix of the environment variables that feed the configuration.
pub const ENV_PREFIX: &str = "REDCAP_";

/// Dotenv file read from the working directory.
pub const DOTENV_FILE: &str = ".env";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A provider failed (unreadable YAML, wrong value type, ...).
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The file passed with `--config` does not exist.
    #[error("config file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A credential required for talking to REDCap is not set.
    #[error("missing {what}: set {env_var} or pass {flag}")]
    MissingCredential {
        /// What is missing ("API URL", "API token").
        what: &'static str,
        /// Environment variable that would provide it.
        env_var: &'static str,
        /// Command-line flag that would provide it.
        flag: &'static str,
    },

    /// A configuration value was invalid.
    #[error("invalid configuration value for key '{key}': {reason}")]
    InvalidValue {
        /// The configuration key that had an invalid value.
        key: String,
        /// A description of why the value is invalid.
        reason: String,
    },
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

// ---------------------------------------------------------------------------
// Main config struct
// ---------------------------------------------------------------------------

/// The resolved calcsync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalcsyncConfig {
    /// REDCap API endpoint, e.g. `https://redcap.example.org/api/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Project API token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Field holding the record identifier.
    #[serde(default = "default_record_id_field")]
    pub record_id_field: String,

    /// How stored values are compared with computed ones.
    #[serde(default)]
    pub comparison: ComparisonMode,

    /// How blank referenced values are treated.
    #[serde(default)]
    pub blank_values: BlankPolicy,

    /// Timeout for each API request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CalcsyncConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_token: None,
            record_id_field: default_record_id_field(),
            comparison: ComparisonMode::default(),
            blank_values: BlankPolicy::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_record_id_field() -> String {
    "record_id".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// URL and token, both present and validated.
#[derive(Clone)]
pub struct Credentials {
    pub api_url: String,
    pub api_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_url", &self.api_url)
            .field("api_token", &mask_token(&self.api_token))
            .finish()
    }
}

impl CalcsyncConfig {
    /// Return the API credentials, failing if either is missing or the URL
    /// is not an http(s) URL.
    pub fn credentials(&self) -> Result<Credentials> {
        let api_url = non_blank(self.api_url.as_deref()).ok_or(ConfigError::MissingCredential {
            what: "API URL",
            env_var: "REDCAP_API_URL",
            flag: "--url",
        })?;
        let api_token = non_blank(self.api_token.as_deref()).ok_or(ConfigError::MissingCredential {
            what: "API token",
            env_var: "REDCAP_API_TOKEN",
            flag: "--token",
        })?;

        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                key: "api_url".to_string(),
                reason: format!("'{api_url}' is not an http(s) URL"),
            });
        }

        Ok(Credentials {
            api_url: api_url.to_string(),
            api_token: api_token.to_string(),
        })
    }

    /// Options for [`calcsync_core::reconcile`] taken from this configuration.
    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            record_id_field: self.record_id_field.clone(),
            comparison: self.comparison,
            blank_values: self.blank_values,
        }
    }

    /// The token with everything but the last four characters hidden.
    pub fn masked_token(&self) -> Option<String> {
        self.api_token.as_deref().map(mask_token)
    }

    fn validate(&self) -> Result<()> {
        if self.record_id_field.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "record_id_field".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "timeout_secs".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Values given on the command line. `None` leaves lower layers untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id_field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blank_values: Option<BlankPolicy>,
}

/// Where configuration comes from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Explicit config file; must exist when given.
    pub file: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

/// `REDCAP_*` assignments from a dotenv file, keyed like [`Env::prefixed`]
/// keys them. The process environment is left untouched and a missing file
/// provides nothing.
#[derive(Debug, Clone)]
pub struct DotEnv {
    path: PathBuf,
}

impl DotEnv {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Provider for DotEnv {
    fn metadata(&self) -> Metadata {
        Metadata::named("`.env` file").source(self.path.as_path())
    }

    fn data(&self) -> std::result::Result<Map<Profile, Dict>, figment::Error> {
        let entries = match dotenvy::from_path_iter(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.not_found() => return Ok(Map::new()),
            Err(e) => return Err(format!("{}: {e}", self.path.display()).into()),
        };

        let mut dict = Dict::new();
        for entry in entries {
            let (key, raw) = entry.map_err(|e| format!("{}: {e}", self.path.display()))?;
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let value = match raw.parse::<Value>() {
                Ok(value) => value,
                Err(never) => match never {},
            };
            dict.insert(name.to_ascii_lowercase(), value);
        }
        Ok(Profile::Default.collect(dict))
    }
}

/// Build the layered figment without extracting it.
pub fn figment(sources: &ConfigSources) -> Result<Figment> {
    let file = match &sources.file {
        Some(path) if !path.exists() => return Err(ConfigError::FileNotFound(path.clone())),
        Some(path) => Yaml::file(path),
        None => Yaml::file(DEFAULT_CONFIG_FILE),
    };

    Ok(Figment::from(Serialized::defaults(CalcsyncConfig::default()))
        .merge(file)
        .merge(DotEnv::file(DOTENV_FILE))
        .merge(Env::prefixed(ENV_PREFIX))
        .merge(Serialized::defaults(sources.overrides.clone())))
}

/// Resolve the configuration.
///
/// # Errors
///
/// Returns [`ConfigError::FileNotFound`] for a missing `--config` file,
/// [`ConfigError::Load`] when a layer cannot be read or has the wrong shape,
/// and [`ConfigError::InvalidValue`] for out-of-range values. Missing
/// credentials are only reported by [`CalcsyncConfig::credentials`], so
/// offline commands work without them.
pub fn load_config(sources: &ConfigSources) -> Result<CalcsyncConfig> {
    let config: CalcsyncConfig = figment(sources)?.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
