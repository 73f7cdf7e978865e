//! Configuration management for calcsync.
//!
//! [`CalcsyncConfig`] is resolved once at startup from built-in defaults, an
//! optional `calcsync.yaml`, `REDCAP_*` environment variables and command-line
//! flags (in increasing precedence), then passed explicitly to every command.

pub mod config;

pub use config::{
    CalcsyncConfig, ConfigError, ConfigOverrides, ConfigSources, Credentials, load_config,
};
