//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup, fails fast on malformed values.
//! The shared secret is wrapped in secrecy::SecretString to prevent log leaks.

pub mod secrets;

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Default data directory holding one `<tenant>.db` file per tenant.
pub const DEFAULT_ROOT: &str = "/var/lib/solidq";

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug)]
pub struct Config {
    /// Directory holding the tenant database files.
    pub root_path: PathBuf,
    pub port: u16,
    /// Shared secret required on every request. `None` disables the check.
    pub secret: Option<SecretString>,
    /// Answer CORS preflights and add permissive CORS headers.
    pub cross_origin: bool,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from(DEFAULT_ROOT),
            port: DEFAULT_PORT,
            secret: None,
            cross_origin: true,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            root_path: std::env::var("SOLIDQ_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.root_path),
            port: parsed_var("SOLIDQ_PORT")?.unwrap_or(defaults.port),
            secret: std::env::var("SOLIDQ_SECRET")
                .ok()
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            cross_origin: parsed_var("SOLIDQ_CROSS_ORIGIN")?.unwrap_or(defaults.cross_origin),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        let file: FileConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("bad config file {}: {e}", path.display())))?;

        let defaults = Self::default();
        Ok(Self {
            root_path: file.root_path.unwrap_or(defaults.root_path),
            port: file.port.unwrap_or(defaults.port),
            secret: file
                .secret
                .filter(|s| !s.is_empty())
                .map(SecretString::from),
            cross_origin: file.cross_origin.unwrap_or(defaults.cross_origin),
            otel_endpoint: file.otel_endpoint,
            log_level: file.log_level.unwrap_or(defaults.log_level),
        })
    }
}

/// On-disk shape of the TOML config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    root_path: Option<PathBuf>,
    port: Option<u16>,
    secret: Option<String>,
    cross_origin: Option<bool>,
    otel_endpoint: Option<String>,
    log_level: Option<String>,
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid value {raw:?} for {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
