//! Daemon configuration.
//!
//! Read from `~/.welcome/daemon.toml` (or `--config`), then overridden by CLI
//! flags. A missing file is fine; missing required keys are not.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use welcome_core::{Result, WelcomeError};

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".welcome/daemon.toml";
const DEFAULT_DATABASE_RELATIVE_PATH: &str = ".welcome/registry.db";
const DEFAULT_INTERVAL_SECS: u64 = 30;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    pub server_url: Option<String>,
    pub home_id: Option<String>,
    pub interval_secs: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub database_path: Option<PathBuf>,
    pub attrs_namespace: Option<String>,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Adds daily rolling log files in this directory.
    pub directory: Option<PathBuf>,
}

/// Values given on the command line; they win over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub server_url: Option<String>,
    pub home_id: Option<String>,
    pub interval_secs: Option<u64>,
}

/// Validated settings for a refresh loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub server_url: String,
    pub home_id: String,
    pub interval: Duration,
    pub request_timeout: Duration,
    pub database_path: PathBuf,
    pub attrs_namespace: String,
}

pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WelcomeError::configuration("config", "home directory not found"))?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

pub fn load_config(path: Option<PathBuf>) -> Result<DaemonConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(DaemonConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| {
        WelcomeError::configuration(
            "config",
            format!("failed to read {}: {}", config_path.display(), err),
        )
    })?;
    toml::from_str::<DaemonConfig>(&content).map_err(|err| {
        WelcomeError::configuration(
            "config",
            format!("failed to parse {}: {}", config_path.display(), err),
        )
    })
}

impl DaemonConfig {
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if overrides.server_url.is_some() {
            self.server_url = overrides.server_url;
        }
        if overrides.home_id.is_some() {
            self.home_id = overrides.home_id;
        }
        if overrides.interval_secs.is_some() {
            self.interval_secs = overrides.interval_secs;
        }
        self
    }

    pub fn log_directory(&self) -> Option<&Path> {
        self.logging.directory.as_deref()
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }
        let home = dirs::home_dir().ok_or_else(|| {
            WelcomeError::configuration("database_path", "home directory not found")
        })?;
        Ok(home.join(DEFAULT_DATABASE_RELATIVE_PATH))
    }

    pub fn resolve(&self) -> Result<Settings> {
        let server_url = required(&self.server_url, "server_url")?
            .trim_end_matches('/')
            .to_string();
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            return Err(WelcomeError::configuration(
                "server_url",
                "must start with http:// or https://",
            ));
        }
        let home_id = required(&self.home_id, "home_id")?.to_string();

        let interval_secs = self.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(WelcomeError::configuration(
                "interval_secs",
                "must be greater than zero",
            ));
        }
        let timeout_ms = self
            .request_timeout_ms
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(WelcomeError::configuration(
                "request_timeout_ms",
                "must be greater than zero",
            ));
        }

        Ok(Settings {
            server_url,
            home_id,
            interval: Duration::from_secs(interval_secs),
            request_timeout: Duration::from_millis(timeout_ms),
            database_path: self.database_path()?,
            attrs_namespace: self
                .attrs_namespace
                .clone()
                .filter(|namespace| !namespace.trim().is_empty())
                .unwrap_or_else(|| welcome_protocol::DEFAULT_ATTRS_NAMESPACE.to_string()),
        })
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(WelcomeError::configuration(field, "is required")),
    }
}
