//! Client configuration.
//!
//! # Base URL resolution
//! ```text
//! behind_proxy            → ""            (relative URLs; explicit ignored)
//! explicit base_url       → explicit
//! PAYDASH_API_BASE_URL    → env default
//! otherwise               → http://localhost:8089
//! ```
//! Resolution happens once, when the client is built.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Local development backend.
pub const DEV_BASE_URL: &str = "http://localhost:8089";

pub const ENV_BASE_URL: &str = "PAYDASH_API_BASE_URL";
pub const ENV_BEHIND_PROXY: &str = "PAYDASH_BEHIND_PROXY";
pub const ENV_TIMEOUT_MS: &str = "PAYDASH_TIMEOUT_MS";

/// Settings consumed by `HttpClient::from_config`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Explicit backend origin.
    pub base_url: Option<String>,

    /// Deployed behind a reverse proxy that routes relative paths.
    pub behind_proxy: bool,

    /// Default per-request timeout in milliseconds.
    pub timeout_ms: u64,

    /// Directory downloads are written into.
    pub download_dir: PathBuf,

    /// Base URL supplied by the environment. Not read from files.
    #[serde(skip)]
    pub env_base_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            behind_proxy: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            download_dir: PathBuf::from("."),
            env_base_url: None,
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl ClientConfig {
    /// Defaults overlaid with `PAYDASH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay environment values read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|u| !u.is_empty()) {
            self.env_base_url = Some(url);
        }
        if let Some(flag) = lookup(ENV_BEHIND_PROXY) {
            self.behind_proxy = truthy(&flag);
        }
        if let Some(ms) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = ms
                .trim()
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("{ENV_TIMEOUT_MS}: {e}")))?;
        }
        self.validate()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn resolve_base_url(&self) -> String {
        resolve_base_url(
            self.behind_proxy,
            self.base_url.as_deref(),
            self.env_base_url.as_deref(),
        )
    }
}

/// Apply the base URL policy. Trailing slashes are trimmed.
pub fn resolve_base_url(behind_proxy: bool, explicit: Option<&str>, env_default: Option<&str>) -> String {
    if behind_proxy {
        return String::new();
    }
    explicit
        .filter(|u| !u.is_empty())
        .or(env_default.filter(|u| !u.is_empty()))
        .unwrap_or(DEV_BASE_URL)
        .trim_end_matches('/')
        .to_string()
}

/// Load and validate a TOML config file, then overlay the environment.
pub fn load_config(path: &Path) -> Result<ClientConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let mut config = ClientConfig::from_toml_str(&text)?;
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}
