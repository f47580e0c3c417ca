//! Client configuration management.
//!
//! This module handles loading and saving the client configuration, which
//! selects the backend environment, optional base URL and timeout overrides,
//! where remembered sessions are kept, and the last username used to log in.
//!
//! Configuration is stored at `~/.config/forestpest/config.json`. The
//! `FORESTPEST_ENV`, `FORESTPEST_API_URL` and `FORESTPEST_TIMEOUT_SECS`
//! environment variables override the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::endpoints;
use crate::auth::token::EXPIRY_BUFFER_SECS;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "forestpest";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_ENVIRONMENT: &str = "FORESTPEST_ENV";
const ENV_API_URL: &str = "FORESTPEST_API_URL";
const ENV_TIMEOUT_SECS: &str = "FORESTPEST_TIMEOUT_SECS";

/// Backend deployment profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Test,
}

impl Environment {
    pub fn base_url(self) -> &'static str {
        match self {
            Environment::Development | Environment::Test => "http://localhost:8080/api",
            Environment::Production => "http://localhost/api",
        }
    }

    pub fn timeout(self) -> Duration {
        match self {
            Environment::Development => Duration::from_secs(10),
            Environment::Production => Duration::from_secs(15),
            Environment::Test => Duration::from_secs(5),
        }
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            "test" => Ok(Environment::Test),
            other => Err(anyhow::anyhow!("Unknown environment: {other}")),
        }
    }
}

/// Where remembered sessions are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    #[default]
    File,
    Keychain,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
    pub credential_backend: CredentialBackend,
    pub last_username: Option<String>,
}

impl Config {
    /// Load the config file (defaults when absent) and apply env overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from `lookup` (the process environment in production).
    /// Malformed values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup(ENV_ENVIRONMENT) {
            match value.parse() {
                Ok(env) => self.environment = env,
                Err(e) => warn!(error = %e, "Ignoring {ENV_ENVIRONMENT}"),
            }
        }
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.base_url = Some(url.trim().to_string());
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout_secs = Some(secs),
                _ => warn!(value = %value, "Ignoring invalid {ENV_TIMEOUT_SECS}"),
            }
        }
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        let mut config = GatewayConfig::for_environment(self.environment);
        if let Some(ref url) = self.base_url {
            config.base_url = url.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        config
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}

/// Settings the gateway needs for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub login_path: String,
    pub logout_path: String,
    pub refresh_path: String,
    /// Refresh proactively when the access token expires within this window.
    pub expiry_buffer_secs: i64,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Environment::Development.timeout(),
            login_path: endpoints::auth::LOGIN.to_string(),
            logout_path: endpoints::auth::LOGOUT.to_string(),
            refresh_path: endpoints::auth::REFRESH.to_string(),
            expiry_buffer_secs: EXPIRY_BUFFER_SECS,
        }
    }

    pub fn for_environment(environment: Environment) -> Self {
        Self {
            timeout: environment.timeout(),
            ..Self::new(environment.base_url())
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
