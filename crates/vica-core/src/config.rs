//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: which
//! backend to talk to, where the session token lives and how federated
//! sign-in is reached.
//!
//! Configuration is stored at `~/.config/vica/config.json` and can be
//! overridden from the environment (`VICA_ENV`, `VICA_BASE_URL`,
//! `VICA_TOKEN_BACKEND`, `VICA_PROVIDER_URL`).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{FileTokenStore, KeychainTokenStore, MemoryTokenStore, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "vica";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Local backend used during development
const DEFAULT_DEV_HOST: &str = "localhost";
const DEFAULT_DEV_PORT: u16 = 8000;

/// Seconds to wait for the user to finish federated sign-in
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Environment::Development),
            "production" | "prod" => Some(Environment::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    #[default]
    File,
    Keychain,
    Memory,
}

impl TokenBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "file" => Some(TokenBackend::File),
            "keychain" | "keyring" => Some(TokenBackend::Keychain),
            "memory" => Some(TokenBackend::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Hosted page that runs the provider popup and redirects back
    pub sign_in_url: Option<String>,
    /// Loopback port for the callback; 0 picks a free one
    pub callback_port: u16,
    pub timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            sign_in_url: None,
            callback_port: 0,
            timeout_secs: DEFAULT_PROVIDER_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub environment: Environment,
    pub dev_host: String,
    pub dev_port: u16,
    /// Deployment base URL, required outside development
    pub base_url: Option<String>,
    pub token_backend: TokenBackend,
    pub provider: ProviderConfig,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            dev_host: DEFAULT_DEV_HOST.to_string(),
            dev_port: DEFAULT_DEV_PORT,
            base_url: None,
            token_backend: TokenBackend::default(),
            provider: ProviderConfig::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the config file (defaults if absent) and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
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

    /// Apply `VICA_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("VICA_ENV") {
            match Environment::parse(&value) {
                Some(environment) => self.environment = environment,
                None => warn!(value = %value, "Ignoring unknown VICA_ENV"),
            }
        }
        if let Some(value) = lookup("VICA_BASE_URL").filter(|v| !v.is_empty()) {
            self.base_url = Some(value);
        }
        if let Some(value) = lookup("VICA_TOKEN_BACKEND") {
            match TokenBackend::parse(&value) {
                Some(backend) => self.token_backend = backend,
                None => warn!(value = %value, "Ignoring unknown VICA_TOKEN_BACKEND"),
            }
        }
        if let Some(value) = lookup("VICA_PROVIDER_URL").filter(|v| !v.is_empty()) {
            self.provider.sign_in_url = Some(value);
        }
    }

    /// Base URL every backend path is appended to
    pub fn api_base(&self) -> Result<String> {
        match self.environment {
            Environment::Development => Ok(format!("http://{}:{}", self.dev_host, self.dev_port)),
            Environment::Production => self
                .base_url
                .as_deref()
                .map(|url| url.trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    anyhow::anyhow!("base_url must be set in production (config file or VICA_BASE_URL)")
                }),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Open the token store selected by `token_backend`
    pub fn open_token_store(&self) -> Result<Arc<dyn TokenStore>> {
        let store: Arc<dyn TokenStore> = match self.token_backend {
            TokenBackend::File => Arc::new(FileTokenStore::new(self.cache_dir()?)),
            TokenBackend::Keychain => {
                Arc::new(KeychainTokenStore::new().context("Failed to open OS keychain")?)
            }
            TokenBackend::Memory => Arc::new(MemoryTokenStore::new()),
        };
        Ok(store)
    }
}
