//! Configuration loading for threatscope
//!
//! Settings resolve with environment variables taking priority over the TOML
//! config file, which takes priority over compiled defaults. Everything is
//! resolved once at startup into an [`AppConfig`] that is passed explicitly
//! to the components that need it.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub datasets: DatasetConfig,
    pub database: DatabaseConfig,
}

/// HTTP server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address, e.g. "127.0.0.1:5870"
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5870".to_string(),
        }
    }
}

/// Analysis provider (LLM API) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key; required at startup, resolved from env when absent here
    pub api_key: Option<String>,
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    /// Model name used for expert and summary calls
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4.1".to_string(),
            temperature: 0.0,
            max_tokens: 32768,
        }
    }
}

/// Dataset file locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub hosts_path: PathBuf,
    pub certificates_path: PathBuf,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            hosts_path: PathBuf::from("dataset/hosts.json"),
            certificates_path: PathBuf::from("dataset/certificates.json"),
        }
    }
}

/// Event store backend selection
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite database path; `None` selects the in-memory store
    pub path: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from the default location.
    ///
    /// Reads the file named by `THREATSCOPE_CONFIG` (default
    /// `threatscope.toml` in the working directory), then applies environment
    /// overrides. A missing file is not an error; defaults apply.
    pub fn load() -> Result<Self> {
        let path = std::env::var("THREATSCOPE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("threatscope.toml"));
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific TOML file, or defaults if absent.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {:?}: {}", path, e)))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Apply `THREATSCOPE_*` environment overrides on top of file values.
    ///
    /// The provider API key additionally falls back to `OPENAI_API_KEY` so a
    /// standard provider environment works without a config file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("THREATSCOPE_BIND") {
            self.server.bind = bind;
        }
        if let Ok(key) = std::env::var("THREATSCOPE_API_KEY") {
            self.provider.api_key = Some(key);
        } else if self.provider.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.provider.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("THREATSCOPE_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Ok(model) = std::env::var("THREATSCOPE_MODEL") {
            self.provider.model = model;
        }
        if let Ok(temperature) = std::env::var("THREATSCOPE_TEMPERATURE") {
            match temperature.parse() {
                Ok(t) => self.provider.temperature = t,
                Err(_) => warn!("Ignoring unparseable THREATSCOPE_TEMPERATURE={}", temperature),
            }
        }
        if let Ok(max_tokens) = std::env::var("THREATSCOPE_MAX_TOKENS") {
            match max_tokens.parse() {
                Ok(m) => self.provider.max_tokens = m,
                Err(_) => warn!("Ignoring unparseable THREATSCOPE_MAX_TOKENS={}", max_tokens),
            }
        }
        if let Ok(path) = std::env::var("THREATSCOPE_HOSTS_DATASET") {
            self.datasets.hosts_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("THREATSCOPE_CERTS_DATASET") {
            self.datasets.certificates_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("THREATSCOPE_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }
    }

    /// Validate settings that must be present before serving traffic.
    pub fn validate(&self) -> Result<()> {
        match &self.provider.api_key {
            Some(key) if !key.trim().is_empty() => Ok(()),
            _ => Err(Error::Config(
                "Provider API key not configured. Set THREATSCOPE_API_KEY or \
                 OPENAI_API_KEY, or provider.api_key in threatscope.toml"
                    .to_string(),
            )),
        }
    }
}
