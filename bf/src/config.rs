//! botfleet configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::limiter::LimiterConfig;

/// Main botfleet configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Primary connection credentials and provider endpoint
    pub telegram: TelegramConfig,

    /// Backend store of accounts/bots/channels
    pub backend: BackendConfig,

    /// Per-connection send quota
    pub limits: LimiterConfig,

    /// Key-value storage
    pub storage: StorageConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call early in startup to fail fast with a clear message.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.telegram.token_env).is_err() {
            return Err(eyre::eyre!(
                "Primary bot token not found. Set the {} environment variable.",
                self.telegram.token_env
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .botfleet.yml
        let local_config = PathBuf::from(".botfleet.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/botfleet/botfleet.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("botfleet").join("botfleet.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Primary connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Stable identity of the primary connection
    #[serde(rename = "main-bot-id")]
    pub main_bot_id: String,

    #[serde(rename = "main-bot-username")]
    pub main_bot_username: String,

    /// Environment variable containing the primary bot token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Provider API base URL
    #[serde(rename = "api-base")]
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            main_bot_id: "main".to_string(),
            main_bot_username: String::new(),
            token_env: "BOTFLEET_MAIN_TOKEN".to_string(),
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl TelegramConfig {
    /// Read the primary bot token from the configured environment variable
    pub fn resolve_token(&self) -> Result<String> {
        std::env::var(&self.token_env)
            .with_context(|| format!("environment variable {} not set", self.token_env))
    }
}

/// Backend collaborator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    #[serde(rename = "base-url")]
    pub base_url: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the key-value store database
    #[serde(rename = "kv-path")]
    pub kv_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kv_path: PathBuf::from(".botfleet/kv.db"),
        }
    }
}
