//! Configuration loading, validation, and management for Sproutline.
//!
//! Loads configuration from `~/.sproutline/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
///
/// Maps directly to `~/.sproutline/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Completion endpoint API key. The deployment mandate is that this is
    /// the operator's own credential, so generated traces also appear in
    /// the operator's upstream console.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Completion endpoint base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for the primary generation call
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for the evaluator's scoring call
    #[serde(default = "default_model")]
    pub evaluator_model: String,

    /// Output-token ceiling per generated reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_max_tokens() -> u32 {
    500
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("evaluator_model", &self.evaluator_model)
            .field("max_tokens", &self.max_tokens)
            .field("storage", &self.storage)
            .field("gateway", &self.gateway)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            evaluator_model: default_model(),
            max_tokens: default_max_tokens(),
            storage: StorageConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// SQLite database file path; defaults to the workspace directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_storage_backend() -> String {
    "sqlite".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    /// The SQLite database path: the configured path, or
    /// `~/.sproutline/sproutline.db`.
    pub fn database_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => PathBuf::from(p),
            None => AppConfig::workspace_dir().join("sproutline.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origin for the public widget; any origin if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_origin: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8088
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allowed_origin: None,
        }
    }
}

impl AppConfig {
    /// The workspace directory: `~/.sproutline`.
    pub fn workspace_dir() -> PathBuf {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sproutline")
    }

    /// The default config file path: `~/.sproutline/config.toml`.
    pub fn config_path() -> PathBuf {
        Self::workspace_dir().join("config.toml")
    }

    /// Load configuration from the default path, falling back to defaults
    /// when the file does not exist, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path();
        let mut config = if path.exists() {
            Self::load_from_path(&path)?
        } else {
            debug!(path = %path.display(), "No config file found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: AppConfig = toml::from_str(&raw)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Environment variables take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("SPROUTLINE_API_KEY") {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Ok(model) = std::env::var("SPROUTLINE_MODEL") {
            if !model.is_empty() {
                self.model = model;
            }
        }
        if let Ok(port) = std::env::var("SPROUTLINE_PORT") {
            if let Ok(port) = port.parse() {
                self.gateway.port = port;
            }
        }
    }

    /// Validate settings that would otherwise fail at an awkward moment.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be positive".into()));
        }
        if self.model.is_empty() || self.evaluator_model.is_empty() {
            return Err(ConfigError::Invalid("model names cannot be empty".into()));
        }
        match self.storage.backend.as_str() {
            "sqlite" | "memory" => Ok(()),
            other => Err(ConfigError::Invalid(format!(
                "unknown storage backend: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.gateway.port, 8088);
        assert_eq!(config.storage.backend, "sqlite");
    }

    #[test]
    fn load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
api_key = "sk-test"
model = "gpt-4o"
max_tokens = 350

[gateway]
port = 9000
allowed_origin = "https://littlesprouts.example"

[storage]
backend = "memory"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.max_tokens, 350);
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(
            config.gateway.allowed_origin.as_deref(),
            Some("https://littlesprouts.example")
        );
        assert_eq!(config.storage.backend, "memory");
        // Unspecified fields keep their defaults.
        assert_eq!(config.evaluator_model, "gpt-4o-mini");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn invalid_backend_rejected() {
        let mut config = AppConfig::default();
        config.storage.backend = "postgres".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_max_tokens_rejected() {
        let mut config = AppConfig::default();
        config.max_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_take_precedence() {
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };

        unsafe {
            std::env::set_var("SPROUTLINE_API_KEY", "sk-env");
            std::env::set_var("SPROUTLINE_MODEL", "gpt-env");
            std::env::set_var("SPROUTLINE_PORT", "9911");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("SPROUTLINE_API_KEY");
            std::env::remove_var("SPROUTLINE_MODEL");
            std::env::remove_var("SPROUTLINE_PORT");
        }

        assert_eq!(config.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.model, "gpt-env");
        assert_eq!(config.gateway.port, 9911);

        // An empty value is not an override.
        let mut config = AppConfig {
            api_key: Some("sk-file".into()),
            ..AppConfig::default()
        };
        unsafe {
            std::env::set_var("SPROUTLINE_API_KEY", "");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("SPROUTLINE_API_KEY");
        }
        assert_eq!(config.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-very-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn database_path_prefers_configured() {
        let storage = StorageConfig {
            backend: "sqlite".into(),
            path: Some("/tmp/test.db".into()),
        };
        assert_eq!(storage.database_path(), PathBuf::from("/tmp/test.db"));
    }
}
