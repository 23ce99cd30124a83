//! # me-config
//!
//! Layered configuration: built-in defaults, then an optional
//! `mindease.toml`, then `MINDEASE__*` environment variables
//! (`MINDEASE__BACKEND__URL`, `MINDEASE__SERVER__PORT`, ...).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

pub const CONFIG_FILE: &str = "mindease";
pub const ENV_PREFIX: &str = "MINDEASE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("missing configuration value: {0}")]
    Missing(&'static str),
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Supabase-compatible HTTP backend.
    Rest,
    /// In-process backend, data lost on exit.
    Memory,
}

#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    #[serde(default)]
    pub url: Option<String>,
    /// Public (anon) API key sent with every request.
    #[serde(default)]
    pub anon_key: Option<SecretString>,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl AppConfig {
    /// Loads `.env`, the config file and the environment, in that order.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("loaded environment from {}", path.display());
        }
        let builder = Self::builder()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true));
        Self::from_builder(builder)
    }

    /// Defaults only; callers stack their own sources on top.
    pub fn builder() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Ok(Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("backend.kind", "rest")?
            .set_default("log.level", "info")?)
    }

    pub fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.kind == BackendKind::Rest {
            if self.backend.url.is_none() {
                return Err(ConfigError::Missing("backend.url"));
            }
            if self.backend.anon_key.is_none() {
                return Err(ConfigError::Missing("backend.anon_key"));
            }
        }
        Ok(())
    }
}
