//! Configuration for the prediction service.

use std::env;

use config::{Config as ConfigLoader, ConfigError, Environment, File, Source};
use serde::Deserialize;

/// API key used when none is configured. Only suitable for local development.
pub const DEFAULT_API_KEY: &str = "testkey";

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Value clients must send in the `X-API-Key` header.
    #[serde(default = "default_api_key")]
    pub api_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key: default_api_key(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// Path to the exported classifier (ONNX).
    #[serde(default = "default_model_path")]
    pub path: String,
    #[serde(default = "default_input_size")]
    pub input_width: u32,
    #[serde(default = "default_input_size")]
    pub input_height: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            input_width: default_input_size(),
            input_height: default_input_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per client identity in any 60 second window.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL or path for the prediction audit log.
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    /// Comma-separated allowed origins, or `*`.
    #[serde(default = "default_cors_origins")]
    pub origins: String,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            origins: default_cors_origins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes, across all uploaded files.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Maximum number of files accepted by the batch endpoint.
    #[serde(default = "default_max_batch_files")]
    pub max_batch_files: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            max_batch_files: default_max_batch_files(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_api_key() -> String {
    DEFAULT_API_KEY.to_string()
}
fn default_model_path() -> String {
    "best_model.onnx".to_string()
}
fn default_input_size() -> u32 {
    32
}
fn default_requests_per_minute() -> u32 {
    60
}
fn default_database_url() -> String {
    "sqlite:./data/predictions.db".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_cors_origins() -> String {
    "*".to_string()
}
fn default_max_body_bytes() -> usize {
    10 * 1024 * 1024
}
fn default_max_batch_files() -> usize {
    32
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. `API_KEY`, `MODEL_PATH`, `RATE_LIMIT_PER_MIN`, `DATABASE_URL`
    /// 2. Environment variables (CIFAR__SECTION__KEY format)
    /// 3. config.toml file (if present)
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(File::with_name("config").required(false))
    }

    fn load_from<S>(file: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let config = ConfigLoader::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("CIFAR")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("auth.api_key", env::var("API_KEY").ok())?
            .set_override_option("model.path", env::var("MODEL_PATH").ok())?
            .set_override_option(
                "rate_limit.requests_per_minute",
                env::var("RATE_LIMIT_PER_MIN").ok(),
            )?
            .set_override_option("database.url", env::var("DATABASE_URL").ok())?
            .build()?;

        config.try_deserialize()
    }

    pub fn uses_default_api_key(&self) -> bool {
        self.auth.api_key == DEFAULT_API_KEY
    }
}
