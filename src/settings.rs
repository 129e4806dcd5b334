use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::Level;
use url::Url;

use crate::core::admission::DEFAULT_MAX_CONCURRENT_JOBS;
use crate::core::orchestrator::DEFAULT_SIGNED_URL_TTL;
use crate::core::readiness::DEFAULT_READY_TIMEOUT;
use crate::core::renderer::DEFAULT_NAVIGATION_TIMEOUT;

const DEFAULT_PORT: u16 = 8000;
const MAX_CONCURRENT_JOBS_LIMIT: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("RENDER_API_KEY must be set")]
    MissingApiKey,
    #[error("MAX_CONCURRENT_JOBS must be between 1 and 10, got {0}")]
    ConcurrencyOutOfRange(usize),
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("APP_BASE_URL is not a valid base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("LOG_LEVEL is not a valid level: {0}")]
    InvalidLogLevel(String),
    #[error("STORAGE_URL and STORAGE_SERVICE_KEY must be set together")]
    PartialStorage,
}

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_env")]
    pub env: String, // file / server
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub prefix: Option<String>,

    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,
    #[serde(default)]
    pub render_api_key: String,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    #[serde(default = "default_ready_flag_timeout_ms")]
    pub ready_flag_timeout_ms: u64,
    #[serde(default = "default_signed_url_ttl_secs")]
    pub signed_url_ttl_secs: u64,

    pub storage_url: Option<String>,
    pub storage_service_key: Option<String>,
    #[serde(default = "default_storage_bucket")]
    pub storage_bucket: String,

    pub chrome_path: Option<PathBuf>,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_env() -> String {
    "file".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_app_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    DEFAULT_MAX_CONCURRENT_JOBS
}

fn default_navigation_timeout_ms() -> u64 {
    DEFAULT_NAVIGATION_TIMEOUT.as_millis() as u64
}

fn default_ready_flag_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT.as_millis() as u64
}

fn default_signed_url_ttl_secs() -> u64 {
    DEFAULT_SIGNED_URL_TTL.as_secs()
}

fn default_storage_bucket() -> String {
    "renders".to_string()
}

fn default_log_dir() -> String {
    "./logs".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: default_env(),
            app_env: default_app_env(),
            host: default_host(),
            port: default_port(),
            prefix: None,
            app_base_url: default_app_base_url(),
            render_api_key: String::new(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            navigation_timeout_ms: default_navigation_timeout_ms(),
            ready_flag_timeout_ms: default_ready_flag_timeout_ms(),
            signed_url_ttl_secs: default_signed_url_ttl_secs(),
            storage_url: None,
            storage_service_key: None,
            storage_bucket: default_storage_bucket(),
            chrome_path: None,
            log_dir: default_log_dir(),
            log_level: default_log_level(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("env", &self.env)
            .field("app_env", &self.app_env)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("prefix", &self.prefix)
            .field("app_base_url", &self.app_base_url)
            .field("render_api_key", &"<redacted>")
            .field("max_concurrent_jobs", &self.max_concurrent_jobs)
            .field("navigation_timeout_ms", &self.navigation_timeout_ms)
            .field("ready_flag_timeout_ms", &self.ready_flag_timeout_ms)
            .field("signed_url_ttl_secs", &self.signed_url_ttl_secs)
            .field("storage_url", &self.storage_url)
            .field("storage_bucket", &self.storage_bucket)
            .field("chrome_path", &self.chrome_path)
            .field("log_dir", &self.log_dir)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.render_api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !(1..=MAX_CONCURRENT_JOBS_LIMIT).contains(&self.max_concurrent_jobs) {
            return Err(ConfigError::ConcurrencyOutOfRange(self.max_concurrent_jobs));
        }
        if self.navigation_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("NAVIGATION_TIMEOUT_MS"));
        }
        if self.ready_flag_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("READY_FLAG_TIMEOUT_MS"));
        }
        if self.signed_url_ttl_secs == 0 {
            return Err(ConfigError::ZeroTimeout("SIGNED_URL_TTL_SECS"));
        }
        self.base_url()?;
        self.log_level()?;
        if self.storage_url.is_some() != self.storage_service_key.is_some() {
            return Err(ConfigError::PartialStorage);
        }
        Ok(())
    }

    /// Where the configuration was read from, for the startup log.
    pub fn env_source(&self) -> &'static str {
        if self.env == "file" {
            ".env file"
        } else {
            "server environment"
        }
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.app_base_url)
            .map_err(|e| ConfigError::InvalidBaseUrl(format!("{}: {}", self.app_base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::InvalidBaseUrl(self.app_base_url.clone()));
        }
        Ok(url)
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn ready_flag_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_flag_timeout_ms)
    }

    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }
}

/// Reads `.env` (when `env=file`) and the process environment.
///
/// Runs before logging is installed; the chosen source is reported later
/// through [`Config::env_source`].
pub fn get_config() -> Result<Config, ConfigError> {
    let env_var = env::var("env").unwrap_or("file".to_string());
    if env_var == "file" {
        let _ = dotenvy::dotenv();
    }
    let config = envy::from_env::<Config>()?;
    config.validate()?;
    Ok(config)
}
