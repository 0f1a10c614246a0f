//! Configuration management for Crosscast

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub scheduler: SchedulerSection,
    #[serde(default)]
    pub retry: RetrySection,
    /// Per-platform rate limit overrides, keyed by platform then operation,
    /// e.g. `[rate_limits.twitter] posts = { max = 300, window = 900 }`
    #[serde(default)]
    pub rate_limits: HashMap<String, HashMap<String, RateLimitOverride>>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the scheduled-posts JSON document
    pub dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: "~/.local/share/crosscast".to_string(),
        }
    }
}

impl StorageConfig {
    /// Expand `~` in the configured directory
    pub fn expand_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the hosted cross-posting API
    pub base_url: String,
    /// Request timeout in seconds
    #[serde(default = "default_api_timeout")]
    pub timeout: u64,
}

fn default_api_timeout() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.crosscast.social".to_string(),
            timeout: default_api_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Directory holding `<platform>.token` files
    pub token_dir: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_dir: "~/.config/crosscast/tokens".to_string(),
        }
    }
}

impl AuthConfig {
    pub fn expand_token_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.token_dir).to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSection {
    /// Seconds between sweep passes over the scheduled set
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,
    /// Posts due within this many seconds get a dedicated timer; everything
    /// beyond it waits for the sweep
    #[serde(default = "default_timer_horizon")]
    pub timer_horizon: u64,
    /// Attempt cap for scheduled posts, unless overridden per post
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay in seconds for the first retry of a failed execution
    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay: u64,
    /// Ceiling in seconds on the exponential retry delay
    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay: u64,
}

fn default_check_interval() -> u64 {
    60
}

fn default_timer_horizon() -> u64 {
    24 * 3600
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay() -> u64 {
    60
}

fn default_retry_max_delay() -> u64 {
    3600
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            timer_horizon: default_timer_horizon(),
            max_attempts: default_max_attempts(),
            retry_base_delay: default_retry_base_delay(),
            retry_max_delay: default_retry_max_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    /// Attempts per platform within a single execution
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff in seconds between in-execution attempts
    #[serde(default = "default_retry_delay")]
    pub base_delay: u64,
    /// Ceiling in seconds on the in-execution backoff
    #[serde(default = "default_retry_ceiling")]
    pub max_delay: u64,
    /// Error-message substrings treated as permanent; replaces the built-in
    /// list when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub non_retryable: Option<Vec<String>>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1
}

fn default_retry_ceiling() -> u64 {
    60
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay: default_retry_delay(),
            max_delay: default_retry_ceiling(),
            non_retryable: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitOverride {
    /// Requests allowed inside the window
    pub max: u32,
    /// Window length in seconds
    pub window: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Platforms used when a request does not name any
    pub platforms: Vec<String>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            platforms: vec!["twitter".to_string(), "mastodon".to_string()],
        }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self::default()
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosscast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir =
        dirs::data_dir().ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("crosscast"))
}
