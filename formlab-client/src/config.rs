//! Configuration loading for the formlab client.
//!
//! `api_base_url` and `credentials_path` are required. Every other section
//! falls back to the deployment defaults below when omitted.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "FORMLAB_CONFIG";
pub const LOG_LEVEL_ENV: &str = "FORMLAB_LOG_LEVEL";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_chat_timeout_ms")]
    pub chat_timeout_ms: u64,
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    pub credentials_path: PathBuf,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollingConfig {
    /// Interval while the agent panel is visible.
    pub fast_interval_ms: u64,
    pub slow_interval_ms: u64,
    /// How long a settled task stays in the registry.
    pub terminal_retention_ms: u64,
    pub max_tracked_tasks: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            fast_interval_ms: 3_000,
            slow_interval_ms: 10_000,
            terminal_retention_ms: 10 * 60 * 1_000,
            max_tracked_tasks: 200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotificationConfig {
    pub dedupe_window_ms: u64,
    pub max_cache_size: usize,
    pub capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 3_000,
            max_cache_size: 50,
            capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    pub level: String,
    pub slow_request_ms: u64,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            slow_request_ms: 3_000,
            json: false,
        }
    }
}

/// Client log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    None,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "none" => Some(LogLevel::None),
            "error" => Some(LogLevel::Error),
            "warn" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    /// Directive understood by `EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::None => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration file path (use --config or FORMLAB_CONFIG)")]
    MissingConfigPath,
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

impl ClientConfig {
    /// Load from the `--config` path if given, else `FORMLAB_CONFIG`, apply
    /// env overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(config_path_from_env)
            .ok_or(ConfigError::MissingConfigPath)?;
        let mut config = Self::from_path(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Minimal config pointing at `api_base_url`, defaults elsewhere.
    pub fn for_base_url(api_base_url: impl Into<String>, credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            request_timeout_ms: default_request_timeout_ms(),
            chat_timeout_ms: default_chat_timeout_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            credentials_path: credentials_path.into(),
            retry: RetryConfig::default(),
            polling: PollingConfig::default(),
            notifications: NotificationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            if !level.trim().is_empty() {
                self.logging.level = level;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must not be empty".to_string(),
            });
        }
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                field: "api_base_url",
                reason: "must start with http:// or https://".to_string(),
            });
        }
        for (field, value) in [
            ("request_timeout_ms", self.request_timeout_ms),
            ("chat_timeout_ms", self.chat_timeout_ms),
            ("poll_timeout_ms", self.poll_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "must be > 0".to_string(),
                });
            }
        }
        if self.credentials_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "credentials_path",
                reason: "must not be empty".to_string(),
            });
        }
        if self.retry.base_delay_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.base_delay_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.polling.fast_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "polling.fast_interval_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.polling.slow_interval_ms < self.polling.fast_interval_ms {
            return Err(ConfigError::InvalidValue {
                field: "polling.slow_interval_ms",
                reason: "must be >= fast_interval_ms".to_string(),
            });
        }
        if self.polling.terminal_retention_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "polling.terminal_retention_ms",
                reason: "must be > 0".to_string(),
            });
        }
        if self.polling.max_tracked_tasks == 0 {
            return Err(ConfigError::InvalidValue {
                field: "polling.max_tracked_tasks",
                reason: "must be > 0".to_string(),
            });
        }
        if self.notifications.capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "notifications.capacity",
                reason: "must be > 0".to_string(),
            });
        }
        if LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::InvalidValue {
                field: "logging.level",
                reason: "must be one of none, error, warn, info, debug".to_string(),
            });
        }
        Ok(())
    }

    pub fn log_level(&self) -> LogLevel {
        LogLevel::parse(&self.logging.level).unwrap_or(LogLevel::Info)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_millis(self.chat_timeout_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

fn default_request_timeout_ms() -> u64 {
    50_000
}

fn default_chat_timeout_ms() -> u64 {
    120_000
}

fn default_poll_timeout_ms() -> u64 {
    10_000
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV).ok().map(PathBuf::from)
}
