use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::RuleGridError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for RuleGridError {
    fn from(err: ConfigError) -> Self {
        RuleGridError::Config(err.to_string())
    }
}

/// Main configuration for RuleGrid
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuleGridConfig {
    /// Channel-range limits and generated-name layout
    #[serde(default)]
    pub channels: ChannelConfig,

    /// Group expansion policy
    #[serde(default)]
    pub expansion: ExpansionConfig,

    /// Remote expansion job polling
    #[serde(default)]
    pub jobs: JobConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Highest channel number a range may contain
    #[serde(default = "default_max_channel_count")]
    pub max_channel_count: u32,

    /// Placed between the reserved prefix and the base name of generated netclasses
    #[serde(default = "default_name_separator")]
    pub name_separator: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_channel_count: default_max_channel_count(),
            name_separator: default_name_separator(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionConfig {
    /// Plans with more raw netclass pairs than this are expanded remotely
    #[serde(default = "default_remote_threshold_pairs")]
    pub remote_threshold_pairs: usize,

    /// Write (b, a) alongside (a, b) for netclass columns
    #[serde(default = "default_mirror_pairs")]
    pub mirror_pairs: bool,
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            remote_threshold_pairs: default_remote_threshold_pairs(),
            mirror_pairs: default_mirror_pairs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Fixed interval between job status polls (ms)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl JobConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_max_channel_count() -> u32 {
    crate::channel::DEFAULT_MAX_CHANNEL_COUNT
}
fn default_name_separator() -> String {
    "_".to_string()
}
fn default_remote_threshold_pairs() -> usize {
    10_000
}
fn default_mirror_pairs() -> bool {
    true
}
fn default_poll_interval_ms() -> u64 {
    3000
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Configuration manager with layered sources
pub struct ConfigManager {
    config: RuleGridConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (.env file)
    /// 2. Config file (.rulegrid.toml)
    /// 3. Sensible defaults
    pub fn load() -> Result<Self, ConfigError> {
        info!("Loading RuleGrid configuration");

        Self::load_dotenv();

        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config);
        Self::validate_config(&config)?;

        match config_path {
            Some(ref path) => info!("Config file: {}", path.display()),
            None => info!("Config file: none (using defaults)"),
        }
        info!(
            "Max channels: {}, remote threshold: {} pairs, poll interval: {}ms",
            config.channels.max_channel_count,
            config.expansion.remote_threshold_pairs,
            config.jobs.poll_interval_ms
        );

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load an explicit config file, still honouring environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::apply_env_overrides(Self::read_toml_file(path)?);
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Load .env file if it exists
    fn load_dotenv() {
        if Path::new(".env").exists() {
            if let Err(e) = dotenv::from_filename(".env") {
                warn!("Failed to load .env file: {}", e);
            }
            return;
        }

        if let Some(home) = dirs::home_dir() {
            let home_env = home.join(".rulegrid.env");
            if home_env.exists() {
                if let Err(e) = dotenv::from_path(&home_env) {
                    warn!("Failed to load .rulegrid.env: {}", e);
                }
            }
        }
    }

    /// Find and load config file
    /// Search order:
    /// 1. ./.rulegrid.toml (current directory)
    /// 2. ~/.rulegrid/config.toml (user config)
    /// 3. Use defaults
    fn load_config_file() -> Result<(RuleGridConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".rulegrid.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".rulegrid").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((RuleGridConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<RuleGridConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: RuleGridConfig) -> RuleGridConfig {
        if let Ok(max) = std::env::var("RULEGRID_MAX_CHANNEL_COUNT") {
            if let Ok(n) = max.parse() {
                config.channels.max_channel_count = n;
            }
        }
        if let Ok(sep) = std::env::var("RULEGRID_NAME_SEPARATOR") {
            config.channels.name_separator = sep;
        }
        if let Ok(threshold) = std::env::var("RULEGRID_REMOTE_THRESHOLD_PAIRS") {
            if let Ok(n) = threshold.parse() {
                config.expansion.remote_threshold_pairs = n;
            }
        }
        if let Ok(mirror) = std::env::var("RULEGRID_MIRROR_PAIRS") {
            config.expansion.mirror_pairs = mirror.to_lowercase() == "true";
        }
        if let Ok(interval) = std::env::var("RULEGRID_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                config.jobs.poll_interval_ms = ms;
            }
        }
        if let Ok(level) = std::env::var("RULEGRID_LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }
        if let Ok(format) = std::env::var("RULEGRID_LOG_FORMAT") {
            config.logging.format = format.to_lowercase();
        }

        config
    }

    pub fn validate_config(config: &RuleGridConfig) -> Result<(), ConfigError> {
        if config.channels.max_channel_count == 0 {
            return Err(ConfigError::ValidationError(
                "channels.max_channel_count must be at least 1".to_string(),
            ));
        }

        if config.channels.max_channel_count > crate::channel::CHANNEL_COUNT_LIMIT {
            return Err(ConfigError::ValidationError(format!(
                "channels.max_channel_count must not exceed {}",
                crate::channel::CHANNEL_COUNT_LIMIT
            )));
        }

        if config.jobs.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "jobs.poll_interval_ms must be positive".to_string(),
            ));
        }

        match config.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                    other
                )))
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "json" | "compact" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, json, compact",
                    other
                )))
            }
        }

        Ok(())
    }

    pub fn config(&self) -> &RuleGridConfig {
        &self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Create a default config file
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let config = RuleGridConfig::default();
        let toml_str =
            toml::to_string_pretty(&config).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        Ok(())
    }
}
