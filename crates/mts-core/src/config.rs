//! Telemetry configuration
//!
//! Provides:
//! - Config file discovery (explicit path, env var, standard path)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Validation, including the configured PII patterns

use crate::pii::{validate_all, DepthPolicy, PiiPattern, ScrubOptions, DEFAULT_MAX_DEPTH};
use crate::DEFAULT_SERVICE_NAME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Env var naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "MTS_TELEMETRY_CONFIG";

/// Default storage key for persisted breadcrumbs
pub const DEFAULT_BREADCRUMB_STORAGE_KEY: &str = "mtsynergy_breadcrumbs";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete telemetry configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service: ServiceSettings,
    pub logger: LoggerSettings,
    pub breadcrumbs: BreadcrumbSettings,
    pub redaction: RedactionSettings,
}

/// Service identity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name stamped on every log entry and span
    pub name: String,

    /// Deployment environment; "production" suppresses debug logs
    pub environment: String,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: DEFAULT_SERVICE_NAME.to_string(),
            environment: "development".to_string(),
        }
    }
}

impl ServiceSettings {
    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }
}

/// Logger pattern sourcing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerSettings {
    /// Endpoint returning a JSON array of patterns
    pub patterns_url: Option<String>,

    /// Pattern fetch timeout in milliseconds
    pub fetch_timeout_ms: u64,

    /// Baseline patterns used until a fetch succeeds
    pub patterns: Vec<PiiPattern>,

    /// Append the built-in catalogue to the baseline patterns
    pub use_builtin_patterns: bool,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            patterns_url: None,
            fetch_timeout_ms: 5000,
            patterns: Vec::new(),
            use_builtin_patterns: false,
        }
    }
}

impl LoggerSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Where breadcrumbs are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// Pick by runtime capability
    #[default]
    Auto,
    /// Keep nothing beyond the in-memory queue
    Memory,
    /// Process-wide map shared by all managers
    Process,
    /// One JSON file per storage key
    File,
}

/// Breadcrumb buffer limits and persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreadcrumbSettings {
    pub max_items: usize,
    pub max_size_kb: usize,
    pub storage_key: String,
    pub storage: StorageBackend,

    /// Directory for file storage (defaults to the platform data dir)
    pub storage_dir: Option<PathBuf>,
}

impl Default for BreadcrumbSettings {
    fn default() -> Self {
        Self {
            max_items: 50,
            max_size_kb: 50,
            storage_key: DEFAULT_BREADCRUMB_STORAGE_KEY.to_string(),
            storage: StorageBackend::Auto,
            storage_dir: None,
        }
    }
}

/// Scrubber traversal settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionSettings {
    pub max_depth: usize,
    pub depth_policy: DepthPolicy,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            depth_policy: DepthPolicy::PassThrough,
        }
    }
}

impl RedactionSettings {
    pub fn scrub_options(&self) -> ScrubOptions {
        ScrubOptions::default()
            .with_max_depth(self.max_depth)
            .with_depth_policy(self.depth_policy)
    }
}

/// Configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Path to config file (if given explicitly)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set an explicit config path
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. Explicit path
    /// 2. MTS_TELEMETRY_CONFIG environment variable
    /// 3. <config dir>/mtsynergy/telemetry.toml
    /// 4. Default values
    pub fn load(&self) -> ConfigResult<TelemetryConfig> {
        let mut config = match self.find_config_file() {
            Some(path) => {
                info!("Loading telemetry configuration from: {}", path.display());
                Self::load_from_file(&path)?
            }
            None => {
                debug!("No telemetry config file found, using defaults");
                TelemetryConfig::default()
            }
        };

        Self::apply_env_overrides(&mut config);
        Self::validate(&config)?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("Config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("{} path does not exist: {}", CONFIG_PATH_ENV, env_path);
        }

        Self::default_config_path().filter(|path| path.exists())
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: &Path) -> ConfigResult<TelemetryConfig> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigResult<TelemetryConfig> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(config: &mut TelemetryConfig) {
        Self::apply_overrides_from(config, |key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup (the process environment in `load`)
    pub fn apply_overrides_from<F>(config: &mut TelemetryConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("MTS_SERVICE_NAME") {
            config.service.name = val;
        }
        if let Some(val) = lookup("MTS_ENV") {
            config.service.environment = val;
        }
        if let Some(val) = lookup("MTS_PII_PATTERNS_URL") {
            config.logger.patterns_url = Some(val).filter(|v| !v.is_empty());
        }
        if let Some(val) = lookup("MTS_PATTERN_FETCH_TIMEOUT_MS") {
            config.logger.fetch_timeout_ms = val.parse().unwrap_or(config.logger.fetch_timeout_ms);
        }
        if let Some(val) = lookup("MTS_BREADCRUMB_MAX_ITEMS") {
            config.breadcrumbs.max_items = val.parse().unwrap_or(config.breadcrumbs.max_items);
        }
        if let Some(val) = lookup("MTS_BREADCRUMB_MAX_SIZE_KB") {
            config.breadcrumbs.max_size_kb = val.parse().unwrap_or(config.breadcrumbs.max_size_kb);
        }
        if let Some(val) = lookup("MTS_BREADCRUMB_STORAGE_KEY") {
            config.breadcrumbs.storage_key = val;
        }
    }

    /// Validate configuration
    pub fn validate(config: &TelemetryConfig) -> ConfigResult<()> {
        if config.service.name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Service name cannot be empty".to_string(),
            ));
        }

        if config.logger.fetch_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Pattern fetch timeout cannot be 0".to_string(),
            ));
        }

        if config.breadcrumbs.max_items == 0 || config.breadcrumbs.max_size_kb == 0 {
            return Err(ConfigError::ValidationError(
                "Breadcrumb limits must be positive".to_string(),
            ));
        }

        if config.breadcrumbs.storage_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "Breadcrumb storage key cannot be empty".to_string(),
            ));
        }

        validate_all(&config.logger.patterns)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(())
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mtsynergy").join("telemetry.toml"))
    }
}
