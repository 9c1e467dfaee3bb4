//! Configuration management for turnlimit

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of prompt/answer pairs kept in the live sequence
pub const DEFAULT_MAX_PAIRS: usize = 2;

/// Default number of pairs restored per scroll trigger
pub const DEFAULT_REVEAL_BATCH_SIZE: usize = 2;

/// Default scroll offset at or below which older content is revealed
pub const DEFAULT_NEAR_TOP_THRESHOLD: f64 = 200.0;

/// Default attribute marking a block that came back from the cache
pub const DEFAULT_RESTORED_ATTRIBUTE: &str = "data-cached";

/// Default quiescence delay for content-changed notifications (ms)
pub const DEFAULT_CONTENT_DEBOUNCE_MS: u64 = 500;

/// Default quiescence delay for scroll notifications (ms)
pub const DEFAULT_SCROLL_DEBOUNCE_MS: u64 = 100;

/// Default interval between readiness probes (ms)
pub const DEFAULT_READY_POLL_INTERVAL_MS: u64 = 1000;

/// Retention and reveal configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimiterConfig {
    /// Maximum number of pairs retained in the live sequence
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,

    /// Maximum number of pairs restored by one scroll trigger
    #[serde(default = "default_reveal_batch_size")]
    pub reveal_batch_size: usize,

    /// Scroll offset at or below which restoration kicks in
    #[serde(default = "default_near_top_threshold")]
    pub near_top_threshold: f64,

    /// Attribute set to "true" on every restored block
    #[serde(default = "default_restored_attribute")]
    pub restored_attribute: String,
}

fn default_max_pairs() -> usize {
    DEFAULT_MAX_PAIRS
}

fn default_reveal_batch_size() -> usize {
    DEFAULT_REVEAL_BATCH_SIZE
}

fn default_near_top_threshold() -> f64 {
    DEFAULT_NEAR_TOP_THRESHOLD
}

fn default_restored_attribute() -> String {
    DEFAULT_RESTORED_ATTRIBUTE.to_string()
}

impl Default for LimiterConfig {
    fn default() -> Self {
        LimiterConfig {
            max_pairs: DEFAULT_MAX_PAIRS,
            reveal_batch_size: DEFAULT_REVEAL_BATCH_SIZE,
            near_top_threshold: DEFAULT_NEAR_TOP_THRESHOLD,
            restored_attribute: default_restored_attribute(),
        }
    }
}

/// Event coalescing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimingConfig {
    /// Quiet period after the last content change before eviction runs
    #[serde(default = "default_content_debounce_ms")]
    pub content_debounce_ms: u64,

    /// Quiet period after the last scroll before restoration runs
    #[serde(default = "default_scroll_debounce_ms")]
    pub scroll_debounce_ms: u64,

    /// How often to probe a content source that is not ready yet
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,
}

fn default_content_debounce_ms() -> u64 {
    DEFAULT_CONTENT_DEBOUNCE_MS
}

fn default_scroll_debounce_ms() -> u64 {
    DEFAULT_SCROLL_DEBOUNCE_MS
}

fn default_ready_poll_interval_ms() -> u64 {
    DEFAULT_READY_POLL_INTERVAL_MS
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            content_debounce_ms: DEFAULT_CONTENT_DEBOUNCE_MS,
            scroll_debounce_ms: DEFAULT_SCROLL_DEBOUNCE_MS,
            ready_poll_interval_ms: DEFAULT_READY_POLL_INTERVAL_MS,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Retention and reveal settings
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Debounce and readiness timing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Default config file location (`<config dir>/turnlimit/config.yaml`)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("turnlimit")
            .join("config.yaml")
    }

    /// Load configuration from a file (YAML or JSON), with environment variable substitution
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let content = Self::substitute_env_vars(&content);

        let mut config: Config = if is_yaml(path_ref) {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse YAML config: {}", e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse JSON config: {}", e))
            })?
        };

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Build a config from defaults plus environment overrides
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(max_pairs) = std::env::var("TURNLIMIT_MAX_PAIRS") {
            if let Ok(n) = max_pairs.trim().parse::<usize>() {
                self.limiter.max_pairs = n;
            }
        }

        if let Ok(batch) = std::env::var("TURNLIMIT_REVEAL_BATCH_SIZE") {
            if let Ok(n) = batch.trim().parse::<usize>() {
                self.limiter.reveal_batch_size = n;
            }
        }

        if let Ok(threshold) = std::env::var("TURNLIMIT_NEAR_TOP_THRESHOLD") {
            if let Ok(t) = threshold.trim().parse::<f64>() {
                self.limiter.near_top_threshold = t;
            }
        }
    }

    /// Substitute environment variables in config content
    /// Supports ${VAR_NAME} syntax
    fn substitute_env_vars(content: &str) -> String {
        let mut result = content.to_string();

        let re = match regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}") {
            Ok(re) => re,
            Err(_) => return result,
        };

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_name = &cap[1];

            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(full_match, &value);
            }
        }

        result
    }

    /// Save configuration to a file (format determined by extension)
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        let content = if is_yaml(path_ref) {
            serde_yaml::to_string(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to YAML: {}", e))
            })?
        } else {
            serde_json::to_string_pretty(self).map_err(|e| {
                Error::Config(format!("Failed to serialize config to JSON: {}", e))
            })?
        };

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path_ref, content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.limiter.reveal_batch_size == 0 {
            return Err(Error::InvalidConfig(
                "reveal_batch_size must be greater than 0".to_string(),
            ));
        }

        let threshold = self.limiter.near_top_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "near_top_threshold must be a non-negative number, got {}",
                threshold
            )));
        }

        if self.limiter.restored_attribute.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "restored_attribute must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}
