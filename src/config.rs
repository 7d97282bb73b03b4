//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/betabridge/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/betabridge/` (~/.config/betabridge/)
//! - State/Logs: `$XDG_STATE_HOME/betabridge/` (~/.local/state/betabridge/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// App Store Connect source configuration
    #[serde(default)]
    pub app_store: AppStoreConfig,

    /// Destination tracker configuration
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// App Store Connect API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppStoreConfig {
    /// API base URL
    #[serde(default = "default_app_store_base_url")]
    pub base_url: String,

    /// App bundle identifier ("com.example.app")
    pub bundle_id: Option<String>,

    /// Opaque app id; cross-validated against `bundle_id` when both are set
    pub app_id: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Max attempts for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Items fetched per list call. The API only supports sort order, not a
    /// date-range filter, so one run sees at most one page of history.
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
}

impl Default for AppStoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_app_store_base_url(),
            bundle_id: None,
            app_id: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            page_limit: default_page_limit(),
        }
    }
}

impl AppStoreConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.bundle_id.is_none() && self.app_id.is_none() {
            return Err(Error::Config(
                "app_store.bundle_id or app_store.app_id is required".to_string(),
            ));
        }
        if self.page_limit == 0 || self.page_limit > 200 {
            return Err(Error::Config(
                "app_store.page_limit must be between 1 and 200".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(Error::Config(
                "app_store.max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_app_store_base_url() -> String {
    "https://api.appstoreconnect.apple.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> usize {
    3
}

fn default_page_limit() -> usize {
    200
}

/// Destination tracker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Team id issues are filed under
    pub team_id: Option<String>,

    /// Labels applied to every filed issue
    #[serde(default)]
    pub default_labels: Vec<String>,

    /// Trailing window for the recent-issue duplicate scan, in days
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: i64,

    /// How many recent team issues the duplicate scan inspects
    #[serde(default = "default_recent_scan_limit")]
    pub recent_scan_limit: usize,

    /// Asset upload timeout in seconds
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            team_id: None,
            default_labels: Vec::new(),
            recent_window_days: default_recent_window_days(),
            recent_scan_limit: default_recent_scan_limit(),
            upload_timeout_secs: default_upload_timeout_secs(),
        }
    }
}

impl TrackerConfig {
    /// Check if the tracker side is fully configured
    pub fn is_ready(&self) -> bool {
        self.team_id.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.team_id.is_none() {
            return Err(Error::Config("tracker.team_id is required".to_string()));
        }
        if self.recent_window_days <= 0 {
            return Err(Error::Config(
                "tracker.recent_window_days must be positive".to_string(),
            ));
        }
        if self.recent_scan_limit == 0 {
            return Err(Error::Config(
                "tracker.recent_scan_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_recent_window_days() -> i64 {
    7
}

fn default_recent_scan_limit() -> usize {
    50
}

fn default_upload_timeout_secs() -> u64 {
    60
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/betabridge/config.toml` (~/.config/betabridge/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("betabridge").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/betabridge/` (~/.local/state/betabridge/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("betabridge")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/betabridge/betabridge.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("betabridge.log")
    }
}
