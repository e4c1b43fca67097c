//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/amelia/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/amelia/` (~/.config/amelia/)
//! - Data: `$XDG_DATA_HOME/amelia/` (~/.local/share/amelia/)
//! - State/Logs: `$XDG_STATE_HOME/amelia/` (~/.local/state/amelia/)

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

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
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
    /// Store location override
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Analytics configuration
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Key-insights summary webhook (optional)
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Conversation lifecycle defaults
    #[serde(default)]
    pub conversation: ConversationDefaults,
}

/// Store location
#[derive(Debug, Deserialize, Default)]
pub struct DatabaseConfig {
    /// Path to the SQLite file; defaults to [`Config::default_database_path`]
    pub path: Option<PathBuf>,
}

/// Analytics configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Accepted `classification_type` values for mood rows.
    /// Empty means every row with a valid score counts.
    #[serde(default)]
    pub mood_classification_types: Vec<String>,

    /// Length of the range used when the caller gives none
    #[serde(default = "default_range_days")]
    pub default_range_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            mood_classification_types: vec![],
            default_range_days: default_range_days(),
        }
    }
}

fn default_range_days() -> u32 {
    7
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

/// Summary webhook configuration
///
/// The webhook returns a short list of key insights for a patient and
/// date range. It is called once per request, without retries.
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Enable/disable the webhook
    #[serde(default)]
    pub enabled: bool,

    /// Endpoint URL (e.g., `https://hooks.example.com/webhook/summary`)
    pub url: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            timeout_secs: default_webhook_timeout(),
        }
    }
}

impl WebhookConfig {
    /// Check if the webhook is enabled and has an endpoint
    pub fn is_ready(&self) -> bool {
        self.enabled && self.url.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.url.as_deref() {
            None => Err(Error::Config(
                "webhook.url is required when webhook is enabled".to_string(),
            )),
            Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => Err(
                Error::Config(format!("webhook.url must be an http(s) URL, got {}", url)),
            ),
            Some(_) if self.timeout_secs == 0 => Err(Error::Config(
                "webhook.timeout_secs must be greater than 0".to_string(),
            )),
            Some(_) => Ok(()),
        }
    }
}

fn default_webhook_timeout() -> u64 {
    30
}

/// Conversation lifecycle defaults
#[derive(Debug, Deserialize)]
pub struct ConversationDefaults {
    /// Inactivity timeout used when the store has no `conversation_config` row
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: i64,
}

impl Default for ConversationDefaults {
    fn default() -> Self {
        Self {
            timeout_minutes: default_timeout_minutes(),
        }
    }
}

fn default_timeout_minutes() -> i64 {
    30
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

        config.webhook.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/amelia/config.toml` (~/.config/amelia/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("amelia").join("config.toml")
    }

    /// Returns the data directory path (for SQLite database)
    ///
    /// `$XDG_DATA_HOME/amelia/` (~/.local/share/amelia/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("amelia")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/amelia/` (~/.local/state/amelia/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("amelia")
    }

    /// Returns the default database file path
    ///
    /// `$XDG_DATA_HOME/amelia/amelia.db` (~/.local/share/amelia/amelia.db)
    pub fn default_database_path() -> PathBuf {
        Self::data_dir().join("amelia.db")
    }

    /// Returns the configured database path, falling back to the default.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(Self::default_database_path)
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/amelia/amelia.log` (~/.local/state/amelia/amelia.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("amelia.log")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.database.path.is_none());
        assert!(config.analytics.mood_classification_types.is_empty());
        assert_eq!(config.analytics.default_range_days, 7);
        assert_eq!(config.conversation.timeout_minutes, 30);
        assert!(!config.webhook.is_ready());
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[database]
path = "/tmp/amelia-test.db"

[analytics]
mood_classification_types = ["daily_checkin", "session"]
default_range_days = 14

[logging]
level = "debug"

[conversation]
timeout_minutes = 45
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/tmp/amelia-test.db"));
        assert_eq!(
            config.analytics.mood_classification_types,
            vec!["daily_checkin", "session"]
        );
        assert_eq!(config.analytics.default_range_days, 14);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.max_files, 5);
        assert_eq!(config.conversation.timeout_minutes, 45);
    }

    #[test]
    fn test_webhook_config_validation() {
        // Disabled config is always valid
        let config = WebhookConfig::default();
        assert!(config.validate().is_ok());

        // Enabled without url should fail
        let config = WebhookConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WebhookConfig {
            enabled: true,
            url: Some("ftp://hooks.example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WebhookConfig {
            enabled: true,
            url: Some("https://hooks.example.com/webhook/summary".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.is_ready());
    }

    #[test]
    fn test_load_from_rejects_invalid_webhook() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[webhook]\nenabled = true\n").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
