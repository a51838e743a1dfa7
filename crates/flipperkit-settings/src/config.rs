//! Configuration and settings management for FlipperKit
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats, chosen by file extension, stored in a platform-specific
//! directory by default.
//!
//! Configuration is organized into sections:
//! - Dispatcher settings (priorities, nesting limit, event history)
//! - Logging preferences (level, output format)

use flipperkit_core::events::DispatcherConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::error::{ConfigError, SettingsError, SettingsResult};

/// Directory name under the platform config dir
const APP_DIR: &str = "flipperkit";
/// Default config file name
const CONFIG_FILE: &str = "config.toml";

/// Event dispatcher settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Priority for handlers registered without one
    pub default_priority: i32,
    /// Maximum nesting of posts inside handlers
    pub max_depth: usize,
    /// Keep a record of posted events
    pub enable_history: bool,
    /// Maximum number of history records
    pub max_history_size: usize,
    /// How long history records are kept, in seconds
    pub history_retention_secs: u64,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        let config = DispatcherConfig::default();
        Self {
            default_priority: config.default_priority,
            max_depth: config.max_depth,
            enable_history: config.enable_history,
            max_history_size: config.max_history_size,
            history_retention_secs: config.history_retention.as_secs(),
        }
    }
}

impl From<&DispatcherSettings> for DispatcherConfig {
    fn from(settings: &DispatcherSettings) -> Self {
        Self {
            default_priority: settings.default_priority,
            max_depth: settings.max_depth,
            enable_history: settings.enable_history,
            max_history_size: settings.max_history_size,
            history_retention: Duration::from_secs(settings.history_retention_secs),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line human readable output
    #[default]
    Pretty,
    /// Single-line output
    Compact,
    /// Newline-delimited JSON
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when `RUST_LOG` is not set: a level or a directive list
    /// such as `flipperkit_core=debug,info`
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Include the event target (module path)
    pub with_target: bool,
    /// Include source line numbers
    pub with_line_number: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
            with_target: true,
            with_line_number: true,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Dispatcher settings
    pub dispatcher: DispatcherSettings,
    /// Logging preferences
    pub logging: LoggingSettings,
}

/// Serialization format picked from a file extension
enum Format {
    Json,
    Toml,
}

impl Format {
    fn from_path(path: &Path) -> SettingsResult<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(ConfigError::UnsupportedFormat(other.unwrap_or("none").to_string()).into()),
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = Format::from_path(path)?;
        let content = std::fs::read_to_string(path)?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load config from file, or the defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match Format::from_path(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.dispatcher.max_depth == 0 {
            return Err(out_of_range("dispatcher.max_depth", self.dispatcher.max_depth));
        }

        if self.dispatcher.max_history_size == 0 {
            return Err(out_of_range(
                "dispatcher.max_history_size",
                self.dispatcher.max_history_size,
            ));
        }

        if let Err(e) = EnvFilter::try_new(&self.logging.level) {
            return Err(SettingsError::InvalidSetting {
                key: "logging.level".to_string(),
                reason: format!("'{}': {}", self.logging.level, e),
            });
        }

        Ok(())
    }

    /// Dispatcher configuration for the core
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::from(&self.dispatcher)
    }
}

fn out_of_range(key: &str, value: impl ToString) -> SettingsError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Default config file location, e.g. `~/.config/flipperkit/config.toml`
pub fn config_file_path() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .ok_or_else(|| ConfigError::UnsupportedPlatform(std::env::consts::OS.to_string()).into())
}

/// Create the directory holding `path` if it is missing
pub fn ensure_config_dir(path: &Path) -> SettingsResult<()> {
    let Some(dir) = path.parent() else {
        return Err(SettingsError::ConfigDirectory(format!(
            "no parent directory for {}",
            path.display()
        )));
    };
    std::fs::create_dir_all(dir)
        .map_err(|e| SettingsError::ConfigDirectory(format!("{}: {}", dir.display(), e)))
}
