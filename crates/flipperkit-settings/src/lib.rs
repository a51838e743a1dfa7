//! FlipperKit Settings Crate
//!
//! Loads, validates and saves the machine configuration.

pub mod config;
pub mod error;

pub use config::{config_file_path, ensure_config_dir, Config, DispatcherSettings, LogFormat, LoggingSettings};
pub use error::{ConfigError, SettingsError, SettingsResult};
