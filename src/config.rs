//! Handler configuration.
//!
//! Loaded from TOML. Every field has a default, so an empty file is a valid
//! configuration:
//!
//! ```toml
//! graceful_shutdown_timeout_ms = 30000
//! window_update_ratio = 0.5
//!
//! [settings]
//! max_concurrent_streams = 100
//! initial_window_size = 65535
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::connection::ConnectionSettings;
use crate::frame::{self, MAX_FRAME_SIZE, MAX_WINDOW_SIZE};

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Connection handler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandlerConfig {
    /// Settings advertised to the peer.
    #[serde(default)]
    pub settings: SettingsConfig,

    /// How long a graceful close waits for active streams before closing
    /// the transport anyway. 0 waits indefinitely.
    #[serde(default = "default_graceful_shutdown_timeout_ms")]
    pub graceful_shutdown_timeout_ms: u64,

    /// Fraction of a receive window consumed before a WINDOW_UPDATE is sent.
    #[serde(default = "default_window_update_ratio")]
    pub window_update_ratio: f32,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_graceful_shutdown_timeout_ms() -> u64 {
    30_000
}

fn default_window_update_ratio() -> f32 {
    0.5
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            settings: SettingsConfig::default(),
            graceful_shutdown_timeout_ms: default_graceful_shutdown_timeout_ms(),
            window_update_ratio: default_window_update_ratio(),
            logging: LoggingConfig::default(),
        }
    }
}

impl HandlerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: HandlerConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let settings = &self.settings;

        if !(frame::DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&settings.max_frame_size) {
            return Err(ConfigError::Invalid(format!(
                "max_frame_size ({}) must be between {} and {}",
                settings.max_frame_size,
                frame::DEFAULT_MAX_FRAME_SIZE,
                MAX_FRAME_SIZE
            )));
        }

        if settings.initial_window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::Invalid(format!(
                "initial_window_size ({}) must be at most {}",
                settings.initial_window_size, MAX_WINDOW_SIZE
            )));
        }

        if !(self.window_update_ratio > 0.0 && self.window_update_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "window_update_ratio ({}) must be in (0, 1]",
                self.window_update_ratio
            )));
        }

        Ok(())
    }

    /// The graceful close deadline, if one is configured.
    pub fn graceful_shutdown_timeout(&self) -> Option<Duration> {
        match self.graceful_shutdown_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Settings advertised in our initial SETTINGS frame.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsConfig {
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: u32,
    #[serde(default = "default_initial_window_size")]
    pub initial_window_size: u32,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u32,
    #[serde(default = "default_max_header_list_size")]
    pub max_header_list_size: u32,
    #[serde(default = "default_header_table_size")]
    pub header_table_size: u32,
    /// Only meaningful for clients.
    #[serde(default)]
    pub enable_push: bool,
}

fn default_max_concurrent_streams() -> u32 {
    frame::DEFAULT_MAX_CONCURRENT_STREAMS
}

fn default_initial_window_size() -> u32 {
    frame::DEFAULT_INITIAL_WINDOW_SIZE
}

fn default_max_frame_size() -> u32 {
    frame::DEFAULT_MAX_FRAME_SIZE
}

fn default_max_header_list_size() -> u32 {
    16384
}

fn default_header_table_size() -> u32 {
    frame::DEFAULT_HEADER_TABLE_SIZE
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: default_max_concurrent_streams(),
            initial_window_size: default_initial_window_size(),
            max_frame_size: default_max_frame_size(),
            max_header_list_size: default_max_header_list_size(),
            header_table_size: default_header_table_size(),
            enable_push: false,
        }
    }
}

impl From<&SettingsConfig> for ConnectionSettings {
    fn from(config: &SettingsConfig) -> Self {
        ConnectionSettings::new()
            .max_concurrent_streams(config.max_concurrent_streams)
            .initial_window_size(config.initial_window_size)
            .max_frame_size(config.max_frame_size)
            .max_header_list_size(config.max_header_list_size)
            .header_table_size(config.header_table_size)
            .enable_push(config.enable_push)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, e.g. "info" or "h2_handler=trace".
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default = "LoggingConfig::default_true")]
    pub timestamps: bool,

    #[serde(default = "LoggingConfig::default_true")]
    pub target: bool,

    #[serde(default)]
    pub thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
            timestamps: true,
            target: true,
            thread_names: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    fn default_true() -> bool {
        true
    }
}
