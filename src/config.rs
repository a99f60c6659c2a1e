//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration. Command-line `--port` / `--baud` (or `ATS_PORT` /
//! `ATS_BAUD`) override the serial section after loading.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::bridge::{BridgeSettings, ResponseWindow};
use crate::commands::ScreenshotOptions;
use crate::error::{BridgeError, Result};
use crate::serial::LinkSettings;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub commands: CommandConfig,
    #[serde(default)]
    pub screenshot: ScreenshotConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SerialConfig {
    /// Device path; empty means auto-detect
    #[serde(default)]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_fallback_baud_rate")]
    pub fallback_baud_rate: u32,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

/// Command response windows
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommandConfig {
    #[serde(default = "default_response_lines")]
    pub response_lines: usize,

    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    #[serde(default = "default_toggle_timeout_ms")]
    pub toggle_timeout_ms: u64,

    #[serde(default = "default_memory_slot_lines")]
    pub memory_slot_lines: usize,

    #[serde(default = "default_memory_slot_timeout_ms")]
    pub memory_slot_timeout_ms: u64,
}

/// Screen capture configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ScreenshotConfig {
    #[serde(default = "default_screenshot_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_hex_bytes")]
    pub max_hex_bytes: usize,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty logs to stdout only
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_baud_rate() -> u32 { 115_200 }
fn default_fallback_baud_rate() -> u32 { 9_600 }
fn default_read_timeout_ms() -> u64 { 100 }
fn default_idle_poll_ms() -> u64 { 500 }

fn default_response_lines() -> usize { 4 }
fn default_response_timeout_ms() -> u64 { 100 }
fn default_toggle_timeout_ms() -> u64 { 100 }
fn default_memory_slot_lines() -> usize { 30 }
fn default_memory_slot_timeout_ms() -> u64 { 400 }

fn default_screenshot_timeout_ms() -> u64 { 5_000 }
fn default_max_hex_bytes() -> usize { 10_000_000 }
fn default_output_dir() -> String { ".".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: default_baud_rate(),
            fallback_baud_rate: default_fallback_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            response_lines: default_response_lines(),
            response_timeout_ms: default_response_timeout_ms(),
            toggle_timeout_ms: default_toggle_timeout_ms(),
            memory_slot_lines: default_memory_slot_lines(),
            memory_slot_timeout_ms: default_memory_slot_timeout_ms(),
        }
    }
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_screenshot_timeout_ms(),
            max_hex_bytes: default_max_hex_bytes(),
            output_dir: default_output_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

fn invalid(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ats_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply explicit port/baud overrides; blank values are ignored
    ///
    /// # Errors
    ///
    /// Returns a config error if `baud` is not a positive integer
    pub fn apply_overrides(&mut self, port: Option<&str>, baud: Option<&str>) -> Result<()> {
        if let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) {
            self.serial.port = port.to_string();
        }

        if let Some(baud) = baud.map(str::trim).filter(|b| !b.is_empty()) {
            self.serial.baud_rate = baud
                .parse()
                .map_err(|_| invalid(format!("baud rate must be an integer, got '{}'", baud)))?;
        }

        self.validate()
    }

    /// Device path, or `None` to auto-detect
    pub fn port(&self) -> Option<&str> {
        Some(self.serial.port.as_str()).filter(|p| !p.is_empty())
    }

    /// Runtime settings derived from this configuration
    pub fn bridge_settings(&self) -> BridgeSettings {
        BridgeSettings {
            link: LinkSettings {
                default_baud_rate: default_baud_rate(),
                fallback_baud_rate: self.serial.fallback_baud_rate,
                read_timeout: Duration::from_millis(self.serial.read_timeout_ms),
            },
            console: ResponseWindow::new(
                self.commands.response_lines,
                self.commands.response_timeout_ms,
            ),
            toggle: ResponseWindow::new(1, self.commands.toggle_timeout_ms),
            memory_slots: ResponseWindow::new(
                self.commands.memory_slot_lines,
                self.commands.memory_slot_timeout_ms,
            ),
            screenshot: ScreenshotOptions {
                timeout: Duration::from_millis(self.screenshot.timeout_ms),
                max_hex_bytes: self.screenshot.max_hex_bytes,
            },
            idle_poll: Duration::from_millis(self.serial.idle_poll_ms),
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.baud_rate == 0 {
            return Err(invalid("baud_rate must be greater than 0"));
        }

        if self.serial.fallback_baud_rate == 0 {
            return Err(invalid("fallback_baud_rate must be greater than 0"));
        }

        for (name, value) in [
            ("read_timeout_ms", self.serial.read_timeout_ms),
            ("idle_poll_ms", self.serial.idle_poll_ms),
            ("response_timeout_ms", self.commands.response_timeout_ms),
            ("toggle_timeout_ms", self.commands.toggle_timeout_ms),
            ("memory_slot_timeout_ms", self.commands.memory_slot_timeout_ms),
        ] {
            if value == 0 || value > 10_000 {
                return Err(invalid(format!("{} must be between 1 and 10000", name)));
            }
        }

        if self.screenshot.timeout_ms == 0 || self.screenshot.timeout_ms > 60_000 {
            return Err(invalid("screenshot timeout_ms must be between 1 and 60000"));
        }

        if self.commands.response_lines == 0 {
            return Err(invalid("response_lines must be greater than 0"));
        }

        if self.commands.memory_slot_lines == 0 {
            return Err(invalid("memory_slot_lines must be greater than 0"));
        }

        if self.screenshot.max_hex_bytes == 0 {
            return Err(invalid("max_hex_bytes must be greater than 0"));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "log level must be one of: {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }
}
