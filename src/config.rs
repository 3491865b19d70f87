//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{RcLinkError, Result};
use crate::link::params::ModelParameters;
use crate::link::pipes::{ActivePipe, DEFAULT_PIPE_ADDRESS};

/// Main configuration structure
///
/// Every section may be omitted and falls back to its defaults.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub parameters: ParameterConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub model: ModelConfig,
}

/// Link timing and addressing
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Consecutive failed writes before the link counts as lost
    #[serde(default = "default_lost_contact_cutoff")]
    pub lost_contact_cutoff: u32,

    #[serde(default = "default_initial_pipe")]
    pub initial_pipe: ActivePipe,

    #[serde(default = "default_pipe")]
    pub default_pipe: u64,

    /// Hex string, 1-8 bytes
    #[serde(default = "default_hardware_id")]
    pub hardware_id: String,
}

/// Channel delta encoder
#[derive(Debug, Deserialize, Clone)]
pub struct EncoderConfig {
    #[serde(default = "default_change_threshold")]
    pub change_threshold: u16,

    /// How many low channels use the primary interval
    #[serde(default = "default_primary_channels")]
    pub primary_channels: usize,

    #[serde(default = "default_primary_interval_ms")]
    pub primary_interval_ms: u64,

    #[serde(default = "default_aux_interval_ms")]
    pub aux_interval_ms: u64,
}

/// Parameter queue and send window
#[derive(Debug, Deserialize, Clone)]
pub struct ParameterConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_repeat_count")]
    pub repeat_count: usize,

    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    #[serde(default = "default_window_period_ms")]
    pub window_period_ms: u64,
}

/// Inactivity power-down
#[derive(Debug, Deserialize, Clone)]
pub struct WatchdogConfig {
    #[serde(default = "default_inactivity_minutes")]
    pub inactivity_minutes: u64,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Diagnostic logging
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write daily-rotated log files here
    #[serde(default)]
    pub file_dir: Option<String>,
}

/// The model currently selected on the transmitter
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ModelConfig {
    /// Hardware identity of the receiver this model was paired with (hex)
    #[serde(default)]
    pub expected_peer_id: Option<String>,

    #[serde(default)]
    pub parameters: ModelParameters,
}

// Default value functions
fn default_tick_interval_ms() -> u64 { 4 }
fn default_lost_contact_cutoff() -> u32 { 1 }
fn default_initial_pipe() -> ActivePipe { ActivePipe::Default }
fn default_pipe() -> u64 { DEFAULT_PIPE_ADDRESS }
fn default_hardware_id() -> String { "a1b2c3d4e5f60718".to_string() }

fn default_change_threshold() -> u16 { 4 }
fn default_primary_channels() -> usize { 4 }
fn default_primary_interval_ms() -> u64 { 50 }
fn default_aux_interval_ms() -> u64 { 150 }

fn default_queue_capacity() -> usize { 250 }
fn default_repeat_count() -> usize { 4 }
fn default_window_ms() -> u64 { 5 }
fn default_window_period_ms() -> u64 { 50 }

fn default_inactivity_minutes() -> u64 { 10 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 100 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_log_level() -> String { "info".to_string() }

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            lost_contact_cutoff: default_lost_contact_cutoff(),
            initial_pipe: default_initial_pipe(),
            default_pipe: default_pipe(),
            hardware_id: default_hardware_id(),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            change_threshold: default_change_threshold(),
            primary_channels: default_primary_channels(),
            primary_interval_ms: default_primary_interval_ms(),
            aux_interval_ms: default_aux_interval_ms(),
        }
    }
}

impl Default for ParameterConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            repeat_count: default_repeat_count(),
            window_ms: default_window_ms(),
            window_period_ms: default_window_period_ms(),
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            inactivity_minutes: default_inactivity_minutes(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
            format: default_log_format(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_dir: None,
        }
    }
}

/// Parse a hex string (optional `0x` prefix, whole bytes) into bytes
fn parse_hex_bytes(text: &str) -> Option<Vec<u8>> {
    let digits = text.trim().trim_start_matches("0x").trim_start_matches("0X");
    if digits.is_empty() || digits.len() % 2 != 0 || !digits.is_ascii() {
        return None;
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).ok())
        .collect()
}

fn config_error(message: impl std::fmt::Display) -> RcLinkError {
    RcLinkError::Config(toml::de::Error::custom(message))
}

impl LinkConfig {
    /// The hardware id as bytes
    ///
    /// # Errors
    ///
    /// Returns error if `hardware_id` is not 1-8 bytes of hex
    pub fn hardware_id_bytes(&self) -> Result<Vec<u8>> {
        match parse_hex_bytes(&self.hardware_id) {
            Some(bytes) if bytes.len() <= 8 => Ok(bytes),
            _ => Err(config_error("hardware_id must be 1 to 8 bytes of hex")),
        }
    }
}

impl ModelConfig {
    /// The expected receiver identity, if one is configured
    ///
    /// # Errors
    ///
    /// Returns error if `expected_peer_id` is not valid 64-bit hex
    pub fn expected_peer_id(&self) -> Result<Option<u64>> {
        let Some(text) = &self.expected_peer_id else {
            return Ok(None);
        };

        let digits = text.trim().trim_start_matches("0x").trim_start_matches("0X");
        u64::from_str_radix(digits, 16)
            .map(Some)
            .map_err(|_| config_error("expected_peer_id must be a 64-bit hex value"))
    }
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
    /// use rc_link::config::Config;
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

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Link timing
        if !(2..=8).contains(&self.link.tick_interval_ms) {
            return Err(config_error("tick_interval_ms must be between 2 and 8"));
        }

        if self.link.lost_contact_cutoff == 0 {
            return Err(config_error("lost_contact_cutoff must be at least 1"));
        }

        if self.link.default_pipe == 0 || self.link.default_pipe > 0xFF_FFFF_FFFF {
            return Err(config_error("default_pipe must be a non-zero 40-bit address"));
        }

        self.link.hardware_id_bytes()?;

        // Delta encoder
        if !(1..=100).contains(&self.encoder.change_threshold) {
            return Err(config_error("change_threshold must be between 1 and 100"));
        }

        if self.encoder.primary_channels > 16 {
            return Err(config_error("primary_channels must be between 0 and 16"));
        }

        if self.encoder.primary_interval_ms == 0 || self.encoder.aux_interval_ms == 0 {
            return Err(config_error("priority intervals must be greater than 0"));
        }

        // Parameter queue
        if !(1..=16).contains(&self.parameters.repeat_count) {
            return Err(config_error("repeat_count must be between 1 and 16"));
        }

        if self.parameters.queue_capacity < self.parameters.repeat_count {
            return Err(config_error("queue_capacity must hold at least one full repeat set"));
        }

        if self.parameters.window_ms == 0 {
            return Err(config_error("window_ms must be greater than 0"));
        }

        if self.parameters.window_period_ms < self.parameters.window_ms {
            return Err(config_error("window_period_ms must not be shorter than window_ms"));
        }

        // Watchdog
        if !(5..=30).contains(&self.watchdog.inactivity_minutes) {
            return Err(config_error("inactivity_minutes must be between 5 and 30"));
        }

        // Telemetry log
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(config_error("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.log_interval_ms == 0 || self.telemetry.log_interval_ms > 60000 {
            return Err(config_error("log_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(config_error("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(config_error("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(config_error("log format must be 'jsonl' (only supported format)"));
        }

        self.model.expected_peer_id()?;

        Ok(())
    }
}
