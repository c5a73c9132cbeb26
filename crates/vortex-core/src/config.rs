//! Configuration loading and typed config structures for the harness.
//!
//! The configuration lives in an optional `vortex-harness.yaml`. Every
//! field has a default, so an empty file (or no file at all) yields a
//! working two-instance setup on the well-known loopback port.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::preview::PreviewSettings;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value parsed but cannot be used.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HarnessConfig {
    /// Emulated IR link.
    #[serde(default)]
    pub link: LinkConfig,

    /// Engine stepping.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Preview rendering.
    #[serde(default)]
    pub preview: PreviewConfig,

    /// Shutdown behavior.
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl HarnessConfig {
    /// Load configuration from a YAML file, then apply env overrides.
    ///
    /// - `VORTEX_IR_HOST` overrides `link.host`
    /// - `VORTEX_IR_PORT` overrides `link.port`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise
    /// whatever [`Self::parse`] returns.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, then apply env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value fails [`Self::validate`].
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.link.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the harness cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.led_count == 0 {
            return Err(invalid("engine.led_count", "must be at least 1"));
        }
        if let Err(e) = self.preview.settings().check() {
            return Err(invalid("preview", e.to_string()));
        }
        if self.preview.sample_led >= self.engine.led_count {
            return Err(ConfigError::Invalid {
                field: "preview.sample_led",
                reason: format!(
                    "LED {} does not exist (engine.led_count is {})",
                    self.preview.sample_led, self.engine.led_count
                ),
            });
        }
        if self.preview.refresh_interval_ms == 0 {
            return Err(invalid("preview.refresh_interval_ms", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// IR link settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkConfig {
    /// Whether to run the IR relay at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host the Peer connects to.
    #[serde(default = "default_link_host")]
    pub host: String,

    /// Loopback TCP port shared by both ends.
    #[serde(default = "default_link_port")]
    pub port: u16,

    /// Name of the lock used for Host/Peer election.
    #[serde(default = "default_election_name")]
    pub election_name: String,

    /// Whether the Host launches its Peer automatically.
    #[serde(default = "default_true")]
    pub launch_peer: bool,
}

impl LinkConfig {
    /// Override link settings from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Override link settings from an arbitrary variable lookup.
    pub fn apply_env_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(host) = lookup("VORTEX_IR_HOST") {
            self.host = host;
        }
        if let Some(raw) = lookup("VORTEX_IR_PORT") {
            match raw.parse() {
                Ok(port) => self.port = port,
                Err(e) => warn!(value = %raw, error = %e, "Ignoring invalid VORTEX_IR_PORT"),
            }
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_link_host(),
            port: default_link_port(),
            election_name: default_election_name(),
            launch_peer: true,
        }
    }
}

/// Engine stepping settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Ticks per second (clamped to at least 10).
    #[serde(default = "default_tickrate")]
    pub tickrate: u32,

    /// Number of LEDs the engine drives.
    #[serde(default = "default_led_count")]
    pub led_count: usize,

    /// Run ticks back to back instead of at `tickrate`.
    #[serde(default)]
    pub instant_timestep: bool,

    /// Ticks between automatic mode changes on the sending side.
    #[serde(default = "default_cycle_ticks")]
    pub cycle_ticks: u64,

    /// Ticks between mode beacons on the sending side.
    #[serde(default = "default_beacon_ticks")]
    pub beacon_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tickrate: default_tickrate(),
            led_count: default_led_count(),
            instant_timestep: false,
            cycle_ticks: default_cycle_ticks(),
            beacon_ticks: default_beacon_ticks(),
        }
    }
}

/// Preview rendering settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PreviewConfig {
    /// Columns (simulated ticks) per preview.
    #[serde(default = "default_preview_width")]
    pub width: usize,

    /// Rows per preview.
    #[serde(default = "default_preview_height")]
    pub height: usize,

    /// LED sampled while rendering.
    #[serde(default)]
    pub sample_led: usize,

    /// How often to check for a mode change, in milliseconds.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl PreviewConfig {
    /// Geometry for the preview builder.
    pub const fn settings(&self) -> PreviewSettings {
        PreviewSettings {
            width: self.width,
            height: self.height,
            sample_led: self.sample_led,
        }
    }

    /// Refresh period.
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: default_preview_width(),
            height: default_preview_height(),
            sample_led: 0,
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

/// Shutdown settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ShutdownConfig {
    /// How long to wait for the tick thread to exit, in milliseconds.
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,
}

impl ShutdownConfig {
    /// Join timeout as a [`Duration`].
    pub const fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            join_timeout_ms: default_join_timeout_ms(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_link_host() -> String {
    "127.0.0.1".to_owned()
}

const fn default_link_port() -> u16 {
    vortex_link::DEFAULT_PORT
}

fn default_election_name() -> String {
    "vortex-ir-link".to_owned()
}

const fn default_tickrate() -> u32 {
    150
}

const fn default_led_count() -> usize {
    10
}

const fn default_cycle_ticks() -> u64 {
    1500
}

const fn default_beacon_ticks() -> u64 {
    300
}

const fn default_preview_width() -> usize {
    1000
}

const fn default_preview_height() -> usize {
    30
}

const fn default_refresh_interval_ms() -> u64 {
    100
}

const fn default_join_timeout_ms() -> u64 {
    3000
}

fn default_log_level() -> String {
    "info".to_owned()
}
