//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::time::Duration;

use serde::Deserialize;

use crate::cad::com::DEFAULT_PROG_ID;
use crate::cad::entities::ScanPacing;
use crate::error::ConfigError;

/// Largest accepted settle delay, in milliseconds.
pub const MAX_SETTLE_DELAY_MS: u64 = 10_000;

/// Largest accepted start-up wait, in milliseconds.
pub const MAX_STARTUP_WAIT_MS: u64 = 60_000;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Host application settings.
    #[serde(default)]
    pub host: HostConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.settle_delay_ms > MAX_SETTLE_DELAY_MS {
            return Err(ConfigError::out_of_range(
                "settle_delay_ms",
                format!(
                    "{} is above the maximum of {MAX_SETTLE_DELAY_MS}",
                    self.host.settle_delay_ms
                ),
            ));
        }
        if self.host.startup_wait_ms > MAX_STARTUP_WAIT_MS {
            return Err(ConfigError::out_of_range(
                "startup_wait_ms",
                format!(
                    "{} is above the maximum of {MAX_STARTUP_WAIT_MS}",
                    self.host.startup_wait_ms
                ),
            ));
        }
        if self.host.prog_id.trim().is_empty() {
            return Err(ConfigError::out_of_range("prog_id", "must not be empty"));
        }
        if self.host.scan_batch_size == 0 {
            return Err(ConfigError::out_of_range(
                "scan_batch_size",
                "must be greater than 0",
            ));
        }
        if self.host.scan_pause_every == 0 {
            return Err(ConfigError::out_of_range(
                "scan_pause_every",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Which host backend the server drives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// No host application is reachable; every tool reports not connected.
    #[default]
    Detached,
    /// An in-process drawing, for dry runs.
    Memory,
    /// The running application over COM automation. Windows only.
    Com,
}

/// Host application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Backend to connect to.
    #[serde(default)]
    pub backend: Backend,

    /// Registered program identifier of the application, for the `com` backend.
    #[serde(default = "default_prog_id")]
    pub prog_id: String,

    /// Wait after starting a new application instance, in milliseconds.
    #[serde(default = "default_startup_wait_ms")]
    pub startup_wait_ms: u64,

    /// Pause after every host mutation, in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Entities read per scan batch.
    #[serde(default = "default_scan_batch_size")]
    pub scan_batch_size: usize,

    /// Pause a scan after this many entities.
    #[serde(default = "default_scan_pause_every")]
    pub scan_pause_every: usize,

    /// Length of a scan pause, in milliseconds.
    #[serde(default = "default_scan_pause_ms")]
    pub scan_pause_ms: u64,
}

impl HostConfig {
    /// Returns the settle delay.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Returns the wait after starting a new application instance.
    #[must_use]
    pub const fn startup_wait(&self) -> Duration {
        Duration::from_millis(self.startup_wait_ms)
    }

    /// Returns the scan pacing.
    #[must_use]
    pub const fn scan_pacing(&self) -> ScanPacing {
        ScanPacing {
            batch_size: self.scan_batch_size,
            pause_every: self.scan_pause_every,
            pause: Duration::from_millis(self.scan_pause_ms),
        }
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            prog_id: default_prog_id(),
            startup_wait_ms: default_startup_wait_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            scan_batch_size: default_scan_batch_size(),
            scan_pause_every: default_scan_pause_every(),
            scan_pause_ms: default_scan_pause_ms(),
        }
    }
}

fn default_prog_id() -> String {
    DEFAULT_PROG_ID.to_string()
}

const fn default_startup_wait_ms() -> u64 {
    2000
}

const fn default_settle_delay_ms() -> u64 {
    1000
}

const fn default_scan_batch_size() -> usize {
    100
}

const fn default_scan_pause_every() -> usize {
    500
}

const fn default_scan_pause_ms() -> u64 {
    100
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
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

fn default_log_level() -> String {
    "warn".to_string()
}
