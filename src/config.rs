//! Host Configuration using Figment
//!
//! Strongly-typed configuration for the focuser host. Configuration is loaded from:
//! 1. `config/focuser.toml` (base configuration)
//! 2. Environment variables (prefixed with `RUST_FOCUS_`, nested keys split on `__`)
//!
//! # Example
//! ```no_run
//! use rust_focus::config::FocusConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FocusConfig::load()?;
//! println!("Device: {}", config.device.r#type);
//! # Ok(())
//! # }
//! ```
//!
//! The `[device.config]` table is kept as raw TOML; its schema belongs to the driver
//! named by `[device] type` and is checked by that driver's factory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/focuser.toml";

/// Prefix of environment variables that override file settings.
pub const ENV_PREFIX: &str = "RUST_FOCUS_";

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level host configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FocusConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Poll loop settings
    #[serde(default)]
    pub polling: PollingConfig,
    /// The focuser to drive
    #[serde(default)]
    pub device: DeviceDefinition,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Poll loop configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Tick interval in milliseconds. Unset means the driver's recommended interval.
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

/// Device definition in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefinition {
    /// Driver type (matches `DriverFactory::driver_type`, e.g. "microstepper")
    #[serde(default = "default_device_type")]
    pub r#type: String,
    /// Driver-specific configuration (dynamic)
    #[serde(default = "empty_table")]
    pub config: toml::Value,
}

// Default value functions
fn default_name() -> String {
    "MicroStepper Focuser".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_device_type() -> String {
    "microstepper".to_string()
}

fn empty_table() -> toml::Value {
    toml::Value::Table(toml::map::Map::new())
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DeviceDefinition {
    fn default() -> Self {
        Self {
            r#type: default_device_type(),
            config: empty_table(),
        }
    }
}

impl PollingConfig {
    /// Configured tick interval, if any.
    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }
}

impl FocusConfig {
    /// Load configuration from `config/focuser.toml` and environment variables
    ///
    /// Environment variables can override configuration with prefix `RUST_FOCUS_`.
    /// Example: `RUST_FOCUS_APPLICATION__LOG_LEVEL=debug`,
    /// `RUST_FOCUS_DEVICE__CONFIG__PORT=/dev/ttyACM0`
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment variables still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Self::figment(path.as_ref()).extract()
    }

    /// The provider stack used by [`FocusConfig::load_from`].
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(FocusConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        let level = self.application.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            ));
        }

        if self.polling.interval_ms == Some(0) {
            return Err("Invalid polling.interval_ms 0. Must be positive".to_string());
        }

        if self.device.r#type.trim().is_empty() {
            return Err("device.type must not be empty".to_string());
        }

        if !self.device.config.is_table() {
            return Err("device.config must be a table".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = FocusConfig::default();
        assert_eq!(config.application.log_level, "info");
        assert_eq!(config.device.r#type, "microstepper");
        assert!(config.polling.interval().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = FocusConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());

        config.application.log_level = "DEBUG".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let mut config = FocusConfig::default();
        config.polling.interval_ms = Some(0);
        assert!(config.validate().is_err());

        config.polling.interval_ms = Some(250);
        assert!(config.validate().is_ok());
        assert_eq!(config.polling.interval(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_device_config_must_be_table() {
        let mut config = FocusConfig::default();
        config.device.config = toml::Value::String("/dev/ttyUSB0".to_string());
        assert!(config.validate().is_err());
    }
}
