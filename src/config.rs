//! Configuration management for the scanner bridge
//!
//! Settings are read from a TOML file. Every field has a default, so a missing
//! file or a partial file is fine.
//!
//! ## Config File Locations
//!
//! | Platform | Path |
//! |----------|------|
//! | Linux | `~/.config/scanner-bridge/config.toml` |
//! | macOS | `~/Library/Application Support/scanner-bridge/config.toml` |
//!
//! ## Example
//!
//! ```toml
//! [device]
//! name = "Symbol Bar Code Scanner"
//!
//! [broker]
//! host = "broker.local"
//! topic = "home/code_scanner"
//!
//! [retry]
//! backoff_secs = 5
//! ```

use crate::device::DeviceSelector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Error type for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to determine config directory
    #[error("Could not determine config directory")]
    NoConfigDir,
    /// IO error reading or writing config file
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Failed to parse config file
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Failed to serialize config
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// Values parsed but make no sense together
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Returns the path of the default config file.
///
/// Does not create anything; a missing file means defaults.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
    Ok(config_dir.join("scanner-bridge").join("config.toml"))
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Which input device is the scanner
    pub device: DeviceConfig,
    /// Broker address and publish target
    pub broker: BrokerConfig,
    /// Retry pacing
    pub retry: RetryConfig,
}

/// Scanner device selection.
///
/// `vendor_id` and `product_id` take precedence over `name` when both are set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    /// Exact device name as reported by the kernel
    pub name: Option<String>,
    /// USB vendor id
    pub vendor_id: Option<u16>,
    /// USB product id
    pub product_id: Option<u16>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: Some("\u{a9} Symbol Technologies, Inc, 2000 Symbol Bar Code Scanner".to_string()),
            vendor_id: None,
            product_id: None,
        }
    }
}

impl DeviceConfig {
    /// Resolve the configured fields into a device selector
    pub fn selector(&self) -> Result<DeviceSelector, ConfigError> {
        match (self.vendor_id, self.product_id, &self.name) {
            (Some(vendor), Some(product), _) => Ok(DeviceSelector::UsbId { vendor, product }),
            (Some(_), None, _) | (None, Some(_), _) => Err(ConfigError::Invalid(
                "vendor_id and product_id must be set together".to_string(),
            )),
            (None, None, Some(name)) if !name.is_empty() => Ok(DeviceSelector::Name(name.clone())),
            (None, None, _) => Err(ConfigError::Invalid(
                "device needs a name or a vendor_id/product_id pair".to_string(),
            )),
        }
    }
}

/// Broker connection and publish settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    /// MQTT keep-alive in seconds
    pub keep_alive_secs: u64,
    pub client_id: String,
    /// Topic receiving scanned codes
    pub topic: String,
    /// Publish codes as retained messages
    pub retain: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive_secs: 120,
            client_id: "code_scanner".to_string(),
            topic: "hasi/code_scanner".to_string(),
            retain: true,
        }
    }
}

impl BrokerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

/// Retry pacing for both connections
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Fixed delay between reconnect attempts
    pub backoff_secs: u64,
    /// How long to wait for the broker to acknowledge a connect or a publish
    pub connect_timeout_secs: u64,
    /// Broker service tick while no codes are queued
    pub service_interval_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_secs: 3,
            connect_timeout_secs: 10,
            service_interval_ms: 500,
        }
    }
}

impl RetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn service_interval(&self) -> Duration {
        Duration::from_millis(self.service_interval_ms)
    }
}

impl Config {
    /// Load configuration from the default config file.
    ///
    /// Returns the default configuration if the file doesn't exist.
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configurations the bridge cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.device.selector()?;

        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::Invalid("broker.host is empty".to_string()));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::Invalid("broker.port must be non-zero".to_string()));
        }
        if self.broker.topic.is_empty() || self.broker.topic.contains(['+', '#']) {
            return Err(ConfigError::Invalid(format!(
                "broker.topic {:?} is not a publishable topic",
                self.broker.topic
            )));
        }
        // rumqttc rejects keep-alive intervals below 5s
        if self.broker.keep_alive_secs < 5 {
            return Err(ConfigError::Invalid(
                "broker.keep_alive_secs must be at least 5".to_string(),
            ));
        }
        if self.retry.service_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "retry.service_interval_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
