//! Configuration loading and validation

use lumen_core::DeviceConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default, rename = "device")]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind address for the device-facing control server
    #[serde(default = "default_control_bind")]
    pub control_bind: String,
    /// Bind address for the accessory REST API
    #[serde(default = "default_api_bind")]
    pub api_bind: String,
    /// Heartbeat period shared by all devices
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// Port devices serve `/state` on
    #[serde(default = "default_device_port")]
    pub device_port: u16,
    /// Timeout for a single pull or push
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
    /// Where accessories are kept across restarts; `None` keeps them in memory
    #[serde(default = "default_accessories_path")]
    pub accessories_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            control_bind: default_control_bind(),
            api_bind: default_api_bind(),
            update_interval_secs: default_update_interval(),
            device_port: default_device_port(),
            request_timeout_ms: default_request_timeout(),
            accessories_path: default_accessories_path(),
        }
    }
}

impl DaemonConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_control_bind() -> String {
    "0.0.0.0:8587".to_string()
}

fn default_api_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_update_interval() -> u64 {
    5
}

fn default_device_port() -> u16 {
    80
}

fn default_request_timeout() -> u64 {
    3000
}

fn default_accessories_path() -> Option<PathBuf> {
    Some(PathBuf::from("lumen-accessories.json"))
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject empty or duplicate MACs and a zero heartbeat period
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daemon.update_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_secs must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for device in &self.devices {
            if device.mac.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "device {:?} has an empty mac",
                    device.n
                )));
            }
            if !seen.insert(device.mac.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device mac {}",
                    device.mac
                )));
            }
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if path.exists() {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Config::from_toml(&content)?;
        info!(
            path = %path.display(),
            devices = config.devices.len(),
            "Loaded configuration"
        );
        Ok(config)
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [daemon]
        control_bind = "0.0.0.0:9000"
        update_interval_secs = 2

        [[device]]
        mac = "AA:BB:CC:DD:EE:FF"
        n = "Kitchen"
        addr = "192.168.1.50"
        gw = "192.168.1.1"
        mask = "255.255.255.0"
        sub = [{ leds = 60 }, { leds = 30 }]

        [[device]]
        mac = "11:22:33:44:55:66"
        n = "Desk"
        addr = "192.168.1.51"
        gw = "192.168.1.1"
        mask = "255.255.255.0"
    "#;

    #[test]
    fn test_parse_sample() {
        let config = Config::from_toml(SAMPLE).unwrap();

        assert_eq!(config.daemon.control_bind, "0.0.0.0:9000");
        assert_eq!(config.daemon.api_bind, "127.0.0.1:8080");
        assert_eq!(config.daemon.update_interval(), Duration::from_secs(2));
        assert_eq!(config.daemon.device_port, 80);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].light_count(), 2);
        assert_eq!(config.devices[1].light_count(), 1);
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = Config::from_toml("").unwrap();
        assert!(config.devices.is_empty());
        assert_eq!(config.daemon.update_interval_secs, 5);
        assert_eq!(config.daemon.request_timeout(), Duration::from_millis(3000));
        assert_eq!(
            config.daemon.accessories_path,
            Some(PathBuf::from("lumen-accessories.json"))
        );
    }

    #[test]
    fn test_rejects_duplicate_mac() {
        let doubled = format!(
            "{SAMPLE}\n[[device]]\nmac = \"AA:BB:CC:DD:EE:FF\"\nn = \"Again\"\naddr = \"10.0.0.2\"\ngw = \"10.0.0.1\"\nmask = \"255.0.0.0\"\n"
        );
        assert!(matches!(
            Config::from_toml(&doubled),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_zero_interval() {
        assert!(matches!(
            Config::from_toml("[daemon]\nupdate_interval_secs = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_bad_address() {
        let bad = r#"
            [[device]]
            mac = "AA:BB"
            n = "Lamp"
            addr = "192.168.1"
            gw = "192.168.1.1"
            mask = "255.255.255.0"
        "#;
        assert!(matches!(Config::from_toml(bad), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load_config(Path::new("/nonexistent/lumen.toml")).unwrap();
        assert!(config.devices.is_empty());
    }
}
