//! TOML configuration loading.
//!
//! Configuration comes from `<config dir>/configuration.toml`; the section
//! names mirror what operators already deploy (`[Service]`, `[Clients.*]`,
//! `[[DeviceList]]`, ...). The `[Driver]` table is opaque to the runtime
//! and handed to the protocol driver verbatim.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::models::{AutoEvent, ProtocolMap};

/// Default directory holding the configuration file.
pub const DEFAULT_CONFIG_DIR: &str = "./res";
/// Configuration file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "configuration.toml";

/// Well-known client keys inside `[Clients]`.
pub const CLIENT_DATA: &str = "Data";
pub const CLIENT_METADATA: &str = "Metadata";
pub const CLIENT_LOGGING: &str = "Logging";

/// Configuration loading failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read configuration file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("could not parse configuration file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    pub service: ServiceConfig,
    /// Core endpoints keyed by client name (`Data`, `Metadata`, `Logging`).
    pub clients: HashMap<String, ClientConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub writable: WritableConfig,
    /// Opaque driver settings, passed through untouched.
    #[serde(default)]
    pub driver: HashMap<String, String>,
    /// Devices provisioned at startup when Core does not know them yet.
    #[serde(default)]
    pub device_list: Vec<DeviceEntry>,
    #[serde(default)]
    pub watchers: Vec<WatcherEntry>,
}

/// `[Service]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Attempts per dependency before bootstrap gives up.
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    /// Milliseconds between dependency ping attempts.
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default = "default_service_name")]
    pub name: String,
}

fn default_connect_retries() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_service_name() -> String {
    "edgelink-device-service".to_string()
}

/// One `[Clients.<Name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
}

impl ClientConfig {
    /// Base URL of the endpoint, without the API prefix.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// `[Logging]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LoggingConfig {
    /// Carried for deployment parity; the runtime always logs locally.
    #[serde(default)]
    pub enable_remote: bool,
    /// Optional log file; stderr when empty.
    #[serde(default)]
    pub file: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_remote: false,
            file: String::new(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

/// `[Writable]` section; wins over `[Logging]` for the level.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WritableConfig {
    #[serde(default)]
    pub log_level: String,
}

/// One `[[DeviceList]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceEntry {
    pub name: String,
    pub profile: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub protocols: ProtocolMap,
    #[serde(default)]
    pub auto_events: Vec<AutoEvent>,
}

/// One `[[Watchers]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WatcherEntry {
    pub name: String,
    pub profile: String,
    #[serde(default)]
    pub identifiers: HashMap<String, String>,
}

impl Config {
    /// Load and validate the configuration below `config_dir`.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants bootstrap relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [CLIENT_METADATA, CLIENT_DATA] {
            let client = self.clients.get(name).ok_or_else(|| {
                ConfigError::Invalid(format!("missing [Clients.{}] section", name))
            })?;
            if client.host.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "host for {} client not configured",
                    name
                )));
            }
            if client.port == 0 {
                return Err(ConfigError::Invalid(format!(
                    "port for {} client not configured",
                    name
                )));
            }
        }
        if self.service.host.is_empty() || self.service.port == 0 {
            return Err(ConfigError::Invalid(
                "service host and port must be configured".into(),
            ));
        }
        Ok(())
    }

    /// Effective log level: `[Writable]` when set, `[Logging]` otherwise.
    pub fn log_level(&self) -> &str {
        if self.writable.log_level.is_empty() {
            &self.logging.log_level
        } else {
            &self.writable.log_level
        }
    }

    pub fn metadata_client(&self) -> &ClientConfig {
        &self.clients[CLIENT_METADATA]
    }

    pub fn data_client(&self) -> &ClientConfig {
        &self.clients[CLIENT_DATA]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[Service]
Host = "0.0.0.0"
Port = 49990
ConnectRetries = 5
Timeout = 2000
Name = "edgelink-modbus"

[Clients.Metadata]
Host = "core-metadata"
Port = 48081
Timeout = 3000

[Clients.Data]
Host = "core-data"
Port = 48080
Timeout = 3000

[Logging]
EnableRemote = false
File = "./edgelink.log"
LogLevel = "INFO"

[Writable]
LogLevel = "DEBUG"

[Driver]
ScanSerial = "/dev/ttyS0"

[[DeviceList]]
Name = "Meter-7"
Profile = "CVM-C10"

[DeviceList.Protocols.ModbusTCP]
Host = "10.0.0.7"
Port = "502"

[[DeviceList.AutoEvents]]
resource = "Voltage"
frequency = "10s"
onChange = true

[[Watchers]]
Name = "CVM"
Profile = "CVM-C10"

[Watchers.Identifiers]
Model = "^CVM"
"#;

    #[test]
    fn parses_full_sample() {
        let config: Config = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.service.port, 49990);
        assert_eq!(config.service.name, "edgelink-modbus");
        assert_eq!(config.metadata_client().url(), "http://core-metadata:48081");
        assert_eq!(config.data_client().timeout, 3000);
        assert_eq!(config.log_level(), "DEBUG");
        assert_eq!(config.driver["ScanSerial"], "/dev/ttyS0");

        assert_eq!(config.device_list.len(), 1);
        let entry = &config.device_list[0];
        assert_eq!(entry.profile, "CVM-C10");
        assert_eq!(entry.protocols["ModbusTCP"]["Port"], "502");
        assert_eq!(entry.auto_events[0].frequency, "10s");
        assert!(entry.auto_events[0].on_change);

        assert_eq!(config.watchers[0].identifiers["Model"], "^CVM");
    }

    #[test]
    fn missing_client_section_is_invalid() {
        let minimal = r#"
[Service]
Host = "0.0.0.0"
Port = 49990

[Clients.Metadata]
Host = "core-metadata"
Port = 48081
"#;
        let config: Config = toml::from_str(minimal).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Clients.Data"));
    }

    #[test]
    fn writable_level_falls_back_to_logging() {
        let mut config: Config = toml::from_str(SAMPLE).unwrap();
        config.writable.log_level.clear();
        assert_eq!(config.log_level(), "INFO");
    }
}
