//! Configuration file parsing and structures.
//!
//! emberd uses TOML for declarative configuration: one `[mqtt]` broker
//! section, an optional `[api]` section, and a `[devices.<did>]` table per
//! device naming its metadata and capabilities.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use emberd_device::BatteryCapability;
use emberd_device::Capabilities;
use emberd_device::CameraCapability;
use emberd_device::DeviceInfo;
use emberd_device::StatusCapability;
use emberd_device::DEFAULT_PREFIX;
use serde::Deserialize;
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

/// Top-level configuration structure
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,

    pub mqtt: MqttConfig,

    #[serde(default)]
    pub api: ApiConfig,

    /// Key = device id (did), value = the device's metadata and capabilities.
    #[serde(default)]
    pub devices: HashMap<String, DeviceConfig>,
}

#[derive(
    Debug, Default, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default)]
    pub level: LogLevel,
}

/// MQTT broker connection configuration
#[derive(Debug, Deserialize)]
pub struct MqttConfig {
    pub broker: String,

    #[serde(default = "default_mqtt_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Leading topic segment shared by every device.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "emberd".to_string()
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

/// HTTP API configuration
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_enabled")]
    pub enabled: bool,

    #[serde(default = "default_api_bind")]
    pub bind: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: default_api_enabled(),
            bind: default_api_bind(),
            port: default_api_port(),
        }
    }
}

fn default_api_enabled() -> bool {
    true
}

fn default_api_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8565
}

/// Per-device configuration
#[derive(Debug, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub manufacturer: Option<String>,

    #[serde(default)]
    pub serial: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub fw_version: Option<String>,

    #[serde(default)]
    pub mac: Option<String>,

    /// The device reports battery level events.
    #[serde(default)]
    pub battery: bool,

    /// The device reports activity status events.
    #[serde(default)]
    pub status: bool,

    /// The device exposes a camera endpoint.
    #[serde(default)]
    pub camera: Option<CameraConfig>,
}

/// Camera endpoint configuration for one device
#[derive(Debug, Deserialize)]
pub struct CameraConfig {
    pub host: String,

    #[serde(default = "default_camera_port")]
    pub port: u16,

    pub username: String,

    pub password: String,

    #[serde(default)]
    pub stream_profile: Option<String>,

    #[serde(default)]
    pub video_source: Option<String>,
}

fn default_camera_port() -> u16 {
    80
}

impl DeviceConfig {
    /// Assemble the device's identity block for `did`.
    pub fn device_info(&self, did: &str) -> DeviceInfo {
        DeviceInfo {
            did: did.to_string(),
            name: self.name.clone(),
            manufacturer: self.manufacturer.clone(),
            serial: self.serial.clone(),
            model: self.model.clone(),
            fw_version: self.fw_version.clone(),
            mac: self.mac.clone(),
        }
    }

    /// Assemble the device's capability set.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            battery: self.battery.then_some(BatteryCapability),
            status: self.status.then_some(StatusCapability),
            camera: self.camera.as_ref().map(|c| CameraCapability {
                host: c.host.clone(),
                port: c.port,
                username: c.username.clone(),
                password: c.password.clone(),
                stream_profile: c.stream_profile.clone(),
                video_source: c.video_source.clone(),
            }),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(path.as_ref().to_path_buf(), e))?;

        let config: Config = toml::from_str(&contents).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// A configured device must expose at least one capability; anything
    /// else is a typo in the config file.
    fn validate(&self) -> Result<(), ConfigError> {
        for (did, device) in &self.devices {
            if !device.battery && !device.status && device.camera.is_none() {
                return Err(ConfigError::Validation(format!(
                    "device {} enables no capabilities",
                    did
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
            [mqtt]
            broker = "localhost"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.logging.level, LogLevel::Info);
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.prefix, "emberd");
        assert!(config.api.enabled);
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_parse_vacuum_device() {
        let toml = r#"
            [mqtt]
            broker = "localhost"
            username = "emberd"

            [devices.E1234]
            name = "Robot1"
            manufacturer = "Ecovacs"
            battery = true
            status = true
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.mqtt.username.as_deref(), Some("emberd"));

        let device = config.devices.get("E1234").unwrap();
        let info = device.device_info("E1234");
        assert_eq!(info.did, "E1234");
        assert_eq!(info.name.as_deref(), Some("Robot1"));
        assert_eq!(info.serial, None);

        let caps = device.capabilities();
        assert!(caps.battery.is_some());
        assert!(caps.status.is_some());
        assert!(caps.camera.is_none());
    }

    #[test]
    fn test_parse_camera_device() {
        let toml = r#"
            [mqtt]
            broker = "localhost"

            [devices.CAM1.camera]
            host = "10.0.0.5"
            username = "root"
            password = "secret"
            stream_profile = "profile_1"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        let caps = config.devices.get("CAM1").unwrap().capabilities();
        let camera = caps.camera.unwrap();
        assert_eq!(camera.host, "10.0.0.5");
        assert_eq!(camera.port, 80);
        assert_eq!(camera.stream_profile.as_deref(), Some("profile_1"));
        assert_eq!(camera.video_source, None);
    }

    #[test]
    fn test_device_without_capabilities_is_rejected() {
        let toml = r#"
            [mqtt]
            broker = "localhost"

            [devices.E1234]
            name = "Robot1"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
                [logging]
                level = "debug"

                [mqtt]
                broker = "broker.local"
                port = 8883

                [devices.E1234]
                battery = true
            "#
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.mqtt.broker, "broker.local");
        assert_eq!(config.mqtt.port, 8883);
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file("/nonexistent/emberd.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }
}
