//! Configuration for the bridge.
//!
//! Loaded from a JSON5 file; every field has a default so an empty `{}`
//! document is a working local-broker configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{BridgeError, Result};

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvsmiBridgeConfig {
    /// MQTT broker connection settings.
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// nvidia-smi invocation settings.
    #[serde(default)]
    pub nvsmi: NvsmiConfig,

    /// Topic layout settings.
    #[serde(default)]
    pub topics: TopicsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for NvsmiBridgeConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig::default(),
            nvsmi: NvsmiConfig::default(),
            topics: TopicsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NvsmiBridgeConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// Calls [`validate`](Self::validate) after parsing.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = json5::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the bridge cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.mqtt.host.is_empty() {
            return Err(BridgeError::validation("mqtt.host must not be empty"));
        }
        if self.mqtt.client_id.is_empty() {
            return Err(BridgeError::validation("mqtt.client_id must not be empty"));
        }
        if self.nvsmi.binary.is_empty() {
            return Err(BridgeError::validation("nvsmi.binary must not be empty"));
        }
        if self.topics.base.is_empty() {
            return Err(BridgeError::validation("topics.base must not be empty"));
        }
        if self.topics.discovery_prefix.is_empty() {
            return Err(BridgeError::validation(
                "topics.discovery_prefix must not be empty",
            ));
        }
        Ok(())
    }
}

/// MQTT broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Broker hostname or IP address (default: "127.0.0.1").
    #[serde(default = "default_host")]
    pub host: String,

    /// Broker port (default: 1883).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for broker authentication.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for broker authentication.
    #[serde(default)]
    pub password: Option<String>,

    /// Client identifier presented to the broker.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Keep-alive interval in seconds (default: 30).
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "nvidia-ha-reporter".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

/// nvidia-smi invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvsmiConfig {
    /// Binary to invoke, resolved via PATH when not absolute
    /// (default: "nvidia-smi").
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Metric sections passed to `dmon -s` (default: "pucvmet").
    #[serde(default = "default_sections")]
    pub sections: String,
}

impl Default for NvsmiConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            sections: default_sections(),
        }
    }
}

fn default_binary() -> String {
    "nvidia-smi".to_string()
}

fn default_sections() -> String {
    "pucvmet".to_string()
}

/// Topic layout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsConfig {
    /// Prefix for the availability and per-GPU state topics
    /// (default: "nvidia-smi").
    #[serde(default = "default_base")]
    pub base: String,

    /// Home Assistant discovery prefix (default: "homeassistant").
    #[serde(default = "default_discovery_prefix")]
    pub discovery_prefix: String,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            base: default_base(),
            discovery_prefix: default_discovery_prefix(),
        }
    }
}

fn default_base() -> String {
    "nvidia-smi".to_string()
}

fn default_discovery_prefix() -> String {
    "homeassistant".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NvsmiBridgeConfig::parse("{}").unwrap();

        assert_eq!(config.mqtt.host, "127.0.0.1");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_id, "nvidia-ha-reporter");
        assert!(config.mqtt.username.is_none());
        assert_eq!(config.nvsmi.binary, "nvidia-smi");
        assert_eq!(config.nvsmi.sections, "pucvmet");
        assert_eq!(config.topics.base, "nvidia-smi");
        assert_eq!(config.topics.discovery_prefix, "homeassistant");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_parse_full_config() {
        let json5 = r#"
        {
            mqtt: {
                host: "broker.lan",
                port: 8883,
                username: "ha",
                password: "secret",
                keep_alive_secs: 15,
            },
            nvsmi: {
                binary: "/usr/bin/nvidia-smi",
                sections: "pu",
            },
            topics: {
                base: "gpu",
            },
            logging: {
                level: "debug",
                format: "json",
            },
        }
        "#;

        let config = NvsmiBridgeConfig::parse(json5).unwrap();

        assert_eq!(config.mqtt.host, "broker.lan");
        assert_eq!(config.mqtt.port, 8883);
        assert_eq!(config.mqtt.username.as_deref(), Some("ha"));
        assert_eq!(config.mqtt.keep_alive_secs, 15);
        assert_eq!(config.nvsmi.binary, "/usr/bin/nvidia-smi");
        assert_eq!(config.nvsmi.sections, "pu");
        assert_eq!(config.topics.base, "gpu");
        // Unset fields keep their defaults
        assert_eq!(config.topics.discovery_prefix, "homeassistant");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_validation_rejects_empty_host() {
        let result = NvsmiBridgeConfig::parse(r#"{ mqtt: { host: "" } }"#);
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_config_not_found() {
        let result = NvsmiBridgeConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }
}
