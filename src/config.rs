//! Configuration for shardwire

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Upper bound on servers: every server must own at least one shard
pub const MAX_SERVERS: usize = 255;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Number of servers an envelope is spread over
    #[serde(default = "default_servers")]
    pub servers: usize,

    /// Where envelopes are posted
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub envelope: EnvelopeConfig,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_servers() -> usize {
    3
}

fn default_endpoint() -> String {
    "http://localhost:8080/tx".to_string()
}

/// How the transport returns response envelopes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseEncoding {
    /// Response body is the envelope itself
    Raw,
    /// Response body is the envelope in standard base64
    #[default]
    Base64,
}

/// Envelope handling
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvelopeConfig {
    #[serde(default)]
    pub response_encoding: ResponseEncoding,
}

/// Shard collection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Collectors still incomplete after this many seconds are dropped
    #[serde(default = "default_abandon_after")]
    pub abandon_after_secs: u64,
}

fn default_abandon_after() -> u64 {
    300
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            abandon_after_secs: default_abandon_after(),
        }
    }
}

impl CollectorConfig {
    pub fn abandon_after(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.abandon_after_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            servers: default_servers(),
            endpoint: default_endpoint(),
            envelope: EnvelopeConfig::default(),
            collector: CollectorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise defaults plus environment
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(servers) = std::env::var("SHARDWIRE_SERVERS") {
            if let Ok(n) = servers.trim().parse::<usize>() {
                self.servers = n;
            }
        }

        if let Ok(level) = std::env::var("SHARDWIRE_LOG_LEVEL") {
            let level = level.trim().to_string();
            if !level.is_empty() {
                self.logging.level = level;
            }
        }

        if let Ok(endpoint) = std::env::var("SHARDWIRE_ENDPOINT") {
            let endpoint = endpoint.trim().to_string();
            if !endpoint.is_empty() {
                self.endpoint = endpoint;
            }
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.servers == 0 || self.servers > MAX_SERVERS {
            return Err(Error::InvalidConfig(format!(
                "servers must be between 1 and {}, got {}",
                MAX_SERVERS, self.servers
            )));
        }

        if self.endpoint.trim().is_empty() {
            return Err(Error::InvalidConfig("Endpoint is required".to_string()));
        }

        if self.collector.abandon_after_secs == 0 {
            return Err(Error::InvalidConfig(
                "collector.abandon_after_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shardwire")
            .join("config.json")
    }
}
