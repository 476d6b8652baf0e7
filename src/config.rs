// src/config.rs

//! Manages server configuration: defaults, loading from TOML, and validation.

use crate::core::protocol::DEFAULT_MAX_RECORD_BYTES;
use crate::core::validation::MAX_MESSAGE_LENGTH;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::warn;

/// The port the server listens on when none is configured.
pub const DEFAULT_PORT: u16 = 12345;

/// Protocol and buffering limits applied to every connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Largest accepted request record in bytes, excluding the newline. A longer
    /// record closes the connection.
    #[serde(default = "default_max_record_bytes")]
    pub max_record_bytes: usize,
}

fn default_max_record_bytes() -> usize {
    DEFAULT_MAX_RECORD_BYTES
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_record_bytes: default_max_record_bytes(),
        }
    }
}

/// Represents the final, validated server configuration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default)]
    pub limits: LimitsConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            limits: LimitsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    /// Missing keys take their default values.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid config file '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(anyhow!("port cannot be 0"));
        }
        if self.host.trim().is_empty() {
            return Err(anyhow!("host cannot be empty"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        if self.limits.max_record_bytes < MAX_MESSAGE_LENGTH {
            return Err(anyhow!(
                "limits.max_record_bytes must be at least {} to fit a full message",
                MAX_MESSAGE_LENGTH
            ));
        }
        if self.limits.max_record_bytes > DEFAULT_MAX_RECORD_BYTES {
            warn!(
                "limits.max_record_bytes is {} bytes, above the protocol limit of {}. Clients may send records other servers reject.",
                self.limits.max_record_bytes, DEFAULT_MAX_RECORD_BYTES
            );
        }
        Ok(())
    }
}
