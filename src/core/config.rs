//! Application configuration.
//!
//! Tunables for every scheduled job in the stack, loaded from an optional
//! TOML file with built-in defaults for every tunable.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// Group transport addressing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupConfig {
    #[serde(default = "default_multicast_addr")]
    pub multicast_addr: Ipv4Addr,
    #[serde(default = "default_multicast_port")]
    pub multicast_port: u16,
    #[serde(default = "default_starting_port")]
    pub starting_port: u16,
}

/// Discovery protocol timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default = "default_discovery_interval_secs")]
    pub interval_secs: u64,
}

/// Bully election timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BullyConfig {
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_coordinator_timeout_secs")]
    pub coordinator_timeout_secs: u64,
}

/// Phase-King agreement timing and quorum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseKingConfig {
    #[serde(default = "default_init_schedule_secs")]
    pub init_schedule_secs: u64,
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
    #[serde(default = "default_min_participants")]
    pub min_participants: usize,
}

/// Bookkeeping limits shared by the causal-order layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CausalConfig {
    #[serde(default = "default_send_history_capacity")]
    pub send_history_capacity: usize,
}

/// Complete application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "GroupConfig::default")]
    pub group: GroupConfig,
    #[serde(default = "DiscoveryConfig::default")]
    pub discovery: DiscoveryConfig,
    #[serde(default = "BullyConfig::default")]
    pub bully: BullyConfig,
    #[serde(default = "PhaseKingConfig::default")]
    pub phase_king: PhaseKingConfig,
    #[serde(default = "CausalConfig::default")]
    pub causal: CausalConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::IoError {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.as_ref().display().to_string(),
            source: e,
        })
    }

    /// Create a default configuration and write it to a file.
    pub fn write_default<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config)
            .map_err(|e| ConfigError::SerializeError { source: e })?;

        fs::write(path.as_ref(), toml).map_err(|e| ConfigError::IoError {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Ok(())
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.interval_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.bully.call_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.bully.response_timeout_secs)
    }

    pub fn coordinator_timeout(&self) -> Duration {
        Duration::from_secs(self.bully.coordinator_timeout_secs)
    }

    pub fn init_schedule(&self) -> Duration {
        Duration::from_secs(self.phase_king.init_schedule_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.phase_king.start_timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            group: GroupConfig::default(),
            discovery: DiscoveryConfig::default(),
            bully: BullyConfig::default(),
            phase_king: PhaseKingConfig::default(),
            causal: CausalConfig::default(),
        }
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            multicast_addr: default_multicast_addr(),
            multicast_port: default_multicast_port(),
            starting_port: default_starting_port(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_discovery_interval_secs(),
        }
    }
}

impl Default for BullyConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            response_timeout_secs: default_response_timeout_secs(),
            coordinator_timeout_secs: default_coordinator_timeout_secs(),
        }
    }
}

impl Default for PhaseKingConfig {
    fn default() -> Self {
        Self {
            init_schedule_secs: default_init_schedule_secs(),
            start_timeout_secs: default_start_timeout_secs(),
            min_participants: default_min_participants(),
        }
    }
}

impl Default for CausalConfig {
    fn default() -> Self {
        Self {
            send_history_capacity: default_send_history_capacity(),
        }
    }
}

fn default_multicast_addr() -> Ipv4Addr {
    Ipv4Addr::new(224, 1, 1, 1)
}
fn default_multicast_port() -> u16 {
    6000
}
fn default_starting_port() -> u16 {
    6001
}
fn default_discovery_interval_secs() -> u64 {
    15
}
fn default_call_timeout_secs() -> u64 {
    40
}
fn default_response_timeout_secs() -> u64 {
    10
}
fn default_coordinator_timeout_secs() -> u64 {
    30
}
fn default_init_schedule_secs() -> u64 {
    30
}
fn default_start_timeout_secs() -> u64 {
    30
}
fn default_min_participants() -> usize {
    5
}
fn default_send_history_capacity() -> usize {
    10_000
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: String,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {source}")]
    SerializeError { source: toml::ser::Error },
}
