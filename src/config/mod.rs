//! Simulator configuration
//!
//! Loaded from `~/.kubequest/config.yaml` when present. Every field has a
//! default, so a missing file or an empty section is fine.
//!
//! ```yaml
//! cluster:
//!   initial_nodes: 2
//!   pod_capacity: 4
//!   recovery_delay_ms: 2000
//! server:
//!   port: 8080
//! tutor:
//!   model: gpt-4o-mini
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::cluster::{ClusterConfig, DEFAULT_PORT};
use crate::tutor::TutorConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// API server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl ServerConfig {
    /// `host:port` to bind to
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Full simulator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    #[serde(default)]
    pub cluster: ClusterConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub tutor: TutorConfig,
}

// ============================================================================
// Pure functions
// ============================================================================

/// Parse and validate YAML config text
pub fn parse_config(content: &str) -> Result<SimulatorConfig, ConfigError> {
    if content.trim().is_empty() {
        return Ok(SimulatorConfig::default());
    }
    let config: SimulatorConfig = serde_yaml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Reject settings the simulation cannot run with
pub fn validate(config: &SimulatorConfig) -> Result<(), ConfigError> {
    let cluster = &config.cluster;
    if cluster.pod_capacity == 0 {
        return Err(ConfigError::Invalid(
            "cluster.pod_capacity must be at least 1".to_string(),
        ));
    }
    if cluster.snapshot_buffer == 0 {
        return Err(ConfigError::Invalid(
            "cluster.snapshot_buffer must be at least 1".to_string(),
        ));
    }
    if cluster.tick_ms == 0 {
        return Err(ConfigError::Invalid(
            "cluster.tick_ms must be at least 1".to_string(),
        ));
    }
    if !(0.0..=2.0).contains(&config.tutor.temperature) {
        return Err(ConfigError::Invalid(format!(
            "tutor.temperature must be between 0 and 2, got {}",
            config.tutor.temperature
        )));
    }
    Ok(())
}

// ============================================================================
// SBIO: I/O wrapper - thin layer over pure functions
// ============================================================================

/// Default config path (~/.kubequest/config.yaml)
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kubequest")
        .join("config.yaml")
}

/// Load config from the default path
pub fn load_config() -> Result<SimulatorConfig, ConfigError> {
    load_config_from(&default_config_path())
}

/// Load config from a path (`~` is expanded); a missing file yields defaults
pub fn load_config_from(path: &Path) -> Result<SimulatorConfig, ConfigError> {
    let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
    let path = Path::new(&expanded);

    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(SimulatorConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}
