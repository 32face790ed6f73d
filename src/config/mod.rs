//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - `PROMPTGATE_*` environment variables
//! - CLI arguments (for the binary)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{GateError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Policy data source
    #[serde(default)]
    pub data: DataConfig,

    /// Guard classifier collaborator
    #[serde(default)]
    pub guard: GuardConfig,

    /// Rewrite collaborator
    #[serde(default)]
    pub rewrite: RewriteConfig,

    /// Matching behavior
    #[serde(default)]
    pub matcher: MatcherConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| GateError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| GateError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("PROMPTGATE_ADDR") {
            config.server.addr = addr;
        }
        if let Ok(path) = std::env::var("PROMPTGATE_DATA_PATH") {
            config.data.base_path = PathBuf::from(path);
        }
        if let Ok(endpoint) = std::env::var("PROMPTGATE_GUARD_ENDPOINT") {
            config.guard.endpoint = Some(endpoint);
        }
        if let Ok(endpoint) = std::env::var("PROMPTGATE_REWRITE_ENDPOINT") {
            config.rewrite.endpoint = Some(endpoint);
        }
        if let Ok(distance) = std::env::var("PROMPTGATE_EXEMPTION_DISTANCE") {
            if let Ok(distance) = distance.parse() {
                config.matcher.exemption_distance = distance;
            }
        }

        config
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Bind address
    pub addr: String,
    /// Enable CORS
    pub cors_enabled: bool,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:3000".to_string(),
            cors_enabled: true,
        }
    }
}

/// Policy data source settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Base path of the JSON policy exports
    pub base_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("./data"),
        }
    }
}

/// Guard classifier settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Classification endpoint; unset falls back to a fixed SAFE label,
    /// for offline use only.
    pub endpoint: Option<String>,
}

/// Rewrite collaborator settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Rewrite endpoint; unset disables rewriting.
    pub endpoint: Option<String>,
}

/// Matching behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Exemption phrase window in bytes; 0 = whole text.
    pub exemption_distance: usize,
}
